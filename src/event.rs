//! Instrumentation event interface
//!
//! The engine never touches a live runtime. An external instrumentation
//! source observes the traced program and delivers one [`TraceEvent`] per
//! observation, carrying snapshots of everything the engine may need:
//! bound locals, the call receiver's attribute sets, visible constants,
//! and (for calls) the invoked method's definition site.

use anyhow::{anyhow, Result};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Kind of a single execution observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A source line was reached
    Line,
    /// A method/function call was entered
    Call,
    /// A method/function call returned
    Return,
    /// Execution crossed into a native (non-traced-language) routine
    NativeCall,
    /// Execution returned from a native routine
    NativeReturn,
}

impl EventKind {
    /// Stable label matching the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Line => "line",
            EventKind::Call => "call",
            EventKind::Return => "return",
            EventKind::NativeCall => "native_call",
            EventKind::NativeReturn => "native_return",
        }
    }
}

/// Opaque, process-unique handle for a runtime value's identity
///
/// Correlates observations of "the same object" across records without ever
/// retaining the object itself. Tokens come from the instrumentation source;
/// the engine only compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(pub u64);

impl IdentityToken {
    /// Derive a token from a source-assigned object id using FNV
    pub fn from_object_id(object_id: u64) -> Self {
        let mut hasher = FnvHasher::default();
        object_id.hash(&mut hasher);
        IdentityToken(hasher.finish())
    }
}

/// Capability-typed access to an observed runtime value
///
/// Rendering may fail (the original value's inspect hook may have raised at
/// capture time); callers must treat `render` as fallible and recover.
pub trait RuntimeValue {
    /// Human-readable representation, unbounded
    fn render(&self) -> Result<String>;
    /// Type label of the value
    fn type_label(&self) -> &str;
    /// Identity token, if the source could assign one
    fn identity(&self) -> Option<IdentityToken>;
}

/// Concrete value snapshot carried inside a [`TraceEvent`]
///
/// `repr` is `None` when the instrumentation source itself failed to render
/// the value; [`RuntimeValue::render`] surfaces that as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotValue {
    #[serde(default)]
    pub repr: Option<String>,
    #[serde(default = "unknown_type")]
    pub type_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityToken>,
}

fn unknown_type() -> String {
    "Unknown".to_string()
}

impl SnapshotValue {
    /// Snapshot of a successfully rendered value
    pub fn new(repr: impl Into<String>, type_label: impl Into<String>) -> Self {
        Self {
            repr: Some(repr.into()),
            type_label: type_label.into(),
            identity: None,
        }
    }

    /// Attach an identity token
    pub fn with_identity(mut self, identity: IdentityToken) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Snapshot of a value whose rendering failed at capture time
    pub fn failed() -> Self {
        Self {
            repr: None,
            type_label: unknown_type(),
            identity: None,
        }
    }
}

impl RuntimeValue for SnapshotValue {
    fn render(&self) -> Result<String> {
        self.repr
            .clone()
            .ok_or_else(|| anyhow!("value rendering failed at capture"))
    }

    fn type_label(&self) -> &str {
        &self.type_label
    }

    fn identity(&self) -> Option<IdentityToken> {
        self.identity
    }
}

/// Snapshot of the call receiver (the active object)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiverSnapshot {
    /// Qualified name of the receiver's type
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityToken>,
    /// Raw runtime object id, for sources that do not assign tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<u64>,
    /// Mutable attributes of the active object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, SnapshotValue>,
    /// Shared attributes of the active type
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_attributes: BTreeMap<String, SnapshotValue>,
}

impl ReceiverSnapshot {
    /// Identity token for keying attribute state
    ///
    /// Prefers a source-assigned token; falls back to deriving one from
    /// the raw object id.
    pub fn identity_token(&self) -> Option<IdentityToken> {
        self.identity
            .or_else(|| self.object_id.map(IdentityToken::from_object_id))
    }
}

/// Resolvable source location of an invoked method's definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSite {
    pub path: PathBuf,
    /// 1-based line of the method's declaration
    pub line: u32,
}

/// One instrumentation observation, as delivered by the source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub line: u32,
    /// Method/function name; `None` for top-level code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Enclosing type name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Locally bound names at this instant
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locals: BTreeMap<String, SnapshotValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverSnapshot>,
    /// Declared parameter names, for call events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Visible qualified constants and their values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, SnapshotValue>,
    /// Return value, for return/native-return events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<SnapshotValue>,
    /// Definition site of the invoked method, for call events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionSite>,
}

impl TraceEvent {
    /// Minimal event with the given kind and location
    pub fn at(kind: EventKind, path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            line,
            method: None,
            owner: None,
            locals: BTreeMap::new(),
            receiver: None,
            parameters: Vec::new(),
            constants: BTreeMap::new(),
            return_value: None,
            definition: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_labels_match_serde() {
        for kind in [
            EventKind::Line,
            EventKind::Call,
            EventKind::Return,
            EventKind::NativeCall,
            EventKind::NativeReturn,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.label()));
        }
    }

    #[test]
    fn test_identity_token_is_stable() {
        let a = IdentityToken::from_object_id(42);
        let b = IdentityToken::from_object_id(42);
        let c = IdentityToken::from_object_id(43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_receiver_token_falls_back_to_object_id() {
        let mut receiver = ReceiverSnapshot {
            type_name: "Billing".to_string(),
            object_id: Some(11),
            ..ReceiverSnapshot::default()
        };
        assert_eq!(
            receiver.identity_token(),
            Some(IdentityToken::from_object_id(11))
        );
        // A source-assigned token wins over derivation
        receiver.identity = Some(IdentityToken(3));
        assert_eq!(receiver.identity_token(), Some(IdentityToken(3)));
        // Neither present: nothing to key on
        assert!(ReceiverSnapshot::default().identity_token().is_none());
    }

    #[test]
    fn test_snapshot_value_render_failure() {
        let value = SnapshotValue::failed();
        assert!(value.render().is_err());
        assert_eq!(value.type_label(), "Unknown");
        assert!(value.identity().is_none());
    }

    #[test]
    fn test_minimal_event_parses_from_json() {
        let event: TraceEvent =
            serde_json::from_str(r#"{"kind":"line","path":"app.rb","line":3}"#).unwrap();
        assert_eq!(event.kind, EventKind::Line);
        assert_eq!(event.line, 3);
        assert!(event.locals.is_empty());
        assert!(event.method.is_none());
    }

    #[test]
    fn test_full_event_parses_from_json() {
        let json = r#"{
            "kind": "call",
            "path": "/srv/app/billing.rb",
            "line": 10,
            "method": "charge",
            "owner": "Billing",
            "parameters": ["amount"],
            "locals": {"amount": {"repr": "100", "type_label": "Integer"}},
            "receiver": {
                "type_name": "Billing",
                "identity": 7,
                "attributes": {"@total": {"repr": "0", "type_label": "Integer"}}
            },
            "definition": {"path": "/srv/app/billing.rb", "line": 9}
        }"#;
        let event: TraceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.method.as_deref(), Some("charge"));
        assert_eq!(event.parameters, vec!["amount"]);
        let receiver = event.receiver.unwrap();
        assert_eq!(receiver.identity, Some(IdentityToken(7)));
        assert_eq!(receiver.attributes.len(), 1);
        assert_eq!(event.definition.unwrap().line, 9);
    }
}
