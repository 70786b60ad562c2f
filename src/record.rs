//! Trace record schema
//!
//! One self-contained JSON object per output line. Optional enrichment
//! fields are omitted entirely when absent so the stream stays compact. The
//! final line of every session is a [`SummaryRecord`], distinguished by its
//! `"event": "summary"` marker.

use crate::config::TraceConfig;
use crate::event::EventKind;
use crate::extract::MethodDefinition;
use crate::value::SerializedValue;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel method name for top-level code
pub const TOP_LEVEL: &str = "<main>";

/// Status of a tracked entity surfaced on a record
///
/// `unchanged` observations are never surfaced, so only these two appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Created,
    Changed,
}

/// A tracked entity's value plus its change status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedState {
    #[serde(flatten)]
    pub value: SerializedValue,
    pub status: ChangeStatus,
    /// Record id of the prior observation, for `changed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_record_id: Option<u64>,
    /// Redefinition warning, for constants only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One emitted, immutable, sequence-numbered trace record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Sequence id, unique and strictly increasing from 1
    pub id: u64,
    /// Microseconds since the Unix epoch
    pub timestamp_us: u64,
    pub event: EventKind,
    /// Source file basename
    pub file: String,
    /// Full source path
    pub path: String,
    pub line: u32,
    /// Method name, or [`TOP_LEVEL`] for top-level code
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Whether the path classified as application code
    pub app_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locals: Option<BTreeMap<String, SerializedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_attributes: Option<BTreeMap<String, RecordedState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_attributes: Option<BTreeMap<String, RecordedState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constants: Option<BTreeMap<String, RecordedState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_values: Option<BTreeMap<String, SerializedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<SerializedValue>,
    /// Text of the executed source line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
    /// Full method source, first call per method key only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_definition: Option<MethodDefinition>,
    /// Back-reference to the record carrying this method's definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_definition_ref: Option<u64>,
    /// Inline markers for enrichment failures on this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl TraceRecord {
    /// Skeleton record for an event at the given location
    ///
    /// The id is a placeholder until the writer assigns one.
    pub fn skeleton(event: EventKind, path: &str, line: u32, app_code: bool) -> Self {
        let file = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unknown>")
            .to_string();
        Self {
            id: 0,
            timestamp_us: now_us(),
            event,
            file,
            path: path.to_string(),
            line,
            method: TOP_LEVEL.to_string(),
            owner: None,
            app_code,
            locals: None,
            object_attributes: None,
            type_attributes: None,
            constants: None,
            parameters: None,
            parameter_values: None,
            return_value: None,
            source_line: None,
            method_definition: None,
            method_definition_ref: None,
            errors: None,
        }
    }
}

/// Marker value distinguishing the terminal summary record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMarker {
    Summary,
}

/// Terminal record aggregating session-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: u64,
    pub timestamp_us: u64,
    pub event: SummaryMarker,
    /// Count of non-summary records; equals the summary's own id minus 1
    pub total_steps: u64,
    /// Touched application-code files, sorted
    pub application_files: Vec<String>,
    /// Touched external files, sorted
    pub external_files: Vec<String>,
    /// Distinct methods observed, qualified, sorted
    pub methods: Vec<String>,
    /// Method key to the record id carrying its full definition
    pub method_definitions: BTreeMap<String, u64>,
    /// Entities tracked for state changes
    pub tracked_entities: usize,
    /// Qualified constant keys observed, sorted
    pub constants: Vec<String>,
    /// Line events suppressed as consecutive duplicates
    pub suppressed_line_events: u64,
    /// Records written per event kind
    pub event_counts: BTreeMap<String, u64>,
    /// Configuration active for the session
    pub config: TraceConfig,
}

/// A parsed output line: either a trace record or the terminal summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyRecord {
    Summary(SummaryRecord),
    Trace(TraceRecord),
}

impl AnyRecord {
    pub fn id(&self) -> u64 {
        match self {
            AnyRecord::Summary(record) => record.id,
            AnyRecord::Trace(record) => record.id,
        }
    }
}

/// Parse one output line back into a record
pub fn parse_line(line: &str) -> Result<AnyRecord> {
    serde_json::from_str(line).context("malformed trace record line")
}

/// Current time in microseconds since the Unix epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_extracts_basename() {
        let record = TraceRecord::skeleton(EventKind::Line, "/srv/app/models/user.rb", 12, true);
        assert_eq!(record.file, "user.rb");
        assert_eq!(record.path, "/srv/app/models/user.rb");
        assert_eq!(record.method, TOP_LEVEL);
        assert!(record.app_code);
    }

    #[test]
    fn test_optional_fields_omitted_from_json() {
        let record = TraceRecord::skeleton(EventKind::Line, "/srv/app/a.rb", 1, true);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("locals"));
        assert!(!json.contains("return_value"));
        assert!(!json.contains("method_definition"));
        assert!(!json.contains("errors"));
    }

    #[test]
    fn test_trace_record_round_trips() {
        let mut record = TraceRecord::skeleton(EventKind::Call, "/srv/app/a.rb", 4, true);
        record.id = 7;
        record.method = "charge".to_string();
        record.parameters = Some(vec!["amount".to_string()]);
        let json = serde_json::to_string(&record).unwrap();
        match parse_line(&json).unwrap() {
            AnyRecord::Trace(parsed) => {
                assert_eq!(parsed.id, 7);
                assert_eq!(parsed.method, "charge");
                assert_eq!(parsed.parameters, Some(vec!["amount".to_string()]));
            }
            AnyRecord::Summary(_) => panic!("trace record parsed as summary"),
        }
    }

    #[test]
    fn test_summary_identified_by_event_marker() {
        let summary = SummaryRecord {
            id: 10,
            timestamp_us: now_us(),
            event: SummaryMarker::Summary,
            total_steps: 9,
            application_files: vec!["/srv/app/a.rb".to_string()],
            external_files: vec![],
            methods: vec![],
            method_definitions: BTreeMap::new(),
            tracked_entities: 0,
            constants: vec![],
            suppressed_line_events: 0,
            event_counts: BTreeMap::new(),
            config: TraceConfig::default(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"event\":\"summary\""));
        match parse_line(&json).unwrap() {
            AnyRecord::Summary(parsed) => assert_eq!(parsed.total_steps, 9),
            AnyRecord::Trace(_) => panic!("summary parsed as trace record"),
        }
    }

    #[test]
    fn test_recorded_state_flattens_value() {
        let state = RecordedState {
            value: SerializedValue {
                repr: "100".to_string(),
                type_label: "Integer".to_string(),
                identity: None,
            },
            status: ChangeStatus::Changed,
            previous_record_id: Some(4),
            warning: None,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"repr\":\"100\""));
        assert!(json.contains("\"status\":\"changed\""));
        assert!(json.contains("\"previous_record_id\":4"));
        assert!(!json.contains("warning"));
    }
}
