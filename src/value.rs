//! Value serialization
//!
//! Renders an observed runtime value into a bounded debug string, a type
//! label, and an optional identity token. Serialization never fails from the
//! caller's point of view: a failing render is replaced with an inline error
//! marker and an `Unknown` type label.

use crate::event::{IdentityToken, RuntimeValue};
use serde::{Deserialize, Serialize};

/// Maximum rendered representation length, in characters
pub const MAX_REPR_LEN: usize = 200;

/// Marker appended to truncated representations
const ELLIPSIS: &str = "...";

/// Rendered form of a value as it appears in a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedValue {
    /// Bounded human-readable representation
    pub repr: String,
    /// Type label of the value
    pub type_label: String,
    /// Identity token, stable per underlying value within a session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityToken>,
}

/// Serialize a runtime value, recovering from render failures
pub fn serialize(value: &dyn RuntimeValue) -> SerializedValue {
    match value.render() {
        Ok(repr) => SerializedValue {
            repr: truncate_repr(&repr),
            type_label: value.type_label().to_string(),
            identity: value.identity(),
        },
        Err(err) => SerializedValue {
            repr: format!("<cronista: serialization failed: {err}>"),
            type_label: "Unknown".to_string(),
            identity: None,
        },
    }
}

/// Truncate to [`MAX_REPR_LEN`] characters, appending an ellipsis marker
///
/// Counts characters rather than bytes so multi-byte input never splits.
pub fn truncate_repr(raw: &str) -> String {
    let mut chars = raw.char_indices();
    match chars.nth(MAX_REPR_LEN) {
        None => raw.to_string(),
        Some((byte_offset, _)) => {
            let mut truncated = raw[..byte_offset].to_string();
            truncated.push_str(ELLIPSIS);
            truncated
        }
    }
}
