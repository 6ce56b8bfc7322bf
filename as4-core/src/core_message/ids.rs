//! Message identifier generation

use uuid::Uuid;

/// Suffix appended to generated message ids unless configured otherwise
pub const DEFAULT_MESSAGE_ID_SUFFIX: &str = "as4-core";

/// Generate a globally unique ebMS message id of the form `<uuid>@<suffix>`
pub fn generate_message_id(suffix: &str) -> String {
    format!("{}@{}", Uuid::new_v4(), suffix)
}
