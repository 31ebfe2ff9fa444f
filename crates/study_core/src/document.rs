use serde::{Deserialize, Serialize};

/// A document that the assistant service has accepted.
///
/// `id` is the service's opaque file identifier; `display_name` is the name
/// the user uploaded it under. Handles are never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    pub display_name: String,
}

impl DocumentHandle {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}
