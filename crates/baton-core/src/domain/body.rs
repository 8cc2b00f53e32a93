//! Task payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque payload submitted alongside a task.
///
/// The engine never looks inside; JSON helpers are provided for handlers
/// that want typed payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBody {
    pub content: String,
}

impl TaskBody {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}
