//! Narrow input interfaces for the secret and registry stores.

use crate::core::types::EventKind;
use serde::{Deserialize, Serialize};

/// A secret as handed over by the store collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub value: String,
    /// Image glob patterns the secret may be exposed to. Empty admits
    /// every image.
    #[serde(default)]
    pub images: Vec<String>,
    /// Events the secret is available for. Empty admits every event.
    #[serde(default)]
    pub events: Vec<EventKind>,
    /// Restrict the secret to plugin-shaped steps (no user commands).
    #[serde(default)]
    pub plugins_only: bool,
}

impl Secret {
    pub fn matches_event(&self, event: EventKind) -> bool {
        self.events.is_empty() || self.events.contains(&event)
    }
}

/// Registry credentials as handed over by the store collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub hostname: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

/// Clone credentials injected as netrc variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Netrc {
    pub login: String,
    pub password: String,
    pub machine: String,
}
