//! Backend internal representation: the executable plan handed to the
//! container executor. Write-once output; an executor receiving one
//! needs no further queries to the core.

use serde::Serialize;
use std::collections::BTreeMap;

/// The executable plan for one workflow.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Config {
    pub stages: Vec<Stage>,
    pub networks: Vec<Network>,
    pub volumes: Vec<Volume>,
}

/// Steps in a stage run concurrently; stages run sequentially.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Stage {
    /// Prefixed, unique across pipelines.
    pub name: String,
    /// Author-facing label.
    pub alias: String,
    pub steps: Vec<Step>,
}

/// One container with its full runtime configuration.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Step {
    /// Prefixed container name, unique across pipelines.
    pub name: String,
    /// Author-facing step name.
    pub alias: String,
    /// Stable identifier, derived from the run prefix.
    pub uuid: String,
    pub image: String,
    pub pull: bool,
    pub detached: bool,
    pub privileged: bool,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,
    pub entrypoint: Vec<String>,
    pub commands: Vec<String>,
    pub volumes: Vec<String>,
    pub networks: Vec<Conn>,
    pub mem_limit: i64,
    pub mem_swap_limit: i64,
    pub shm_size: i64,
    pub cpu_quota: i64,
    pub cpu_shares: i64,
    pub cpu_set: String,
    #[serde(skip_serializing_if = "AuthConfig::is_empty")]
    pub auth_config: AuthConfig,
}

/// Network attachment for a step.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Conn {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Registry credentials resolved for a step image.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl AuthConfig {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// Named network created for the run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Network {
    pub name: String,
    pub driver: String,
}

/// Named volume created for the run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Volume {
    pub name: String,
    pub driver: String,
}
