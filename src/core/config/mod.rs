//! Administrator configuration snapshot.
//!
//! Captured once at compilation entry and read-only afterwards; two
//! compilations never share mutable configuration state.

use crate::core::error::{CompileError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_WORKSPACE_BASE: &str = "/pipewright";
const DEFAULT_MAX_MATRIX_JOBS: usize = 100;

/// Backend settings applied to every compiled workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    /// Images permitted to run privileged (trusted repositories only).
    pub privileged: Vec<String>,
    /// Hard resource ceilings stamped onto every step.
    pub limits: ResourceLimits,
    /// Host mounts attached to every step.
    pub volumes: Vec<String>,
    /// Networks attached to every step.
    pub networks: Vec<String>,
    /// Image used for the generated clone step.
    pub default_clone_image: String,
    /// Also inject clone credentials for public repositories.
    pub authenticate_public_repos: bool,
    /// Keep clone credentials away from user steps of untrusted repos.
    pub netrc_only_trusted: bool,
    /// Upper bound on matrix expansion per source file.
    pub max_matrix_jobs: usize,
    /// In-container workspace root.
    pub workspace_base: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            privileged: Vec::new(),
            limits: ResourceLimits::default(),
            volumes: Vec::new(),
            networks: Vec::new(),
            default_clone_image: String::new(),
            authenticate_public_repos: false,
            netrc_only_trusted: true,
            max_matrix_jobs: DEFAULT_MAX_MATRIX_JOBS,
            workspace_base: DEFAULT_WORKSPACE_BASE.to_string(),
        }
    }
}

/// Container resource ceilings. Zero means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceLimits {
    pub mem_limit: i64,
    pub mem_swap_limit: i64,
    pub shm_size: i64,
    pub cpu_quota: i64,
    pub cpu_shares: i64,
    pub cpu_set: String,
}

impl BackendSettings {
    /// Load settings from a YAML file and validate them.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let content = fs::read_to_string(path).map_err(|err| {
            CompileError::new(
                ErrorKind::Config,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        let settings: BackendSettings = serde_yaml::from_str(&content).map_err(|err| {
            CompileError::new(
                ErrorKind::Config,
                format!("failed to parse {}: {}", path.display(), err),
            )
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        let limits = &self.limits;
        for (name, value) in [
            ("mem_limit", limits.mem_limit),
            ("mem_swap_limit", limits.mem_swap_limit),
            ("shm_size", limits.shm_size),
            ("cpu_quota", limits.cpu_quota),
            ("cpu_shares", limits.cpu_shares),
        ] {
            if value < 0 {
                return Err(CompileError::new(
                    ErrorKind::Config,
                    format!("limits.{} must not be negative", name),
                ));
            }
        }
        if self.max_matrix_jobs == 0 {
            return Err(CompileError::new(
                ErrorKind::Config,
                "max_matrix_jobs must be at least 1",
            ));
        }
        if self.workspace_base.is_empty() {
            return Err(CompileError::new(
                ErrorKind::Config,
                "workspace_base must be set",
            ));
        }
        Ok(())
    }
}
