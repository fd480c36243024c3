//! Core domain model: metadata binding, configuration snapshot, and the
//! pipeline compilation subsystem.
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod secret;
pub mod types;

pub use config::{BackendSettings, ResourceLimits};
pub use error::{CompileError, ErrorKind};
pub use metadata::{ForgeInfo, Metadata, PipelineInfo, Repo, WorkflowInfo};
pub use secret::{Netrc, Registry, Secret};
pub use types::{CancellationFlag, EventKind, WorkflowState};
