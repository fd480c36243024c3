//! The pipeline compilation core: from `(name, bytes)` sources to the
//! executable plan consumed by container executors.

pub mod backend;
pub mod builder;
pub mod compiler;
pub mod ids;
pub mod lint;
pub mod matrix;
pub mod schema;
pub mod source;
pub mod substitute;
pub mod when;

pub use builder::{link_steps, Item, PlanBuilder, StepRecord, WorkflowRecord};
pub use ids::{FixedRunIds, RunIdSource, SystemRunIds};
pub use source::SourceSpec;
