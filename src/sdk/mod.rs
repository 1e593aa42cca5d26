//! Project-type SDK: the declarative builder and its compiled config.

pub mod builder;
pub mod config;

pub use builder::{Branch, BuildError, ProjectTypeBuilder, TransitionOptions};
pub use config::{FieldKind, MetadataSchema, PhaseConfig, ProjectTypeConfig};
