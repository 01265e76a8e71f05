//! Configuration module for gatesync.
//!
//! This module handles everything about declarative gateway configuration:
//! - The resource tree model and the default-value table
//! - Loading YAML/JSON files with environment substitution and merging
//! - Label and resource-type selection
//! - Validation of desired configurations
//! - Resource identifiers and configuration fingerprints

mod hash;
mod model;
mod parser;
mod validator;

pub use hash::{ConfigHasher, generate_id};
pub use model::{Configuration, DefaultValue, Resource, STREAM_SERVICE_BUCKET};
pub use parser::{
    ConfigLoader, FileFormat, LabelSelector, fill_labels, filter_by_labels, filter_resource_types,
    merge_into, substitute_env,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
