//! Configuration validation.
//!
//! Checks a desired configuration for mistakes the diff engine would
//! otherwise turn into confusing events: nameless resources, duplicates,
//! and malformed service, SSL or credential fields.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::planner::{Naming, ResourceKind};

use super::model::{Configuration, Resource};

/// Credential types a consumer credential may use.
const CREDENTIAL_TYPES: &[&str] = &["key-auth", "basic-auth", "jwt-auth", "hmac-auth"];

/// Validator for desired configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a desired configuration.
    ///
    /// All findings are collected; the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any rule fails.
    pub fn validate(&self, config: &Configuration) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(ConfigError::validation(first_error.message.clone(), first_error.field.clone()).into());
        }

        debug!(
            "Configuration validation passed with {} warning(s)",
            result.warnings.len()
        );
        Ok(result)
    }

    /// Runs every rule and returns all findings without failing.
    #[must_use]
    pub fn check(&self, config: &Configuration) -> ValidationResult {
        let mut result = ValidationResult::default();

        for kind in ResourceKind::ALL {
            if let Some(list) = config.list(kind) {
                let items: Vec<&Resource> = list.iter().collect();
                Self::validate_collection(kind, &items, kind.collection_key(), &mut result);
            }
        }

        result
    }

    /// Validates one collection and, recursively, the children it nests.
    fn validate_collection(kind: ResourceKind, items: &[&Resource], path: &str, result: &mut ValidationResult) {
        let desc = kind.descriptor();
        let mut seen = HashSet::new();

        for (index, resource) in items.iter().enumerate() {
            let at = format!("{path}[{index}]");
            let name = desc.resource_name(resource);

            if name.is_empty() {
                let field = name_field(kind);
                result.error(format!("{at}.{field}"), format!("{kind} {field} cannot be empty"));
            } else if !seen.insert(name.clone()) {
                result.error(format!("{at}.{}", name_field(kind)), format!("Duplicate {kind} name '{name}'"));
            }

            Self::validate_resource(kind, resource, &at, result);

            for child in desc.children {
                let Some(children) = resource.get(child.field).and_then(Value::as_array) else {
                    continue;
                };
                let children: Vec<&Resource> = children.iter().filter_map(Value::as_object).collect();
                Self::validate_collection(child.kind, &children, &format!("{at}.{}", child.field), result);
            }
        }
    }

    /// Applies the kind-specific rules to one resource.
    fn validate_resource(kind: ResourceKind, resource: &Resource, at: &str, result: &mut ValidationResult) {
        match kind {
            ResourceKind::Service => {
                if resource.contains_key("routes") && resource.contains_key("stream_routes") {
                    result.error(
                        at.to_string(),
                        "A service cannot contain both routes and stream_routes",
                    );
                }
                if let Some(prefix) = resource.get("path_prefix").and_then(Value::as_str)
                    && !prefix.starts_with('/')
                {
                    result.error(
                        format!("{at}.path_prefix"),
                        format!("Path prefix '{prefix}' must start with '/'"),
                    );
                }
            }
            ResourceKind::Ssl => {
                let has_certificate = resource
                    .get("certificates")
                    .and_then(Value::as_array)
                    .is_some_and(|certs| !certs.is_empty());
                if !has_certificate {
                    result.error(format!("{at}.certificates"), "An SSL needs at least one certificate");
                }
            }
            ResourceKind::ConsumerCredential => {
                let credential_type = resource.get("type").and_then(Value::as_str).unwrap_or_default();
                if !CREDENTIAL_TYPES.contains(&credential_type) {
                    result.error(
                        format!("{at}.type"),
                        format!(
                            "Credential type '{credential_type}' is invalid. Must be one of: {}",
                            CREDENTIAL_TYPES.join(", ")
                        ),
                    );
                }
            }
            ResourceKind::Route => {
                let has_uris = resource
                    .get("uris")
                    .and_then(Value::as_array)
                    .is_some_and(|uris| !uris.is_empty());
                if !has_uris {
                    result.warnings.push(format!("{at}: route has no uris and will never match"));
                }
            }
            _ => {}
        }
    }
}

/// Returns the field a kind's name is read from.
const fn name_field(kind: ResourceKind) -> &'static str {
    match kind.descriptor().naming {
        Naming::Username => "username",
        Naming::Snis => "snis",
        Naming::Name | Naming::MapKey => "name",
    }
}
