// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![warn(warnings)]                    // Surface every warning
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # gatesync
//!
//! A declarative configuration differ and sync planner for API gateways.
//!
//! ## Overview
//!
//! gatesync lets you keep a gateway's routes, services, upstreams, SSL
//! certificates, consumers and plugin settings in version-controlled files:
//!
//! - Describe the desired configuration in one or more YAML/JSON files
//! - Compare it with what the gateway currently holds
//! - Get an ordered list of create, update and delete events
//! - Apply those events through a backend, guarded by a lock
//!
//! ## Architecture
//!
//! The system is built around **declarative reconciliation**:
//!
//! 1. **Desired configuration**: loaded from declarative files
//! 2. **Observed configuration**: dumped from a backend, together with the
//!    default values the gateway injects into stored resources
//! 3. **Diff engine**: matches resources by identifier, compares them with
//!    defaults applied, and orders the resulting events so that references
//!    are always satisfied
//!
//! ## Modules
//!
//! - [`config`]: Configuration model, loading, filtering and validation
//! - [`planner`]: The diff engine and its events
//! - [`backend`]: Backends holding the observed configuration
//! - [`reconciler`]: Plan, sync and drift detection against a backend
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! services:
//!   - name: httpbin
//!     upstream:
//!       nodes:
//!         - host: httpbin.org
//!           port: 80
//!           weight: 1
//!     routes:
//!       - name: anything
//!         uris:
//!           - /anything
//!         plugins:
//!           key-auth: {}
//! consumers:
//!   - username: jack
//!     credentials:
//!       - name: primary
//!         type: key-auth
//!         config:
//!           key: ${JACK_KEY}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{Backend, FileBackend, SyncOptions, SyncResult};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigLoader, ConfigValidator, Configuration, DefaultValue};
pub use error::{GatesyncError, Result};
pub use planner::{DiffEngine, DiffSummary, Event, EventType, ResourceKind, diff};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
