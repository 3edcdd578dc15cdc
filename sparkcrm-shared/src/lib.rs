//! # SparkCRM Shared Library
//!
//! This crate contains the data model, error taxonomy and remote collaborator
//! contracts used by the SparkCRM synchronization core and console.
//!
//! ## Module Organization
//!
//! - `models`: Contacts, tasks, sessions and the `Record` trait
//! - `error`: The closed `CrmError` enumeration
//! - `remote`: Auth service and record collection contracts plus backends
//! - `auth`: Session token and password hashing helpers

pub mod auth;
pub mod error;
pub mod models;
pub mod remote;

pub use error::{CrmError, CrmResult};

/// Current version of the SparkCRM shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
