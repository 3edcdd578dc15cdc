//! # SparkCRM Console Library
//!
//! Terminal front end over the SparkCRM synchronization core.
//!
//! ## Modules
//!
//! - `app`: Backend wiring, guard mount and sign-in
//! - `cli`: Command-line arguments
//! - `commands`: Command handlers producing printable lines
//! - `config`: Configuration management

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
