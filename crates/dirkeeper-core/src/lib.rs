//! # dirkeeper-core
//!
//! Core types shared by the DirKeeper crates.
//!
//! This crate provides the error hierarchy every directory operation reports through and the
//! connection configuration that is resolved from the process environment on each tool call.
//!
//! ## Modules
//!
//! - [`error`] - Error types, stable error codes and structured error responses
//! - [`config`] - Directory connection configuration and its environment resolver

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ConnectionTarget, DirectoryConfig};
pub use error::{Error, Result};
