//! pgrest Common Types and Utilities
//!
//! Shared error handling, configuration and wire types for the
//! PostgREST-compatible translation layer.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{CorsConfig, LoggingConfig, RestConfig};
pub use error::{Error, Result};
pub use types::{DatabaseError, PostgrestError};
