//! `wardgate-core`: shared configuration and identity primitives.
//!
//! This crate holds the process-wide settings every pipeline component reads.
//! It has no HTTP framework or storage dependencies.

pub mod config;
pub mod error;
pub mod id;

pub use config::{
    CookieSettings, DEFAULT_MAX_FORM_BYTES, DEFAULT_SESSION_MAX_AGE_SECS, SecurityConfig, StaticMount,
};
pub use error::{ConfigError, ConfigResult};
pub use id::UserId;
