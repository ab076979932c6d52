//! Shared types and utilities for retrofs.
//!
//! This crate provides common functionality used across all retrofs crates:
//! - Block and cache tuning constants
//! - `nfs://` URL handling
//! - Shared error types

pub mod constants;
pub mod error;
pub mod location;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::UrlError;
pub use location::NfsLocation;
