//! # TTNLOG Common Library
//!
//! Shared code for the TTNLOG shipment code logging service:
//! - Error types
//! - Configuration loading
//! - Database initialization and models
//! - Shipment code normalization

pub mod code;
pub mod config;
pub mod db;
pub mod error;

pub use code::{normalize_code, LengthPolicy};
pub use error::{Error, Result};
