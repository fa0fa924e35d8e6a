//! Shared types, errors, and configuration for Rampart.
//!
//! This crate provides common types used across all other crates:
//! - Integer minor-unit money types
//! - Typed IDs for type-safe entity references
//! - Offset pagination types for list endpoints
//! - Application-wide error types
//! - HMAC-SHA256 webhook signing shared by ingestion and delivery
//! - Configuration management

pub mod config;
pub mod error;
pub mod signature;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
