//! # LMS Common Library
//!
//! Shared code for the LMS backend services including:
//! - Common error types
//! - Domain models (courses, enrollments, progress entries)
//! - Database initialization and schema
//! - Configuration loading
//! - Database retry helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
