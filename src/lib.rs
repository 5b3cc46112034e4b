//! webp-redirect - CDN WebP rewriting with fallback to original images.
//!
//! This crate rewrites image URLs on a page to CDN-hosted WebP copies,
//! walks back to the original image when a copy is missing, and reports
//! load outcomes to a log server. Browser surfaces are modelled as ports.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the rewriting engine.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "webp-redirect";
