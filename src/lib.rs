//! patchvault - fetch signed update packages, verify their embedded
//! signatures and archive their patch payloads by signing time
//!
//! A run reads an update manifest, downloads every listed package with
//! bounded concurrency (skipping files that already carry a valid
//! counter-signed signature), extracts each package with an external tool
//! and files the resulting payloads under
//! `<archive root>/<X86|X64>/updates/<signing time>-<name>`.

// Enforce strict code quality and reliability
#![deny(
    // Safety
    unsafe_code,

    // Correctness
    missing_debug_implementations,

    // Future compatibility
    future_incompatible,

    // Rust 2018 idioms
    rust_2018_idioms,
)]
#![warn(
    // Error handling best practices
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_enum_variant,

    // Code clarity and maintainability
    clippy::cognitive_complexity,
    clippy::type_complexity,

    // Best practices
    clippy::clone_on_ref_ptr,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
)]

pub mod api;
pub mod defaults;
pub mod download;
pub mod exceptions;
pub mod exit_codes;
pub mod extract;
pub mod logger;
pub mod manifest;
pub mod signing;
pub mod utils;
pub mod version;

// Re-export main API types
pub use api::{RunOptions, RunSummary, Session};
pub use exceptions::{Result, VaultError};
pub use manifest::{Manifest, Platform, PlatformSet};
pub use signing::{SignatureInspector, SignedTimestamp};
