//! Ridgeline Core - Shared types library.
//!
//! This crate provides common types used across the Ridgeline components:
//! - `admin` - Internal administration console for the recruiting platform
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, session tokens,
//!   and routing slugs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
