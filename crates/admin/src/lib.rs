//! Ridgeline Admin library.
//!
//! The session-integrity, threat-telemetry, and encrypted-messaging core
//! of the Ridgeline recruiting platform's administrative console, exposed
//! as a library so it can be tested and reused.
//!
//! # Security
//!
//! This crate enforces:
//! - Single-active-session authentication with a rotating routing slug
//! - Behavioral telemetry with threat heuristics and audit logging
//! - End-to-end-encrypted messaging (ciphertext-only persistence)
//!
//! The CRUD surfaces of the console (job builder, applicant table, user
//! list) live elsewhere; only the settings row's shape is consumed here.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
