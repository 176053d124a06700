//! Axon Core - Shared types library.
//!
//! This crate provides the domain types used by the landing page:
//! - `landing` - Waitlist, session, and feedback controllers plus the HTTP surface
//! - `integration-tests` - Router-level tests
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for emails, identities, and feedback input

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
