//! Autohaul Core - Shared types library.
//!
//! This crate provides common types used across all Autohaul components:
//! - `api` - HTTP API in front of the managed backend
//! - `portal` - Client-side session, route guarding and API access
//!
//! # Architecture
//!
//! The core crate contains only types and pure predicates - no I/O, no
//! database access, no HTTP clients. Both the server gate chain and the
//! client route guard decide access through [`access::is_authorized`], so
//! role semantics cannot drift between the two sides.
//!
//! # Modules
//!
//! - [`types`] - Roles, statuses, emails, reference ids and typed UUIDs
//! - [`access`] - Role predicates shared by server gates and client guards

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod types;

pub use access::{admits_client, is_authorized};
pub use types::*;
