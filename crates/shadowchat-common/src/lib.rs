// ============================================
// File: crates/shadowchat-common/src/lib.rs
// ============================================
//! # ShadowChat Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the identifier types and base error type shared by every
//! ShadowChat crate, so connection and user identities look the same
//! from the cipher layer up to the relay.
//!
//! ## Main Functionality
//! - [`types`]: Identifiers (`ConnectionId`, `UserId`)
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               shadowchat-node                       │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │  shadowchat-core      shadowchat-transport          │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │           shadowchat-common  ◄── You are here       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dependencies
//! - No internal crate dependencies (leaf node)
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - `UserId` ordering is part of the key agreement rule, do not change `Ord`
//! - Identifiers travel on the wire as plain strings
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{ConnectionId, UserId};
