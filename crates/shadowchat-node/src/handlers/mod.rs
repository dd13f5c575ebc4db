// ============================================
// File: crates/shadowchat-node/src/handlers/mod.rs
// ============================================
//! # Session Roles
//!
//! ## Creation Reason
//! The session state machine is shared by both ends of a connection;
//! what differs is how each side reacts to envelopes. Each role here
//! plugs into [`crate::services::SessionHandler`].
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`server_role`]: Identifies users and fans frames out through the relay
//! - [`client_role`]: Agrees session keys and decrypts text
//!
//! ## Handler Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionHandler                          │
//! │          inbound pump ──► SessionRole::on_envelope          │
//! ├─────────────────────────────┬───────────────────────────────┤
//! │        ServerRole           │          ClientRole           │
//! │  - bind username / key      │  - announce identity          │
//! │  - check sender id          │  - RSA-OAEP key agreement     │
//! │  - Relay::broadcast         │  - AES-GCM decrypt            │
//! └─────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Roles must never log plaintext
//! - Returning an error from a role drops the frame unless the error is
//!   fatal to the session
//!
//! ## Last Modified
//! v0.1.0 - Initial roles

pub mod client_role;
pub mod server_role;

pub use client_role::{ChatEvent, ClientRole, GROUP_UNAVAILABLE};
pub use server_role::ServerRole;
