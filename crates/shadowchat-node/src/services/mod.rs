// ============================================
// File: crates/shadowchat-node/src/services/mod.rs
// ============================================
//! # Node Services
//!
//! ## Creation Reason
//! Connection bookkeeping and the session state machine, kept apart
//! from the wire transport and from role-specific envelope handling.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`connection`]: One peer link with a bounded outbound queue
//! - [`relay`]: Registry of live connections and broadcast fan-out
//! - [`session`]: Per-connection state machine with inbound/outbound pumps
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐        ┌──────────────────────────┐  │
//! │  │  SessionHandler  │───────►│       Connection         │  │
//! │  │  - inbound pump  │        │  - outbound queue (256)  │  │
//! │  │  - outbound pump │        │  - bound User            │  │
//! │  └────────┬─────────┘        └────────────▲─────────────┘  │
//! │           │ role                          │ Weak           │
//! │           ▼                  ┌────────────┴─────────────┐  │
//! │     SessionRole ────────────►│          Relay           │  │
//! │                              │  - register / deregister │  │
//! │                              │  - broadcast except self │  │
//! │                              └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The relay never holds its lock across an await
//! - Closing a connection must wake both pumps
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod connection;
pub mod relay;
pub mod session;

// Re-export primary types
pub use connection::{Connection, User, DEFAULT_OUTBOUND_CAPACITY};
pub use relay::Relay;
pub use session::{SessionHandler, SessionRole, SessionState};
