// ============================================
// File: crates/shadowchat-node/src/lib.rs
// ============================================
//! # ShadowChat Node Library
//!
//! ## Creation Reason
//! Provides both ends of the ShadowChat relay: the server that fans
//! opaque frames out to every other connection, and the client that
//! agrees per-peer keys and encrypts messages end to end.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Node configuration management
//! - [`server`]: Relay server orchestration
//! - [`client`]: Chat client and session handle
//! - [`identity`]: Client key file persistence
//! - [`services`]: Connection, relay and session state machine
//!   - [`services::connection`]: One peer link with a bounded queue
//!   - [`services::relay`]: Live connection registry and broadcast
//!   - [`services::session`]: Inbound/outbound pumps and state
//! - [`handlers`]: Server and client session roles
//! - [`error`]: Node-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ShadowChat Node                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐  │
//! │  │   Config    │────►│   Server    │────►│   ServerRole    │  │
//! │  │             │     │  / Client   │     │  / ClientRole   │  │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘  │
//! │                             │                     │           │
//! │         ┌───────────────────┼─────────────────────┘           │
//! │         ▼                   ▼                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     │
//! │  │   Session   │     │ Connection  │     │    Relay    │     │
//! │  │   Handler   │     │             │     │             │     │
//! │  └─────────────┘     └─────────────┘     └─────────────┘     │
//! │                                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │                     Transport Layer                           │
//! │  ┌─────────────────────┐     ┌─────────────────────────────┐ │
//! │  │  WebSocket (/ws)    │     │   In-memory (tests)         │ │
//! │  └─────────────────────┘     └─────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Client A → encrypt → WS → Relay → WS → decrypt → Client B
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The server never sees plaintext or session keys
//! - Configuration changes require restart (no hot-reload)
//! - Graceful shutdown closes every live connection
//!
//! ## Last Modified
//! v0.1.0 - Initial node library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod server;
pub mod services;

// Re-export primary types
pub use client::{Client, ClientHandle};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use handlers::ChatEvent;
pub use server::Server;
pub use services::SessionState;
