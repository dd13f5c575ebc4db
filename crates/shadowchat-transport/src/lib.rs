// ============================================
// File: crates/shadowchat-transport/src/lib.rs
// ============================================
//! # ShadowChat Transport - Frame I/O Layer
//!
//! ## Creation Reason
//! Provides frame transport abstractions for the ShadowChat relay and
//! client: WebSocket connections for real traffic and an in-memory pipe
//! for tests.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `FrameTransport` trait definition
//! - [`websocket`]: WebSocket listener, transport and client dial
//! - [`memory`]: In-process transport pair
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              shadowchat-node                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │   shadowchat-core      shadowchat-transport         │
//! │                        You are here ◄──             │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             shadowchat-common                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always program against `FrameTransport` for testability
//! - Frames carry JSON envelopes; they are sent as WebSocket text frames
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod memory;
pub mod traits;
pub mod websocket;

// Re-export primary types
pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::FrameTransport;
pub use websocket::{dial, ClientTransport, WsListener, WsTransport};
