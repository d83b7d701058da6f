//! # troop-relay
//!
//! Real-time presence and event relay for the troop portal.
//!
//! Clients connect over WebSocket at `/ws` and authenticate with a user id
//! and role. The relay derives each user's topics from the groups it leads
//! and the scouts it parents, tracks who is online, and fans out chat
//! messages, RSVP changes, achievements and document uploads to exactly the
//! connections subscribed to the affected topics.
//!
//! - [`presence`]: who is online, through which connections
//! - [`router`]: topic membership and non-blocking fan-out
//! - [`auth`]: claim validation and topic derivation
//! - [`handlers`]: validate → persist → publish for each inbound event
//! - [`lifecycle`]: connect/disconnect transitions and status broadcasts
//! - [`server`]: axum routes (`/ws`, `/health`, `/metrics`) and graceful shutdown

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod lifecycle;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use errors::{AuthenticationError, DeliveryError, PersistenceError, RelayError, ValidationError};
pub use hub::RelayHub;
pub use server::RelayServer;
