//! # Tactics Server Library
//!
//! This library provides the authoritative server for a two-player, turn-based
//! tactics game played on a square grid. It owns every match, validates each
//! action a player submits, and pushes the resulting state to both players
//! over websocket connections.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Clients only submit intents (move here, cast this there, end my turn). The
//! server checks turn ownership, adjacency, bounds, occupancy, ability range
//! and action points, and either applies the whole action or nothing.
//!
//! ### Matchmaking
//! Players asking for a game are seated in the oldest match with a free slot,
//! or a new match is opened. The second player to arrive starts the match.
//!
//! ### State Broadcasting
//! Every successful action is followed by a full snapshot sent to both
//! players, and every turn rotation by a `turn_changed` event.
//!
//! ## Architecture Design
//!
//! ### Per-Match Locking
//! The session registry keeps each match behind its own lock. Actions on one
//! match never wait on another, and actions on the same match are applied one
//! at a time against a draft that is committed only on success.
//!
//! ### Websocket Transport
//! One task per connection reads JSON envelopes `{eventName, data}` and a
//! writer task drains a bounded outbound queue. Identity comes from the
//! handshake query string.
//!
//! ## Module Organization
//!
//! - `grid`, `entity`, `ability`: board geometry, units and the ability catalog
//! - `game`: a single match and its turn rotation
//! - `registry`: the concurrency-safe store of matches
//! - `matchmaker`: pairing players into matches
//! - `resolver`: action validation and application, turn expiry, terminal hook
//! - `connections`, `notifier`: connected players and event delivery
//! - `service`: inbound event dispatch
//! - `network`: websocket accept loop and the turn watchdog
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod ability;
pub mod config;
pub mod connections;
pub mod entity;
pub mod error;
pub mod game;
pub mod grid;
pub mod matchmaker;
pub mod network;
pub mod notifier;
pub mod registry;
pub mod resolver;
pub mod service;
