//! # SwordForge Game Server Library
//!
//! Authoritative server for a real-time multiplayer arena. The server owns
//! the only true copy of the world (players, enemies, thrown swords and
//! resource pickups), validates every client intent against it and streams
//! snapshots back to all connected clients over WebSockets.
//!
//! ## Architecture
//!
//! ### Single Scheduling Domain
//! All world mutation happens inside [`network::Server::run`]. Connection
//! tasks parse frames and forward intents over a channel; the loop applies
//! them between ticks, so a tick always sees a consistent world and its
//! snapshot always follows its own mutations.
//!
//! ### Fixed Tick Order
//! Each tick integrates players, resolves queued melee swings, runs the
//! enemy AI, removes dead enemies whose grace window has passed, tops the
//! population up, advances thrown swords and finally emits the snapshot.
//! Time is a virtual clock advanced by the tick itself; timed effects are
//! expiry stamps compared against it.
//!
//! ### Events, Not Sockets
//! Simulation code returns [`shared::ServerEvent`] values and never touches
//! a connection. The [`client_manager`] decides who receives what.
//!
//! ### Progression Off the Hot Path
//! Profiles, crafting and the market live in a separate single-writer
//! service ([`progression::ProfileService`]) with its own store. The loop
//! only sends it requests and relays its answers.
//!
//! ## Module Organization
//!
//! - `world`, `entity`: the world aggregate and entity stores
//! - `combat`, `ai`, `projectile`: per-tick rules
//! - `game`: intent application and the tick sequence
//! - `network`, `client_manager`, `auth`: sessions and transport
//! - `progression`, `persistence`: durable profiles and the market
//! - `config`, `error`: tuning and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::TokenTable;
//! use server::network::{Server, ServerSettings};
//! use server::persistence::MemoryProfileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let mut tokens = TokenTable::new();
//!     tokens.insert("secret", "user-1", "ada");
//!
//!     let server = Server::bind(
//!         "127.0.0.1:8080",
//!         ServerSettings::default(),
//!         Arc::new(tokens),
//!         Box::new(MemoryProfileStore::new()),
//!     )
//!     .await?;
//!     server.run().await
//! }
//! ```

pub mod ai;
pub mod auth;
pub mod client_manager;
pub mod combat;
pub mod config;
pub mod duel;
pub mod entity;
pub mod error;
pub mod game;
pub mod network;
pub mod persistence;
pub mod progression;
pub mod projectile;
pub mod world;
