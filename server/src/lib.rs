//! # Test-Double Game Server
//!
//! A small UDP server that speaks the server side of the A2S-style query
//! exchange. It exists so the polling client can be exercised end to end
//! without a real game server: integration tests spawn it on an ephemeral
//! port, and the `server` binary runs it for local demos.
//!
//! ## Behaviour
//!
//! - **Info query**: replies with the configured `ServerInfo`, with the
//!   player count taken from the current roster.
//! - **Challenge request**: replies with a fresh random token and remembers it
//!   for the requesting address.
//! - **Player request**: replies with the roster if the token matches the one
//!   issued to that address, otherwise with a new challenge, as real servers
//!   do.
//! - **Anything else**: logged and dropped.
//!
//! Every well-formed request is recorded with its arrival time so tests can
//! assert on what the client actually sent.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! `QueryServer`, its background `ServerHandle`, and request bookkeeping.
//!
//! ### Roster Module (`roster`)
//! Helpers for building fake player lists.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::QueryServer;
//! use server::roster::fixed_players;
//! use shared::ServerInfo;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = ServerInfo {
//!         name: "Local Test".to_string(),
//!         map: "cp_well".to_string(),
//!         max_players: 24,
//!         ..Default::default()
//!     };
//!
//!     let server = QueryServer::bind("127.0.0.1:27015", info, fixed_players(&["a", "b"])).await?;
//!     server.run_until(tokio::signal::ctrl_c()).await;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod roster;
