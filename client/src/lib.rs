//! # Server Status Client Library
//!
//! This library polls a single game server with the two-step A2S-style query
//! (server info, then challenge-gated player list) and hands every result to a
//! consumer that displays it. The consumer never touches the network: it reads
//! `ServerStatus` values from a channel and may send back a refresh request.
//!
//! ## Architecture Overview
//!
//! ### Polling Thread
//! A dedicated OS thread owns the query socket and the poll state, so polling
//! carries on however the consumer schedules its own work. It runs a
//! tight loop: drain refresh requests, advance the state machine by one
//! non-blocking step, sleep for a fraction of a millisecond. Because the loop
//! never waits on the socket, a stop request is noticed within one iteration.
//!
//! ### Explicit State Machine
//! A cycle moves through `Idle → AwaitingInfo → AwaitingChallenge →
//! AwaitingPlayers → Idle`. Every transition consumes the current state and
//! returns the next one. The partial server info and the challenge token live
//! inside the state variants, so a token can never leak into a later cycle.
//!
//! ### Failure Policy
//! Malformed responses, socket errors and step timeouts all end the cycle with
//! a `ServerStatus::Error` and an immediate retry. A successful cycle waits a
//! full poll interval. Only start-up (resolving the server, binding the local
//! port) can fail outright.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The non-blocking UDP transport and the `Link` trait the state machine is
//! written against.
//!
//! ### State Module (`state`)
//! `PollState`, `PollMachine` and the timing policy. No I/O of its own, time is
//! passed in by the caller.
//!
//! ### Channel Module (`channel`)
//! The ordered status stream and the coalescing refresh path.
//!
//! ### Poller Module (`poller`)
//! Configuration, start-up and the background loop tying the rest together.
//!
//! ### Error Module (`error`)
//! `PollError` (per-cycle failures) and `StartupError`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::poller::{Poller, PollerConfig};
//! use shared::ServerStatus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PollerConfig {
//!         remote_host: "192.0.2.10".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let mut handle = Poller::start(config).await?;
//!
//!     while let Some(status) = handle.recv().await {
//!         println!("[{}] {}", status.badge(), status.tooltip());
//!         if let ServerStatus::Ok(info) = status {
//!             for player in &info.player_list {
//!                 println!("  {} ({})", player.name, player.score);
//!             }
//!             break;
//!         }
//!     }
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod network;
pub mod poller;
pub mod state;

pub use channel::{Refresh, RefreshSender, StatusReceiver};
pub use error::{PollError, StartupError, Step};
pub use poller::{Poller, PollerConfig, PollerHandle, ShutdownHandle};
pub use state::{PollMachine, PollState, Timing};
