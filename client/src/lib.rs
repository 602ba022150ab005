//! # Game Client Library
//!
//! This library provides the client side of a networked two-player paddle game.
//! The server owns the physics; the client joins matches, forwards paddle input,
//! mirrors the authoritative state and renders it. A local tournament mode chains
//! matches into a single-elimination bracket on one keyboard.
//!
//! ## Architecture Overview
//!
//! Everything runs on one event thread. Socket I/O lives in tokio tasks that only
//! move raw frames; decoding, routing and every state change happen when the frame
//! loop polls the channel.
//!
//! ### Shared Channel, Per-Game Subscriptions
//! One connection to the server carries traffic for every match this client plays.
//! Each session subscribes to its own `game_id` and revokes the subscription when
//! it is torn down, so a finished match never sees messages meant for the next one.
//!
//! ### Ball Prediction
//! The server steps the game ten times a second. Between two updates the client
//! extrapolates the ball along the last reported per-step delta and snaps it back
//! when the next update arrives. Paddles are only ever drawn where the server put
//! them.
//!
//! ### Deadlines Instead of Timers
//! Countdown, GOAL banner, game-over delay and error teardown are deadlines checked
//! on every frame. Tests drive them with synthetic instants.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The per-match state machine: initialization, message handling, prediction,
//! movement, quitting and teardown.
//!
//! ### Tournament Module (`tournament`)
//! Runs a bracket of matches one after another and reports each result through a
//! one-shot completion signal. Bracket bookkeeping itself lives in `bracket`.
//!
//! ### Network Module (`network`)
//! The `Transport` seam sessions talk to, the UDP link used in production and an
//! in-memory link for tests.
//!
//! ### Input Module (`input`)
//! Keyboard sampling and the mapping from keys to paddle deltas.
//!
//! ### Rendering Module (`rendering`)
//! Top-down drawing of a session view plus the effect state owned by the frame loop.
//!
//! ### Supporting Modules
//! `auth` supplies bearer tokens for remote matches, `config` holds match and
//! timing configuration, `error` the error types.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::auth::LocalOnly;
//! use client::config::{MatchConfig, SessionTimings};
//! use client::game::GameSession;
//! use client::input::MoveIntent;
//! use client::network::{memory_link, Channel};
//! use std::time::Instant;
//!
//! let (link, _server) = memory_link();
//! let mut channel = Channel::new(link);
//! let mut session = GameSession::new(SessionTimings::default());
//!
//! let config = MatchConfig::local(&mut rand::thread_rng());
//! session
//!     .initialize(config, &mut channel, &mut LocalOnly, |summary| {
//!         println!("winner: {}", summary.winner);
//!     })
//!     .expect("local match");
//!
//! loop {
//!     // Apply inbound messages and fire due deadlines
//!     session.update(Instant::now(), &mut channel);
//!
//!     // Forward this frame's paddle movement
//!     let _ = session.send_movement(MoveIntent::default(), &mut channel);
//!
//!     if session.is_torn_down() {
//!         break;
//!     }
//! }
//! ```

pub mod auth;
pub mod bracket;
pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod tournament;
