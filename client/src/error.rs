//! Error taxonomy for the client core.
//!
//! Protocol errors are logged and dropped by whoever detects them, transport and
//! auth errors are propagated to the caller, and bracket anomalies never surface
//! here at all because the scheduler rejects them structurally.

use shared::{GameId, PlayerId};
use thiserror::Error;

/// Inbound traffic that cannot be applied to a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("{kind} message carries no game id")]
    MissingGameId { kind: &'static str },
    #[error("{kind} message for game {got} delivered to game {expected}")]
    ForeignGameId {
        kind: &'static str,
        expected: GameId,
        got: GameId,
    },
    #[error("malformed frame: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel closed")]
    Closed,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("no credentials available")]
    MissingCredentials,
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("auth backend unavailable: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("local tournament matches cannot be remote")]
    RemoteTournament,
    #[error("remote match requires a local player id")]
    MissingLocalPlayer,
    #[error("local player {local} is not part of match {player1} vs {player2}")]
    LocalPlayerNotInMatch {
        local: PlayerId,
        player1: PlayerId,
        player2: PlayerId,
    },
    #[error("player {0} cannot play against itself")]
    DuplicatePlayers(PlayerId),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid match config: {0}")]
    Config(#[from] ConfigError),
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("session for game {0} is already initialized")]
    AlreadyInitialized(GameId),
}

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("unsupported entrant count {0}: brackets need a power of two of at least 2")]
    UnsupportedEntrantCount(usize),
    #[error("alias {0:?} is empty or used twice")]
    InvalidAlias(String),
    #[error("a tournament is already running")]
    AlreadyRunning,
    #[error("failed to start match: {0}")]
    Session(#[from] SessionError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] bincode::Error),
}
