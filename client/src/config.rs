//! Match configuration and session timing.

use crate::error::ConfigError;
use rand::Rng;
use shared::{GameId, PlayerId};
use std::time::Duration;

/// Immutable description of one match, validated before a session accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub game_id: GameId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub local_player_id: Option<PlayerId>,
    pub player1_alias: String,
    pub player2_alias: String,
    pub is_remote: bool,
    pub is_local_tournament: bool,
}

impl MatchConfig {
    /// Head-to-head match on one keyboard with throwaway ids.
    pub fn local<R: Rng>(rng: &mut R) -> Self {
        Self {
            game_id: rng.gen_range(5000..10000),
            player1_id: rng.gen_range(1000..2000),
            player2_id: rng.gen_range(2000..3000),
            local_player_id: None,
            player1_alias: "Player1".to_string(),
            player2_alias: "Player2".to_string(),
            is_remote: false,
            is_local_tournament: false,
        }
    }

    pub fn remote(
        game_id: GameId,
        players: (PlayerId, PlayerId),
        local_player_id: PlayerId,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            game_id,
            player1_id: players.0,
            player2_id: players.1,
            local_player_id: Some(local_player_id),
            player1_alias: format!("Player {}", players.0),
            player2_alias: format!("Player {}", players.1),
            is_remote: true,
            is_local_tournament: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn tournament_match(
        game_id: GameId,
        player1: (PlayerId, &str),
        player2: (PlayerId, &str),
    ) -> Result<Self, ConfigError> {
        let config = Self {
            game_id,
            player1_id: player1.0,
            player2_id: player2.0,
            local_player_id: None,
            player1_alias: player1.1.to_string(),
            player2_alias: player2.1.to_string(),
            is_remote: false,
            is_local_tournament: true,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_aliases(mut self, player1: &str, player2: &str) -> Self {
        self.player1_alias = player1.to_string();
        self.player2_alias = player2.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_local_tournament && self.is_remote {
            return Err(ConfigError::RemoteTournament);
        }
        if self.player1_id == self.player2_id {
            return Err(ConfigError::DuplicatePlayers(self.player1_id));
        }
        if self.is_remote {
            let local = self.local_player_id.ok_or(ConfigError::MissingLocalPlayer)?;
            if local != self.player1_id && local != self.player2_id {
                return Err(ConfigError::LocalPlayerNotInMatch {
                    local,
                    player1: self.player1_id,
                    player2: self.player2_id,
                });
            }
        }
        Ok(())
    }

    /// True when the local player controls the right-hand paddle and sees the
    /// field mirrored.
    pub fn inverted_view(&self) -> bool {
        self.is_remote && self.local_player_id == Some(self.player2_id)
    }
}

/// Fixed delays of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTimings {
    /// From the `starting` message until input is enabled.
    pub countdown: Duration,
    /// How long the GOAL banner stays up before the scoreboard catches up.
    pub goal_display: Duration,
    /// From `game_over` until the completion callback fires.
    pub game_over_delay: Duration,
    /// From a transport error until the session tears itself down.
    pub error_teardown: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(2),
            goal_display: Duration::from_secs(2),
            game_over_delay: Duration::from_secs(3),
            error_teardown: Duration::from_secs(3),
        }
    }
}
