//! Local single-elimination tournament played on one keyboard.
//!
//! The controller owns the bracket and at most one running [`GameSession`]. Each
//! session reports its result through a one-shot channel; the controller picks it
//! up on the next [`TournamentController::update`], records the winner and then
//! decides what runs next.

use crate::auth::LocalOnly;
use crate::bracket::{is_final, next_unplayed_pairing, BracketEntry, TournamentState};
use crate::config::{MatchConfig, SessionTimings};
use crate::error::TournamentError;
use crate::game::{GameSession, Phase};
use crate::network::Transport;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{GameId, GameOverSummary, PlayerId};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::oneshot::{self, error::TryRecvError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TournamentEvent {
    MatchStarted {
        game_id: GameId,
        round: u32,
        player1: String,
        player2: String,
    },
    MatchFinished {
        game_id: GameId,
        winner: String,
    },
    RoundAdvanced {
        round: u32,
    },
    FinalStarted {
        game_id: GameId,
        player1: String,
        player2: String,
    },
    Champion(String),
    Aborted(String),
}

impl TournamentEvent {
    /// Closing line for the events that end a tournament.
    pub fn headline(&self) -> Option<String> {
        match self {
            TournamentEvent::Champion(alias) => Some(format!("{} wins the tournament!", alias)),
            TournamentEvent::Aborted(reason) => Some(format!("Tournament stopped: {}", reason)),
            _ => None,
        }
    }
}

struct ActiveMatch {
    session: GameSession,
    completion: oneshot::Receiver<GameOverSummary>,
    pairing: usize,
}

pub struct TournamentController {
    timings: SessionTimings,
    rng: StdRng,
    state: Option<TournamentState>,
    active: Option<ActiveMatch>,
    next_game_id: GameId,
    last_checkpoint: Option<Vec<u8>>,
}

impl TournamentController {
    pub fn new(timings: SessionTimings) -> Self {
        Self::from_rng(timings, StdRng::from_entropy())
    }

    /// Deterministic pairings, for replays and tests.
    pub fn with_seed(timings: SessionTimings, seed: u64) -> Self {
        Self::from_rng(timings, StdRng::seed_from_u64(seed))
    }

    fn from_rng(timings: SessionTimings, mut rng: StdRng) -> Self {
        let next_game_id = rng.gen_range(5000..10000);
        Self {
            timings,
            rng,
            state: None,
            active: None,
            next_game_id,
            last_checkpoint: None,
        }
    }

    pub fn launch(&mut self, aliases: &[&str]) -> Result<(), TournamentError> {
        if self.state.is_some() {
            return Err(TournamentError::AlreadyRunning);
        }
        if aliases.len() < 2 || !aliases.len().is_power_of_two() {
            return Err(TournamentError::UnsupportedEntrantCount(aliases.len()));
        }

        let mut seen = HashSet::new();
        for alias in aliases {
            let trimmed = alias.trim();
            if trimmed.is_empty() || !seen.insert(trimmed) {
                return Err(TournamentError::InvalidAlias(alias.to_string()));
            }
        }

        let entrants: Vec<BracketEntry> = aliases
            .iter()
            .enumerate()
            .map(|(index, alias)| BracketEntry::new(index as PlayerId + 1, alias.trim()))
            .collect();

        let state = TournamentState::new(entrants, &mut self.rng);
        info!(
            "Tournament launched with {} players over {} rounds",
            aliases.len(),
            state.total_rounds
        );
        self.state = Some(state);
        self.take_checkpoint()?;
        Ok(())
    }

    /// Drives the running match and schedules whatever comes after it.
    pub fn update(&mut self, now: Instant, transport: &mut dyn Transport) -> Vec<TournamentEvent> {
        let mut events = Vec::new();

        if let Some(active) = self.active.as_mut() {
            active.session.update(now, transport);

            match active.completion.try_recv() {
                Ok(summary) => {
                    if let Some(finished) = self.active.take() {
                        if let Err(reason) = self.finish_match(finished, summary, &mut events) {
                            events.push(self.discard(transport, reason));
                            return events;
                        }
                    }
                }
                Err(TryRecvError::Empty) => {
                    // A failed match stays visible until its own teardown runs.
                    let phase = active.session.phase();
                    if phase.is_terminal()
                        && phase != Phase::GameOver
                        && active.session.is_torn_down()
                    {
                        let reason = active
                            .session
                            .message()
                            .unwrap_or("match ended without a winner")
                            .to_string();
                        warn!("Tournament match ended in {:?}: {}", phase, reason);
                        events.push(self.discard(transport, reason));
                        return events;
                    }
                    return events;
                }
                Err(TryRecvError::Closed) => {
                    events.push(self.discard(transport, "match result lost".to_string()));
                    return events;
                }
            }
        }

        if self.state.is_some() {
            if let Err(e) = self.schedule(transport, &mut events) {
                error!("Tournament scheduling failed: {}", e);
                events.push(self.discard(transport, e.to_string()));
            }
        }
        events
    }

    fn finish_match(
        &mut self,
        finished: ActiveMatch,
        summary: GameOverSummary,
        events: &mut Vec<TournamentEvent>,
    ) -> Result<(), String> {
        let game_id = finished.session.game_id().unwrap_or_default();
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Ok(()),
        };

        let in_match = state
            .pairings
            .get(finished.pairing)
            .map_or(false, |pairing| pairing.involves(summary.winner));
        if !in_match {
            warn!(
                "Game {} reported winner {} who was not in the match",
                game_id, summary.winner
            );
            return Err(format!(
                "game {} reported an unknown winner {}",
                game_id, summary.winner
            ));
        }

        if state.record_winner(summary.winner) {
            let winner = state
                .winners
                .last()
                .map(|entry| entry.alias.clone())
                .unwrap_or_default();
            info!("{} won game {}", winner, game_id);
            events.push(TournamentEvent::MatchFinished { game_id, winner });
            if let Err(e) = self.take_checkpoint() {
                warn!("Checkpoint after game {} failed: {}", game_id, e);
            }
        }
        Ok(())
    }

    fn schedule(
        &mut self,
        transport: &mut dyn Transport,
        events: &mut Vec<TournamentEvent>,
    ) -> Result<(), TournamentError> {
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Ok(()),
        };

        if let Some(index) = next_unplayed_pairing(&state.pairings) {
            return self.start_match(index, transport, events);
        }

        if state.is_final_round {
            if let Some(champion) = state.champion().map(|entry| entry.alias.clone()) {
                info!("{} wins the tournament!", champion);
                self.state = None;
                self.last_checkpoint = None;
                transport.disconnect();
                events.push(TournamentEvent::Champion(champion));
            }
            return Ok(());
        }

        if is_final(&state.winners) {
            state.start_final();
            self.take_checkpoint()?;
            return self.schedule(transport, events);
        }

        if state.round_complete() {
            state.advance_round(&mut self.rng);
            info!("Round {} of {}", state.round, state.total_rounds);
            events.push(TournamentEvent::RoundAdvanced { round: state.round });
            self.take_checkpoint()?;
            return self.schedule(transport, events);
        }

        Ok(())
    }

    fn start_match(
        &mut self,
        index: usize,
        transport: &mut dyn Transport,
        events: &mut Vec<TournamentEvent>,
    ) -> Result<(), TournamentError> {
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Ok(()),
        };
        let game_id = self.next_game_id;
        self.next_game_id += 1;

        let pairing = &mut state.pairings[index];
        let config = MatchConfig::tournament_match(
            game_id,
            (pairing.player_a.player_id, &pairing.player_a.alias),
            (pairing.player_b.player_id, &pairing.player_b.alias),
        )
        .map_err(crate::error::SessionError::from)?;

        let (sender, completion) = oneshot::channel();
        let mut session = GameSession::retaining_transport(self.timings);
        session.initialize(config, transport, &mut LocalOnly, move |summary| {
            // The receiver is gone only if the tournament was torn down.
            let _ = sender.send(summary);
        })?;

        pairing.played = true;
        let player1 = pairing.player_a.alias.clone();
        let player2 = pairing.player_b.alias.clone();
        let event = if state.is_final_round {
            info!("Final: {} vs {}", player1, player2);
            TournamentEvent::FinalStarted {
                game_id,
                player1,
                player2,
            }
        } else {
            info!("Round {}: {} vs {}", state.round, player1, player2);
            TournamentEvent::MatchStarted {
                game_id,
                round: state.round,
                player1,
                player2,
            }
        };
        events.push(event);

        self.active = Some(ActiveMatch {
            session,
            completion,
            pairing: index,
        });
        Ok(())
    }

    /// Stops the tournament and releases the running match, if any.
    pub fn abort(&mut self, transport: &mut dyn Transport) -> Option<TournamentEvent> {
        if self.state.is_none() && self.active.is_none() {
            return None;
        }
        if let Some(active) = self.active.as_mut() {
            active.session.quit(transport);
        }
        Some(self.discard(transport, "tournament aborted".to_string()))
    }

    fn discard(&mut self, transport: &mut dyn Transport, reason: String) -> TournamentEvent {
        if let Some(mut active) = self.active.take() {
            active.session.teardown(transport);
        }
        self.state = None;
        transport.disconnect();
        info!("Tournament ended: {}", reason);
        TournamentEvent::Aborted(reason)
    }

    fn take_checkpoint(&mut self) -> Result<(), TournamentError> {
        if let Some(state) = &self.state {
            self.last_checkpoint = Some(state.to_checkpoint()?);
        }
        Ok(())
    }

    /// Bytes of the most recent checkpoint. Kept after an abort so the bracket
    /// can be resumed.
    pub fn checkpoint(&self) -> Option<&[u8]> {
        self.last_checkpoint.as_deref()
    }

    /// Restores a bracket from a checkpoint. Matches that were running when it
    /// was taken are played again.
    pub fn resume(&mut self, bytes: &[u8]) -> Result<(), TournamentError> {
        if self.state.is_some() {
            return Err(TournamentError::AlreadyRunning);
        }
        let mut state = TournamentState::from_checkpoint(bytes)?;

        let winners: HashSet<PlayerId> = state.winners.iter().map(|w| w.player_id).collect();
        for pairing in state.pairings.iter_mut() {
            let decided = winners.contains(&pairing.player_a.player_id)
                || winners.contains(&pairing.player_b.player_id);
            if pairing.played && !decided {
                pairing.played = false;
            }
        }

        info!(
            "Tournament resumed in round {} with {} winners recorded",
            state.round,
            state.winners.len()
        );
        self.state = Some(state);
        self.last_checkpoint = Some(bytes.to_vec());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&TournamentState> {
        self.state.as_ref()
    }

    pub fn active_game_id(&self) -> Option<GameId> {
        self.active.as_ref().and_then(|active| active.session.game_id())
    }

    pub fn active_session(&self) -> Option<&GameSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn active_session_mut(&mut self) -> Option<&mut GameSession> {
        self.active.as_mut().map(|active| &mut active.session)
    }
}
