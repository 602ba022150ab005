//! Single-elimination bracket bookkeeping.
//!
//! Everything in here is plain data plus pure functions; the only input besides
//! the bracket itself is the random source used to draw pairings.

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketEntry {
    pub player_id: PlayerId,
    pub alias: String,
}

impl BracketEntry {
    pub fn new(player_id: PlayerId, alias: &str) -> Self {
        Self {
            player_id,
            alias: alias.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub player_a: BracketEntry,
    pub player_b: BracketEntry,
    /// Set once a match for this pairing has been launched.
    pub played: bool,
}

impl Pairing {
    pub fn new(player_a: BracketEntry, player_b: BracketEntry) -> Self {
        Self {
            player_a,
            player_b,
            played: false,
        }
    }

    pub fn involves(&self, player_id: PlayerId) -> bool {
        self.player_a.player_id == player_id || self.player_b.player_id == player_id
    }
}

/// Draws two random entrants at a time until at most one is left. A leftover
/// entrant gets no pairing.
pub fn pair<R: Rng>(entrants: &[BracketEntry], rng: &mut R) -> Vec<Pairing> {
    let mut remaining = entrants.to_vec();
    let mut pairings = Vec::with_capacity(remaining.len() / 2);

    while remaining.len() > 1 {
        let first = remaining.swap_remove(rng.gen_range(0..remaining.len()));
        let second = remaining.swap_remove(rng.gen_range(0..remaining.len()));
        debug!("Paired {} vs {}", first.alias, second.alias);
        pairings.push(Pairing::new(first, second));
    }

    if let Some(left_over) = remaining.pop() {
        warn!("{} has no opponent this round", left_over.alias);
    }

    pairings
}

pub fn next_unplayed_pairing(pairings: &[Pairing]) -> Option<usize> {
    pairings.iter().position(|pairing| !pairing.played)
}

/// Adds the directory entry for `winner_id` unless it is already recorded.
/// Returns whether the winner list changed.
pub fn record_winner(
    winner_id: PlayerId,
    directory: &[BracketEntry],
    winners: &mut Vec<BracketEntry>,
) -> bool {
    if winners.iter().any(|entry| entry.player_id == winner_id) {
        debug!("Winner {} already recorded", winner_id);
        return false;
    }

    match directory.iter().find(|entry| entry.player_id == winner_id) {
        Some(entry) => {
            winners.push(entry.clone());
            true
        }
        None => {
            warn!("Winner {} is not part of this bracket", winner_id);
            false
        }
    }
}

pub fn round_complete(winners: &[BracketEntry], entrant_count: usize) -> bool {
    winners.len() == entrant_count / 2
}

/// Two survivors meet directly; no pairing step is needed.
pub fn is_final(winners: &[BracketEntry]) -> bool {
    winners.len() == 2
}

pub fn total_rounds(entrant_count: usize) -> u32 {
    if entrant_count < 2 {
        return 0;
    }
    entrant_count.ilog2()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentState {
    /// Entrant pool of the current round.
    pub entrants: Vec<BracketEntry>,
    pub pairings: Vec<Pairing>,
    pub winners: Vec<BracketEntry>,
    pub round: u32,
    pub total_rounds: u32,
    pub is_final_round: bool,
}

impl TournamentState {
    pub fn new<R: Rng>(entrants: Vec<BracketEntry>, rng: &mut R) -> Self {
        let pairings = pair(&entrants, rng);
        Self {
            total_rounds: total_rounds(entrants.len()),
            is_final_round: entrants.len() == 2,
            entrants,
            pairings,
            winners: Vec::new(),
            round: 1,
        }
    }

    /// Winners become the next round's pool and are paired afresh.
    pub fn advance_round<R: Rng>(&mut self, rng: &mut R) {
        self.round += 1;
        self.entrants = std::mem::take(&mut self.winners);
        self.pairings = pair(&self.entrants, rng);
        self.is_final_round = self.entrants.len() == 2;
    }

    /// Sets up the deciding match between the two remaining winners.
    pub fn start_final(&mut self) {
        self.round += 1;
        self.entrants = std::mem::take(&mut self.winners);
        self.pairings = match self.entrants.as_slice() {
            [a, b] => vec![Pairing::new(a.clone(), b.clone())],
            _ => Vec::new(),
        };
        self.is_final_round = true;
    }

    pub fn round_complete(&self) -> bool {
        round_complete(&self.winners, self.entrants.len())
    }

    pub fn record_winner(&mut self, winner_id: PlayerId) -> bool {
        record_winner(winner_id, &self.entrants, &mut self.winners)
    }

    pub fn champion(&self) -> Option<&BracketEntry> {
        if self.is_final_round && self.winners.len() == 1 {
            self.winners.first()
        } else {
            None
        }
    }

    pub fn to_checkpoint(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_checkpoint(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
