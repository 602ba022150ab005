//! One match, from the join request to a terminal phase.
//!
//! The session owns the local copy of the game state. Paddle and ball positions
//! come from the server; between two server updates the ball is extrapolated
//! locally and snapped back when the next update lands. Paddles are never
//! extrapolated.
//!
//! All deferred effects (countdown, GOAL banner, completion, error teardown) are
//! deadlines checked in [`GameSession::tick`], so the whole state machine runs on
//! the caller's frame loop and can be driven with synthetic instants in tests.

use crate::auth::TokenProvider;
use crate::config::{MatchConfig, SessionTimings};
use crate::error::{ProtocolError, SessionError, TransportError};
use crate::input::MoveIntent;
use crate::network::{Subscription, Transport};
use log::{debug, error, info, warn};
use shared::{
    predict, to_local_space, BallState, ClientMessage, GameId, GameInit, GameOverSummary,
    GameStateUpdate, Notice, PaddleMove, PlayerId, QuitNotice, ServerMessage, Vec3, LEFT_PADDLE_X,
    RIGHT_PADDLE_X,
};
use std::collections::VecDeque;
use std::time::Instant;

/// How fast the cosmetic bounce glow fades, in intensity per second.
const BOUNCE_FADE_PER_SEC: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Waiting,
    Starting,
    InProgress,
    GameOver,
    Cancelled,
    Error,
    Quit,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::GameOver | Phase::Cancelled | Phase::Error | Phase::Quit
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub player1_score: u32,
    pub player2_score: u32,
    pub paddle1_pos: Vec3,
    pub paddle2_pos: Vec3,
    pub ball_pos: Vec3,
    pub last_server_update: Option<Instant>,
    pub paused: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Init,
            player1_score: 0,
            player2_score: 0,
            paddle1_pos: Vec3::new(LEFT_PADDLE_X, 0.0, 0.0),
            paddle2_pos: Vec3::new(RIGHT_PADDLE_X, 0.0, 0.0),
            ball_pos: Vec3::default(),
            last_server_update: None,
            paused: false,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the renderer reads each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: Phase,
    /// GOAL banner is up and the scoreboard has not caught up yet.
    pub goal: bool,
    /// `None` once the paddles have been taken off the field.
    pub paddle1: Option<Vec3>,
    pub paddle2: Option<Vec3>,
    pub ball: Vec3,
    pub scoreboard: (u32, u32),
    pub player1_alias: String,
    pub player2_alias: String,
    pub bounce_intensity: f32,
    pub inverted_view: bool,
    /// Alias of the player the server declared the winner.
    pub winner: Option<String>,
    pub message: Option<String>,
}

type GameEndCallback = Box<dyn FnOnce(GameOverSummary)>;

pub struct GameSession {
    timings: SessionTimings,
    retain_transport: bool,

    config: Option<MatchConfig>,
    state: SessionState,
    authoritative_ball: BallState,
    subscription: Option<Subscription>,
    on_game_end: Option<GameEndCallback>,

    countdown_until: Option<Instant>,
    /// One deadline per goal; each one refreshes the displayed scoreboard.
    scoreboard_due: VecDeque<Instant>,
    completion_due: Option<(Instant, GameOverSummary)>,
    teardown_due: Option<Instant>,

    displayed_scores: (u32, u32),
    goal_banner: bool,
    winner: Option<PlayerId>,
    paddles_visible: bool,
    input_enabled: bool,
    bounce_intensity: f32,
    last_tick: Option<Instant>,
    message: Option<String>,
    torn_down: bool,
}

impl GameSession {
    /// Session that disconnects the transport when it is torn down.
    pub fn new(timings: SessionTimings) -> Self {
        Self {
            timings,
            retain_transport: false,
            config: None,
            state: SessionState::new(),
            authoritative_ball: BallState {
                position: Vec3::default(),
                velocity_hint: Default::default(),
            },
            subscription: None,
            on_game_end: None,
            countdown_until: None,
            scoreboard_due: VecDeque::new(),
            completion_due: None,
            teardown_due: None,
            displayed_scores: (0, 0),
            goal_banner: false,
            winner: None,
            paddles_visible: true,
            input_enabled: false,
            bounce_intensity: 0.0,
            last_tick: None,
            message: None,
            torn_down: false,
        }
    }

    /// Session that leaves the transport connected at teardown because another
    /// match will reuse it.
    pub fn retaining_transport(timings: SessionTimings) -> Self {
        Self {
            retain_transport: true,
            ..Self::new(timings)
        }
    }

    pub fn initialize<F>(
        &mut self,
        config: MatchConfig,
        transport: &mut dyn Transport,
        tokens: &mut dyn TokenProvider,
        on_game_end: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce(GameOverSummary) + 'static,
    {
        if let Some(existing) = &self.config {
            return Err(SessionError::AlreadyInitialized(existing.game_id));
        }
        config.validate()?;

        // Authorization comes first so a failure leaves nothing registered.
        let token = if config.is_remote {
            Some(tokens.bearer_token()?)
        } else {
            None
        };

        if !transport.is_connected() {
            transport.connect()?;
        }

        let init = GameInit {
            game_id: config.game_id,
            local_player_id: config.local_player_id,
            player1_id: config.player1_id,
            player2_id: config.player2_id,
            is_remote: config.is_remote,
            is_local_tournament: config.is_local_tournament,
            token,
        };
        let request = if config.is_remote {
            ClientMessage::JoinGame(init)
        } else {
            ClientMessage::StartGame(init)
        };

        let subscription = transport.subscribe(config.game_id);
        if let Err(e) = transport.emit(&request) {
            transport.revoke(subscription);
            return Err(e.into());
        }

        info!(
            "Game session {} initialized: {} ({}) vs {} ({}), remote: {}, tournament: {}",
            config.game_id,
            config.player1_alias,
            config.player1_id,
            config.player2_alias,
            config.player2_id,
            config.is_remote,
            config.is_local_tournament
        );

        self.state = SessionState::new();
        self.state.phase = Phase::Waiting;
        self.subscription = Some(subscription);
        self.on_game_end = Some(Box::new(on_game_end));
        self.config = Some(config);
        Ok(())
    }

    /// Applies one inbound message. Messages for another game, or without a
    /// game id, are rejected without touching any state.
    pub fn handle_message(
        &mut self,
        message: ServerMessage,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        let expected = match &self.config {
            Some(config) => config.game_id,
            None => {
                debug!("Ignoring {} before initialization", message.kind());
                return Ok(());
            }
        };

        match message.game_id() {
            None => {
                let err = ProtocolError::MissingGameId {
                    kind: message.kind(),
                };
                warn!("Dropping message: {}", err);
                return Err(err);
            }
            Some(got) if got != expected => {
                let err = ProtocolError::ForeignGameId {
                    kind: message.kind(),
                    expected,
                    got,
                };
                warn!("Dropping message: {}", err);
                return Err(err);
            }
            Some(_) => {}
        }

        if self.state.phase.is_terminal() {
            debug!(
                "Ignoring {} for game {} in phase {:?}",
                message.kind(),
                expected,
                self.state.phase
            );
            return Ok(());
        }

        match message {
            ServerMessage::Starting { .. } => self.on_starting(now),
            ServerMessage::SendGameState(update) => self.apply_authoritative(&update, now),
            ServerMessage::ScoreUpdate(score) => {
                self.on_score(score.player1_score, score.player2_score, now)
            }
            ServerMessage::GameOver(summary) => self.on_game_over(summary, now),
            ServerMessage::OpponentQuit(notice) | ServerMessage::CancelGame(notice) => {
                self.on_cancelled(notice, now)
            }
            ServerMessage::Error(notice) => self.on_error(notice, now),
        }
        Ok(())
    }

    fn on_starting(&mut self, now: Instant) {
        if self.state.phase != Phase::Waiting {
            debug!("Duplicate starting message in phase {:?}", self.state.phase);
            return;
        }
        self.state.phase = Phase::Starting;
        self.countdown_until = Some(now + self.timings.countdown);
        info!("Game {} starting", self.game_id().unwrap_or_default());
    }

    /// Takes the server's view of the field as the new truth.
    pub fn apply_authoritative(&mut self, update: &GameStateUpdate, now: Instant) {
        let frame = to_local_space(update);

        self.state.paddle1_pos = frame.paddle1;
        self.state.paddle2_pos = frame.paddle2;
        self.state.ball_pos = frame.ball;
        self.state.last_server_update = Some(now);
        self.state.paused = update.paused;
        self.authoritative_ball = BallState {
            position: frame.ball,
            velocity_hint: update.ball_delta,
        };

        if update.bounce {
            self.bounce_intensity = update.hitpos.abs().min(1.0);
        }
    }

    fn on_score(&mut self, player1_score: u32, player2_score: u32, now: Instant) {
        info!("Score update: {} - {}", player1_score, player2_score);
        self.state.player1_score = player1_score;
        self.state.player2_score = player2_score;
        self.goal_banner = true;
        self.scoreboard_due.push_back(now + self.timings.goal_display);
    }

    fn on_game_over(&mut self, summary: GameOverSummary, now: Instant) {
        info!(
            "Game over! Winner: {}, score {} - {}, longest rally {}",
            summary.winner, summary.player1_score, summary.player2_score, summary.longest_rally
        );
        self.state.phase = Phase::GameOver;
        self.state.player1_score = summary.player1_score;
        self.state.player2_score = summary.player2_score;
        self.displayed_scores = (summary.player1_score, summary.player2_score);
        self.goal_banner = false;
        self.scoreboard_due.clear();
        self.winner = Some(summary.winner);
        self.paddles_visible = false;
        self.input_enabled = false;
        self.completion_due = Some((now + self.timings.game_over_delay, summary));
    }

    fn on_cancelled(&mut self, notice: Notice, now: Instant) {
        warn!(
            "Game {} cancelled: {}",
            self.game_id().unwrap_or_default(),
            notice.message.as_deref().unwrap_or("opponent left")
        );
        self.state.phase = Phase::Cancelled;
        self.input_enabled = false;
        self.message = Some(
            notice
                .message
                .unwrap_or_else(|| "Your opponent left the game".to_string()),
        );
        self.teardown_due = Some(now);
    }

    fn on_error(&mut self, notice: Notice, now: Instant) {
        let reason = notice
            .message
            .unwrap_or_else(|| "Connection to the game server failed".to_string());
        error!(
            "Game {} failed: {}",
            self.game_id().unwrap_or_default(),
            reason
        );
        self.state.phase = Phase::Error;
        self.input_enabled = false;
        self.message = Some(reason);
        self.teardown_due = Some(now + self.timings.error_teardown);
    }

    /// Extrapolates the ball from the last authoritative update.
    pub fn predict_tick(&mut self, now: Instant) {
        if self.state.paused || self.state.phase.is_terminal() {
            return;
        }
        let last_update = match self.state.last_server_update {
            Some(at) => at,
            None => return,
        };

        let elapsed = now.saturating_duration_since(last_update);
        self.state.ball_pos = predict(&self.authoritative_ball, elapsed);
    }

    /// Fires every deadline that has passed, then runs prediction.
    pub fn tick(&mut self, now: Instant, transport: &mut dyn Transport) {
        if self.countdown_until.map_or(false, |until| now >= until) {
            self.countdown_until = None;
            if self.state.phase == Phase::Starting {
                self.state.phase = Phase::InProgress;
                self.input_enabled = true;
                info!("Game {} in progress", self.game_id().unwrap_or_default());
            }
        }

        let mut refreshed = false;
        while self.scoreboard_due.front().map_or(false, |due| now >= *due) {
            self.scoreboard_due.pop_front();
            refreshed = true;
        }
        if refreshed {
            self.displayed_scores = (self.state.player1_score, self.state.player2_score);
            self.goal_banner = !self.scoreboard_due.is_empty();
        }

        if self.completion_due.as_ref().map_or(false, |(due, _)| now >= *due) {
            if let Some((_, summary)) = self.completion_due.take() {
                self.teardown(transport);
                self.fire_game_end(summary);
            }
        }

        if self.teardown_due.map_or(false, |due| now >= due) {
            self.teardown_due = None;
            self.teardown(transport);
        }

        self.predict_tick(now);

        if let Some(last) = self.last_tick {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            self.bounce_intensity = (self.bounce_intensity - dt * BOUNCE_FADE_PER_SEC).max(0.0);
        }
        self.last_tick = Some(now);
    }

    fn fire_game_end(&mut self, summary: GameOverSummary) {
        match self.on_game_end.take() {
            Some(callback) => {
                callback(summary);
                debug!("Game end callback executed");
            }
            None => debug!("No game end callback pending"),
        }
    }

    /// Routes pending traffic, applies everything addressed to this session and
    /// advances its deadlines.
    pub fn update(&mut self, now: Instant, transport: &mut dyn Transport) {
        transport.poll();

        while let Some(message) = self.subscription.as_mut().and_then(Subscription::try_next) {
            // Rejections are already logged by handle_message.
            let _ = self.handle_message(message, now);
        }

        self.tick(now, transport);
    }

    pub fn send_movement(
        &mut self,
        intent: MoveIntent,
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        if !self.input_enabled || self.state.paused || intent.is_idle() {
            return Ok(());
        }
        let config = match &self.config {
            Some(config) => config,
            None => return Ok(()),
        };

        let movement = if config.is_remote {
            let player_id = match config.local_player_id {
                Some(id) => id,
                None => return Ok(()),
            };
            let delta_z = if player_id == config.player2_id {
                intent.player2_delta
            } else {
                intent.player1_delta
            };
            if delta_z == 0.0 {
                return Ok(());
            }
            PaddleMove::Single {
                game_id: config.game_id,
                player_id,
                delta_z,
            }
        } else {
            PaddleMove::Dual {
                game_id: config.game_id,
                player1_id: config.player1_id,
                p1_delta_z: intent.player1_delta,
                player2_id: config.player2_id,
                p2_delta_z: intent.player2_delta,
            }
        };

        match transport.emit(&ClientMessage::MovePaddle(movement)) {
            Ok(()) => Ok(()),
            Err(TransportError::NotConnected) => {
                debug!("Movement dropped, channel not connected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Leaves the match without waiting for the server to acknowledge it.
    pub fn quit(&mut self, transport: &mut dyn Transport) {
        if !matches!(
            self.state.phase,
            Phase::Waiting | Phase::Starting | Phase::InProgress
        ) {
            return;
        }
        let config = match &self.config {
            Some(config) => config,
            None => return,
        };

        let notice = ClientMessage::QuitGame(QuitNotice {
            game_id: config.game_id,
            player_id: config.local_player_id,
        });
        if let Err(e) = transport.emit(&notice) {
            warn!("Quit notice for game {} not sent: {}", config.game_id, e);
        }

        info!("Player left game {}", config.game_id);
        self.state.phase = Phase::Quit;
        self.message = Some("You left the game".to_string());
        self.teardown(transport);
    }

    /// Releases input and the game's subscription. Safe to call repeatedly.
    pub fn teardown(&mut self, transport: &mut dyn Transport) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.input_enabled = false;
        self.countdown_until = None;
        self.scoreboard_due.clear();
        self.teardown_due = None;

        if let Some(subscription) = self.subscription.take() {
            transport.revoke(subscription);
        }
        if !self.retain_transport {
            transport.disconnect();
        }

        debug!(
            "Game session {} torn down in phase {:?}",
            self.game_id().unwrap_or_default(),
            self.state.phase
        );
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn config(&self) -> Option<&MatchConfig> {
        self.config.as_ref()
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.config.as_ref().map(|config| config.game_id)
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// True while a completion is scheduled but has not fired yet.
    pub fn completion_pending(&self) -> bool {
        self.completion_due.is_some()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn view(&self) -> SessionView {
        let (player1_alias, player2_alias, inverted_view) = match &self.config {
            Some(config) => (
                config.player1_alias.clone(),
                config.player2_alias.clone(),
                config.inverted_view(),
            ),
            None => (String::new(), String::new(), false),
        };
        let winner = match (&self.config, self.winner) {
            (Some(config), Some(id)) if id == config.player1_id => Some(player1_alias.clone()),
            (Some(config), Some(id)) if id == config.player2_id => Some(player2_alias.clone()),
            (_, Some(id)) => Some(format!("Player {}", id)),
            _ => None,
        };

        SessionView {
            phase: self.state.phase,
            goal: self.goal_banner,
            paddle1: self.paddles_visible.then_some(self.state.paddle1_pos),
            paddle2: self.paddles_visible.then_some(self.state.paddle2_pos),
            ball: self.state.ball_pos,
            scoreboard: self.displayed_scores,
            player1_alias,
            player2_alias,
            bounce_intensity: self.bounce_intensity,
            inverted_view,
            winner,
            message: self.message.clone(),
        }
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(SessionTimings::default())
    }
}
