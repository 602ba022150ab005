use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type GameId = u32;
pub type PlayerId = u32;

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const PADDLE_SPEED: f32 = 9.0;
pub const PADDLE_WIDTH: f32 = 100.0;
pub const PADDLE_THICKNESS: f32 = 16.0;
pub const BALL_SIZE: f32 = 8.0;
pub const LEFT_PADDLE_X: f32 = -(FIELD_WIDTH / 2.0) - 8.0;
pub const RIGHT_PADDLE_X: f32 = (FIELD_WIDTH / 2.0) + 8.0;

/// Interval between two simulation steps on the game server. The ball delta in
/// every state update is the distance travelled during one such step.
pub const SERVER_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Per-step ball movement as reported by the server; `dy` runs along the z axis
/// of the field.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct BallDelta {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub position: Vec3,
    pub velocity_hint: BallDelta,
}

/// Extrapolates the ball linearly from its last authoritative position.
pub fn predict(ball: &BallState, elapsed: Duration) -> Vec3 {
    let steps = elapsed.as_secs_f32() / SERVER_STEP.as_secs_f32();

    Vec3 {
        x: ball.position.x + ball.velocity_hint.dx * steps,
        y: ball.position.y,
        z: ball.position.z + ball.velocity_hint.dy * steps,
    }
}

/// Positions of every moving entity in local (field-centred) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub paddle1: Vec3,
    pub paddle2: Vec3,
    pub ball: Vec3,
}

/// Moves server coordinates (origin at the bottom-left corner of the field) into
/// the centred space the client renders in.
pub fn to_local_space(update: &GameStateUpdate) -> LocalFrame {
    LocalFrame {
        paddle1: Vec3::new(
            LEFT_PADDLE_X,
            0.0,
            update.player1_position.z - FIELD_HEIGHT / 2.0,
        ),
        paddle2: Vec3::new(
            RIGHT_PADDLE_X,
            0.0,
            update.player2_position.z - FIELD_HEIGHT / 2.0,
        ),
        ball: Vec3::new(
            update.ball.x - FIELD_WIDTH / 2.0,
            update.ball.y,
            update.ball.z - FIELD_HEIGHT / 2.0,
        ),
    }
}

// Client -> server

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartGame(GameInit),
    JoinGame(GameInit),
    MovePaddle(PaddleMove),
    QuitGame(QuitNotice),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameInit {
    pub game_id: GameId,
    pub local_player_id: Option<PlayerId>,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub is_remote: bool,
    pub is_local_tournament: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PaddleMove {
    /// Both paddles are driven from the same keyboard.
    Dual {
        game_id: GameId,
        player1_id: PlayerId,
        p1_delta_z: f32,
        player2_id: PlayerId,
        p2_delta_z: f32,
    },
    Single {
        game_id: GameId,
        player_id: PlayerId,
        delta_z: f32,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuitNotice {
    pub game_id: GameId,
    pub player_id: Option<PlayerId>,
}

impl ClientMessage {
    pub fn game_id(&self) -> GameId {
        match self {
            ClientMessage::StartGame(init) | ClientMessage::JoinGame(init) => init.game_id,
            ClientMessage::MovePaddle(PaddleMove::Dual { game_id, .. })
            | ClientMessage::MovePaddle(PaddleMove::Single { game_id, .. }) => *game_id,
            ClientMessage::QuitGame(notice) => notice.game_id,
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Server -> client

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Starting {
        #[serde(default)]
        game_id: Option<GameId>,
    },
    SendGameState(GameStateUpdate),
    ScoreUpdate(ScoreUpdate),
    GameOver(GameOverSummary),
    OpponentQuit(Notice),
    CancelGame(Notice),
    Error(Notice),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameStateUpdate {
    #[serde(default)]
    pub game_id: Option<GameId>,
    pub player1_position: Vec3,
    pub player2_position: Vec3,
    pub ball: Vec3,
    #[serde(rename = "ballDelta", default)]
    pub ball_delta: BallDelta,
    #[serde(default)]
    pub bounce: bool,
    #[serde(default)]
    pub hitpos: f32,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoreUpdate {
    #[serde(default)]
    pub game_id: Option<GameId>,
    #[serde(rename = "player1Score")]
    pub player1_score: u32,
    #[serde(rename = "player2Score")]
    pub player2_score: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameOverSummary {
    #[serde(default)]
    pub game_id: Option<GameId>,
    pub winner: PlayerId,
    pub player1_score: u32,
    pub player2_score: u32,
    #[serde(default)]
    pub player1_hits: u32,
    #[serde(default)]
    pub player2_hits: u32,
    #[serde(default)]
    pub longest_rally: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Notice {
    #[serde(default)]
    pub game_id: Option<GameId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerMessage {
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            ServerMessage::Starting { game_id } => *game_id,
            ServerMessage::SendGameState(update) => update.game_id,
            ServerMessage::ScoreUpdate(score) => score.game_id,
            ServerMessage::GameOver(summary) => summary.game_id,
            ServerMessage::OpponentQuit(notice)
            | ServerMessage::CancelGame(notice)
            | ServerMessage::Error(notice) => notice.game_id,
        }
    }

    /// Wire name of the message, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Starting { .. } => "starting",
            ServerMessage::SendGameState(_) => "send_game_state",
            ServerMessage::ScoreUpdate(_) => "score_update",
            ServerMessage::GameOver(_) => "game_over",
            ServerMessage::OpponentQuit(_) => "opponent_quit",
            ServerMessage::CancelGame(_) => "cancel_game",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::{json, Value};

    fn ball(x: f32, z: f32, dx: f32, dy: f32) -> BallState {
        BallState {
            position: Vec3::new(x, 0.0, z),
            velocity_hint: BallDelta { dx, dy },
        }
    }

    #[test]
    fn test_predict_zero_elapsed_is_identity() {
        let state = ball(10.0, 5.0, 8.0, -3.0);
        assert_eq!(predict(&state, Duration::ZERO), state.position);
    }

    #[test]
    fn test_predict_one_server_step() {
        let state = ball(10.0, 5.0, 8.0, -3.0);
        let predicted = predict(&state, SERVER_STEP);
        assert_approx_eq!(predicted.x, 18.0, 0.001);
        assert_approx_eq!(predicted.z, 2.0, 0.001);
        assert_eq!(predicted.y, 0.0);
    }

    #[test]
    fn test_predict_monotonic_in_elapsed_time() {
        let state = ball(-100.0, 0.0, 4.0, 2.5);
        let mut last = predict(&state, Duration::ZERO);

        for ms in (5..=500).step_by(5) {
            let next = predict(&state, Duration::from_millis(ms));
            assert!(next.x > last.x);
            assert!(next.z > last.z);
            last = next;
        }
    }

    #[test]
    fn test_predict_stationary_ball() {
        let state = ball(3.0, 4.0, 0.0, 0.0);
        assert_eq!(predict(&state, Duration::from_secs(2)), state.position);
    }

    #[test]
    fn test_to_local_space_centres_field() {
        let update = GameStateUpdate {
            game_id: Some(1),
            player1_position: Vec3::new(-8.0, 0.0, 300.0),
            player2_position: Vec3::new(808.0, 0.0, 350.0),
            ball: Vec3::new(410.0, 0.0, 305.0),
            ball_delta: BallDelta::default(),
            bounce: false,
            hitpos: 0.0,
            paused: false,
        };

        let frame = to_local_space(&update);
        assert_eq!(frame.paddle1, Vec3::new(LEFT_PADDLE_X, 0.0, 0.0));
        assert_eq!(frame.paddle2, Vec3::new(RIGHT_PADDLE_X, 0.0, 50.0));
        assert_eq!(frame.ball, Vec3::new(10.0, 0.0, 5.0));
    }

    #[test]
    fn test_join_game_wire_shape() {
        let message = ClientMessage::JoinGame(GameInit {
            game_id: 7,
            local_player_id: Some(11),
            player1_id: 11,
            player2_id: 12,
            is_remote: true,
            is_local_tournament: false,
            token: Some("abc".to_string()),
        });

        let value: Value = serde_json::from_str(&message.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "join_game",
                "game_id": 7,
                "local_player_id": 11,
                "player1_id": 11,
                "player2_id": 12,
                "is_remote": true,
                "is_local_tournament": false,
                "token": "abc",
            })
        );
    }

    #[test]
    fn test_start_game_omits_missing_token() {
        let message = ClientMessage::StartGame(GameInit {
            game_id: 5001,
            local_player_id: None,
            player1_id: 1001,
            player2_id: 2001,
            is_remote: false,
            is_local_tournament: false,
            token: None,
        });

        let value: Value = serde_json::from_str(&message.to_frame().unwrap()).unwrap();
        assert_eq!(value["type"], "start_game");
        assert!(value.get("token").is_none());
        assert_eq!(value["local_player_id"], Value::Null);
    }

    #[test]
    fn test_move_paddle_variants_share_type_tag() {
        let dual = ClientMessage::MovePaddle(PaddleMove::Dual {
            game_id: 3,
            player1_id: 1,
            p1_delta_z: -PADDLE_SPEED,
            player2_id: 2,
            p2_delta_z: 0.0,
        });
        let single = ClientMessage::MovePaddle(PaddleMove::Single {
            game_id: 3,
            player_id: 2,
            delta_z: PADDLE_SPEED,
        });

        let dual_value: Value = serde_json::from_str(&dual.to_frame().unwrap()).unwrap();
        let single_value: Value = serde_json::from_str(&single.to_frame().unwrap()).unwrap();

        assert_eq!(dual_value["type"], "move_paddle");
        assert_eq!(dual_value["p1_delta_z"], json!(-9.0));
        assert_eq!(single_value["type"], "move_paddle");
        assert_eq!(single_value["delta_z"], json!(9.0));
        assert!(single_value.get("p1_delta_z").is_none());

        let parsed: ClientMessage = serde_json::from_value(single_value).unwrap();
        assert_eq!(parsed, single);
    }

    #[test]
    fn test_game_state_decodes_camel_case_delta() {
        let frame = json!({
            "type": "send_game_state",
            "game_id": 7,
            "player1_position": {"x": -8.0, "y": 0.0, "z": 300.0},
            "player2_position": {"x": 808.0, "y": 0.0, "z": 300.0},
            "ball": {"x": 400.0, "y": 0.0, "z": 300.0},
            "ballDelta": {"dx": 8.0, "dy": -2.0},
            "bounce": true,
            "hitpos": 0.4,
            "paused": false,
        })
        .to_string();

        match ServerMessage::from_frame(&frame).unwrap() {
            ServerMessage::SendGameState(update) => {
                assert_eq!(update.game_id, Some(7));
                assert_eq!(update.ball_delta, BallDelta { dx: 8.0, dy: -2.0 });
                assert!(update.bounce);
                assert_approx_eq!(update.hitpos, 0.4, 0.0001);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_score_update_uses_camel_case_scores() {
        let frame = r#"{"type":"score_update","game_id":2,"player1Score":3,"player2Score":1}"#;
        let message = ServerMessage::from_frame(frame).unwrap();
        assert_eq!(
            message,
            ServerMessage::ScoreUpdate(ScoreUpdate {
                game_id: Some(2),
                player1_score: 3,
                player2_score: 1,
            })
        );
        assert_eq!(message.kind(), "score_update");
    }

    #[test]
    fn test_missing_game_id_decodes_as_none() {
        let message = ServerMessage::from_frame(r#"{"type":"opponent_quit"}"#).unwrap();
        assert_eq!(message.game_id(), None);

        let message = ServerMessage::from_frame(r#"{"type":"starting"}"#).unwrap();
        assert_eq!(message.game_id(), None);
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        assert!(ServerMessage::from_frame(r#"{"type":"teleport","game_id":1}"#).is_err());
        assert!(ServerMessage::from_frame("not json").is_err());
    }
}
