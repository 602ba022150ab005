//! Keyboard sampling and its translation into paddle movement intents

use macroquad::prelude::*;
use shared::PADDLE_SPEED;

/// Requested paddle movement for this frame, per player slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveIntent {
    pub player1_delta: f32,
    pub player2_delta: f32,
}

impl MoveIntent {
    pub fn is_idle(&self) -> bool {
        self.player1_delta == 0.0 && self.player2_delta == 0.0
    }
}

/// Which paddles this keyboard drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScheme {
    /// W/S for the left paddle, arrow keys for the right one.
    SharedKeyboard,
    /// W/S for the local player's paddle only.
    Remote { local_is_player2: bool },
}

/// Key state relevant to the game, sampled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySnapshot {
    pub w: bool,
    pub s: bool,
    pub up: bool,
    pub down: bool,
    pub quit: bool,
    pub view: bool,
}

/// Edge-triggered commands that are not paddle movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggles {
    pub quit: bool,
    pub change_view: bool,
}

pub fn intent_from_keys(keys: &KeySnapshot, scheme: ControlScheme) -> MoveIntent {
    match scheme {
        ControlScheme::SharedKeyboard => MoveIntent {
            player1_delta: axis(keys.w, keys.s),
            player2_delta: axis(keys.up, keys.down),
        },
        ControlScheme::Remote { local_is_player2 } => {
            if local_is_player2 {
                // The mirrored camera flips what "up" means on screen.
                MoveIntent {
                    player1_delta: 0.0,
                    player2_delta: -axis(keys.w, keys.s),
                }
            } else {
                MoveIntent {
                    player1_delta: axis(keys.w, keys.s),
                    player2_delta: 0.0,
                }
            }
        }
    }
}

fn axis(negative: bool, positive: bool) -> f32 {
    let mut delta = 0.0;
    if negative {
        delta -= PADDLE_SPEED;
    }
    if positive {
        delta += PADDLE_SPEED;
    }
    delta
}

/// Samples the keyboard and turns it into intents and toggles
pub struct InputManager {
    scheme: ControlScheme,
    prev_quit: bool,
    prev_view: bool,
}

impl InputManager {
    pub fn new(scheme: ControlScheme) -> Self {
        Self {
            scheme,
            prev_quit: false,
            prev_view: false,
        }
    }

    pub fn set_scheme(&mut self, scheme: ControlScheme) {
        self.scheme = scheme;
    }

    /// Reads the keyboard; must run inside the macroquad frame loop.
    pub fn update(&mut self) -> (Toggles, MoveIntent) {
        let keys = KeySnapshot {
            w: is_key_down(KeyCode::W),
            s: is_key_down(KeyCode::S),
            up: is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::Down),
            quit: is_key_down(KeyCode::Q),
            view: is_key_down(KeyCode::C),
        };
        self.apply(keys)
    }

    pub fn apply(&mut self, keys: KeySnapshot) -> (Toggles, MoveIntent) {
        // Detect key press events (current && !previous)
        let toggles = Toggles {
            quit: keys.quit && !self.prev_quit,
            change_view: keys.view && !self.prev_view,
        };
        self.prev_quit = keys.quit;
        self.prev_view = keys.view;

        (toggles, intent_from_keys(&keys, self.scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_keyboard_drives_both_paddles() {
        let keys = KeySnapshot {
            w: true,
            down: true,
            ..Default::default()
        };
        let intent = intent_from_keys(&keys, ControlScheme::SharedKeyboard);
        assert_eq!(intent.player1_delta, -PADDLE_SPEED);
        assert_eq!(intent.player2_delta, PADDLE_SPEED);
    }

    #[test]
    fn test_opposite_keys_cancel_out() {
        let keys = KeySnapshot {
            w: true,
            s: true,
            ..Default::default()
        };
        assert!(intent_from_keys(&keys, ControlScheme::SharedKeyboard).is_idle());
    }

    #[test]
    fn test_remote_player_one_uses_ws() {
        let keys = KeySnapshot {
            s: true,
            up: true,
            ..Default::default()
        };
        let intent = intent_from_keys(
            &keys,
            ControlScheme::Remote {
                local_is_player2: false,
            },
        );
        assert_eq!(intent.player1_delta, PADDLE_SPEED);
        assert_eq!(intent.player2_delta, 0.0);
    }

    #[test]
    fn test_remote_player_two_is_mirrored() {
        let keys = KeySnapshot {
            w: true,
            ..Default::default()
        };
        let intent = intent_from_keys(
            &keys,
            ControlScheme::Remote {
                local_is_player2: true,
            },
        );
        assert_eq!(intent.player1_delta, 0.0);
        assert_eq!(intent.player2_delta, PADDLE_SPEED);
    }

    #[test]
    fn test_toggles_fire_on_press_only() {
        let mut manager = InputManager::new(ControlScheme::SharedKeyboard);
        let held = KeySnapshot {
            view: true,
            ..Default::default()
        };

        let (first, _) = manager.apply(held);
        let (second, _) = manager.apply(held);
        let (_, _) = manager.apply(KeySnapshot::default());
        let (third, _) = manager.apply(held);

        assert!(first.change_view);
        assert!(!second.change_view);
        assert!(third.change_view);
        assert!(!first.quit);
    }
}
