use crate::game::{Phase, SessionView};
use macroquad::prelude::*;
use shared::{BALL_SIZE, FIELD_HEIGHT, FIELD_WIDTH, PADDLE_THICKNESS, PADDLE_WIDTH};

/// Visual-effect state that outlives single frames. Owned by the frame loop and
/// handed to every render call.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectsContext {
    /// Seconds since the window opened; drives the pulsing effects.
    pub i_time: f32,
    pub bounce_glow: f32,
    /// Flat top-down field instead of the tilted arena.
    pub view_2d: bool,
    pub inverted_view: bool,
}

impl EffectsContext {
    pub fn new() -> Self {
        Self {
            i_time: 0.0,
            bounce_glow: 0.0,
            view_2d: false,
            inverted_view: false,
        }
    }

    /// Advances the clock and picks up the per-session effect inputs.
    pub fn advance(&mut self, dt: f32, view: &SessionView) {
        self.i_time += dt;
        self.bounce_glow = view.bounce_intensity;
        self.inverted_view = view.inverted_view;
    }

    pub fn toggle_view(&mut self) {
        self.view_2d = !self.view_2d;
    }
}

impl Default for EffectsContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps field-centred coordinates onto the screen. The field keeps its aspect
/// ratio and is mirrored horizontally for an inverted view.
pub fn field_to_screen(
    x: f32,
    z: f32,
    screen_width: f32,
    screen_height: f32,
    inverted: bool,
) -> (f32, f32) {
    let scale = field_scale(screen_width, screen_height);
    let x = if inverted { -x } else { x };
    (
        screen_width / 2.0 + x * scale,
        screen_height / 2.0 - z * scale,
    )
}

fn field_scale(screen_width: f32, screen_height: f32) -> f32 {
    // Leave room for the paddles outside the field and the scoreboard above it.
    let usable_width = screen_width / (FIELD_WIDTH + 4.0 * PADDLE_THICKNESS);
    let usable_height = (screen_height - 80.0) / FIELD_HEIGHT;
    usable_width.min(usable_height)
}

/// Centre-screen text for the current phase, if any.
pub fn banner_text(view: &SessionView) -> Option<String> {
    match view.phase {
        Phase::Init | Phase::Waiting => Some("Waiting for opponent...".to_string()),
        Phase::Starting => Some("Get ready!".to_string()),
        Phase::InProgress if view.goal => Some("GOAL!".to_string()),
        Phase::InProgress => None,
        Phase::GameOver => Some(match &view.winner {
            Some(winner) => format!("{} wins!", winner),
            None => "Game over".to_string(),
        }),
        Phase::Cancelled | Phase::Error | Phase::Quit => Some(
            view.message
                .clone()
                .unwrap_or_else(|| "Game ended".to_string()),
        ),
    }
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Renderer {
            width: width as f32,
            height: height as f32,
        })
    }

    pub fn render(&mut self, view: &SessionView, effects: &EffectsContext) {
        self.width = screen_width();
        self.height = screen_height();

        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_field(effects);

        let left_color = Color::from_rgba(0, 170, 255, 255);
        let right_color = Color::from_rgba(255, 68, 68, 255);
        if let Some(paddle) = view.paddle1 {
            self.draw_paddle(paddle.x, paddle.z, left_color, effects);
        }
        if let Some(paddle) = view.paddle2 {
            self.draw_paddle(paddle.x, paddle.z, right_color, effects);
        }

        if !matches!(view.phase, Phase::Init | Phase::Waiting) {
            self.draw_ball(view.ball.x, view.ball.z, effects);
        }

        self.draw_scoreboard(view, effects);

        if let Some(text) = banner_text(view) {
            self.draw_banner(&text, effects);
        }

        self.draw_controls_hint(effects);
    }

    /// Draws a single centred line on an empty screen.
    pub fn render_message(&mut self, text: &str, effects: &EffectsContext) {
        self.width = screen_width();
        self.height = screen_height();

        clear_background(Color::from_rgba(26, 26, 26, 255));
        self.draw_banner(text, effects);
    }

    fn to_screen(&self, x: f32, z: f32, effects: &EffectsContext) -> (f32, f32) {
        field_to_screen(x, z, self.width, self.height, effects.inverted_view)
    }

    fn scale(&self) -> f32 {
        field_scale(self.width, self.height)
    }

    fn draw_field(&mut self, effects: &EffectsContext) {
        let (left, top) = self.to_screen(-FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0, effects);
        let (right, bottom) = self.to_screen(FIELD_WIDTH / 2.0, -FIELD_HEIGHT / 2.0, effects);
        let x = left.min(right);
        let width = (right - left).abs();

        let floor = if effects.view_2d {
            Color::from_rgba(40, 40, 40, 255)
        } else {
            Color::from_rgba(68, 68, 68, 255)
        };
        draw_rectangle(x, top, width, bottom - top, floor);

        // Border glows briefly after a paddle hit.
        let glow = effects.bounce_glow.clamp(0.0, 1.0);
        let pulse = 0.5 + 0.5 * (effects.i_time * 6.0).sin();
        let border = Color::new(1.0, 1.0, 1.0, 0.4 + 0.6 * glow * pulse);
        draw_rectangle_lines(x, top, width, bottom - top, 2.0 + 4.0 * glow, border);

        let (mid_x, _) = self.to_screen(0.0, 0.0, effects);
        let dash = 12.0;
        let mut y = top;
        while y < bottom {
            draw_line(mid_x, y, mid_x, (y + dash).min(bottom), 2.0, GRAY);
            y += dash * 2.0;
        }
    }

    fn draw_paddle(&mut self, x: f32, z: f32, color: Color, effects: &EffectsContext) {
        let scale = self.scale();
        let (cx, cy) = self.to_screen(x, z, effects);
        let w = PADDLE_THICKNESS * scale;
        let h = PADDLE_WIDTH * scale;

        draw_rectangle(cx - w / 2.0, cy - h / 2.0, w, h, color);
        draw_rectangle_lines(cx - w / 2.0, cy - h / 2.0, w, h, 2.0, WHITE);
    }

    fn draw_ball(&mut self, x: f32, z: f32, effects: &EffectsContext) {
        let (cx, cy) = self.to_screen(x, z, effects);
        let radius = BALL_SIZE * self.scale();
        draw_circle(cx, cy, radius, YELLOW);

        if effects.bounce_glow > 0.0 {
            let halo = Color::new(1.0, 1.0, 0.0, 0.35 * effects.bounce_glow);
            draw_circle_lines(cx, cy, radius * (1.0 + effects.bounce_glow), 2.0, halo);
        }
    }

    fn draw_scoreboard(&mut self, view: &SessionView, effects: &EffectsContext) {
        let (left_alias, right_alias, left_score, right_score) = if effects.inverted_view {
            (
                &view.player2_alias,
                &view.player1_alias,
                view.scoreboard.1,
                view.scoreboard.0,
            )
        } else {
            (
                &view.player1_alias,
                &view.player2_alias,
                view.scoreboard.0,
                view.scoreboard.1,
            )
        };

        let text = format!(
            "{}  {} - {}  {}",
            left_alias, left_score, right_score, right_alias
        );
        let size = 28.0;
        let dims = measure_text(&text, None, size as u16, 1.0);
        draw_text(
            &text,
            self.width / 2.0 - dims.width / 2.0,
            36.0,
            size,
            WHITE,
        );
    }

    fn draw_banner(&mut self, text: &str, effects: &EffectsContext) {
        let size = 48.0;
        let dims = measure_text(text, None, size as u16, 1.0);
        let alpha = 0.75 + 0.25 * (effects.i_time * 3.0).sin();
        draw_text(
            text,
            self.width / 2.0 - dims.width / 2.0,
            self.height / 2.0,
            size,
            Color::new(1.0, 1.0, 1.0, alpha),
        );
    }

    fn draw_controls_hint(&mut self, effects: &EffectsContext) {
        let view = if effects.view_2d { "2D" } else { "Arena" };
        let hint = format!("W/S, Up/Down: move   Q: quit   C: view ({})", view);
        draw_text(&hint, 10.0, self.height - 10.0, 16.0, GRAY);
    }
}
