use clap::{Parser, ValueEnum};
use client::auth::{LocalOnly, StaticToken};
use client::config::{MatchConfig, SessionTimings};
use client::game::GameSession;
use client::input::{ControlScheme, InputManager};
use client::network::{Channel, Transport, UdpLink};
use client::rendering::{EffectsContext, Renderer};
use client::tournament::{TournamentController, TournamentEvent};
use log::{error, info, warn};
use macroquad::prelude::*;
use std::time::{Duration, Instant};

/// How long the tournament result stays on screen before the window closes.
const CLOSING_BANNER: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Two players on one keyboard
    Local,
    /// One player here, the opponent on another client
    Remote,
    /// Single-elimination bracket on one keyboard
    Tournament,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    #[arg(short = 'm', long, value_enum, default_value = "local")]
    mode: Mode,

    /// Game id of a remote match
    #[arg(long)]
    game_id: Option<u32>,

    /// Player ids of a remote match, left paddle first
    #[arg(long, num_args = 2, value_delimiter = ',')]
    players: Vec<u32>,

    /// Which of the two players sits at this client
    #[arg(long)]
    local_player: Option<u32>,

    /// Bearer token for remote matches
    #[arg(long)]
    token: Option<String>,

    /// Tournament entrants, comma separated
    #[arg(long, value_delimiter = ',')]
    aliases: Vec<String>,

    /// Seed for tournament pairings
    #[arg(long)]
    seed: Option<u64>,

    /// Countdown before input is enabled, in milliseconds
    #[arg(long, default_value = "2000")]
    countdown_ms: u64,

    /// How long the GOAL banner stays up, in milliseconds
    #[arg(long, default_value = "2000")]
    goal_display_ms: u64,

    /// Delay between game over and leaving the match, in milliseconds
    #[arg(long, default_value = "3000")]
    game_over_ms: u64,

    /// Delay between a server error and leaving the match, in milliseconds
    #[arg(long, default_value = "3000")]
    error_teardown_ms: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "1000")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "700")]
    height: usize,
}

impl Args {
    fn timings(&self) -> SessionTimings {
        SessionTimings {
            countdown: Duration::from_millis(self.countdown_ms),
            goal_display: Duration::from_millis(self.goal_display_ms),
            game_over_delay: Duration::from_millis(self.game_over_ms),
            error_teardown: Duration::from_millis(self.error_teardown_ms),
        }
    }
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Pong".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

enum App {
    Match(GameSession),
    Tournament(TournamentController),
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Socket tasks run here; the frame loop stays on the macroquad thread.
    let runtime = tokio::runtime::Runtime::new()?;

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let link = UdpLink::new(&args.server, args.fake_ping, runtime.handle().clone())?;
    let mut channel = Channel::new(link);
    let timings = args.timings();

    let (mut app, scheme) = match args.mode {
        Mode::Local => {
            let config = MatchConfig::local(&mut ::rand::thread_rng());
            info!("Controls: W/S for the left paddle, Up/Down for the right paddle");
            let mut session = GameSession::new(timings);
            session.initialize(
                config,
                &mut channel,
                &mut LocalOnly,
                |summary| info!("Match finished, winner {}", summary.winner),
            )?;
            (App::Match(session), ControlScheme::SharedKeyboard)
        }
        Mode::Remote => {
            let game_id = args.game_id.ok_or("--game-id is required for remote matches")?;
            let (player1, player2) = match args.players.as_slice() {
                [a, b] => (*a, *b),
                _ => return Err("--players takes exactly two ids".into()),
            };
            let local = args
                .local_player
                .ok_or("--local-player is required for remote matches")?;
            let config = MatchConfig::remote(game_id, (player1, player2), local)?;
            let scheme = ControlScheme::Remote {
                local_is_player2: config.inverted_view(),
            };
            info!("Controls: W/S to move your paddle");

            let mut tokens = StaticToken(args.token.clone().unwrap_or_default());
            let mut session = GameSession::new(timings);
            session.initialize(config, &mut channel, &mut tokens, |summary| {
                info!("Match finished, winner {}", summary.winner)
            })?;
            (App::Match(session), scheme)
        }
        Mode::Tournament => {
            let mut controller = match args.seed {
                Some(seed) => TournamentController::with_seed(timings, seed),
                None => TournamentController::new(timings),
            };
            let aliases: Vec<&str> = args.aliases.iter().map(String::as_str).collect();
            controller.launch(&aliases)?;
            info!("Controls: W/S for the left paddle, Up/Down for the right paddle");
            (App::Tournament(controller), ControlScheme::SharedKeyboard)
        }
    };
    info!("Press Q to quit, C to toggle the 2D view");

    let mut input_manager = InputManager::new(scheme);
    let mut renderer = Renderer::new(args.width, args.height)?;
    let mut effects = EffectsContext::new();
    let mut closing: Option<String> = None;

    loop {
        let now = Instant::now();
        let (toggles, intent) = input_manager.update();

        if toggles.change_view {
            effects.toggle_view();
        }

        let session = match &mut app {
            App::Match(session) => {
                session.update(now, &mut channel);
                if toggles.quit {
                    session.quit(&mut channel);
                }
                Some(session)
            }
            App::Tournament(controller) => {
                if toggles.quit {
                    controller.abort(&mut channel);
                }
                for event in controller.update(now, &mut channel) {
                    log_event(&event);
                    if let Some(headline) = event.headline() {
                        closing = Some(headline);
                    }
                }
                controller.active_session_mut()
            }
        };

        let view = match session {
            Some(session) => {
                if let Err(e) = session.send_movement(intent, &mut channel) {
                    warn!("Error sending movement: {}", e);
                }
                Some(session.view())
            }
            None => None,
        };

        match &view {
            Some(view) => {
                effects.advance(get_frame_time(), view);
                renderer.render(view, &effects);
            }
            None => break,
        }

        if finished(&app) {
            // One last frame so the final banner is visible.
            next_frame().await;
            break;
        }

        next_frame().await;
    }

    if let Some(text) = closing {
        let shown_at = Instant::now();
        while shown_at.elapsed() < CLOSING_BANNER {
            let (toggles, _) = input_manager.update();
            if toggles.quit {
                break;
            }
            effects.i_time += get_frame_time();
            renderer.render_message(&text, &effects);
            next_frame().await;
        }
    }

    channel.disconnect();
    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(())
}

fn finished(app: &App) -> bool {
    match app {
        App::Match(session) => session.is_torn_down(),
        App::Tournament(controller) => !controller.is_running(),
    }
}

fn log_event(event: &TournamentEvent) {
    match event {
        TournamentEvent::MatchStarted {
            round,
            player1,
            player2,
            ..
        } => info!("Round {}: {} vs {}", round, player1, player2),
        TournamentEvent::FinalStarted {
            player1, player2, ..
        } => info!("Final: {} vs {}", player1, player2),
        TournamentEvent::MatchFinished { winner, .. } => info!("{} advances", winner),
        TournamentEvent::RoundAdvanced { round } => info!("Starting round {}", round),
        TournamentEvent::Champion(alias) => info!("Champion: {}", alias),
        TournamentEvent::Aborted(reason) => warn!("Tournament stopped: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_flags_reach_session_timings() {
        let args = Args::try_parse_from([
            "client",
            "--countdown-ms",
            "100",
            "--error-teardown-ms",
            "500",
        ])
        .unwrap();
        let timings = args.timings();

        assert_eq!(timings.countdown, Duration::from_millis(100));
        assert_eq!(timings.error_teardown, Duration::from_millis(500));
        assert_eq!(timings.game_over_delay, Duration::from_millis(3000));
    }

    #[test]
    fn test_default_timings_match_session_defaults() {
        let args = Args::try_parse_from(["client"]).unwrap();
        assert_eq!(args.timings(), SessionTimings::default());
    }
}
