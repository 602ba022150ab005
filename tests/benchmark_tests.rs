//! Performance benchmarks for the per-frame client paths

use client::bracket::{pair, BracketEntry, TournamentState};
use client::network::{memory_link, Channel, Transport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{predict, BallDelta, BallState, ScoreUpdate, ServerMessage, Vec3};
use std::time::{Duration, Instant};

/// Benchmarks ball extrapolation, which runs every frame
#[test]
fn benchmark_ball_prediction() {
    let ball = BallState {
        position: Vec3::new(10.0, 0.0, -20.0),
        velocity_hint: BallDelta { dx: 7.5, dy: -3.0 },
    };

    let iterations = 1_000_000u64;
    let start = Instant::now();
    let mut checksum = 0.0f32;

    for i in 0..iterations {
        let predicted = predict(&ball, Duration::from_micros(i % 100_000));
        checksum += predicted.x;
    }

    let duration = start.elapsed();
    println!(
        "Ball prediction: {} iterations in {:?} ({:.2} ns/iter, checksum {})",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        checksum
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks drawing pairings for a large bracket
#[test]
fn benchmark_bracket_pairing() {
    let entrants: Vec<BracketEntry> = (1..=1024)
        .map(|id| BracketEntry::new(id, &format!("player{}", id)))
        .collect();
    let mut rng = StdRng::seed_from_u64(1);

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        let pairings = pair(&entrants, &mut rng);
        assert_eq!(pairings.len(), 512);
    }

    let duration = start.elapsed();
    println!(
        "Bracket pairing: {} × 1024 entrants in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks decoding and routing inbound frames across several games
#[test]
fn benchmark_channel_routing() {
    let (link, peer) = memory_link();
    let mut channel = Channel::new(link);
    let mut subscriptions: Vec<_> = (1..=4).map(|id| channel.subscribe(id)).collect();

    let frames = 5_000u32;
    for i in 0..frames {
        peer.push(&ServerMessage::ScoreUpdate(ScoreUpdate {
            game_id: Some(i % 5),
            player1_score: i,
            player2_score: 0,
        }));
    }

    let start = Instant::now();
    let delivered = channel.poll();
    let mut drained = 0;
    for subscription in &mut subscriptions {
        while subscription.try_next().is_some() {
            drained += 1;
        }
    }
    let duration = start.elapsed();

    println!(
        "Channel routing: {} frames in {:?} ({:.2} μs/frame)",
        frames,
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    // Game id 0 has no subscriber.
    assert_eq!(delivered, 4_000);
    assert_eq!(drained, 4_000);

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks tournament checkpoints
#[test]
fn benchmark_checkpoint_serialization() {
    let entrants: Vec<BracketEntry> = (1..=64)
        .map(|id| BracketEntry::new(id, &format!("player{}", id)))
        .collect();
    let mut rng = StdRng::seed_from_u64(64);
    let state = TournamentState::new(entrants, &mut rng);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = state.to_checkpoint().unwrap();
        let restored = TournamentState::from_checkpoint(&bytes).unwrap();
        assert_eq!(restored.pairings.len(), 32);
    }

    let duration = start.elapsed();
    println!(
        "Checkpoint serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
