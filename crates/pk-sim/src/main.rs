//! pk-sim — headless pachinko session
//!
//! Usage:
//!   pk-sim                          - two minutes with default settings
//!   pk-sim --turbo --seed 7 --json  - fast timings, deterministic, JSON report
//!   pk-sim --config machine.yaml --trace session.json
//!
//! Balls are launched at a fixed rate, fly for a while and then land in the
//! start hole, the prize attacker (tried only during a hit) or the drain.
//! Reach PUSH is pressed after a fixed delay.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pk_core::secs;
use pk_machine::{
    BallId, EntryOutcome, HitSummary, LedgerSnapshot, MachineConfig, MachineStats,
    PachinkoMachine, PushButton, ReachPresenter,
};
use pk_stage::{HoleKind, StageTrace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "pk-sim", about = "Headless pachinko machine session")]
struct Cli {
    /// Machine config (.json / .yaml / .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use fast timings instead of the defaults (ignored with --config)
    #[arg(long)]
    turbo: bool,

    /// Simulated session length
    #[arg(short, long, default_value_t = 120.0)]
    seconds: f32,

    /// Simulation step
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Seed for the machine and the board
    #[arg(long)]
    seed: Option<u64>,

    /// Balls launched per second
    #[arg(long, default_value_t = 1.5)]
    launch_rate: f32,

    /// Seconds from launch to landing
    #[arg(long, default_value_t = 2.0)]
    flight_secs: f32,

    /// Chance a landing ball finds the start hole
    #[arg(long, default_value_t = 0.15)]
    start_chance: f64,

    /// Chance a landing ball tries the prize attacker during a hit
    #[arg(long, default_value_t = 0.6)]
    prize_chance: f64,

    /// Seconds before PUSH is pressed on a reach
    #[arg(long, default_value_t = 1.0)]
    push_delay: f32,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Write every stage event to this file as JSON
    #[arg(long)]
    trace: Option<PathBuf>,
}

struct Flight {
    ball: BallId,
    remaining: Duration,
}

#[derive(Serialize)]
struct Report {
    seconds: f64,
    stats: MachineStats,
    ledger: LedgerSnapshot,
    last_hit: Option<HitSummary>,
    balls_in_flight: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MachineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None if cli.turbo => MachineConfig::turbo(),
        None => MachineConfig::default(),
    };

    let (mut machine, mut board_rng) = match cli.seed {
        Some(seed) => (
            PachinkoMachine::with_seed(config, seed)?,
            StdRng::seed_from_u64(seed ^ 0xB0A2D),
        ),
        None => (PachinkoMachine::new(config)?, StdRng::from_os_rng()),
    };

    let button = Arc::new(PushButton::new());
    let presenter: Arc<dyn ReachPresenter> = button.clone();
    machine.set_reach_presenter(Some(presenter));
    let sub = machine.subscribe();

    let dt = Duration::from_millis(cli.tick_ms.max(1));
    let total = secs(cli.seconds);
    let flight_time = secs(cli.flight_secs);
    let push_delay = secs(cli.push_delay);

    let mut trace = StageTrace::new(format!("pk-sim-{}", cli.seed.unwrap_or_default()));
    let mut flights: Vec<Flight> = Vec::new();
    let mut launch_credit = 0.0f32;
    let mut push_wait = Duration::ZERO;

    log::info!(
        "simulating {:.1}s at {}ms ticks, {} balls/s",
        cli.seconds,
        dt.as_millis(),
        cli.launch_rate
    );

    while machine.elapsed() < total {
        machine.tick(dt);

        // PUSH
        if button.is_waiting() {
            push_wait += dt;
            if push_wait >= push_delay {
                button.press();
                push_wait = Duration::ZERO;
            }
        } else {
            push_wait = Duration::ZERO;
        }

        // launcher
        launch_credit += cli.launch_rate * dt.as_secs_f32();
        while launch_credit >= 1.0 {
            launch_credit -= 1.0;
            if let Some(ball) = machine.launch_ball() {
                flights.push(Flight {
                    ball,
                    remaining: flight_time,
                });
            }
        }

        // landings
        let mut landed = Vec::new();
        flights.retain_mut(|flight| {
            flight.remaining = flight.remaining.saturating_sub(dt);
            if flight.remaining.is_zero() {
                landed.push(flight.ball);
                false
            } else {
                true
            }
        });
        for ball in landed {
            land(&mut machine, &mut board_rng, &cli, ball);
        }

        if cli.trace.is_some() {
            trace.extend(sub.drain());
        } else {
            sub.drain();
        }
    }

    if let Some(path) = &cli.trace {
        std::fs::write(path, trace.to_json()?)
            .with_context(|| format!("writing trace {}", path.display()))?;
        log::info!("trace: {} events → {}", trace.len(), path.display());
    }

    let report = Report {
        seconds: machine.elapsed().as_secs_f64(),
        stats: machine.stats().clone(),
        ledger: machine.ledger().snapshot(),
        last_hit: machine.director().last_hit(),
        balls_in_flight: flights.len(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Resolve a landing ball into a hole
fn land(machine: &mut PachinkoMachine, rng: &mut StdRng, cli: &Cli, ball: BallId) {
    let roll: f64 = rng.random();

    if machine.ledger().is_hit() && roll < cli.prize_chance {
        match machine.enter_hole(ball, HoleKind::Prize) {
            // bounced off the closed attacker
            EntryOutcome::Ignored(_) => {
                machine.enter_hole(ball, HoleKind::Out);
            }
            outcome => log::debug!("ball {:?}: {:?}", ball, outcome),
        }
    } else if roll < cli.start_chance {
        let outcome = machine.enter_hole(ball, HoleKind::Start);
        log::debug!("ball {:?}: {:?}", ball, outcome);
    } else {
        machine.enter_hole(ball, HoleKind::Out);
    }

    machine.despawn_ball(ball);
}

fn print_report(report: &Report) {
    let stats = &report.stats;
    println!("═══ pk-sim session ({:.1}s) ═══", report.seconds);
    println!(
        "spins {}  wins {} ({:.2}%)  reaches {}",
        stats.spins,
        stats.wins,
        stats.win_rate(),
        stats.reaches
    );
    println!(
        "hits {}  rounds {}  timeouts {}  payout {}",
        stats.hits, stats.rounds, stats.round_timeouts, stats.prize_payout
    );
    println!(
        "holds +{} -{} rejected {}",
        stats.holds_accepted, stats.holds_consumed, stats.holds_rejected
    );
    println!(
        "balls launched {}  rejected {}  in flight {}",
        stats.balls_launched, stats.launch_rejections, report.balls_in_flight
    );
    println!(
        "ledger: balls {}  in {}  hit {}",
        report.ledger.balls, report.ledger.in_count, report.ledger.is_hit
    );
    if let Some(hit) = report.last_hit {
        println!(
            "last hit: {} rounds, payout {}, timeouts {}",
            hit.rounds_played, hit.total_payout, hit.timeouts
        );
    }
}
