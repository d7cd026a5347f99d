use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use arcanefall::{AiController, Duel, GameConfig};

/// Headless duel runner: two automated players trade spells until one tops out.
#[derive(Parser, Debug)]
struct Opts {
    /// Path to a JSON config; defaults are used when missing or invalid
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulation tick in milliseconds
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Simulated seconds before the match is called a draw
    #[arg(long, default_value_t = 600.0)]
    max_seconds: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let config = match &opts.config {
        Some(path) => GameConfig::load(path),
        None => GameConfig::default(),
    };

    let mut duel = Duel::new(&config);
    duel.set_ai(0, Some(AiController::new(config.ai_weights)));
    duel.set_ai(1, Some(AiController::new(config.ai_weights)));

    let dt = opts.tick_ms as f64 / 1000.0;
    let mut elapsed = 0.0;
    while !duel.is_over() && elapsed < opts.max_seconds {
        duel.tick(dt);
        elapsed += dt;
    }

    for player in duel.players() {
        let engine = player.engine();
        println!(
            "{}: score {} lines {} level {} mana {}{}",
            player.name(),
            engine.score(),
            engine.lines(),
            engine.level(),
            player.mana(),
            if engine.is_game_over() {
                " (topped out)"
            } else {
                ""
            },
        );
    }
    Ok(())
}
