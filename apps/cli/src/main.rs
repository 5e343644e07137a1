#![deny(warnings)]

//! Headless driver: seats bots in a room and plays a full game.

use anyhow::{bail, Context, Result};
use game_runtime::{bot, ActionReply, GameSession, Phase};
use market_catalog::{Catalog, GameRules};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    seed: Option<u64>,
    players: Option<usize>,
    rounds: Option<u32>,
    catalog: Option<String>,
    rules: Option<String>,
    json: bool,
    version: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--players" => args.players = it.next().and_then(|s| s.parse().ok()),
            "--rounds" => args.rounds = it.next().and_then(|s| s.parse().ok()),
            "--catalog" => args.catalog = it.next(),
            "--rules" => args.rules = it.next(),
            "--json" => args.json = true,
            "--version" => args.version = true,
            _ => {}
        }
    }
    args
}

fn load(args: &Args) -> Result<(Catalog, GameRules)> {
    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path).with_context(|| format!("loading catalog {path}"))?,
        None => Catalog::builtin().context("builtin catalog")?,
    };
    let mut rules = match &args.rules {
        Some(path) => GameRules::load(path).with_context(|| format!("loading rules {path}"))?,
        None => GameRules::default(),
    };
    if let Some(seed) = args.seed {
        rules.rng_seed = Some(seed);
    }
    if let Some(rounds) = args.rounds {
        rules.max_rounds = rounds;
    }
    rules.validate()?;
    Ok((catalog, rules))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if args.version {
        println!(
            "bubble-market {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let (catalog, rules) = load(&args)?;
    let players = args.players.unwrap_or(rules.min_players.max(2));
    if players < rules.min_players {
        bail!("need at least {} players", rules.min_players);
    }
    info!(players, rounds = rules.max_rounds, seed = ?rules.rng_seed, "starting bot game");

    let mut session = GameSession::new("cli", catalog, rules);
    for i in 1..=players {
        session.join(format!("bot{i}"))?;
    }
    session.start_game()?;

    while session.phase() != Phase::GameEnded {
        let turn = bot::play_turn(&mut session);
        if args.json {
            for event in session.drain_events() {
                println!("{}", serde_json::to_string(&event)?);
            }
            let reply = ActionReply::from_result(&turn, |t| format!("{} ended their turn", t.player));
            println!("{}", serde_json::to_string(&reply)?);
        }
        turn?;
    }

    if !args.json {
        for entry in session.log().entries() {
            println!("[R{}] {}", entry.round, entry.message);
        }
        println!();
        println!("{}", standings(&session));
    }
    Ok(())
}

fn standings(session: &GameSession) -> String {
    let rankings = session.final_rankings();
    rankings
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {} | cash ${} | net worth ${} | stocks {}",
                i + 1,
                r.player,
                r.cash,
                r.net_worth,
                r.stock_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
