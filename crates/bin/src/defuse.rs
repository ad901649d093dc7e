//! Native Defuse - match server running against a simulated arena.

mod sim;

use server::{GameModeKind, MatchHandle};
use sim::SimArena;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Native Defuse v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    let map = config.current_map();
    info!("Loaded configuration");
    info!("  Map: {} ({} bomb sites)", config.current_map, map.bomb_sites.len());
    info!("  Rounds to win: {}", config.bomb.rounds_to_win);
    info!("  Kills to win: {}", config.deathmatch.kills_to_win);

    let bot_count: u32 = match std::env::var("DEFUSE_BOTS") {
        Ok(value) => value.parse()?,
        Err(_) => 6,
    };
    let kind = match std::env::var("DEFUSE_MODE").as_deref() {
        Ok("tdm") => GameModeKind::TeamDeathmatch,
        _ => GameModeKind::BombDefusal,
    };
    info!("Simulating {} bots in {}", bot_count, kind);

    // Bot IDs start high, clear of anything a real host would hand out first
    let bots: Vec<u32> = (1_000..1_000 + bot_count).collect();
    let mut arena = SimArena::new(map.bounds);
    for &id in &bots {
        arena.add_bot(id);
    }

    let handle = MatchHandle::new(config, arena);
    let game_loop = handle.spawn_game_loop().await;
    let driver = tokio::spawn(sim::drive_bots(handle.clone(), bots, kind, map));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.force_end("Server shutting down").await;
    driver.abort();
    game_loop.abort();

    Ok(())
}
