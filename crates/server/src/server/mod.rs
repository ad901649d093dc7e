//! Match runtime: shared state, the heartbeat loop and the handle host adapters talk to.

use crate::config::Config;
use crate::error::MatchError;
use crate::gamemodes::GameModeKind;
use crate::host::{Host, PlayerId};
use crate::team::Team;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub mod game;

pub use game::{
    BombStatus, MatchOrchestrator, MatchState, MatchStatus, MemberStatus, Membership, SpawnDecision,
};

/// The orchestrator together with the host it drives.
pub struct GameState<H: Host> {
    pub orchestrator: MatchOrchestrator,
    pub host: H,
    /// Smoothed heartbeat duration in milliseconds.
    pub update_time_avg: f64,
}

impl<H: Host> GameState<H> {
    pub fn new(config: Config, host: H) -> Self {
        Self {
            orchestrator: MatchOrchestrator::new(config),
            host,
            update_time_avg: 0.0,
        }
    }

    /// Run one heartbeat. Returns whether a game tick ran.
    pub fn heartbeat(&mut self) -> bool {
        let GameState { orchestrator, host, .. } = self;
        orchestrator.heartbeat(host)
    }
}

/// Drive the orchestrator at the configured heartbeat rate until the task is dropped.
pub async fn run_game_loop<H: Host + Sync + 'static>(state: Arc<RwLock<GameState<H>>>, interval_ms: u64) {
    let interval_ms = interval_ms.max(1);
    let start = Instant::now() + Duration::from_millis(interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(interval_ms));
    // A stalled heartbeat is dropped rather than replayed in a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        // Hibernate while nobody is online and nobody is queued
        {
            let game = state.read().await;
            if game.orchestrator.roster().is_empty() && game.host.active_participants().is_empty() {
                drop(game);
                sleep(Duration::from_millis((interval_ms * 4).max(100))).await;
                continue;
            }
        }

        let mut game = state.write().await;
        let beat_start = std::time::Instant::now();
        let ticked = game.heartbeat();
        let beat_ms = beat_start.elapsed().as_secs_f64() * 1000.0;

        game.update_time_avg = game.update_time_avg * 0.5 + beat_ms * 0.5;

        let budget = interval_ms as f64 * 0.9;
        if beat_ms > budget {
            warn!(
                "Slow heartbeat at tick #{}: {:.3}ms (budget: {:.1}ms) - {} members",
                game.orchestrator.tick_count(),
                beat_ms,
                budget,
                game.orchestrator.roster().len()
            );
        } else if ticked {
            debug!(
                "Tick #{} done, avg heartbeat {:.3}ms",
                game.orchestrator.tick_count(),
                game.update_time_avg
            );
        }
    }
}

/// Cloneable entry point for host events and commands.
///
/// Every call takes the write lock for its duration, so events are serialized
/// with the heartbeat.
pub struct MatchHandle<H: Host> {
    state: Arc<RwLock<GameState<H>>>,
}

impl<H: Host> Clone for MatchHandle<H> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<H: Host + Sync + 'static> MatchHandle<H> {
    pub fn new(config: Config, host: H) -> Self {
        Self {
            state: Arc::new(RwLock::new(GameState::new(config, host))),
        }
    }

    /// Start the heartbeat loop on the current runtime.
    pub async fn spawn_game_loop(&self) -> tokio::task::JoinHandle<()> {
        let interval_ms = self.state.read().await.orchestrator.config().server.heartbeat_interval_ms;
        info!("Heartbeat every {}ms", interval_ms);
        tokio::spawn(run_game_loop(Arc::clone(&self.state), interval_ms))
    }

    pub fn state(&self) -> Arc<RwLock<GameState<H>>> {
        Arc::clone(&self.state)
    }

    /// Run `f` against the host under the write lock.
    pub async fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let mut game = self.state.write().await;
        f(&mut game.host)
    }

    pub async fn toggle_membership(&self, player: PlayerId, kind: GameModeKind) -> Result<Membership, MatchError> {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.toggle_membership(host, player, kind)
    }

    pub async fn set_team(&self, player: PlayerId, team: Team) -> Result<(), MatchError> {
        let mut game = self.state.write().await;
        game.orchestrator.set_team(player, team)
    }

    pub async fn damage(&self, attacker: PlayerId, victim: PlayerId, raw: i32) {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.on_damage(&*host, attacker, victim, raw, std::time::Instant::now());
    }

    pub async fn death(&self, victim: PlayerId, direct: Option<PlayerId>) -> Option<String> {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.on_death(host, victim, direct, std::time::Instant::now())
    }

    pub async fn spawn_request(&self, player: PlayerId) -> SpawnDecision {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.on_spawn_request(host, player)
    }

    pub async fn start_planting(&self, player: PlayerId) -> Result<(), MatchError> {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.start_planting(host, player)
    }

    pub async fn start_defusing(&self, player: PlayerId) -> Result<(), MatchError> {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.start_defusing(host, player)
    }

    pub async fn force_start(&self) -> Result<(), MatchError> {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.force_start(host)
    }

    pub async fn force_end(&self, reason: &str) {
        let mut game = self.state.write().await;
        let GameState { orchestrator, host, .. } = &mut *game;
        orchestrator.force_end(host, reason);
    }

    pub async fn reload_config(&self, config: Config) {
        self.state.write().await.orchestrator.reload_config(config);
    }

    pub async fn status(&self) -> MatchStatus {
        self.state.read().await.orchestrator.status()
    }

    pub async fn action_status(&self, player: PlayerId) -> Option<String> {
        self.state.read().await.orchestrator.action_status(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[tokio::test]
    async fn test_handle_drives_lobby() {
        let handle = MatchHandle::new(Config::default(), FakeHost::with_players(2));
        assert_eq!(
            handle.toggle_membership(1, GameModeKind::BombDefusal).await,
            Ok(Membership::Joined)
        );
        assert_eq!(handle.set_team(2, Team::Red).await, Err(MatchError::NotMember));
        handle.toggle_membership(2, GameModeKind::BombDefusal).await.unwrap();
        handle.force_start().await.unwrap();

        let status = handle.status().await;
        assert_eq!(status.state, MatchState::Countdown);
        assert_eq!(status.countdown, Some(3));
        assert_eq!(status.members.len(), 2);
    }

    #[tokio::test]
    async fn test_game_loop_starts_forced_match() {
        let mut config = Config::default();
        config.server.heartbeat_interval_ms = 1;
        config.server.heartbeats_per_tick = 1;
        let handle = MatchHandle::new(config, FakeHost::with_players(2));
        for id in [1, 2] {
            handle.toggle_membership(id, GameModeKind::TeamDeathmatch).await.unwrap();
        }
        handle.force_start().await.unwrap();

        let task = handle.spawn_game_loop().await;
        let started = tokio::time::timeout(Duration::from_secs(5), async {
            while handle.status().await.state != MatchState::InProgress {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        task.abort();

        assert!(started.is_ok());
        assert!(handle.with_host(|host| host.announced("Team Deathmatch started")).await);
    }
}
