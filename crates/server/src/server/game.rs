//! The match orchestrator: lobby, countdown, round dispatch and match reset.

use crate::combat::{CombatTracker, KillSource};
use crate::config::Config;
use crate::error::MatchError;
use crate::gamemodes::{announce_teams, get_gamemode, GameMode, GameModeKind, MatchContext, MatchOver};
use crate::host::{Color, Host, PlayerId};
use crate::roster::Roster;
use crate::schedule::{Deferred, Generation, Scheduler};
use crate::team::Team;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lobby/match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchState {
    #[default]
    Waiting,
    Countdown,
    InProgress,
}

/// Result of a join/leave toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Joined,
    Left,
}

/// Whether the host should let a spawn go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    pub original_team: Team,
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BombStatus {
    pub planted: bool,
    pub timer: u32,
    pub site: Option<String>,
}

/// Point-in-time view of the match for status commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchStatus {
    pub mode: Option<GameModeKind>,
    pub state: MatchState,
    pub countdown: Option<u32>,
    pub round: u32,
    pub red_rounds: u32,
    pub blue_rounds: u32,
    pub overtime: bool,
    pub swapped: bool,
    pub round_waiting: bool,
    pub members: Vec<MemberStatus>,
    pub bomb: Option<BombStatus>,
}

/// Owns the single match and everything attached to it.
pub struct MatchOrchestrator {
    config: Config,
    /// Mode the lobby is queued for. `None` exactly when the roster is empty.
    kind: Option<GameModeKind>,
    state: MatchState,
    countdown: Option<u32>,
    roster: Roster,
    /// Live mode, only while a match is in progress.
    mode: Option<Box<dyn GameMode>>,
    combat: CombatTracker,
    scheduler: Scheduler,
    /// Bumped on every match start and end.
    match_serial: u64,
    heartbeat_count: u64,
    /// Logical ticks (seconds) processed.
    tick_count: u64,
}

impl MatchOrchestrator {
    pub fn new(config: Config) -> Self {
        let combat = CombatTracker::new(kill_window(&config));
        Self {
            config,
            kind: None,
            state: MatchState::Waiting,
            countdown: None,
            roster: Roster::new(),
            mode: None,
            combat,
            scheduler: Scheduler::new(),
            match_serial: 0,
            heartbeat_count: 0,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn kind(&self) -> Option<GameModeKind> {
        self.kind
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn combat(&self) -> &CombatTracker {
        &self.combat
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_round_waiting(&self) -> bool {
        self.mode.as_ref().is_some_and(|m| m.is_round_waiting())
    }

    fn generation(&self) -> Generation {
        Generation {
            match_serial: self.match_serial,
            round: self.mode.as_ref().map_or(0, |m| m.round_index()),
        }
    }

    // ---- Lobby ----

    /// Join the lobby for `kind`, or leave it if already a member.
    pub fn toggle_membership(
        &mut self,
        host: &mut dyn Host,
        player: PlayerId,
        kind: GameModeKind,
    ) -> Result<Membership, MatchError> {
        if self.state == MatchState::InProgress {
            return Err(MatchError::Rejected("a match is already in progress"));
        }

        if self.roster.remove(player) {
            info!("Player {} left the {} lobby", player, self.kind.map_or_else(String::new, |k| k.to_string()));
            host.whisper(player, "You left the match lobby");
            if self.roster.is_empty() {
                self.kind = None;
                if self.countdown.take().is_some() {
                    self.state = MatchState::Waiting;
                    host.announce("The lobby is empty, countdown cancelled", Color::YELLOW);
                }
            }
            return Ok(Membership::Left);
        }

        // The first joiner picks the mode; later joiners queue for it.
        let active = *self.kind.get_or_insert(kind);
        let name = host.name(player).unwrap_or_else(|| format!("#{player}"));
        info!("{} joined the {} lobby", name, active);
        self.roster.add(player, name);
        if active == kind {
            host.whisper(player, &format!("You joined the {} lobby", active));
        } else {
            host.whisper(player, &format!("You joined the lobby; this match is {}, not {}", active, kind));
        }
        Ok(Membership::Joined)
    }

    pub fn set_team(&mut self, player: PlayerId, team: Team) -> Result<(), MatchError> {
        if !self.roster.contains(player) {
            return Err(MatchError::NotMember);
        }
        if self.state == MatchState::InProgress {
            return Err(MatchError::Rejected("teams are locked while a match is in progress"));
        }
        self.roster.set_team(player, team);
        debug!("Player {} picked {}", player, team);
        Ok(())
    }

    // ---- Admin ----

    pub fn force_start(&mut self, host: &mut dyn Host) -> Result<(), MatchError> {
        if self.state == MatchState::InProgress {
            return Err(MatchError::Rejected("a match is already in progress"));
        }
        if self.roster.len() < 2 {
            return Err(MatchError::NotEnoughPlayers(2));
        }
        let seconds = self.config.general.forced_countdown;
        self.countdown = Some(seconds);
        self.state = MatchState::Countdown;
        info!("Forced countdown: {}s", seconds);
        host.announce("An admin forced the match countdown!", Color::ORANGE);
        Ok(())
    }

    /// End the match with no winner.
    pub fn force_end(&mut self, host: &mut dyn Host, reason: &str) {
        self.end_match(
            host,
            MatchOver {
                winner: None,
                message: reason.to_string(),
            },
        );
    }

    /// Swap in a new configuration. Combat history is dropped with the old one.
    pub fn reload_config(&mut self, config: Config) {
        self.combat.reset();
        self.combat.set_window(kill_window(&config));
        self.config = config;
        info!("Configuration reloaded");
    }

    // ---- Ticking ----

    /// Called at the heartbeat rate. Returns whether a game tick ran.
    pub fn heartbeat(&mut self, host: &mut dyn Host) -> bool {
        self.heartbeat_count += 1;
        let per_tick = u64::from(self.config.server.heartbeats_per_tick.max(1));
        if self.heartbeat_count % per_tick != 0 {
            return false;
        }
        self.tick(host);
        true
    }

    /// One game tick (one second).
    pub fn tick(&mut self, host: &mut dyn Host) {
        self.tick_count += 1;
        self.run_deferred(host);
        self.update_countdown(host);
        self.update_match(host);
    }

    fn run_deferred(&mut self, host: &mut dyn Host) {
        for scheduled in self.scheduler.take_due(self.tick_count) {
            if scheduled.generation != self.generation() {
                debug!("Dropping stale {:?} from {:?}", scheduled.task, scheduled.generation);
                continue;
            }
            match scheduled.task {
                Deferred::EliminationCheck => {
                    if self.state != MatchState::InProgress {
                        continue;
                    }
                    let Some(mode) = self.mode.as_mut() else {
                        continue;
                    };
                    let over = {
                        let mut ctx = MatchContext {
                            config: &self.config,
                            roster: &mut self.roster,
                            host: &mut *host,
                        };
                        mode.check_elimination(&mut ctx)
                    };
                    if let Some(over) = over {
                        self.end_match(host, over);
                    }
                }
                Deferred::RedirectToSpawn(player) => self.redirect_to_spawn(host, player),
            }
        }
    }

    fn redirect_to_spawn(&self, host: &mut dyn Host, player: PlayerId) {
        if !host.is_active(player) {
            debug!("Skipping spawn redirect for inactive player {}", player);
            return;
        }
        let map = self.config.current_map();
        let spawn = match self.roster.team_of(player) {
            Team::Red => map.red_spawn,
            Team::Blue => map.blue_spawn,
            Team::Unassigned => return,
        };
        host.teleport(player, spawn);
    }

    fn should_start_countdown(&self) -> bool {
        if self.state != MatchState::Waiting || self.kind.is_none() {
            return false;
        }
        let total = self.roster.len();
        if total == 0 || total < self.config.general.min_players_to_start {
            return false;
        }
        let ratio = self.roster.ready_count() as f64 / total as f64;
        ratio >= self.config.general.ready_players_ratio
    }

    fn update_countdown(&mut self, host: &mut dyn Host) {
        match self.countdown {
            Some(seconds) => {
                let left = seconds.saturating_sub(1);
                if left > 0 {
                    self.countdown = Some(left);
                    host.announce(&format!("The match starts in {} seconds", left), Color::GREEN);
                } else {
                    self.countdown = None;
                    self.start_match(host);
                }
            }
            None if self.should_start_countdown() => {
                let seconds = self.config.general.countdown_time;
                self.countdown = Some(seconds);
                self.state = MatchState::Countdown;
                info!("Countdown started: {}s", seconds);
                host.announce(
                    &format!("Enough players are ready, the match starts in {} seconds", seconds),
                    Color::GREEN,
                );
            }
            None => {}
        }
    }

    fn update_match(&mut self, host: &mut dyn Host) {
        if self.state != MatchState::InProgress {
            return;
        }
        let Some(mode) = self.mode.as_mut() else {
            return;
        };
        let over = {
            let mut ctx = MatchContext {
                config: &self.config,
                roster: &mut self.roster,
                host: &mut *host,
            };
            mode.on_tick(&mut ctx)
        };
        if let Some(over) = over {
            self.end_match(host, over);
        }
    }

    // ---- Match lifecycle ----

    fn start_match(&mut self, host: &mut dyn Host) {
        let Some(kind) = self.kind.filter(|_| !self.roster.is_empty()) else {
            self.state = MatchState::Waiting;
            return;
        };

        let (red, blue) = self.roster.balance();
        self.roster.snapshot_original_teams();
        self.roster.reset_stats();
        self.combat.reset();
        self.scheduler.clear();
        self.match_serial += 1;

        let mut mode = get_gamemode(kind);
        self.state = MatchState::InProgress;
        info!(
            "Match #{} started: {} with {} red / {} blue",
            self.match_serial,
            kind,
            red.len(),
            blue.len()
        );
        host.announce(&format!("=== {} started! ===", mode.name()), Color::GREEN);
        {
            let mut ctx = MatchContext {
                config: &self.config,
                roster: &mut self.roster,
                host: &mut *host,
            };
            announce_teams(&mut ctx, false);
            mode.on_match_start(&mut ctx);
        }
        self.mode = Some(mode);
    }

    fn end_match(&mut self, host: &mut dyn Host, over: MatchOver) {
        let color = over.winner.map_or(Color::GOLD, Team::color);
        host.announce(&format!("*** {} ***", over.message), color);
        if let Some(mut mode) = self.mode.take() {
            let mut ctx = MatchContext {
                config: &self.config,
                roster: &mut self.roster,
                host: &mut *host,
            };
            mode.on_match_end(&mut ctx);
        }
        info!("Match #{} ended: {}", self.match_serial, over.message);

        self.state = MatchState::Waiting;
        self.kind = None;
        self.countdown = None;
        self.roster.clear();
        self.combat.reset();
        self.scheduler.clear();
        self.match_serial += 1;

        for id in host.active_participants() {
            host.set_engine_team(id, Team::Unassigned.engine_tag());
        }
        host.announce("All players have been reset, a new match can begin!", Color::GREEN);
    }

    // ---- Host events ----

    /// Record a hit between two match members on opposing teams.
    pub fn on_damage(&mut self, host: &dyn Host, attacker: PlayerId, victim: PlayerId, raw: i32, now: Instant) {
        if self.state != MatchState::InProgress || raw <= 0 || attacker == victim {
            return;
        }
        let (Some(a), Some(v)) = (self.roster.get(attacker), self.roster.get(victim)) else {
            debug!("Damage {} -> {} involves an untracked player", attacker, victim);
            return;
        };
        if a.team == v.team || !host.is_active(attacker) || !host.is_active(victim) {
            return;
        }
        let damage = host.mitigated_damage(victim, raw);
        self.combat.record_damage(attacker, victim, damage, now);
    }

    /// Resolve a member's death. Returns the kill-feed line, or `None` if the death is not ours.
    pub fn on_death(
        &mut self,
        host: &mut dyn Host,
        victim: PlayerId,
        direct: Option<PlayerId>,
        now: Instant,
    ) -> Option<String> {
        if self.state != MatchState::InProgress {
            return None;
        }
        let Some(member) = self.roster.get_mut(victim) else {
            debug!("Death of untracked player {}", victim);
            return None;
        };
        member.deaths += 1;
        let victim_team = member.team;
        let victim_name = member.name.clone();

        if let Some(mode) = self.mode.as_mut() {
            let mut ctx = MatchContext {
                config: &self.config,
                roster: &mut self.roster,
                host: &mut *host,
            };
            mode.on_player_death(&mut ctx, victim);
        }

        let roster = &self.roster;
        let killer = self.combat.resolve_killer(victim, direct, now, |id| {
            roster.contains(id) && host.is_active(id)
        });

        let credited = killer.filter(|k| {
            let team = self.roster.team_of(k.id);
            team.is_assigned() && team != victim_team
        });
        let message = match credited {
            Some(killer) => {
                let killer_team = self.roster.team_of(killer.id);
                let killer_name = self.roster.name_of(killer.id);
                if let Some(member) = self.roster.get_mut(killer.id) {
                    member.kills += 1;
                }
                if let Some(mode) = self.mode.as_mut() {
                    let mut ctx = MatchContext {
                        config: &self.config,
                        roster: &mut self.roster,
                        host: &mut *host,
                    };
                    mode.on_kill(&mut ctx, killer.id);
                }
                let verb = match killer.source {
                    KillSource::Direct => "killed",
                    KillSource::Indirect => "finished off",
                };
                info!("{} {} {}", killer_name, verb, victim_name);
                format!("[{}] {} {} [{}] {}", killer_team, killer_name, verb, victim_team, victim_name)
            }
            None => format!("[{}] {} died", victim_team, victim_name),
        };
        host.announce(&message, Color::YELLOW);

        self.combat.clear(victim);
        if self.kind == Some(GameModeKind::BombDefusal) {
            self.scheduler
                .schedule(self.tick_count, 1, self.generation(), Deferred::EliminationCheck);
        }
        Some(message)
    }

    /// Decide whether a member may respawn, and queue a redirect to their team spawn.
    pub fn on_spawn_request(&mut self, host: &mut dyn Host, player: PlayerId) -> SpawnDecision {
        if !self.roster.contains(player) {
            return SpawnDecision::Allow;
        }

        if self.state == MatchState::InProgress {
            let allowed = self.mode.as_ref().is_some_and(|m| m.allows_respawn());
            if !allowed {
                debug!("Blocked mid-round respawn of {}", player);
                host.whisper(player, "You cannot respawn while a round is in progress");
                host.whisper(player, "You will be revived when the round ends");
                return SpawnDecision::Deny;
            }
            if self.is_round_waiting() {
                host.whisper(player, "You have been revived, the next round starts soon");
            } else {
                host.whisper(player, "Respawned, back into the fight!");
            }
        }

        self.scheduler
            .schedule(self.tick_count, 1, self.generation(), Deferred::RedirectToSpawn(player));
        SpawnDecision::Allow
    }

    // ---- Bomb commands ----

    pub fn start_planting(&mut self, host: &mut dyn Host, player: PlayerId) -> Result<(), MatchError> {
        self.ensure_live_member(player)?;
        let Some(mode) = self.mode.as_mut() else {
            return Err(MatchError::Rejected("no match is in progress"));
        };
        let mut ctx = MatchContext {
            config: &self.config,
            roster: &mut self.roster,
            host,
        };
        mode.start_planting(&mut ctx, player)
    }

    pub fn start_defusing(&mut self, host: &mut dyn Host, player: PlayerId) -> Result<(), MatchError> {
        self.ensure_live_member(player)?;
        let Some(mode) = self.mode.as_mut() else {
            return Err(MatchError::Rejected("no match is in progress"));
        };
        let mut ctx = MatchContext {
            config: &self.config,
            roster: &mut self.roster,
            host,
        };
        mode.start_defusing(&mut ctx, player)
    }

    /// Progress of a member's bomb action, e.g. `"defusing: 3/5s"`.
    pub fn action_status(&self, player: PlayerId) -> Option<String> {
        self.mode
            .as_ref()
            .and_then(|m| m.bomb())
            .and_then(|bomb| bomb.action_status(player, &self.config.bomb))
    }

    fn ensure_live_member(&self, player: PlayerId) -> Result<(), MatchError> {
        if self.state != MatchState::InProgress {
            return Err(MatchError::Rejected("no match is in progress"));
        }
        if !self.roster.contains(player) {
            return Err(MatchError::NotMember);
        }
        Ok(())
    }

    // ---- Status ----

    pub fn status(&self) -> MatchStatus {
        let scoreboard = self.mode.as_ref().and_then(|m| m.scoreboard());
        let bomb = self.mode.as_ref().and_then(|m| m.bomb()).map(|bomb| BombStatus {
            planted: bomb.is_planted(),
            timer: bomb.timer(),
            site: bomb.active_site().map(|site| site.name.clone()),
        });
        MatchStatus {
            mode: self.kind,
            state: self.state,
            countdown: self.countdown,
            round: scoreboard.map_or(0, |s| s.current_round),
            red_rounds: scoreboard.map_or(0, |s| s.red_rounds),
            blue_rounds: scoreboard.map_or(0, |s| s.blue_rounds),
            overtime: scoreboard.is_some_and(|s| s.overtime),
            swapped: scoreboard.is_some_and(|s| s.swapped),
            round_waiting: self.is_round_waiting(),
            members: self
                .roster
                .iter()
                .map(|m| MemberStatus {
                    id: m.id,
                    name: m.name.clone(),
                    team: m.team,
                    original_team: m.original_team,
                    kills: m.kills,
                    deaths: m.deaths,
                })
                .collect(),
            bomb,
        }
    }
}

fn kill_window(config: &Config) -> Duration {
    Duration::try_from_secs_f64(config.general.kill_window_secs).unwrap_or(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Action, FakeHost};
    use glam::Vec2;

    const SITE: Vec2 = Vec2::new(400.0, 300.0);

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.general.countdown_time = 1;
        config.bomb.plant_time = 1;
        config.bomb.defuse_time = 1;
        config.bomb.bomb_timer = 3;
        config.bomb.round_wait_time = 0;
        config
    }

    /// Players `1..=n` join `kind`; odd ids pick red, even ids blue; the match starts.
    fn started(n: u32, kind: GameModeKind, config: Config) -> (MatchOrchestrator, FakeHost) {
        let mut host = FakeHost::with_players(n);
        let mut orch = MatchOrchestrator::new(config);
        for id in 1..=n {
            orch.toggle_membership(&mut host, id, kind).unwrap();
            let team = if id % 2 == 1 { Team::Red } else { Team::Blue };
            orch.set_team(id, team).unwrap();
        }
        while orch.state() != MatchState::InProgress {
            orch.tick(&mut host);
            assert!(orch.tick_count() < 100, "match never started");
        }
        (orch, host)
    }

    #[test]
    fn test_membership_rules() {
        let mut host = FakeHost::with_players(3);
        let mut orch = MatchOrchestrator::new(Config::default());

        assert_eq!(
            orch.toggle_membership(&mut host, 1, GameModeKind::BombDefusal),
            Ok(Membership::Joined)
        );
        assert_eq!(orch.kind(), Some(GameModeKind::BombDefusal));
        assert_eq!(
            orch.toggle_membership(&mut host, 2, GameModeKind::TeamDeathmatch),
            Ok(Membership::Joined)
        );
        assert_eq!(orch.kind(), Some(GameModeKind::BombDefusal));
        assert_eq!(orch.roster().len(), 2);
        assert!(host
            .whispers
            .iter()
            .any(|(id, w)| *id == 2 && w.contains("not Team Deathmatch")));
        assert_eq!(orch.set_team(3, Team::Red), Err(MatchError::NotMember));
        assert_eq!(
            orch.toggle_membership(&mut host, 2, GameModeKind::TeamDeathmatch),
            Ok(Membership::Left)
        );
        assert_eq!(
            orch.toggle_membership(&mut host, 1, GameModeKind::BombDefusal),
            Ok(Membership::Left)
        );
        assert_eq!(orch.kind(), None);
        assert!(orch.roster().is_empty());
    }

    #[test]
    fn test_ready_ratio_starts_countdown() {
        let mut config = Config::default();
        config.general.countdown_time = 3;
        let mut host = FakeHost::with_players(3);
        let mut orch = MatchOrchestrator::new(config);
        for id in 1..=3 {
            orch.toggle_membership(&mut host, id, GameModeKind::TeamDeathmatch).unwrap();
        }
        orch.set_team(1, Team::Red).unwrap();
        orch.tick(&mut host);
        assert_eq!(orch.state(), MatchState::Waiting);

        orch.set_team(2, Team::Blue).unwrap();
        orch.tick(&mut host);
        assert_eq!(orch.state(), MatchState::Countdown);
        assert_eq!(orch.status().countdown, Some(3));

        orch.tick(&mut host);
        orch.tick(&mut host);
        assert_eq!(orch.state(), MatchState::Countdown);
        orch.tick(&mut host);
        assert_eq!(orch.state(), MatchState::InProgress);
        assert_eq!(orch.roster().ready_count(), 3);
        assert_eq!(
            orch.toggle_membership(&mut host, 1, GameModeKind::TeamDeathmatch),
            Err(MatchError::Rejected("a match is already in progress"))
        );
        assert!(orch.set_team(1, Team::Blue).is_err());
    }

    #[test]
    fn test_force_start_needs_two_members() {
        let mut host = FakeHost::with_players(2);
        let mut orch = MatchOrchestrator::new(Config::default());
        orch.toggle_membership(&mut host, 1, GameModeKind::BombDefusal).unwrap();
        assert_eq!(orch.force_start(&mut host), Err(MatchError::NotEnoughPlayers(2)));

        orch.toggle_membership(&mut host, 2, GameModeKind::BombDefusal).unwrap();
        orch.force_start(&mut host).unwrap();
        assert_eq!(orch.state(), MatchState::Countdown);
        for _ in 0..3 {
            orch.tick(&mut host);
        }
        assert_eq!(orch.state(), MatchState::InProgress);
        let red = orch.roster().team_members(Team::Red).len();
        let blue = orch.roster().team_members(Team::Blue).len();
        assert_eq!((red, blue), (1, 1));
    }

    #[test]
    fn test_heartbeat_throttles_to_game_ticks() {
        let mut config = Config::default();
        config.server.heartbeats_per_tick = 4;
        let mut host = FakeHost::new();
        let mut orch = MatchOrchestrator::new(config);
        let ticks = (0..12).filter(|_| orch.heartbeat(&mut host)).count();
        assert_eq!(ticks, 3);
        assert_eq!(orch.tick_count(), 3);
    }

    #[test]
    fn test_damage_filters() {
        let (mut orch, host) = started(4, GameModeKind::TeamDeathmatch, quick_config());
        let now = Instant::now();

        orch.on_damage(&host, 1, 3, 20, now);
        assert!(orch.combat().is_empty(), "same team");
        orch.on_damage(&host, 1, 1, 20, now);
        assert!(orch.combat().is_empty(), "self damage");
        orch.on_damage(&host, 1, 9, 20, now);
        assert!(orch.combat().is_empty(), "not a member");
        orch.on_damage(&host, 1, 2, 0, now);
        assert!(orch.combat().is_empty(), "no damage");

        orch.on_damage(&host, 1, 2, 20, now);
        assert_eq!(orch.combat().record(2).and_then(|r| r.last_attacker), Some(1));
    }

    #[test]
    fn test_indirect_kill_is_credited_and_rewarded() {
        let (mut orch, mut host) = started(2, GameModeKind::BombDefusal, quick_config());
        let hit = Instant::now();
        orch.on_damage(&host, 1, 2, 40, hit);
        host.kill(2);

        let message = orch
            .on_death(&mut host, 2, None, hit + Duration::from_millis(4900))
            .unwrap();
        assert_eq!(message, "[Red] p1 finished off [Blue] p2");
        assert_eq!(orch.roster().get(1).map(|m| m.kills), Some(1));
        assert_eq!(orch.roster().get(2).map(|m| m.deaths), Some(1));
        assert!(orch.combat().record(2).is_none());
        assert!(host.whispers.iter().any(|(id, text)| *id == 1 && text.contains("Kill reward")));
    }

    #[test]
    fn test_late_death_is_accidental() {
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        let hit = Instant::now();
        orch.on_damage(&host, 1, 2, 40, hit);
        host.kill(2);

        let message = orch
            .on_death(&mut host, 2, None, hit + Duration::from_millis(5100))
            .unwrap();
        assert_eq!(message, "[Blue] p2 died");
        assert_eq!(orch.roster().get(1).map(|m| m.kills), Some(0));
    }

    #[test]
    fn test_death_outside_a_match_is_ignored() {
        let mut host = FakeHost::with_players(2);
        let mut orch = MatchOrchestrator::new(Config::default());
        orch.toggle_membership(&mut host, 1, GameModeKind::BombDefusal).unwrap();
        assert_eq!(orch.on_death(&mut host, 1, Some(2), Instant::now()), None);
    }

    #[test]
    fn test_deathmatch_to_completion() {
        let mut config = quick_config();
        config.deathmatch.kills_to_win = 2;
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, config);
        let now = Instant::now();

        for _ in 0..2 {
            host.kill(1);
            orch.on_death(&mut host, 1, Some(2), now);
            assert_eq!(orch.on_spawn_request(&mut host, 1), SpawnDecision::Allow);
        }
        orch.tick(&mut host);

        assert_eq!(orch.state(), MatchState::Waiting);
        assert_eq!(orch.kind(), None);
        assert!(orch.roster().is_empty());
        assert!(host.announced("Blue team wins! Kills: 2"));
        assert!(host.announced("Blue team kills: 2"));
        assert!(host.players.values().all(|p| p.engine_team == 0));
    }

    #[test]
    fn test_spawn_redirect_runs_next_tick() {
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        host.move_to(2, Vec2::new(1.0, 1.0));
        assert_eq!(orch.on_spawn_request(&mut host, 2), SpawnDecision::Allow);
        assert_eq!(host.players[&2].position, Vec2::new(1.0, 1.0));
        orch.tick(&mut host);
        assert_eq!(host.players[&2].position, orch.config().current_map().blue_spawn);
    }

    #[test]
    fn test_bomb_mode_blocks_mid_round_respawn() {
        let mut config = quick_config();
        config.bomb.round_wait_time = 5;
        let (mut orch, mut host) = started(4, GameModeKind::BombDefusal, config);
        assert_eq!(orch.on_spawn_request(&mut host, 1), SpawnDecision::Deny);

        host.kill(2);
        host.kill(4);
        orch.tick(&mut host);
        assert!(orch.is_round_waiting());
        assert_eq!(orch.on_spawn_request(&mut host, 2), SpawnDecision::Allow);
        assert!(orch.start_planting(&mut host, 1).is_err());
    }

    #[test]
    fn test_stale_deferred_tasks_are_dropped() {
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        let live = orch.generation();
        let stale = Generation {
            match_serial: live.match_serial - 1,
            ..live
        };
        orch.scheduler.schedule(orch.tick_count, 0, stale, Deferred::RedirectToSpawn(1));
        orch.scheduler.schedule(orch.tick_count, 0, live, Deferred::RedirectToSpawn(2));
        host.move_to(1, Vec2::new(5.0, 5.0));
        host.move_to(2, Vec2::new(5.0, 5.0));

        orch.tick(&mut host);
        assert_eq!(host.players[&1].position, Vec2::new(5.0, 5.0));
        assert_eq!(host.players[&2].position, orch.config().current_map().blue_spawn);
        assert!(orch.scheduler.is_empty());
    }

    #[test]
    fn test_force_end_discards_pending_work() {
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        assert_eq!(orch.on_spawn_request(&mut host, 2), SpawnDecision::Allow);
        orch.force_end(&mut host, "Stopped by an admin");
        assert!(host.announced("Stopped by an admin"));

        let before = host.actions.len();
        orch.tick(&mut host);
        assert_eq!(orch.state(), MatchState::Waiting);
        assert!(!host.actions[before..].iter().any(|a| matches!(a, Action::Teleport(..))));
    }

    #[test]
    fn test_round_change_invalidates_elimination_check() {
        let mut config = quick_config();
        config.bomb.round_wait_time = 3;
        let (mut orch, mut host) = started(2, GameModeKind::BombDefusal, config);
        let round_one = orch.generation();

        host.kill(2);
        orch.tick(&mut host);
        assert_eq!(orch.status().red_rounds, 1);
        assert!(orch.is_round_waiting());

        // A check queued during round 1 must not score round 2.
        orch.scheduler.schedule(orch.tick_count, 0, round_one, Deferred::EliminationCheck);
        orch.tick(&mut host);
        orch.tick(&mut host);
        orch.tick(&mut host);
        assert!(!orch.is_round_waiting());
        host.kill(2);
        orch.scheduler.schedule(orch.tick_count, 0, round_one, Deferred::EliminationCheck);
        orch.run_deferred(&mut host);
        assert_eq!(orch.status().red_rounds, 1);
    }

    #[test]
    fn test_wrong_mode_and_non_member_bomb_commands() {
        let (mut orch, mut host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        assert_eq!(orch.start_planting(&mut host, 1), Err(MatchError::WrongMode));
        assert_eq!(orch.start_defusing(&mut host, 7), Err(MatchError::NotMember));
    }

    #[test]
    fn test_death_cancels_bomb_action() {
        let mut config = quick_config();
        config.bomb.plant_time = 3;
        let (mut orch, mut host) = started(4, GameModeKind::BombDefusal, config);

        host.move_to(1, SITE);
        orch.start_planting(&mut host, 1).unwrap();
        orch.tick(&mut host);
        assert_eq!(orch.action_status(1).as_deref(), Some("planting: 1/3s"));

        host.kill(1);
        orch.on_death(&mut host, 1, Some(2), Instant::now());
        assert_eq!(orch.action_status(1), None);
        assert!(host.announced("p1's planting was interrupted"));

        orch.tick(&mut host);
        orch.tick(&mut host);
        assert_eq!(orch.status().bomb.map(|b| b.planted), Some(false));
    }

    #[test]
    fn test_bomb_defusal_end_to_end() {
        let (mut orch, mut host) = started(4, GameModeKind::BombDefusal, quick_config());
        assert_eq!(orch.roster().team_members(Team::Red), vec![1, 3]);
        assert_eq!(orch.roster().team_members(Team::Blue), vec![2, 4]);

        // Round 1: red plants and the bomb explodes.
        host.move_to(1, SITE);
        orch.start_planting(&mut host, 1).unwrap();
        orch.tick(&mut host);
        assert_eq!(orch.status().bomb.map(|b| b.planted), Some(true));
        assert_eq!(orch.start_planting(&mut host, 3), Err(MatchError::AlreadyPlanted));
        for _ in 0..3 {
            orch.tick(&mut host);
        }
        let status = orch.status();
        assert_eq!((status.red_rounds, status.blue_rounds), (1, 0));
        assert_eq!(status.round, 2);

        // Round 2: blue defuses; halftime swap follows.
        host.move_to(1, SITE);
        orch.start_planting(&mut host, 1).unwrap();
        orch.tick(&mut host);
        host.move_to(2, SITE);
        orch.start_defusing(&mut host, 2).unwrap();
        orch.tick(&mut host);
        let status = orch.status();
        assert_eq!((status.red_rounds, status.blue_rounds), (1, 1));
        assert!(status.swapped);
        assert_eq!(orch.roster().team_members(Team::Red), vec![2, 4]);
        assert_eq!(orch.roster().get(2).map(|m| m.original_team), Some(Team::Blue));

        // Round 3: the side now labeled red (originally blue) wipes out blue.
        let now = Instant::now();
        for victim in [1, 3] {
            host.kill(victim);
            orch.on_death(&mut host, victim, Some(2), now);
        }
        orch.tick(&mut host);

        let status = orch.status();
        assert_eq!((status.red_rounds, status.blue_rounds), (1, 2));
        assert_eq!(status.round, 4);
        assert_eq!(status.state, MatchState::InProgress);
        assert!(!status.overtime);
        assert_eq!(orch.roster().get(2).map(|m| m.kills), Some(2));
        assert!(host.players.values().all(|p| p.health > 0));
    }

    #[test]
    fn test_bomb_match_ends_with_reset() {
        let mut config = quick_config();
        config.bomb.rounds_to_win = 1;
        let (mut orch, mut host) = started(2, GameModeKind::BombDefusal, config);
        host.kill(2);
        orch.tick(&mut host);

        assert_eq!(orch.state(), MatchState::Waiting);
        assert!(host.announced("Red team wins the match"));
        assert!(host.announced("Final score"));
        assert!(host.actions.contains(&Action::EngineTeam(1, 0)));
        assert_eq!(orch.status().mode, None);
    }

    #[test]
    fn test_reload_config_clears_combat() {
        let (mut orch, host) = started(2, GameModeKind::TeamDeathmatch, quick_config());
        orch.on_damage(&host, 1, 2, 10, Instant::now());
        assert!(!orch.combat().is_empty());

        let mut config = quick_config();
        config.general.kill_window_secs = 2.0;
        orch.reload_config(config);
        assert!(orch.combat().is_empty());
        assert_eq!(orch.combat().window(), Duration::from_secs(2));
    }
}
