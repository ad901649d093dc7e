use crate::bomb::BombSubsystem;
use crate::config::Config;
use crate::error::MatchError;
use crate::host::{Color, Host, PlayerId};
use crate::roster::Roster;
use crate::scoring::Scoreboard;
use crate::team::Team;
use std::fmt;

pub mod bomb_defusal;
pub mod deathmatch;

/// Which mode the lobby is queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameModeKind {
    TeamDeathmatch,
    BombDefusal,
}

impl fmt::Display for GameModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameModeKind::TeamDeathmatch => "Team Deathmatch",
            GameModeKind::BombDefusal => "Bomb Defusal",
        })
    }
}

/// Everything a mode may touch during a callback.
pub struct MatchContext<'a> {
    pub config: &'a Config,
    pub roster: &'a mut Roster,
    pub host: &'a mut dyn Host,
}

/// A mode's verdict that the match is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOver {
    /// `None` for a forced end.
    pub winner: Option<Team>,
    pub message: String,
}

pub trait GameMode: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> GameModeKind;

    /// Announce the rules and put everyone in position.
    fn on_match_start(&mut self, ctx: &mut MatchContext<'_>);

    /// One game tick (one second) of round logic.
    fn on_tick(&mut self, ctx: &mut MatchContext<'_>) -> Option<MatchOver>;

    /// A member died. Default: no-op.
    fn on_player_death(&mut self, _ctx: &mut MatchContext<'_>, _victim: PlayerId) {}

    /// Reward for a cross-team kill. Default: none.
    fn on_kill(&mut self, _ctx: &mut MatchContext<'_>, _killer: PlayerId) {}

    /// Deferred re-check after a death. Default: nothing to check.
    fn check_elimination(&mut self, _ctx: &mut MatchContext<'_>) -> Option<MatchOver> {
        None
    }

    /// Whether a dead member may respawn right now.
    fn allows_respawn(&self) -> bool {
        true
    }

    fn is_round_waiting(&self) -> bool {
        false
    }

    /// Generation counter for deferred tasks: changes whenever a round ends.
    fn round_index(&self) -> u32 {
        0
    }

    fn start_planting(&mut self, _ctx: &mut MatchContext<'_>, _player: PlayerId) -> Result<(), MatchError> {
        Err(MatchError::WrongMode)
    }

    fn start_defusing(&mut self, _ctx: &mut MatchContext<'_>, _player: PlayerId) -> Result<(), MatchError> {
        Err(MatchError::WrongMode)
    }

    fn scoreboard(&self) -> Option<&Scoreboard> {
        None
    }

    fn bomb(&self) -> Option<&BombSubsystem> {
        None
    }

    /// Final statistics and cleanup before the orchestrator resets.
    fn on_match_end(&mut self, _ctx: &mut MatchContext<'_>) {}
}

pub fn get_gamemode(kind: GameModeKind) -> Box<dyn GameMode> {
    match kind {
        GameModeKind::TeamDeathmatch => Box::new(deathmatch::TeamDeathmatch::new()),
        GameModeKind::BombDefusal => Box::new(bomb_defusal::BombDefusal::new()),
    }
}

/// Send every active member with a team to their spawn with a fresh loadout.
pub fn deploy(ctx: &mut MatchContext<'_>) {
    let map = ctx.config.current_map();
    let members: Vec<(PlayerId, Team)> = ctx
        .roster
        .iter()
        .filter(|m| m.team.is_assigned())
        .map(|m| (m.id, m.team))
        .collect();

    for (id, team) in members {
        if !ctx.host.is_active(id) {
            continue;
        }
        let spawn = match team {
            Team::Red => map.red_spawn,
            _ => map.blue_spawn,
        };
        ctx.host.set_engine_team(id, team.engine_tag());
        ctx.host.teleport(id, spawn);
        for item in &ctx.config.general.initial_items {
            ctx.host.give_item(id, item);
        }
        let max = ctx.host.max_health(id);
        ctx.host.heal(id, max);
        ctx.host.whisper(id, &format!("Deployed to the {} spawn with a fresh loadout", team));
    }
}

/// Announce both rosters. After a swap each side is tagged with who originally played it.
pub fn announce_teams(ctx: &mut MatchContext<'_>, swapped: bool) {
    if swapped {
        ctx.host.announce("Teams have swapped sides!", Color::ORANGE);
    }
    for side in [Team::Red, Team::Blue] {
        let names: Vec<String> = ctx
            .roster
            .team_members(side)
            .into_iter()
            .map(|id| ctx.roster.name_of(id))
            .collect();
        let mut line = format!("{} ({}): {}", side, names.len(), names.join(", "));
        if swapped {
            line.push_str(&format!(" [originally {}]", ctx.roster.original_team_of_side(side)));
        }
        ctx.host.announce(&line, side.color());
    }
}
