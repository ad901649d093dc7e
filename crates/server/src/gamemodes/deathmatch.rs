//! Team deathmatch.
//!
//! First team whose members reach the kill target wins. Respawns are free.

use super::{deploy, GameMode, GameModeKind, MatchContext, MatchOver};
use crate::host::Color;
use crate::team::Team;
use tracing::info;

#[derive(Debug, Default)]
pub struct TeamDeathmatch;

impl TeamDeathmatch {
    pub fn new() -> Self {
        Self
    }
}

impl GameMode for TeamDeathmatch {
    fn name(&self) -> &str {
        "Team Deathmatch"
    }

    fn kind(&self) -> GameModeKind {
        GameModeKind::TeamDeathmatch
    }

    fn on_match_start(&mut self, ctx: &mut MatchContext<'_>) {
        ctx.host.announce(
            &format!(
                "Team Deathmatch rules: first team to {} kills wins",
                ctx.config.deathmatch.kills_to_win
            ),
            Color::CYAN,
        );
        deploy(ctx);
    }

    fn on_tick(&mut self, ctx: &mut MatchContext<'_>) -> Option<MatchOver> {
        let target = ctx.config.deathmatch.kills_to_win;
        for team in [Team::Red, Team::Blue] {
            let kills = ctx.roster.team_kills(team);
            if kills >= target {
                info!("{} reached {} kills", team, kills);
                return Some(MatchOver {
                    winner: Some(team),
                    message: format!("{} team wins! Kills: {}", team, kills),
                });
            }
        }
        None
    }

    fn on_match_end(&mut self, ctx: &mut MatchContext<'_>) {
        let red = ctx.roster.team_kills(Team::Red);
        let blue = ctx.roster.team_kills(Team::Blue);
        ctx.host.announce("=== Final stats ===", Color::CYAN);
        ctx.host.announce(&format!("Red team kills: {}", red), Color::RED);
        ctx.host.announce(&format!("Blue team kills: {}", blue), Color::BLUE);
    }
}
