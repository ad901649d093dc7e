//! Bomb defusal.
//!
//! Red attacks and wins a round by detonating the bomb or wiping out blue.
//! Blue defends and wins by defusing or wiping out red. Rounds are scored
//! against original teams; sides swap at halftime and periodically in
//! overtime.

use super::{announce_teams, deploy, GameMode, GameModeKind, MatchContext, MatchOver};
use crate::bomb::{BombOutcome, BombSubsystem};
use crate::error::MatchError;
use crate::host::{Color, PlayerId};
use crate::scoring::Scoreboard;
use crate::team::Team;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct BombDefusal {
    bomb: BombSubsystem,
    scoreboard: Scoreboard,
    /// Seconds until the next round starts; `None` while a round is live.
    round_wait: Option<u32>,
    /// Last stealth state applied per player.
    stealth: HashMap<PlayerId, bool>,
}

impl BombDefusal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round_wait(&self) -> Option<u32> {
        self.round_wait
    }

    /// Score the round for whoever currently plays `side`.
    fn end_round(&mut self, ctx: &mut MatchContext<'_>, side: Team, message: &str) -> Option<MatchOver> {
        ctx.host.announce(&format!("=== {} ===", message), side.color());

        let original = ctx.roster.original_team_of_side(side);
        let report = self
            .scoreboard
            .record_round(original, ctx.config.bomb.rounds_to_win);
        info!(
            "{} ended: side {} (original {}) scores, {}",
            self.scoreboard.round_label(),
            side,
            original,
            self.scoreboard.score_line()
        );

        if report.swaps_sides() {
            ctx.roster.swap_sides();
        }
        if report.halftime {
            ctx.host.announce(
                &format!("=== Halftime! Score {} ===", self.score_text()),
                Color::ORANGE,
            );
            ctx.host.announce("Teams swap sides!", Color::ORANGE);
        }
        if report.overtime_started {
            ctx.host.announce("=== Overtime! ===", Color::GOLD);
            ctx.host.announce(&format!("Score: {}", self.score_text()), Color::GOLD);
            ctx.host.announce("Overtime rules: win two rounds in a row to take the match", Color::GOLD);
            ctx.host.announce("Sides swap every two overtime rounds", Color::GOLD);
            ctx.host.announce("Overtime begins, teams swap sides!", Color::ORANGE);
        }
        if report.overtime_swap {
            ctx.host.announce("Overtime side swap!", Color::ORANGE);
        }

        if let Some((team, reason)) = report.winner {
            let suffix = if self.scoreboard.overtime { " (OT)" } else { "" };
            return Some(MatchOver {
                winner: Some(team),
                message: format!(
                    "{} team wins the match by {}! Final score {}{}",
                    team,
                    reason,
                    self.scoreboard.score_line(),
                    suffix
                ),
            });
        }

        self.continue_to_next_round(ctx);
        None
    }

    fn continue_to_next_round(&mut self, ctx: &mut MatchContext<'_>) {
        revive_members(ctx);
        self.scoreboard.advance_round();
        self.bomb.reset();
        self.stealth.clear();

        ctx.host.announce(
            &format!("=== {} getting ready ===", self.scoreboard.round_label()),
            Color::YELLOW,
        );
        ctx.host.announce(&format!("Score: {}", self.score_text()), Color::CYAN);
        if self.scoreboard.overtime {
            ctx.host.announce(
                &format!(
                    "Overtime: two straight round wins needed | recent winners: {}",
                    self.scoreboard.recent_history()
                ),
                Color::GOLD,
            );
        }

        let wait = ctx.config.bomb.round_wait_time;
        if wait > 0 {
            self.round_wait = Some(wait);
            ctx.host.announce(
                &format!("All players revived, next round starts in {} seconds", wait),
                Color::GREEN,
            );
        } else {
            self.start_next_round(ctx);
        }
    }

    fn start_next_round(&mut self, ctx: &mut MatchContext<'_>) {
        ctx.host.announce(
            &format!("=== {} begins! ===", self.scoreboard.round_label()),
            Color::GREEN,
        );
        announce_teams(ctx, self.scoreboard.swapped);
        deploy(ctx);
        self.round_wait = None;
    }

    /// The side left standing when the other is wiped out.
    ///
    /// A planted bomb keeps the round alive after red is wiped: blue still has to defuse.
    fn elimination_winner(&self, ctx: &MatchContext<'_>) -> Option<Team> {
        let alive = |team: Team| {
            ctx.roster
                .team_members(team)
                .into_iter()
                .filter(|&id| ctx.host.is_active(id) && ctx.host.health(id) > 0)
                .count()
        };
        let red = alive(Team::Red);
        let blue = alive(Team::Blue);

        if red == 0 && blue > 0 {
            if self.bomb.is_planted() {
                debug!("Red eliminated but the bomb is planted");
                return None;
            }
            Some(Team::Blue)
        } else if blue == 0 && red > 0 {
            Some(Team::Red)
        } else {
            None
        }
    }

    fn eliminate(&mut self, ctx: &mut MatchContext<'_>) -> Option<MatchOver> {
        match self.elimination_winner(ctx)? {
            Team::Blue => self.end_round(ctx, Team::Blue, "Blue wiped out red and wins the round!"),
            _ => self.end_round(ctx, Team::Red, "Red wiped out blue and wins the round!"),
        }
    }

    /// Hide players with no enemy nearby. Only calls the host when a player's state flips.
    fn update_stealth(&mut self, ctx: &mut MatchContext<'_>) {
        let general = &ctx.config.general;
        let players: Vec<(PlayerId, Team, glam::Vec2)> = ctx
            .roster
            .iter()
            .filter(|m| m.team.is_assigned() && ctx.host.is_active(m.id))
            .filter_map(|m| ctx.host.position(m.id).map(|pos| (m.id, m.team, pos)))
            .collect();

        for &(id, team, pos) in &players {
            let enemy_near = players
                .iter()
                .any(|&(other, other_team, other_pos)| {
                    other != id && other_team != team && pos.distance(other_pos) <= general.invisibility_range
                });
            let hidden = self.stealth.get(&id).copied().unwrap_or(false);

            if !enemy_near && !hidden {
                ctx.host.set_buff(id, general.invisibility_buff, general.invisibility_duration);
                self.stealth.insert(id, true);
            } else if enemy_near && hidden {
                ctx.host.set_buff(id, general.invisibility_buff, 0);
                self.stealth.insert(id, false);
            }
        }
    }

    fn score_text(&self) -> String {
        format!(
            "Red {} - Blue {}",
            self.scoreboard.red_rounds, self.scoreboard.blue_rounds
        )
    }
}

/// Revive the dead and top everyone up.
fn revive_members(ctx: &mut MatchContext<'_>) {
    for id in ctx.roster.ids() {
        if !ctx.host.is_active(id) {
            continue;
        }
        if ctx.host.health(id) <= 0 {
            ctx.host.revive(id);
        }
        let max = ctx.host.max_health(id);
        ctx.host.heal(id, max);
    }
    debug!("Revived all match members");
}

impl GameMode for BombDefusal {
    fn name(&self) -> &str {
        "Bomb Defusal"
    }

    fn kind(&self) -> GameModeKind {
        GameModeKind::BombDefusal
    }

    fn on_match_start(&mut self, ctx: &mut MatchContext<'_>) {
        self.scoreboard = Scoreboard::new();
        self.bomb.reset();
        self.stealth.clear();
        self.round_wait = None;

        ctx.host.announce(
            "Red (attackers): plant the bomb at a site or eliminate the defenders",
            Color::YELLOW,
        );
        ctx.host.announce(
            "Blue (defenders): stop the plant, defuse the bomb or eliminate the attackers",
            Color::YELLOW,
        );
        ctx.host.announce(
            &format!(
                "Bomb Defusal rules: first team to win {} rounds wins",
                ctx.config.bomb.rounds_to_win
            ),
            Color::CYAN,
        );
        deploy(ctx);
    }

    fn on_tick(&mut self, ctx: &mut MatchContext<'_>) -> Option<MatchOver> {
        if let Some(wait) = self.round_wait {
            let left = wait.saturating_sub(1);
            if left > 0 {
                self.round_wait = Some(left);
                ctx.host.announce(&format!("Next round starts in {} seconds", left), Color::YELLOW);
            } else {
                self.start_next_round(ctx);
            }
            return None;
        }

        let tick = self.bomb.tick(ctx.host, &ctx.config.bomb);
        if let Some(seconds) = tick.warning {
            ctx.host.announce(&format!("The bomb explodes in {} seconds!", seconds), Color::RED);
        }
        match tick.outcome {
            Some(BombOutcome::Planted { planter, site, timer }) => {
                ctx.host.announce(
                    &format!(
                        "{} planted the bomb at site {}! Blue has {} seconds to defuse it",
                        ctx.roster.name_of(planter),
                        site,
                        timer
                    ),
                    Color::RED,
                );
            }
            Some(BombOutcome::Defused { defuser }) => {
                let message = format!("{} defused the bomb! Blue wins the round", ctx.roster.name_of(defuser));
                return self.end_round(ctx, Team::Blue, &message);
            }
            Some(BombOutcome::Exploded) => {
                return self.end_round(ctx, Team::Red, "The bomb exploded! Red wins the round");
            }
            None => {}
        }

        if let Some(over) = self.eliminate(ctx) {
            return Some(over);
        }
        if self.round_wait.is_none() {
            self.update_stealth(ctx);
        }
        None
    }

    fn on_player_death(&mut self, ctx: &mut MatchContext<'_>, victim: PlayerId) {
        if self.bomb.is_busy(victim) {
            self.bomb.cancel_action(ctx.host, victim);
        }
    }

    fn on_kill(&mut self, ctx: &mut MatchContext<'_>, killer: PlayerId) {
        let amount = ctx.host.max_health(killer) / 2;
        if amount > 0 {
            ctx.host.heal(killer, amount);
            ctx.host.whisper(killer, &format!("Kill reward: healed {} HP", amount));
        }
    }

    fn check_elimination(&mut self, ctx: &mut MatchContext<'_>) -> Option<MatchOver> {
        if self.round_wait.is_some() {
            return None;
        }
        self.eliminate(ctx)
    }

    fn allows_respawn(&self) -> bool {
        self.round_wait.is_some()
    }

    fn is_round_waiting(&self) -> bool {
        self.round_wait.is_some()
    }

    fn round_index(&self) -> u32 {
        self.scoreboard.current_round
    }

    fn start_planting(&mut self, ctx: &mut MatchContext<'_>, player: PlayerId) -> Result<(), MatchError> {
        if self.round_wait.is_some() {
            return Err(MatchError::Rejected("the next round has not started"));
        }
        let sites = ctx.config.current_map().bomb_sites;
        self.bomb.start_planting(ctx.host, player, &sites)
    }

    fn start_defusing(&mut self, ctx: &mut MatchContext<'_>, player: PlayerId) -> Result<(), MatchError> {
        if self.round_wait.is_some() {
            return Err(MatchError::Rejected("the next round has not started"));
        }
        self.bomb.start_defusing(ctx.host, player)
    }

    fn scoreboard(&self) -> Option<&Scoreboard> {
        Some(&self.scoreboard)
    }

    fn bomb(&self) -> Option<&BombSubsystem> {
        Some(&self.bomb)
    }

    fn on_match_end(&mut self, ctx: &mut MatchContext<'_>) {
        let buff = ctx.config.general.invisibility_buff;
        for (&id, &hidden) in &self.stealth {
            if hidden && ctx.host.is_active(id) {
                ctx.host.set_buff(id, buff, 0);
            }
        }
        self.stealth.clear();
        self.bomb.reset();
        self.round_wait = None;
        ctx.host.announce(&format!("Final score: {}", self.score_text()), Color::CYAN);
    }
}
