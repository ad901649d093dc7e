//! Round scoring for bomb defusal: halftime, overtime and win conditions.
//!
//! Scores are kept per original team. Callers translate the winning side
//! into its original team before recording a round, so swaps never move
//! points between teams.

use crate::team::Team;
use std::fmt;
use tracing::info;

/// Overtime rounds allowed past regulation before the leader is declared.
const OVERTIME_ROUND_CAP: u32 = 20;
/// Score gap that ends overtime immediately.
const OVERTIME_MARGIN: u32 = 4;

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinReason {
    /// Reached the rounds-to-win target.
    Regulation,
    /// Regulation ran out with a one-round lead.
    RegulationBuzzer,
    /// Two overtime rounds in a row.
    OvertimeStreak,
    /// Pulled too far ahead in overtime.
    OvertimeMargin,
    /// Overtime hit the round cap.
    OvertimeCap,
}

impl fmt::Display for WinReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WinReason::Regulation => "regulation",
            WinReason::RegulationBuzzer => "end of regulation",
            WinReason::OvertimeStreak => "overtime streak",
            WinReason::OvertimeMargin => "overtime margin",
            WinReason::OvertimeCap => "overtime round limit",
        })
    }
}

/// What happened as a consequence of recording a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Regulation halftime reached; sides swap.
    pub halftime: bool,
    /// Periodic overtime swap.
    pub overtime_swap: bool,
    /// Regulation ended tied; overtime begins with a swap.
    pub overtime_started: bool,
    pub winner: Option<(Team, WinReason)>,
}

impl RoundReport {
    /// Whether the roster must relabel red and blue.
    pub fn swaps_sides(&self) -> bool {
        self.halftime || self.overtime_swap || self.overtime_started
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scoreboard {
    pub red_rounds: u32,
    pub blue_rounds: u32,
    /// 1-based round number.
    pub current_round: u32,
    pub overtime: bool,
    pub overtime_rounds: u32,
    /// Whether the regulation halftime swap happened.
    pub swapped: bool,
    /// Original-team winners of overtime rounds since the last overtime swap.
    pub history: Vec<Team>,
}

impl Default for Scoreboard {
    fn default() -> Self {
        Self {
            red_rounds: 0,
            blue_rounds: 0,
            current_round: 1,
            overtime: false,
            overtime_rounds: 0,
            swapped: false,
            history: Vec::new(),
        }
    }
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u32 {
        self.red_rounds + self.blue_rounds
    }

    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red_rounds,
            Team::Blue => self.blue_rounds,
            Team::Unassigned => 0,
        }
    }

    /// `"red:blue"`.
    pub fn score_line(&self) -> String {
        format!("{}:{}", self.red_rounds, self.blue_rounds)
    }

    /// Team with the higher score, `None` on a tie.
    pub fn leader(&self) -> Option<Team> {
        match self.red_rounds.cmp(&self.blue_rounds) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Blue),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Score a round for `winner` (an original team) and evaluate what follows.
    pub fn record_round(&mut self, winner: Team, rounds_to_win: u32) -> RoundReport {
        let mut report = RoundReport::default();

        if self.overtime {
            self.history.push(winner);
        }
        match winner {
            Team::Red => self.red_rounds += 1,
            Team::Blue => self.blue_rounds += 1,
            Team::Unassigned => {}
        }

        let half = rounds_to_win.saturating_sub(1);
        let max_regulation = half * 2;

        if half > 0 && !self.overtime && self.total() == half && !self.swapped {
            info!("Halftime at {}", self.score_line());
            self.swapped = true;
            report.halftime = true;
        }
        // Overtime swaps land on every second overtime round. The streak check
        // has to see that round's result before the swap wipes the history.
        let overtime_swap_due =
            half > 0 && self.overtime && self.overtime_rounds > 0 && self.overtime_rounds % 2 == 0;

        if !self.overtime {
            if self.score(winner) >= rounds_to_win {
                report.winner = Some((winner, WinReason::Regulation));
                return report;
            }
            if let Some(leader) = self.leader().filter(|&team| self.score(team) >= rounds_to_win) {
                report.winner = Some((leader, WinReason::Regulation));
                return report;
            }
        }

        if half > 0 && !self.overtime && self.total() >= max_regulation {
            if self.red_rounds == self.blue_rounds {
                info!("Regulation tied at {}, entering overtime", self.score_line());
                self.overtime = true;
                self.overtime_rounds = 0;
                self.history.clear();
                report.overtime_started = true;
            } else if self.red_rounds.abs_diff(self.blue_rounds) == 1 {
                report.winner = self.leader().map(|team| (team, WinReason::RegulationBuzzer));
                return report;
            }
        }

        if self.overtime {
            if let Some(team) = consecutive_winner(&self.history) {
                report.winner = Some((team, WinReason::OvertimeStreak));
                return report;
            }
            if self.red_rounds.abs_diff(self.blue_rounds) >= OVERTIME_MARGIN {
                report.winner = self.leader().map(|team| (team, WinReason::OvertimeMargin));
                return report;
            }
            if self.total() >= max_regulation + OVERTIME_ROUND_CAP {
                // A tie at the cap goes to whoever took the last round.
                let team = self.leader().unwrap_or(winner);
                report.winner = Some((team, WinReason::OvertimeCap));
                return report;
            }
        }

        if overtime_swap_due {
            info!("Overtime side swap at {}", self.score_line());
            self.history.clear();
            report.overtime_swap = true;
        }

        report
    }

    /// Move on to the next round number.
    pub fn advance_round(&mut self) {
        self.current_round += 1;
        if self.overtime {
            self.overtime_rounds += 1;
        }
    }

    /// `"Round 5"` or `"Round 5 (OT 1)"`.
    pub fn round_label(&self) -> String {
        if self.overtime {
            format!("Round {} (OT {})", self.current_round, self.overtime_rounds)
        } else {
            format!("Round {}", self.current_round)
        }
    }

    /// The last four overtime winners, oldest first.
    pub fn recent_history(&self) -> String {
        if self.history.is_empty() {
            return "[none]".to_string();
        }
        let start = self.history.len().saturating_sub(4);
        let names: Vec<String> = self.history[start..].iter().map(Team::to_string).collect();
        format!("[{}]", names.join(", "))
    }
}

/// The team that won the last two entries, if they match.
pub fn consecutive_winner(history: &[Team]) -> Option<Team> {
    match history {
        [.., a, b] if a == b && a.is_assigned() => Some(*a),
        _ => None,
    }
}
