//! Match membership and team bookkeeping.

use crate::host::PlayerId;
use crate::team::Team;

/// A lobby or match member.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: PlayerId,
    /// Display name captured on join.
    pub name: String,
    /// Current side. Flips on every swap.
    pub team: Team,
    /// Side at the start of round 1. Never touched by swaps; rounds are scored against it.
    pub original_team: Team,
    pub kills: u32,
    pub deaths: u32,
}

/// Ordered membership. Order is join order, which keeps balancing stable.
#[derive(Debug, Default)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Add a member. Returns false if already present.
    pub fn add(&mut self, id: PlayerId, name: String) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push(Member {
            id,
            name,
            team: Team::Unassigned,
            original_team: Team::Unassigned,
            kills: 0,
            deaths: 0,
        });
        true
    }

    /// Remove a member. Returns false if not present.
    pub fn remove(&mut self, id: PlayerId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        self.members.len() != before
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Set a member's current side. Returns false for non-members.
    pub fn set_team(&mut self, id: PlayerId, team: Team) -> bool {
        match self.get_mut(id) {
            Some(member) => {
                member.team = team;
                true
            }
            None => false,
        }
    }

    pub fn team_of(&self, id: PlayerId) -> Team {
        self.get(id).map_or(Team::Unassigned, |m| m.team)
    }

    pub fn name_of(&self, id: PlayerId) -> String {
        self.get(id)
            .map_or_else(|| format!("#{id}"), |m| m.name.clone())
    }

    /// Members currently on `team`, in roster order.
    pub fn team_members(&self, team: Team) -> Vec<PlayerId> {
        self.members
            .iter()
            .filter(|m| m.team == team)
            .map(|m| m.id)
            .collect()
    }

    /// Number of members that picked a side.
    pub fn ready_count(&self) -> usize {
        self.members.iter().filter(|m| m.team.is_assigned()).count()
    }

    /// Sum of kills for members currently on `team`.
    pub fn team_kills(&self, team: Team) -> u32 {
        self.members
            .iter()
            .filter(|m| m.team == team)
            .map(|m| m.kills)
            .sum()
    }

    /// Even out the sides and give everyone a team.
    ///
    /// With `cap = ceil(n / 2)`, an oversized side sheds its last members to the
    /// other side, then unassigned members fill red up to `cap` before blue.
    /// Returns the final red and blue member lists.
    pub fn balance(&mut self) -> (Vec<PlayerId>, Vec<PlayerId>) {
        let cap = self.members.len().div_ceil(2);
        let mut red: Vec<usize> = self.indices_on(Team::Red);
        let mut blue: Vec<usize> = self.indices_on(Team::Blue);

        while red.len() > cap {
            if let Some(idx) = red.pop() {
                self.members[idx].team = Team::Blue;
                blue.push(idx);
            }
        }
        while blue.len() > cap {
            if let Some(idx) = blue.pop() {
                self.members[idx].team = Team::Red;
                red.push(idx);
            }
        }

        for idx in self.indices_on(Team::Unassigned) {
            if red.len() < cap {
                self.members[idx].team = Team::Red;
                red.push(idx);
            } else {
                self.members[idx].team = Team::Blue;
                blue.push(idx);
            }
        }

        let ids = |list: Vec<usize>| -> Vec<PlayerId> {
            list.into_iter().map(|i| self.members[i].id).collect()
        };
        (ids(red), ids(blue))
    }

    fn indices_on(&self, team: Team) -> Vec<usize> {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.team == team)
            .map(|(i, _)| i)
            .collect()
    }

    /// Freeze every member's current side as their original side.
    pub fn snapshot_original_teams(&mut self) {
        for member in &mut self.members {
            member.original_team = member.team;
        }
    }

    pub fn reset_stats(&mut self) {
        for member in &mut self.members {
            member.kills = 0;
            member.deaths = 0;
        }
    }

    /// Relabel red as blue and blue as red. Original sides are untouched.
    pub fn swap_sides(&mut self) {
        for member in &mut self.members {
            member.team = member.team.opposite();
        }
    }

    /// The original side of whoever currently plays `side`.
    ///
    /// Falls back to `side` itself when nobody is on it any more.
    pub fn original_team_of_side(&self, side: Team) -> Team {
        self.members
            .iter()
            .find(|m| m.team == side && m.original_team.is_assigned())
            .map_or(side, |m| m.original_team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with(teams: &[Team]) -> Roster {
        let mut roster = Roster::new();
        for (i, &team) in teams.iter().enumerate() {
            let id = i as PlayerId + 1;
            roster.add(id, format!("p{id}"));
            roster.set_team(id, team);
        }
        roster
    }

    fn counts(roster: &Roster) -> (usize, usize, usize) {
        (
            roster.team_members(Team::Red).len(),
            roster.team_members(Team::Blue).len(),
            roster.team_members(Team::Unassigned).len(),
        )
    }

    #[test]
    fn test_balance_invariant_for_all_small_labelings() {
        let labels = [Team::Unassigned, Team::Red, Team::Blue];
        for n in 0..=6usize {
            let combos = 3usize.pow(n as u32);
            for mut code in 0..combos {
                let mut teams = Vec::with_capacity(n);
                for _ in 0..n {
                    teams.push(labels[code % 3]);
                    code /= 3;
                }
                let mut roster = roster_with(&teams);
                roster.balance();
                let (red, blue, unassigned) = counts(&roster);
                assert_eq!(unassigned, 0, "labeling {teams:?}");
                assert!(red.abs_diff(blue) <= 1, "labeling {teams:?} -> {red}/{blue}");
            }
        }
    }

    #[test]
    fn test_balance_moves_most_recent_member_off_stacked_team() {
        let mut roster = roster_with(&[Team::Red, Team::Red, Team::Red, Team::Red]);
        let (red, blue) = roster.balance();
        assert_eq!(red, vec![1, 2]);
        assert_eq!(blue, vec![4, 3]);
    }

    #[test]
    fn test_balance_prefers_red_for_unassigned() {
        let mut roster = roster_with(&[Team::Unassigned, Team::Unassigned, Team::Unassigned]);
        roster.balance();
        assert_eq!(roster.team_members(Team::Red), vec![1, 2]);
        assert_eq!(roster.team_members(Team::Blue), vec![3]);
    }

    #[test]
    fn test_balance_is_idempotent() {
        let mut roster = roster_with(&[Team::Blue, Team::Unassigned, Team::Blue, Team::Blue, Team::Red]);
        roster.balance();
        let first: Vec<Team> = roster.iter().map(|m| m.team).collect();
        roster.balance();
        let second: Vec<Team> = roster.iter().map(|m| m.team).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_swap_keeps_original_teams() {
        let mut roster = roster_with(&[Team::Red, Team::Blue]);
        roster.snapshot_original_teams();
        roster.swap_sides();
        assert_eq!(roster.team_of(1), Team::Blue);
        assert_eq!(roster.get(1).unwrap().original_team, Team::Red);
        assert_eq!(roster.original_team_of_side(Team::Red), Team::Blue);
    }

    #[test]
    fn test_original_team_of_empty_side_falls_back() {
        let mut roster = roster_with(&[Team::Red]);
        roster.snapshot_original_teams();
        assert_eq!(roster.original_team_of_side(Team::Blue), Team::Blue);
    }

    #[test]
    fn test_add_remove() {
        let mut roster = Roster::new();
        assert!(roster.add(7, "seven".into()));
        assert!(!roster.add(7, "seven".into()));
        assert!(roster.remove(7));
        assert!(!roster.remove(7));
        assert!(roster.is_empty());
    }
}
