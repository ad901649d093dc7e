//! Team labels.

use crate::host::Color;
use std::fmt;

/// A player's side. `Unassigned` is an explicit state, not a missing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Team {
    #[default]
    Unassigned,
    Red,
    Blue,
}

impl Team {
    /// The other side. `Unassigned` has no opponent and maps to itself.
    pub fn opposite(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
            Team::Unassigned => Team::Unassigned,
        }
    }

    pub fn is_assigned(self) -> bool {
        self != Team::Unassigned
    }

    /// Team tag understood by the host engine (0 clears affiliation).
    pub fn engine_tag(self) -> u8 {
        match self {
            Team::Unassigned => 0,
            Team::Red => 1,
            Team::Blue => 3,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Team::Red => Color::RED,
            Team::Blue => Color::BLUE,
            Team::Unassigned => Color::WHITE,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Team::Unassigned => "Unassigned",
            Team::Red => "Red",
            Team::Blue => "Blue",
        })
    }
}
