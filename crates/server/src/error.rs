//! Match error types.

use thiserror::Error;

/// Errors reported back to the player or admin that issued an operation.
///
/// None of these change match state; the caller just gets told why.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("Action rejected: {0}")]
    Rejected(&'static str),

    #[error("You are not in the match lobby")]
    NotMember,

    #[error("You must be inside a bomb site")]
    InvalidPosition,

    #[error("You are already planting or defusing")]
    Busy,

    #[error("The bomb is already planted")]
    AlreadyPlanted,

    #[error("There is no bomb to defuse")]
    NotPlanted,

    #[error("This action is only available in bomb defusal")]
    WrongMode,

    #[error("At least {0} players are required")]
    NotEnoughPlayers(usize),

    #[error("Unknown map: {0}")]
    UnknownMap(String),
}
