//! Round-based team match orchestrator.
//!
//! Runs team deathmatch and bomb defusal matches on top of a host engine
//! reached only through the traits in [`host`].

pub mod bomb;
pub mod combat;
pub mod config;
pub mod error;
pub mod gamemodes;
pub mod host;
pub mod roster;
pub mod scoring;
pub mod schedule;
pub mod server;
pub mod team;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::MatchError;
pub use gamemodes::GameModeKind;
pub use host::{Broadcaster, Color, Host, PlayerDirectory, PlayerId, WorldActions};
pub use server::{
    run_game_loop, GameState, MatchHandle, MatchOrchestrator, MatchState, MatchStatus, MemberStatus,
    Membership, SpawnDecision,
};
pub use team::Team;
