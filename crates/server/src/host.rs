//! Capabilities the orchestrator consumes from the host engine.
//!
//! The orchestrator never touches engine state directly. Everything it reads
//! comes through [`PlayerDirectory`], and every side effect is a one-way call
//! on [`WorldActions`] or [`Broadcaster`].

use crate::config::ItemSpec;
use glam::Vec2;

/// Host-assigned player identifier.
pub type PlayerId = u32;

/// RGB color for announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const RED: Color = Color::new(255, 0, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const YELLOW: Color = Color::new(255, 255, 0);
    pub const ORANGE: Color = Color::new(255, 165, 0);
    pub const CYAN: Color = Color::new(0, 255, 255);
    pub const GOLD: Color = Color::new(255, 215, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
}

/// Read-only view of who is online and where they are.
pub trait PlayerDirectory {
    /// Every player currently connected and active.
    fn active_participants(&self) -> Vec<PlayerId>;
    fn name(&self, id: PlayerId) -> Option<String>;
    /// Tile position, `None` when the player is unknown.
    fn position(&self, id: PlayerId) -> Option<Vec2>;
    fn health(&self, id: PlayerId) -> i32;
    fn max_health(&self, id: PlayerId) -> i32;
    fn is_active(&self, id: PlayerId) -> bool;

    /// Damage actually taken after the victim's defense. Hosts without a
    /// defense model can keep the raw value.
    fn mitigated_damage(&self, _victim: PlayerId, raw: i32) -> i32 {
        raw
    }
}

/// Fire-and-forget engine actions.
pub trait WorldActions {
    fn teleport(&mut self, id: PlayerId, tile: Vec2);
    fn give_item(&mut self, id: PlayerId, item: &ItemSpec);
    fn heal(&mut self, id: PlayerId, amount: i32);
    /// Bring a dead player back at full health.
    fn revive(&mut self, id: PlayerId);
    /// Apply a buff; a zero duration removes it.
    fn set_buff(&mut self, id: PlayerId, buff: u32, duration: u32);
    fn set_engine_team(&mut self, id: PlayerId, tag: u8);
}

/// Text notifications.
pub trait Broadcaster {
    fn announce(&mut self, text: &str, color: Color);
    fn whisper(&mut self, id: PlayerId, text: &str);
}

/// Everything the orchestrator needs from its host, as one object.
pub trait Host: PlayerDirectory + WorldActions + Broadcaster + Send {}

impl<T: PlayerDirectory + WorldActions + Broadcaster + Send> Host for T {}
