//! Match configuration.

use crate::error::MatchError;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Name of the map used for spawns and bomb sites.
    #[serde(default = "default_map_name")]
    pub current_map: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub deathmatch: DeathmatchConfig,
    #[serde(default)]
    pub bomb: BombConfig,
    #[serde(default = "default_maps")]
    pub maps: BTreeMap<String, MapConfig>,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// The active map, or the built-in default when `current_map` is not configured.
    pub fn current_map(&self) -> MapConfig {
        self.maps
            .get(&self.current_map)
            .cloned()
            .unwrap_or_default()
    }

    /// Switch the active map. Only configured maps are accepted.
    pub fn set_current_map(&mut self, name: &str) -> Result<(), MatchError> {
        if !self.maps.contains_key(name) {
            return Err(MatchError::UnknownMap(name.to_string()));
        }
        self.current_map = name.to_string();
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_map: default_map_name(),
            server: ServerConfig::default(),
            general: GeneralConfig::default(),
            deathmatch: DeathmatchConfig::default(),
            bomb: BombConfig::default(),
            maps: default_maps(),
        }
    }
}

fn default_map_name() -> String {
    "default".to_string()
}
fn default_maps() -> BTreeMap<String, MapConfig> {
    BTreeMap::from([(default_map_name(), MapConfig::default())])
}

/// Game loop timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeats per logical game tick (one game tick is one second).
    #[serde(default = "default_heartbeats_per_tick")]
    pub heartbeats_per_tick: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeats_per_tick: default_heartbeats_per_tick(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    1000 / 60
}
fn default_heartbeats_per_tick() -> u32 {
    60
}

/// Settings shared by both game modes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Lobby countdown in seconds.
    #[serde(default = "default_countdown_time")]
    pub countdown_time: u32,
    /// Countdown used by an admin force start.
    #[serde(default = "default_forced_countdown")]
    pub forced_countdown: u32,
    #[serde(default = "default_min_players")]
    pub min_players_to_start: usize,
    /// Fraction of members that must have picked a team (0.0-1.0).
    #[serde(default = "default_ready_ratio")]
    pub ready_players_ratio: f64,
    /// Enemy proximity (tiles) that breaks stealth.
    #[serde(default = "default_invisibility_range")]
    pub invisibility_range: f32,
    /// Stealth buff duration in engine ticks.
    #[serde(default = "default_invisibility_duration")]
    pub invisibility_duration: u32,
    #[serde(default = "default_invisibility_buff")]
    pub invisibility_buff: u32,
    /// How long recent damage still earns the kill.
    #[serde(default = "default_kill_window")]
    pub kill_window_secs: f64,
    #[serde(default = "default_initial_items")]
    pub initial_items: Vec<ItemSpec>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            countdown_time: default_countdown_time(),
            forced_countdown: default_forced_countdown(),
            min_players_to_start: default_min_players(),
            ready_players_ratio: default_ready_ratio(),
            invisibility_range: default_invisibility_range(),
            invisibility_duration: default_invisibility_duration(),
            invisibility_buff: default_invisibility_buff(),
            kill_window_secs: default_kill_window(),
            initial_items: default_initial_items(),
        }
    }
}

fn default_countdown_time() -> u32 {
    10
}
fn default_forced_countdown() -> u32 {
    3
}
fn default_min_players() -> usize {
    2
}
fn default_ready_ratio() -> f64 {
    0.5
}
fn default_invisibility_range() -> f32 {
    30.0
}
fn default_invisibility_duration() -> u32 {
    120
}
fn default_invisibility_buff() -> u32 {
    14
}
fn default_kill_window() -> f64 {
    5.0
}
fn default_initial_items() -> Vec<ItemSpec> {
    vec![
        ItemSpec::new(1, 1),
        ItemSpec::new(2, 1),
        ItemSpec::new(28, 50),
    ]
}

/// An item handed out at every deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemSpec {
    pub id: i32,
    #[serde(default = "default_stack")]
    pub stack: i32,
    #[serde(default)]
    pub prefix: u8,
}

impl ItemSpec {
    pub const fn new(id: i32, stack: i32) -> Self {
        Self { id, stack, prefix: 0 }
    }
}

fn default_stack() -> i32 {
    1
}

/// Team deathmatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeathmatchConfig {
    #[serde(default = "default_kills_to_win")]
    pub kills_to_win: u32,
}

impl Default for DeathmatchConfig {
    fn default() -> Self {
        Self {
            kills_to_win: default_kills_to_win(),
        }
    }
}

fn default_kills_to_win() -> u32 {
    30
}

/// Bomb defusal settings. All durations are in seconds (game ticks).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BombConfig {
    #[serde(default = "default_rounds_to_win")]
    pub rounds_to_win: u32,
    #[serde(default = "default_bomb_timer")]
    pub bomb_timer: u32,
    #[serde(default = "default_plant_time")]
    pub plant_time: u32,
    #[serde(default = "default_defuse_time")]
    pub defuse_time: u32,
    #[serde(default = "default_warning_interval")]
    pub bomb_warning_interval: u32,
    #[serde(default = "default_round_wait")]
    pub round_wait_time: u32,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            rounds_to_win: default_rounds_to_win(),
            bomb_timer: default_bomb_timer(),
            plant_time: default_plant_time(),
            defuse_time: default_defuse_time(),
            bomb_warning_interval: default_warning_interval(),
            round_wait_time: default_round_wait(),
        }
    }
}

fn default_rounds_to_win() -> u32 {
    3
}
fn default_bomb_timer() -> u32 {
    45
}
fn default_plant_time() -> u32 {
    3
}
fn default_defuse_time() -> u32 {
    5
}
fn default_warning_interval() -> u32 {
    10
}
fn default_round_wait() -> u32 {
    5
}

/// Map geometry: spawns, bomb sites and bounds, in tile coordinates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_red_spawn")]
    pub red_spawn: Vec2,
    #[serde(default = "default_blue_spawn")]
    pub blue_spawn: Vec2,
    #[serde(default = "default_bomb_sites")]
    pub bomb_sites: Vec<BombSite>,
    #[serde(default = "default_map_bounds")]
    pub bounds: BoundingBox,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: default_map_name(),
            description: String::new(),
            red_spawn: default_red_spawn(),
            blue_spawn: default_blue_spawn(),
            bomb_sites: default_bomb_sites(),
            bounds: default_map_bounds(),
        }
    }
}

fn default_red_spawn() -> Vec2 {
    Vec2::new(200.0, 200.0)
}
fn default_blue_spawn() -> Vec2 {
    Vec2::new(600.0, 200.0)
}
fn default_bomb_sites() -> Vec<BombSite> {
    vec![BombSite {
        name: "A".to_string(),
        area: BoundingBox::new(Vec2::new(390.0, 290.0), Vec2::new(410.0, 310.0)),
    }]
}
fn default_map_bounds() -> BoundingBox {
    BoundingBox::new(Vec2::ZERO, Vec2::new(1000.0, 1000.0))
}

/// A named region where the bomb may be planted and defused.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BombSite {
    pub name: String,
    pub area: BoundingBox,
}

impl BombSite {
    pub fn contains(&self, pos: Vec2) -> bool {
        self.area.contains(pos)
    }
}

/// Axis-aligned rectangle, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct BoundingBox {
    pub top_left: Vec2,
    pub bottom_right: Vec2,
}

impl BoundingBox {
    pub const fn new(top_left: Vec2, bottom_right: Vec2) -> Self {
        Self { top_left, bottom_right }
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= self.top_left.x
            && pos.x <= self.bottom_right.x
            && pos.y >= self.top_left.y
            && pos.y <= self.bottom_right.y
    }
}
