//! In-memory arena host and a crude bot driver.

use glam::Vec2;
use rand::Rng;
use server::config::{BoundingBox, ItemSpec, MapConfig};
use server::{
    Broadcaster, Color, GameModeKind, MatchHandle, MatchState, MemberStatus, PlayerDirectory, PlayerId,
    SpawnDecision, Team, WorldActions,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

const BOT_NAMES: &[&str] = &[
    "Vex", "Nyx", "Rook", "Ash", "Kestrel", "Moth", "Quill", "Sable", "Tarn", "Wren",
];

/// Tiles a bot walks per driver step.
const BOT_SPEED: f32 = 12.0;
/// Bots only trade hits inside this range.
const ENGAGE_RANGE: f32 = 40.0;

#[derive(Debug, Clone)]
pub struct SimPlayer {
    pub name: String,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub defense: i32,
    pub active: bool,
    pub engine_team: u8,
    pub buffs: HashMap<u32, u32>,
    pub inventory: Vec<ItemSpec>,
}

/// A flat arena standing in for the host engine.
#[derive(Debug)]
pub struct SimArena {
    players: BTreeMap<PlayerId, SimPlayer>,
    bounds: BoundingBox,
}

impl SimArena {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            players: BTreeMap::new(),
            bounds,
        }
    }

    pub fn add_bot(&mut self, id: PlayerId) {
        let mut rng = rand::rng();
        let name = format!("{}{}", BOT_NAMES[rng.random_range(0..BOT_NAMES.len())], id % 100);
        let position = Vec2::new(
            rng.random_range(self.bounds.top_left.x..=self.bounds.bottom_right.x),
            rng.random_range(self.bounds.top_left.y..=self.bounds.bottom_right.y),
        );
        self.players.insert(
            id,
            SimPlayer {
                name,
                position,
                health: 100,
                max_health: 100,
                defense: rng.random_range(0..=8),
                active: true,
                engine_team: 0,
                buffs: HashMap::new(),
                inventory: Vec::new(),
            },
        );
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.players.get(&id).is_some_and(|p| p.active && p.health > 0)
    }

    /// Step toward `target`, clamped to the arena.
    pub fn walk(&mut self, id: PlayerId, target: Vec2) {
        let bounds = self.bounds;
        if let Some(p) = self.players.get_mut(&id) {
            let step = (target - p.position).clamp_length_max(BOT_SPEED);
            p.position = (p.position + step).clamp(bounds.top_left, bounds.bottom_right);
        }
    }

    /// Apply damage. Returns true when it kills.
    pub fn hurt(&mut self, id: PlayerId, damage: i32) -> bool {
        match self.players.get_mut(&id) {
            Some(p) if p.health > 0 => {
                p.health -= damage;
                p.health <= 0
            }
            _ => false,
        }
    }

    /// The engine respawns the player at a random point; the orchestrator redirects them.
    pub fn respawn(&mut self, id: PlayerId) {
        let mut rng = rand::rng();
        let bounds = self.bounds;
        if let Some(p) = self.players.get_mut(&id) {
            p.health = p.max_health;
            p.position = Vec2::new(
                rng.random_range(bounds.top_left.x..=bounds.bottom_right.x),
                rng.random_range(bounds.top_left.y..=bounds.bottom_right.y),
            );
        }
    }
}

impl PlayerDirectory for SimArena {
    fn active_participants(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(&id, _)| id)
            .collect()
    }

    fn name(&self, id: PlayerId) -> Option<String> {
        self.players.get(&id).map(|p| p.name.clone())
    }

    fn position(&self, id: PlayerId) -> Option<Vec2> {
        self.players.get(&id).map(|p| p.position)
    }

    fn health(&self, id: PlayerId) -> i32 {
        self.players.get(&id).map_or(0, |p| p.health)
    }

    fn max_health(&self, id: PlayerId) -> i32 {
        self.players.get(&id).map_or(0, |p| p.max_health)
    }

    fn is_active(&self, id: PlayerId) -> bool {
        self.players.get(&id).is_some_and(|p| p.active)
    }

    fn mitigated_damage(&self, victim: PlayerId, raw: i32) -> i32 {
        let defense = self.players.get(&victim).map_or(0, |p| p.defense);
        (raw - defense / 2).max(1)
    }
}

impl WorldActions for SimArena {
    fn teleport(&mut self, id: PlayerId, tile: Vec2) {
        if let Some(p) = self.players.get_mut(&id) {
            p.position = tile;
        }
    }

    fn give_item(&mut self, id: PlayerId, item: &ItemSpec) {
        if let Some(p) = self.players.get_mut(&id) {
            p.inventory.push(item.clone());
        }
    }

    fn heal(&mut self, id: PlayerId, amount: i32) {
        if let Some(p) = self.players.get_mut(&id) {
            p.health = (p.health + amount).min(p.max_health);
        }
    }

    fn revive(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.health = p.max_health;
        }
    }

    fn set_buff(&mut self, id: PlayerId, buff: u32, duration: u32) {
        if let Some(p) = self.players.get_mut(&id) {
            if duration == 0 {
                p.buffs.remove(&buff);
            } else {
                p.buffs.insert(buff, duration);
            }
        }
    }

    fn set_engine_team(&mut self, id: PlayerId, tag: u8) {
        if let Some(p) = self.players.get_mut(&id) {
            p.engine_team = tag;
        }
    }
}

impl Broadcaster for SimArena {
    fn announce(&mut self, text: &str, color: Color) {
        info!(target: "chat", "[#{:02x}{:02x}{:02x}] {}", color.r, color.g, color.b, text);
    }

    fn whisper(&mut self, id: PlayerId, text: &str) {
        let name = self.players.get(&id).map_or("?", |p| p.name.as_str());
        debug!(target: "chat", "-> {}: {}", name, text);
    }
}

/// Join every bot to `kind`, pick sides, then play forever.
pub async fn drive_bots(handle: MatchHandle<SimArena>, bots: Vec<PlayerId>, kind: GameModeKind, map: MapConfig) {
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        ticker.tick().await;
        let status = handle.status().await;
        match status.state {
            MatchState::InProgress => {
                let teams: HashMap<PlayerId, Team> = status.members.iter().map(|m| (m.id, m.team)).collect();
                let planted = status.bomb.as_ref().is_some_and(|b| b.planted);
                play_step(&handle, &bots, &teams, kind, planted, &map).await;
            }
            _ => join_lobby(&handle, &bots, kind, &status.members).await,
        }
    }
}

async fn join_lobby(
    handle: &MatchHandle<SimArena>,
    bots: &[PlayerId],
    kind: GameModeKind,
    members: &[MemberStatus],
) {
    for &bot in bots {
        if members.iter().any(|m| m.id == bot) {
            continue;
        }
        if let Err(e) = handle.toggle_membership(bot, kind).await {
            warn!("Bot {} could not join: {}", bot, e);
            continue;
        }
        // Leave a few bots unassigned so balancing has work to do.
        let team = match rand::rng().random_range(0..3) {
            0 => Team::Red,
            1 => Team::Blue,
            _ => continue,
        };
        if let Err(e) = handle.set_team(bot, team).await {
            warn!("Bot {} could not pick {}: {}", bot, team, e);
        }
    }
}

async fn play_step(
    handle: &MatchHandle<SimArena>,
    bots: &[PlayerId],
    teams: &HashMap<PlayerId, Team>,
    kind: GameModeKind,
    planted: bool,
    map: &MapConfig,
) {
    let site = map.bomb_sites.first().map(|s| {
        (s.area.top_left + s.area.bottom_right) * 0.5
    });

    for &bot in bots {
        let Some(&team) = teams.get(&bot) else {
            continue;
        };
        let alive = handle.with_host(|arena| arena.is_alive(bot)).await;
        if !alive {
            if handle.spawn_request(bot).await == SpawnDecision::Allow {
                handle.with_host(|arena| arena.respawn(bot)).await;
            }
            continue;
        }

        // Red heads for the site; blue heads there once the bomb is down, otherwise roams.
        let target = match (kind, team, site) {
            (GameModeKind::BombDefusal, Team::Red, Some(site)) => site,
            (GameModeKind::BombDefusal, Team::Blue, Some(site)) if planted => site,
            _ => {
                let mut rng = rand::rng();
                Vec2::new(
                    rng.random_range(map.bounds.top_left.x..=map.bounds.bottom_right.x),
                    rng.random_range(map.bounds.top_left.y..=map.bounds.bottom_right.y),
                )
            }
        };
        handle.with_host(|arena| arena.walk(bot, target)).await;

        if kind == GameModeKind::BombDefusal {
            let attempt = if team == Team::Red && !planted {
                handle.start_planting(bot).await
            } else if team == Team::Blue && planted {
                handle.start_defusing(bot).await
            } else {
                Ok(())
            };
            if let Err(e) = attempt {
                debug!("Bot {}: {}", bot, e);
            }
        }

        fight(handle, bot, team, teams).await;
    }
}

/// Hit the closest living enemy in range, reporting damage and death like a host would.
async fn fight(handle: &MatchHandle<SimArena>, bot: PlayerId, team: Team, teams: &HashMap<PlayerId, Team>) {
    let target = handle
        .with_host(|arena| {
            let from = arena.position(bot)?;
            teams
                .iter()
                .filter(|&(&id, &t)| t != team && t.is_assigned() && arena.is_alive(id))
                .filter_map(|(&id, _)| arena.position(id).map(|pos| (id, pos.distance(from))))
                .filter(|&(_, distance)| distance <= ENGAGE_RANGE)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        })
        .await;
    let Some(victim) = target else {
        return;
    };

    let raw = rand::rng().random_range(5..=25);
    handle.damage(bot, victim, raw).await;
    let died = handle
        .with_host(|arena| {
            let damage = arena.mitigated_damage(victim, raw);
            arena.hurt(victim, damage)
        })
        .await;
    if died {
        if let Some(line) = handle.death(victim, Some(bot)).await {
            debug!("Kill feed: {}", line);
        }
    }
}
