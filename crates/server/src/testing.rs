//! In-memory host used by the unit tests.

use crate::config::ItemSpec;
use crate::host::{Broadcaster, Color, PlayerDirectory, PlayerId, WorldActions};
use glam::Vec2;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct FakePlayer {
    pub name: String,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub active: bool,
    pub engine_team: u8,
    pub buffs: BTreeMap<u32, u32>,
    pub items: Vec<ItemSpec>,
}

/// Every side effect the orchestrator performed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Teleport(PlayerId, Vec2),
    Heal(PlayerId, i32),
    Revive(PlayerId),
    Buff(PlayerId, u32, u32),
    EngineTeam(PlayerId, u8),
}

#[derive(Debug, Default)]
pub struct FakeHost {
    pub players: BTreeMap<PlayerId, FakePlayer>,
    pub announcements: Vec<String>,
    pub whispers: Vec<(PlayerId, String)>,
    pub actions: Vec<Action>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with players `1..=n`, all alive at the origin.
    pub fn with_players(n: u32) -> Self {
        let mut host = Self::new();
        for id in 1..=n {
            host.add_player(id, Vec2::ZERO);
        }
        host
    }

    pub fn add_player(&mut self, id: PlayerId, position: Vec2) {
        self.players.insert(
            id,
            FakePlayer {
                name: format!("p{id}"),
                position,
                health: 100,
                max_health: 100,
                active: true,
                engine_team: 0,
                buffs: BTreeMap::new(),
                items: Vec::new(),
            },
        );
    }

    pub fn move_to(&mut self, id: PlayerId, position: Vec2) {
        if let Some(p) = self.players.get_mut(&id) {
            p.position = position;
        }
    }

    pub fn kill(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.health = 0;
        }
    }

    pub fn disconnect(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.active = false;
        }
    }

    pub fn announced(&self, needle: &str) -> bool {
        self.announcements.iter().any(|a| a.contains(needle))
    }

    pub fn buff_calls(&self, id: PlayerId) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, Action::Buff(p, _, _) if *p == id))
            .count()
    }
}

impl PlayerDirectory for FakeHost {
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
}

impl WorldActions for FakeHost {
    fn teleport(&mut self, id: PlayerId, tile: Vec2) {
        self.move_to(id, tile);
        self.actions.push(Action::Teleport(id, tile));
    }

    fn give_item(&mut self, id: PlayerId, item: &ItemSpec) {
        if let Some(p) = self.players.get_mut(&id) {
            p.items.push(item.clone());
        }
    }

    fn heal(&mut self, id: PlayerId, amount: i32) {
        if let Some(p) = self.players.get_mut(&id) {
            p.health = (p.health + amount).min(p.max_health);
        }
        self.actions.push(Action::Heal(id, amount));
    }

    fn revive(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.health = p.max_health;
        }
        self.actions.push(Action::Revive(id));
    }

    fn set_buff(&mut self, id: PlayerId, buff: u32, duration: u32) {
        if let Some(p) = self.players.get_mut(&id) {
            if duration == 0 {
                p.buffs.remove(&buff);
            } else {
                p.buffs.insert(buff, duration);
            }
        }
        self.actions.push(Action::Buff(id, buff, duration));
    }

    fn set_engine_team(&mut self, id: PlayerId, tag: u8) {
        if let Some(p) = self.players.get_mut(&id) {
            p.engine_team = tag;
        }
        self.actions.push(Action::EngineTeam(id, tag));
    }
}

impl Broadcaster for FakeHost {
    fn announce(&mut self, text: &str, _color: Color) {
        self.announcements.push(text.to_string());
    }

    fn whisper(&mut self, id: PlayerId, text: &str) {
        self.whispers.push((id, text.to_string()));
    }
}
