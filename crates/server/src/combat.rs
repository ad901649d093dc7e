//! Damage history and kill attribution.
//!
//! Deaths reported by the host often carry no attacker (falls, lava, damage
//! over time). The tracker remembers who last hit whom so those deaths can
//! still be credited to the player who caused them.

use crate::host::PlayerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Transient combat history for one player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombatRecord {
    /// Who hit this player most recently.
    pub last_attacker: Option<PlayerId>,
    /// When this player was last hit.
    pub last_attack_time: Option<Instant>,
    /// Who this player hit most recently.
    pub last_target: Option<PlayerId>,
    /// When this player last hit someone.
    pub last_target_time: Option<Instant>,
    pub total_damage_dealt: i64,
    pub total_damage_received: i64,
}

/// How a killer was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSource {
    /// Named by the death event itself.
    Direct,
    /// Recovered from recent damage history.
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKiller {
    pub id: PlayerId,
    pub source: KillSource,
}

/// Per-player combat records.
#[derive(Debug)]
pub struct CombatTracker {
    records: HashMap<PlayerId, CombatRecord>,
    /// Damage older than this no longer earns the kill.
    window: Duration,
}

impl CombatTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            records: HashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn record(&self, id: PlayerId) -> Option<&CombatRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a hit. Callers filter out self damage and friendly fire.
    pub fn record_damage(&mut self, attacker: PlayerId, victim: PlayerId, damage: i32, now: Instant) {
        let damage = i64::from(damage.max(0));

        let victim_record = self.records.entry(victim).or_default();
        victim_record.last_attacker = Some(attacker);
        victim_record.last_attack_time = Some(now);
        victim_record.total_damage_received += damage;

        let attacker_record = self.records.entry(attacker).or_default();
        attacker_record.last_target = Some(victim);
        attacker_record.last_target_time = Some(now);
        attacker_record.total_damage_dealt += damage;

        debug!("Damage record: {} -> {} ({} damage)", attacker, victim, damage);
    }

    /// Work out who killed `victim`.
    ///
    /// The direct attacker wins if it is still a participant. Otherwise the
    /// victim's last attacker is used when the hit landed within the window
    /// and that attacker is still a participant.
    pub fn resolve_killer(
        &self,
        victim: PlayerId,
        direct: Option<PlayerId>,
        now: Instant,
        is_participant: impl Fn(PlayerId) -> bool,
    ) -> Option<ResolvedKiller> {
        if let Some(id) = direct.filter(|&id| id != victim && is_participant(id)) {
            debug!("Direct kill: {} killed {}", id, victim);
            return Some(ResolvedKiller {
                id,
                source: KillSource::Direct,
            });
        }

        let record = self.records.get(&victim)?;
        let (attacker, hit_at) = record.last_attacker.zip(record.last_attack_time)?;
        let elapsed = now.saturating_duration_since(hit_at);
        if elapsed <= self.window && attacker != victim && is_participant(attacker) {
            debug!("Indirect kill: {} killed {} ({:?} after last hit)", attacker, victim, elapsed);
            return Some(ResolvedKiller {
                id: attacker,
                source: KillSource::Indirect,
            });
        }

        debug!("No killer for {}, treating as accidental", victim);
        None
    }

    /// Forget a player's history (after their death is resolved).
    pub fn clear(&mut self, id: PlayerId) {
        self.records.remove(&id);
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }
}
