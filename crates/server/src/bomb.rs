//! Bomb plant/defuse state machine.
//!
//! At most one bomb exists per round. Any number of players may be working
//! on it at once, one action each: planting before the bomb is down,
//! defusing after. Every action is re-validated against the player's
//! position on each tick and cancelled as soon as it becomes invalid.

use crate::config::{BombConfig, BombSite};
use crate::error::MatchError;
use crate::host::{Color, Host, PlayerId};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BombAction {
    Planting,
    Defusing,
}

impl BombAction {
    pub fn verb(self) -> &'static str {
        match self {
            BombAction::Planting => "planting",
            BombAction::Defusing => "defusing",
        }
    }

    fn required(self, config: &BombConfig) -> u32 {
        match self {
            BombAction::Planting => config.plant_time,
            BombAction::Defusing => config.defuse_time,
        }
    }
}

/// One player's in-flight action.
#[derive(Debug, Clone)]
pub struct ActionProgress {
    pub kind: BombAction,
    /// Whole seconds spent so far.
    pub progress: u32,
    /// The site the action is bound to.
    pub site: BombSite,
}

/// Something round-relevant that happened during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum BombOutcome {
    Planted {
        planter: PlayerId,
        site: String,
        timer: u32,
    },
    Defused {
        defuser: PlayerId,
    },
    Exploded,
}

/// Result of one [`BombSubsystem::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BombTick {
    pub outcome: Option<BombOutcome>,
    /// Seconds left, emitted on every multiple of the warning interval.
    pub warning: Option<u32>,
}

#[derive(Debug, Default)]
pub struct BombSubsystem {
    planted: bool,
    planter: Option<PlayerId>,
    active_site: Option<BombSite>,
    /// Seconds to detonation. Only meaningful while planted.
    timer: u32,
    actions: BTreeMap<PlayerId, ActionProgress>,
}

impl BombSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_planted(&self) -> bool {
        self.planted
    }

    pub fn planter(&self) -> Option<PlayerId> {
        self.planter
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn active_site(&self) -> Option<&BombSite> {
        self.active_site.as_ref()
    }

    pub fn is_busy(&self, player: PlayerId) -> bool {
        self.actions.contains_key(&player)
    }

    pub fn start_planting(
        &mut self,
        host: &mut dyn Host,
        player: PlayerId,
        sites: &[BombSite],
    ) -> Result<(), MatchError> {
        if self.planted {
            return Err(MatchError::AlreadyPlanted);
        }
        let site = host
            .position(player)
            .and_then(|pos| sites.iter().find(|site| site.contains(pos)))
            .cloned()
            .ok_or(MatchError::InvalidPosition)?;
        if self.is_busy(player) {
            return Err(MatchError::Busy);
        }

        let name = display_name(host, player);
        host.whisper(player, &format!("Planting the bomb at site {}...", site.name));
        host.announce(&format!("{} started planting at site {}!", name, site.name), Color::ORANGE);
        debug!("{} started planting at {}", name, site.name);

        self.actions.insert(
            player,
            ActionProgress {
                kind: BombAction::Planting,
                progress: 0,
                site,
            },
        );
        Ok(())
    }

    pub fn start_defusing(&mut self, host: &mut dyn Host, player: PlayerId) -> Result<(), MatchError> {
        let site = match (&self.active_site, self.planted) {
            (Some(site), true) => site.clone(),
            _ => return Err(MatchError::NotPlanted),
        };
        let in_site = host.position(player).is_some_and(|pos| site.contains(pos));
        if !in_site {
            return Err(MatchError::InvalidPosition);
        }
        if self.is_busy(player) {
            return Err(MatchError::Busy);
        }

        let name = display_name(host, player);
        host.whisper(player, &format!("Defusing the bomb at site {}...", site.name));
        host.announce(&format!("{} started defusing!", name), Color::CYAN);
        debug!("{} started defusing at {}", name, site.name);

        self.actions.insert(
            player,
            ActionProgress {
                kind: BombAction::Defusing,
                progress: 0,
                site,
            },
        );
        Ok(())
    }

    /// Drop a player's action and tell everyone it was interrupted.
    pub fn cancel_action(&mut self, host: &mut dyn Host, player: PlayerId) {
        let Some(action) = self.actions.remove(&player) else {
            return;
        };
        let name = display_name(host, player);
        host.whisper(player, &format!("Your {} was interrupted", action.kind.verb()));
        host.announce(&format!("{}'s {} was interrupted", name, action.kind.verb()), Color::YELLOW);
        debug!("{} stopped {} at {}/{}s", name, action.kind.verb(), action.progress, action.site.name);
    }

    /// Advance the bomb by one second.
    pub fn tick(&mut self, host: &mut dyn Host, config: &BombConfig) -> BombTick {
        let mut result = BombTick::default();

        if self.planted {
            self.timer = self.timer.saturating_sub(1);
            if self.timer == 0 {
                info!("Bomb exploded");
                self.reset();
                result.outcome = Some(BombOutcome::Exploded);
                return result;
            }
            if config.bomb_warning_interval > 0 && self.timer % config.bomb_warning_interval == 0 {
                result.warning = Some(self.timer);
            }
        }

        let players: Vec<PlayerId> = self.actions.keys().copied().collect();
        for player in players {
            if !host.is_active(player) {
                debug!("Dropping bomb action of inactive player {}", player);
                self.actions.remove(&player);
                continue;
            }

            let Some(action) = self.actions.get(&player) else {
                continue;
            };
            let position = host.position(player);
            let valid = match action.kind {
                BombAction::Planting => !self.planted && position.is_some_and(|pos| action.site.contains(pos)),
                BombAction::Defusing => {
                    self.planted
                        && self
                            .active_site
                            .as_ref()
                            .zip(position)
                            .is_some_and(|(site, pos)| site.contains(pos))
                }
            };
            if !valid {
                self.cancel_action(host, player);
                continue;
            }

            let Some(action) = self.actions.get_mut(&player) else {
                continue;
            };
            action.progress += 1;
            let kind = action.kind;
            let progress = action.progress;
            let required = kind.required(config);
            host.whisper(
                player,
                &format!(
                    "{} progress: {}% ({}/{})",
                    kind.verb(),
                    progress_percent(progress, required),
                    progress,
                    required
                ),
            );

            if progress < required {
                continue;
            }

            let Some(action) = self.actions.remove(&player) else {
                continue;
            };
            match kind {
                BombAction::Planting => {
                    info!("Bomb planted at {} by {}", action.site.name, player);
                    self.planted = true;
                    self.planter = Some(player);
                    self.timer = config.bomb_timer;
                    result.outcome = Some(BombOutcome::Planted {
                        planter: player,
                        site: action.site.name.clone(),
                        timer: self.timer,
                    });
                    self.active_site = Some(action.site);
                }
                BombAction::Defusing => {
                    info!("Bomb defused by {}", player);
                    self.reset();
                    result.outcome = Some(BombOutcome::Defused { defuser: player });
                    return result;
                }
            }
        }

        result
    }

    /// Back to idle: no bomb, no actions.
    pub fn reset(&mut self) {
        self.planted = false;
        self.planter = None;
        self.active_site = None;
        self.timer = 0;
        self.actions.clear();
    }

    /// Short progress line, e.g. `"planting: 2/3s"`.
    pub fn action_status(&self, player: PlayerId, config: &BombConfig) -> Option<String> {
        self.actions.get(&player).map(|action| {
            format!(
                "{}: {}/{}s",
                action.kind.verb(),
                action.progress,
                action.kind.required(config)
            )
        })
    }
}

/// `min(100, floor(progress / required * 100))`; a zero requirement is already done.
pub fn progress_percent(progress: u32, required: u32) -> u32 {
    if required == 0 {
        return 100;
    }
    let percent = u64::from(progress) * 100 / u64::from(required);
    percent.min(100) as u32
}

fn display_name(host: &dyn Host, player: PlayerId) -> String {
    host.name(player).unwrap_or_else(|| format!("#{player}"))
}
