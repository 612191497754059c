use std::collections::BTreeMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bullet::Bullet;
use crate::constants::FIXED_DT;
use crate::map::{MapError, TileMap};
use crate::player::{InputState, Player};
use crate::protocol::{BulletHit, PlayerRecord, Shoot};

/// Which end of the wire a simulation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMode {
    /// Server: no local actor, projectile hits are decided here.
    Authoritative,
    /// Client: one local actor takes input, projectiles only hit terrain.
    Predicted,
}

/// Something a tick produced that the session layer has to send.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The local actor fired one projectile.
    Shot(Shoot),
    /// An authoritative projectile hit an actor.
    Hit(BulletHit),
}

pub struct GameState {
    pub mode: SimMode,
    pub tick: u32,
    pub players: BTreeMap<u8, Player>,
    pub bullets: Vec<Bullet>,
    pub map: Option<TileMap>,
    local_player: Option<u8>,
    input: InputState,
    events: Vec<GameEvent>,
    rng: StdRng,
}

impl GameState {
    pub fn new(mode: SimMode) -> Self {
        Self::with_rng(mode, StdRng::from_entropy())
    }

    /// Deterministic spread and spawn choices.
    pub fn with_seed(mode: SimMode, seed: u64) -> Self {
        Self::with_rng(mode, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mode: SimMode, rng: StdRng) -> Self {
        Self {
            mode,
            tick: 0,
            players: BTreeMap::new(),
            bullets: Vec::new(),
            map: None,
            local_player: None,
            input: InputState::default(),
            events: Vec::new(),
            rng,
        }
    }

    /// Empties the world back to tick 0. Mode and random stream carry over.
    pub fn reset(&mut self) {
        self.tick = 0;
        self.players.clear();
        self.bullets.clear();
        self.map = None;
        self.local_player = None;
        self.input = InputState::default();
        self.events.clear();
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Replaces the current map and clears in-flight projectiles.
    pub fn load_map(&mut self, name: &str) -> Result<(), MapError> {
        let map = TileMap::builtin(name)?;
        info!("Loaded map {} ({}x{})", name, map.cols(), map.rows());
        self.set_map(map);
        Ok(())
    }

    pub fn set_map(&mut self, map: TileMap) {
        self.map = Some(map);
        self.bullets.clear();
    }

    /// A random spawn point of the loaded map.
    pub fn random_spawn(&mut self, team: Option<&str>) -> Option<(f32, f32)> {
        let map = self.map.as_ref()?;
        map.random_spawn(team, &mut self.rng).map(|spawn| (spawn.x, spawn.y))
    }

    pub fn add_player(&mut self, mut player: Player) {
        player.is_local = self.local_player == Some(player.id);
        debug!("Added player {} at ({}, {})", player.id, player.x, player.y);
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&mut self, id: u8) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            debug!("Removed player {}", id);
        }
        removed
    }

    pub fn player(&self, id: u8) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: u8) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Marks `id` as the one actor that accepts local input.
    ///
    /// Ignored in authoritative mode.
    pub fn set_local_player(&mut self, id: u8) {
        if self.mode == SimMode::Authoritative {
            warn!("Ignoring local player {} on an authoritative simulation", id);
            return;
        }
        self.local_player = Some(id);
        for player in self.players.values_mut() {
            player.is_local = player.id == id;
        }
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_player.and_then(|id| self.players.get(&id))
    }

    pub fn local_player_id(&self) -> Option<u8> {
        self.local_player
    }

    /// Input applied to the local actor on the following ticks.
    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    /// Spawns a projectile described by a `Shoot` message.
    pub fn spawn_bullet(&mut self, shot: &Shoot) -> bool {
        match Bullet::from_shot(shot) {
            Some(bullet) => {
                self.bullets.push(bullet);
                true
            }
            None => {
                warn!(
                    "Dropping shot from {} with unknown weapon {}",
                    shot.owner_id, shot.weapon_type
                );
                false
            }
        }
    }

    /// Advances the world by one fixed tick.
    pub fn step(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let authoritative = self.mode == SimMode::Authoritative;

        for player in self.players.values_mut() {
            player.begin_tick();
        }

        if !authoritative {
            if let Some(local) = self.local_player.and_then(|id| self.players.get_mut(&id)) {
                let shots = local.apply_input(&self.input, FIXED_DT, &mut self.rng);
                for shot in shots {
                    if let Some(bullet) = Bullet::from_shot(&shot) {
                        self.bullets.push(bullet);
                    }
                    self.events.push(GameEvent::Shot(shot));
                }
            }
        }

        for player in self.players.values_mut() {
            player.update_physics(FIXED_DT, self.map.as_ref());
        }

        for bullet in &mut self.bullets {
            let hit = bullet.update(FIXED_DT, self.map.as_ref(), &mut self.players, authoritative);
            if let Some(hit) = hit {
                debug!(
                    "Player {} hit player {} for {} ({} left)",
                    hit.attacker_id, hit.target_id, hit.damage, hit.health
                );
                self.events.push(GameEvent::Hit(hit));
            }
        }
        self.bullets.retain(|b| b.alive);
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot_records(&self) -> Vec<PlayerRecord> {
        self.players.values().map(Player::to_record).collect()
    }
}
