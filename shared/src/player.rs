use rand::Rng;

use crate::collision::resolve_aabb;
use crate::constants::{
    GRAVITY, GROUND_Y, GUN_OFFSET, JETPACK_BURN_RATE, JETPACK_FUEL_MAX, JETPACK_REGEN_RATE,
    JETPACK_THRUST, JUMP_CUT_EXTRA_GRAVITY, JUMP_VELOCITY, MAX_HEALTH, MAX_VELOCITY,
    MOVE_FORCE_AIR, MOVE_FORCE_GROUND, PLAYER_RADIUS, SIDEJUMP_HORIZONTAL, SIDEJUMP_VERTICAL,
    SURFACE_FRICTION, VELOCITY_DAMPING, WORLD_WIDTH,
};
use crate::map::TileMap;
use crate::protocol::{PlayerRecord, Shoot};
use crate::weapons::{WeaponKind, WeaponState};

/// One frame of player intent, sampled by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub jetpack: bool,
    pub fire: bool,
    pub reload: bool,
    /// Aim point in world coordinates.
    pub aim_x: f32,
    pub aim_y: f32,
    pub weapon_select: Option<WeaponKind>,
}

/// Authoritative values a remote actor is blended toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u8,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub health: u8,
    pub on_ground: bool,
    pub is_local: bool,
    pub weapon: WeaponState,
    pub jetpack_fuel: f32,

    pub prev_x: f32,
    pub prev_y: f32,
    pub prev_angle: f32,
    pub target: Option<Target>,

    jump_held: bool,
    jump_active: bool,
    trigger_held: bool,
    fired: bool,
}

impl Player {
    pub fn new(id: u8, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            angle: 0.0,
            health: MAX_HEALTH,
            on_ground: false,
            is_local: false,
            weapon: WeaponState::new(WeaponKind::default()),
            jetpack_fuel: JETPACK_FUEL_MAX,
            prev_x: x,
            prev_y: y,
            prev_angle: 0.0,
            target: None,
            jump_held: false,
            jump_active: false,
            trigger_held: false,
            fired: false,
        }
    }

    pub fn from_record(record: &PlayerRecord) -> Self {
        let mut player = Self::new(record.id, record.x, record.y);
        player.apply_record(record);
        player
    }

    pub fn apply_record(&mut self, record: &PlayerRecord) {
        self.x = record.x;
        self.y = record.y;
        self.vx = record.vx;
        self.vy = record.vy;
        self.angle = record.angle;
        self.health = record.health;
        if let Some(kind) = WeaponKind::from_id(record.weapon_type) {
            self.weapon.switch_to(kind);
        }
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            angle: self.angle,
            weapon_type: self.weapon.kind.id(),
            health: self.health,
        }
    }

    /// Records the pre-tick pose for sub-tick interpolation.
    pub fn begin_tick(&mut self) {
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.prev_angle = self.angle;
        self.fired = false;
    }

    /// Applies one tick of local input and returns the shots it fired.
    pub fn apply_input<R: Rng + ?Sized>(
        &mut self,
        input: &InputState,
        dt: f32,
        rng: &mut R,
    ) -> Vec<Shoot> {
        self.angle = (input.aim_y - self.y).atan2(input.aim_x - self.x);

        if let Some(kind) = input.weapon_select {
            self.weapon.switch_to(kind);
        }

        let dir = match (input.left, input.right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        let force = if self.on_ground {
            MOVE_FORCE_GROUND
        } else {
            MOVE_FORCE_AIR
        };
        self.vx += dir * force * dt;

        if input.jump && !self.jump_held && self.on_ground {
            if dir != 0.0 {
                self.vy = SIDEJUMP_VERTICAL;
                self.vx += dir * SIDEJUMP_HORIZONTAL;
            } else {
                self.vy = JUMP_VELOCITY;
            }
            self.on_ground = false;
            self.jump_active = true;
        }
        if self.jump_active && self.vy >= 0.0 {
            self.jump_active = false;
        }
        if self.jump_active && !input.jump {
            self.vy += JUMP_CUT_EXTRA_GRAVITY * dt;
        }
        self.jump_held = input.jump;

        if input.jetpack && self.jetpack_fuel > 0.0 {
            self.vy -= JETPACK_THRUST * dt;
            self.jetpack_fuel = (self.jetpack_fuel - JETPACK_BURN_RATE * dt).max(0.0);
        } else {
            self.jetpack_fuel = (self.jetpack_fuel + JETPACK_REGEN_RATE * dt).min(JETPACK_FUEL_MAX);
        }

        if input.reload {
            self.weapon.start_reload();
        }

        let trigger = input.fire && (self.weapon.spec().automatic || !self.trigger_held);
        self.trigger_held = input.fire;
        if trigger && self.weapon.try_fire() {
            self.fired = true;
            return self.spawn_pellets(rng);
        }
        Vec::new()
    }

    fn spawn_pellets<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Shoot> {
        let spec = self.weapon.spec();
        let muzzle = PLAYER_RADIUS + GUN_OFFSET;
        let half_spread = self.weapon.spread / 2.0;

        (0..spec.pellets)
            .map(|_| {
                let offset = if half_spread > 0.0 {
                    rng.gen_range(-half_spread..=half_spread)
                } else {
                    0.0
                };
                let angle = self.angle + offset;
                Shoot {
                    owner_id: self.id,
                    weapon_type: self.weapon.kind.id(),
                    x: self.x + self.angle.cos() * muzzle,
                    y: self.y + self.angle.sin() * muzzle,
                    vel_x: angle.cos() * spec.bullet_speed,
                    vel_y: angle.sin() * spec.bullet_speed,
                }
            })
            .collect()
    }

    /// Gravity, damping, friction and movement against the map, or against the
    /// ground line and world edges when no map is loaded.
    pub fn update_physics(&mut self, dt: f32, map: Option<&TileMap>) {
        self.weapon.update(dt, self.fired);

        self.vy += GRAVITY * dt;
        self.vx *= VELOCITY_DAMPING;
        self.vy *= VELOCITY_DAMPING;
        if self.on_ground {
            self.vx *= SURFACE_FRICTION;
        }

        let speed = (self.vx * self.vx + self.vy * self.vy).sqrt();
        if speed > MAX_VELOCITY {
            let scale = MAX_VELOCITY / speed;
            self.vx *= scale;
            self.vy *= scale;
        }

        match map {
            Some(map) => {
                let r = resolve_aabb(
                    self.x,
                    self.y,
                    self.vx * dt,
                    self.vy * dt,
                    PLAYER_RADIUS,
                    PLAYER_RADIUS,
                    map,
                );
                self.x = r.x;
                self.y = r.y;
                if r.move_x == 0.0 {
                    self.vx = 0.0;
                }
                if r.move_y == 0.0 {
                    self.vy = 0.0;
                }
                self.on_ground = r.on_ground;
            }
            None => {
                self.x = (self.x + self.vx * dt).clamp(PLAYER_RADIUS, WORLD_WIDTH - PLAYER_RADIUS);
                self.y += self.vy * dt;
                self.on_ground = false;
                if self.y + PLAYER_RADIUS >= GROUND_Y {
                    self.y = GROUND_Y - PLAYER_RADIUS;
                    self.vy = self.vy.min(0.0);
                    self.on_ground = true;
                }
            }
        }
    }

    /// Pose between the previous and current tick.
    pub fn render_position(&self, alpha: f32) -> (f32, f32) {
        (
            self.prev_x + (self.x - self.prev_x) * alpha,
            self.prev_y + (self.y - self.prev_y) * alpha,
        )
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}
