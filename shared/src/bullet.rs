use std::collections::BTreeMap;

use crate::collision::{actor_hit_wins, raycast_tiles, segment_circle_intersect};
use crate::constants::{
    BULLET_MARGIN_BOTTOM, BULLET_MARGIN_TOP, BULLET_MARGIN_X, PLAYER_RADIUS,
};
use crate::map::TileMap;
use crate::player::Player;
use crate::protocol::{BulletHit, Shoot};
use crate::weapons::WeaponKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub owner_id: u8,
    pub weapon: WeaponKind,
    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub gravity: f32,
    /// Seconds left before the bullet expires.
    pub lifetime: f32,
    pub damage: u8,
    pub radius: f32,
    pub alive: bool,
}

impl Bullet {
    /// `None` when the shot names an unknown weapon.
    pub fn from_shot(shot: &Shoot) -> Option<Self> {
        let weapon = WeaponKind::from_id(shot.weapon_type)?;
        let spec = weapon.spec();
        Some(Self {
            owner_id: shot.owner_id,
            weapon,
            x: shot.x,
            y: shot.y,
            prev_x: shot.x,
            prev_y: shot.y,
            vel_x: shot.vel_x,
            vel_y: shot.vel_y,
            gravity: spec.bullet_gravity,
            lifetime: spec.bullet_lifetime,
            damage: spec.damage,
            radius: spec.bullet_radius,
            alive: true,
        })
    }

    /// Advances one tick.
    ///
    /// Terrain always stops the bullet. With `authoritative` set, live actors
    /// other than the owner are hit-tested too and a hit is returned with the
    /// target's resulting health.
    pub fn update(
        &mut self,
        dt: f32,
        map: Option<&TileMap>,
        players: &mut BTreeMap<u8, Player>,
        authoritative: bool,
    ) -> Option<BulletHit> {
        if !self.alive {
            return None;
        }

        let (x0, y0) = (self.x, self.y);
        self.prev_x = x0;
        self.prev_y = y0;

        self.vel_y += self.gravity * dt;
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;

        self.lifetime -= dt;
        if self.lifetime <= 0.0 {
            self.alive = false;
            return None;
        }

        if let Some(map) = map {
            let (pw, ph) = (map.pixel_width(), map.pixel_height());
            if self.x < -BULLET_MARGIN_X
                || self.x > pw + BULLET_MARGIN_X
                || self.y < -BULLET_MARGIN_TOP
                || self.y > ph + BULLET_MARGIN_BOTTOM
            {
                self.alive = false;
                return None;
            }
        }

        let terrain = map.and_then(|m| raycast_tiles(x0, y0, self.x, self.y, m));

        if authoritative {
            let reach = PLAYER_RADIUS + self.radius;
            let closest = players
                .values()
                .filter(|p| p.id != self.owner_id && p.health > 0)
                .filter_map(|p| {
                    segment_circle_intersect(x0, y0, self.x, self.y, p.x, p.y, reach)
                        .map(|t| (t, p.id))
                })
                .fold(None, |best: Option<(f32, u8)>, (t, id)| match best {
                    Some((best_t, _)) if best_t <= t => best,
                    _ => Some((t, id)),
                });

            if let Some((t, target_id)) = closest {
                if actor_hit_wins(t, terrain.as_ref()) {
                    if let Some(target) = players.get_mut(&target_id) {
                        return Some(self.hit(target, x0, y0, t));
                    }
                }
            }
        }

        if let Some(hit) = terrain {
            self.x = hit.x;
            self.y = hit.y;
            self.alive = false;
        }
        None
    }

    fn hit(&mut self, target: &mut Player, x0: f32, y0: f32, t: f32) -> BulletHit {
        target.health = target.health.saturating_sub(self.damage);
        self.x = x0 + (self.x - x0) * t;
        self.y = y0 + (self.y - y0) * t;
        self.alive = false;

        BulletHit {
            target_id: target.id,
            attacker_id: self.owner_id,
            damage: self.damage,
            health: target.health,
            x: self.x,
            y: self.y,
        }
    }

    /// Position between the previous and current tick.
    pub fn render_position(&self, alpha: f32) -> (f32, f32) {
        (
            self.prev_x + (self.x - self.prev_x) * alpha,
            self.prev_y + (self.y - self.prev_y) * alpha,
        )
    }
}
