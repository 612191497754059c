//! Weapon table and per-actor weapon state.

/// Weapon ids as carried in `weaponType` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WeaponKind {
    #[default]
    Pistol = 0,
    Smg = 1,
    Shotgun = 2,
    Sniper = 3,
    Ak47 = 4,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 5] = [
        WeaponKind::Pistol,
        WeaponKind::Smg,
        WeaponKind::Shotgun,
        WeaponKind::Sniper,
        WeaponKind::Ak47,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn spec(self) -> &'static WeaponSpec {
        &WEAPONS[self as usize]
    }
}

/// Static tuning for one weapon. Times are seconds, angles radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponSpec {
    pub name: &'static str,
    pub damage: u8,
    pub fire_interval: f32,
    pub magazine: u16,
    pub reload_time: f32,
    /// Holding the trigger keeps firing.
    pub automatic: bool,
    pub pellets: u8,
    pub bullet_speed: f32,
    pub bullet_gravity: f32,
    pub bullet_lifetime: f32,
    pub bullet_radius: f32,
    pub min_spread: f32,
    pub max_spread: f32,
    pub spread_per_shot: f32,
    /// Exponential decay rate of spread toward `min_spread`, per second.
    pub spread_recovery: f32,
}

pub static WEAPONS: [WeaponSpec; 5] = [
    WeaponSpec {
        name: "Pistol",
        damage: 20,
        fire_interval: 0.25,
        magazine: 12,
        reload_time: 1.2,
        automatic: false,
        pellets: 1,
        bullet_speed: 1400.0,
        bullet_gravity: 120.0,
        bullet_lifetime: 1.5,
        bullet_radius: 3.0,
        min_spread: 0.01,
        max_spread: 0.15,
        spread_per_shot: 0.05,
        spread_recovery: 6.0,
    },
    WeaponSpec {
        name: "SMG",
        damage: 12,
        fire_interval: 0.07,
        magazine: 30,
        reload_time: 1.6,
        automatic: true,
        pellets: 1,
        bullet_speed: 1300.0,
        bullet_gravity: 150.0,
        bullet_lifetime: 1.0,
        bullet_radius: 2.0,
        min_spread: 0.03,
        max_spread: 0.25,
        spread_per_shot: 0.03,
        spread_recovery: 5.0,
    },
    WeaponSpec {
        name: "Shotgun",
        damage: 10,
        fire_interval: 0.8,
        magazine: 6,
        reload_time: 2.2,
        automatic: false,
        pellets: 8,
        bullet_speed: 1100.0,
        bullet_gravity: 200.0,
        bullet_lifetime: 0.6,
        bullet_radius: 2.0,
        min_spread: 0.3,
        max_spread: 0.45,
        spread_per_shot: 0.1,
        spread_recovery: 3.0,
    },
    WeaponSpec {
        name: "Sniper",
        damage: 80,
        fire_interval: 1.4,
        magazine: 5,
        reload_time: 2.5,
        automatic: false,
        pellets: 1,
        bullet_speed: 2600.0,
        bullet_gravity: 40.0,
        bullet_lifetime: 2.0,
        bullet_radius: 3.0,
        min_spread: 0.0,
        max_spread: 0.2,
        spread_per_shot: 0.2,
        spread_recovery: 2.0,
    },
    WeaponSpec {
        name: "AK-47",
        damage: 18,
        fire_interval: 0.1,
        magazine: 30,
        reload_time: 2.0,
        automatic: true,
        pellets: 1,
        bullet_speed: 1600.0,
        bullet_gravity: 100.0,
        bullet_lifetime: 1.4,
        bullet_radius: 3.0,
        min_spread: 0.02,
        max_spread: 0.2,
        spread_per_shot: 0.04,
        spread_recovery: 4.0,
    },
];

/// Ammo, timers and spread of the weapon an actor is holding.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponState {
    pub kind: WeaponKind,
    pub ammo: u16,
    pub fire_cooldown: f32,
    /// Seconds left on the current reload, zero when not reloading.
    pub reload_timer: f32,
    pub spread: f32,
}

impl WeaponState {
    pub fn new(kind: WeaponKind) -> Self {
        let spec = kind.spec();
        Self {
            kind,
            ammo: spec.magazine,
            fire_cooldown: 0.0,
            reload_timer: 0.0,
            spread: spec.min_spread,
        }
    }

    pub fn spec(&self) -> &'static WeaponSpec {
        self.kind.spec()
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_timer > 0.0
    }

    /// Swaps to a fresh magazine of `kind`. Cancels any reload.
    pub fn switch_to(&mut self, kind: WeaponKind) {
        if kind != self.kind {
            *self = Self::new(kind);
        }
    }

    /// Returns false when already reloading or the magazine is full.
    pub fn start_reload(&mut self) -> bool {
        if self.is_reloading() || self.ammo >= self.spec().magazine {
            return false;
        }
        self.reload_timer = self.spec().reload_time;
        true
    }

    /// Consumes one round if the fire-rate, ammo and reload gates allow it.
    pub fn try_fire(&mut self) -> bool {
        if self.fire_cooldown > 0.0 || self.ammo == 0 || self.is_reloading() {
            return false;
        }
        let spec = self.spec();
        self.ammo -= 1;
        self.fire_cooldown = spec.fire_interval;
        self.spread = (self.spread + spec.spread_per_shot).min(spec.max_spread);
        if self.ammo == 0 {
            self.start_reload();
        }
        true
    }

    /// Advances timers by `dt`. Spread recovers only on ticks without a shot.
    pub fn update(&mut self, dt: f32, fired: bool) {
        let spec = self.spec();
        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);

        if self.is_reloading() {
            self.reload_timer -= dt;
            if self.reload_timer <= 0.0 {
                self.reload_timer = 0.0;
                self.ammo = spec.magazine;
            }
        }

        if !fired {
            let decay = (-spec.spread_recovery * dt).exp();
            self.spread = spec.min_spread + (self.spread - spec.min_spread) * decay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_ids_round_trip() {
        for kind in WeaponKind::ALL {
            assert_eq!(WeaponKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(WeaponKind::from_id(5), None);
        assert_eq!(WeaponKind::Shotgun.spec().pellets, 8);
    }

    #[test]
    fn test_fire_rate_gate() {
        let mut weapon = WeaponState::new(WeaponKind::Pistol);
        assert!(weapon.try_fire());
        assert!(!weapon.try_fire());
        weapon.update(0.1, false);
        assert!(!weapon.try_fire());
        weapon.update(0.2, false);
        assert!(weapon.try_fire());
        assert_eq!(weapon.ammo, 10);
    }

    #[test]
    fn test_empty_magazine_auto_reloads() {
        let mut weapon = WeaponState::new(WeaponKind::Sniper);
        for _ in 0..5 {
            weapon.fire_cooldown = 0.0;
            assert!(weapon.try_fire());
        }
        assert_eq!(weapon.ammo, 0);
        assert!(weapon.is_reloading());

        weapon.fire_cooldown = 0.0;
        assert!(!weapon.try_fire());

        weapon.update(2.5, false);
        assert!(!weapon.is_reloading());
        assert_eq!(weapon.ammo, 5);
    }

    #[test]
    fn test_manual_reload() {
        let mut weapon = WeaponState::new(WeaponKind::Smg);
        assert!(!weapon.start_reload(), "full magazine");
        weapon.try_fire();
        assert!(weapon.start_reload());
        assert!(!weapon.start_reload(), "already reloading");
    }

    #[test]
    fn test_spread_grows_and_recovers() {
        let mut weapon = WeaponState::new(WeaponKind::Ak47);
        let spec = weapon.spec();
        for _ in 0..20 {
            weapon.fire_cooldown = 0.0;
            weapon.try_fire();
            weapon.update(0.0, true);
        }
        assert_approx_eq!(weapon.spread, spec.max_spread, 1e-6);

        for _ in 0..640 {
            weapon.update(1.0 / 64.0, false);
        }
        assert_approx_eq!(weapon.spread, spec.min_spread, 1e-4);
    }

    #[test]
    fn test_switch_resets_state() {
        let mut weapon = WeaponState::new(WeaponKind::Pistol);
        weapon.try_fire();
        weapon.switch_to(WeaponKind::Shotgun);
        assert_eq!(weapon.kind, WeaponKind::Shotgun);
        assert_eq!(weapon.ammo, 6);
        assert_eq!(weapon.fire_cooldown, 0.0);
    }
}
