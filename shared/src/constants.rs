use std::time::Duration;

pub const TICK_RATE: u32 = 64;
/// Simulation quantum in seconds.
pub const FIXED_DT: f32 = 1.0 / TICK_RATE as f32;
pub const TICK_DURATION: Duration = Duration::from_micros(15_625);
/// Most ticks drained by one poll after a stall.
pub const MAX_CATCHUP_TICKS: u32 = 5;

pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 720.0;

pub const GRAVITY: f32 = 360.0;
pub const JUMP_VELOCITY: f32 = -420.0;
pub const MOVE_FORCE_GROUND: f32 = 700.0;
pub const MOVE_FORCE_AIR: f32 = 180.0;
/// 0.99 per 60 Hz frame, rescaled to the 64 Hz tick.
pub const VELOCITY_DAMPING: f32 = 0.990_622_06;
/// 0.97 per 60 Hz frame, rescaled to the 64 Hz tick.
pub const SURFACE_FRICTION: f32 = 0.971_848_35;
pub const MAX_VELOCITY: f32 = 660.0;

pub const SIDEJUMP_VERTICAL: f32 = -280.0;
pub const SIDEJUMP_HORIZONTAL: f32 = 170.0;
pub const JUMP_CUT_EXTRA_GRAVITY: f32 = 500.0;

pub const JETPACK_FUEL_MAX: f32 = 100.0;
pub const JETPACK_BURN_RATE: f32 = 50.0;
pub const JETPACK_REGEN_RATE: f32 = 20.0;
pub const JETPACK_THRUST: f32 = 600.0;

/// Floor line used when no map is loaded.
pub const GROUND_Y: f32 = 900.0;
pub const PLAYER_RADIUS: f32 = 18.0;
pub const MAX_HEALTH: u8 = 100;
pub const SMOOTH_FACTOR: f32 = 0.15;
/// Muzzle distance beyond the player's radius.
pub const GUN_OFFSET: f32 = 10.0;

/// Projectiles this far outside the map die.
pub const BULLET_MARGIN_X: f32 = 100.0;
pub const BULLET_MARGIN_TOP: f32 = 500.0;
pub const BULLET_MARGIN_BOTTOM: f32 = 200.0;

pub const DEFAULT_MAP: &str = "m1";
