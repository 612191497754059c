//! Stateless collision queries against a tile grid and against circles.
//!
//! Both peers run these with identical inputs, so the order of operations here
//! is part of the behaviour: AABB movement resolves X before Y, and the grid
//! raycast visits cells in strict DDA order.

/// A grid of square-ish cells that are either solid or empty.
pub trait SolidGrid {
    fn tile_width(&self) -> f32;
    fn tile_height(&self) -> f32;

    /// Cells outside the grid must report solid.
    fn is_solid(&self, col: i32, row: i32) -> bool;
}

/// Outcome of a swept AABB move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AabbResolution {
    pub x: f32,
    pub y: f32,
    /// Remaining X motion, zero when a wall was hit.
    pub move_x: f32,
    /// Remaining Y motion, zero when a floor or ceiling was hit.
    pub move_y: f32,
    /// Set only when a downward move was stopped.
    pub on_ground: bool,
}

/// First solid cell touched by a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub x: f32,
    pub y: f32,
    /// Position of the impact along the segment, in `[0, 1]`.
    pub t: f32,
}

/// Distance in pixels a ray impact is pulled back along the segment.
pub const RAY_PULLBACK: f32 = 0.5;

// Keeps the far edge of a box from claiming the next cell when it sits exactly on a boundary.
const EDGE_INSET: f32 = 0.01;

fn cell(v: f32, size: f32) -> i32 {
    (v / size).floor() as i32
}

/// Moves a box centred on `(x, y)` by `(move_x, move_y)`, resolving X first and
/// then Y using the resolved X.
pub fn resolve_aabb<G: SolidGrid + ?Sized>(
    x: f32,
    y: f32,
    move_x: f32,
    move_y: f32,
    half_w: f32,
    half_h: f32,
    grid: &G,
) -> AabbResolution {
    let tw = grid.tile_width();
    let th = grid.tile_height();

    let new_x = x + move_x;
    let mut resolved_x = new_x;
    let mut resolved_move_x = move_x;

    let start_row = cell(y - half_h, th);
    let end_row = cell(y + half_h - EDGE_INSET, th);
    let start_col = cell(new_x - half_w, tw);
    let end_col = cell(new_x + half_w - EDGE_INSET, tw);

    for row in start_row..=end_row {
        for col in start_col..=end_col {
            if !grid.is_solid(col, row) {
                continue;
            }
            if move_x > 0.0 {
                resolved_x = col as f32 * tw - half_w;
            } else if move_x < 0.0 {
                resolved_x = (col + 1) as f32 * tw + half_w;
            }
            resolved_move_x = 0.0;
        }
    }

    let new_y = y + move_y;
    let mut resolved_y = new_y;
    let mut resolved_move_y = move_y;
    let mut on_ground = false;

    let start_col = cell(resolved_x - half_w, tw);
    let end_col = cell(resolved_x + half_w - EDGE_INSET, tw);
    let start_row = cell(new_y - half_h, th);
    let end_row = cell(new_y + half_h - EDGE_INSET, th);

    for row in start_row..=end_row {
        for col in start_col..=end_col {
            if !grid.is_solid(col, row) {
                continue;
            }
            if move_y > 0.0 {
                resolved_y = row as f32 * th - half_h;
                on_ground = true;
            } else if move_y < 0.0 {
                resolved_y = (row + 1) as f32 * th + half_h;
            }
            resolved_move_y = 0.0;
        }
    }

    AabbResolution {
        x: resolved_x,
        y: resolved_y,
        move_x: resolved_move_x,
        move_y: resolved_move_y,
        on_ground,
    }
}

/// Walks the grid cells crossed by the segment `(x0, y0) -> (x1, y1)`.
///
/// Returns the first solid cell's entry point pulled back by [`RAY_PULLBACK`]
/// pixels, or the start point when the segment starts inside a solid cell.
pub fn raycast_tiles<G: SolidGrid + ?Sized>(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    grid: &G,
) -> Option<RayHit> {
    let tw = grid.tile_width();
    let th = grid.tile_height();
    let dx = x1 - x0;
    let dy = y1 - y0;

    let mut col = cell(x0, tw);
    let mut row = cell(y0, th);

    if dx == 0.0 && dy == 0.0 {
        return grid
            .is_solid(col, row)
            .then_some(RayHit { x: x0, y: y0, t: 0.0 });
    }

    let step_col = if dx > 0.0 { 1 } else if dx < 0.0 { -1 } else { 0 };
    let step_row = if dy > 0.0 { 1 } else if dy < 0.0 { -1 } else { 0 };

    let (mut t_max_x, t_delta_x) = if dx != 0.0 {
        let next_x = if step_col > 0 { (col + 1) as f32 * tw } else { col as f32 * tw };
        ((next_x - x0) / dx, (tw / dx).abs())
    } else {
        (f32::INFINITY, f32::INFINITY)
    };
    let (mut t_max_y, t_delta_y) = if dy != 0.0 {
        let next_y = if step_row > 0 { (row + 1) as f32 * th } else { row as f32 * th };
        ((next_y - y0) / dy, (th / dy).abs())
    } else {
        (f32::INFINITY, f32::INFINITY)
    };

    if grid.is_solid(col, row) {
        return Some(RayHit { x: x0, y: y0, t: 0.0 });
    }

    let epsilon = RAY_PULLBACK / (dx * dx + dy * dy).sqrt();

    loop {
        let t = if t_max_x < t_max_y {
            col += step_col;
            let t = t_max_x;
            t_max_x += t_delta_x;
            t
        } else {
            row += step_row;
            let t = t_max_y;
            t_max_y += t_delta_y;
            t
        };

        // Also stops on NaN input.
        if !(t <= 1.0) {
            return None;
        }

        if grid.is_solid(col, row) {
            let hit_t = (t - epsilon).max(0.0);
            return Some(RayHit {
                x: x0 + dx * hit_t,
                y: y0 + dy * hit_t,
                t: hit_t,
            });
        }
    }
}

/// Earliest `t` in `[0, 1]` at which the segment touches the circle.
///
/// A zero-length segment is a point-in-circle test. When the segment starts
/// inside the circle the exit root is returned.
pub fn segment_circle_intersect(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    cx: f32,
    cy: f32,
    r: f32,
) -> Option<f32> {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let ocx = x0 - cx;
    let ocy = y0 - cy;

    let a = dx * dx + dy * dy;
    if a == 0.0 {
        return (ocx * ocx + ocy * ocy <= r * r).then_some(0.0);
    }

    let b = 2.0 * (ocx * dx + ocy * dy);
    let c = ocx * ocx + ocy * ocy - r * r;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    if (0.0..=1.0).contains(&t1) {
        return Some(t1);
    }
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    if (0.0..=1.0).contains(&t2) {
        return Some(t2);
    }
    None
}

/// Whether an actor hit at `actor_t` takes precedence over the terrain result
/// of the same step. A missing terrain hit counts as `t = 1`.
pub fn actor_hit_wins(actor_t: f32, terrain: Option<&RayHit>) -> bool {
    actor_t <= terrain.map_or(1.0, |hit| hit.t)
}
