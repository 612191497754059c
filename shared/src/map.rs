//! Tile maps: solidity layers and spawn points.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collision::SolidGrid;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("unknown map {0}")]
    Unknown(String),
    #[error("invalid map description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("layer {layer} has {found} rows, map declares {expected}")]
    LayerShape {
        layer: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    /// Row-major tile ids, `None` for an empty cell.
    pub data: Vec<Vec<Option<u32>>>,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperties {
    #[serde(rename = "Team", default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub properties: ObjectProperties,
}

impl MapObject {
    pub fn is_spawn(&self) -> bool {
        self.kind == "Spawn"
    }
}

/// Map description as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    pub name: String,
    pub tile_width: f32,
    pub tile_height: f32,
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub objects: Vec<MapObject>,
}

/// An immutable tile grid for one round.
#[derive(Debug, Clone)]
pub struct TileMap {
    data: MapData,
}

const M1: &[&str] = &[
    "########################################",
    "#......................................#",
    "#......................................#",
    "#......................................#",
    "#......................................#",
    "#......................................#",
    "#......................................#",
    "#..........########......########......#",
    "#......................................#",
    "#......................................#",
    "#.......S...................S..........#",
    "#......................................#",
    "#.....######..............######.......#",
    "#......................................#",
    "#.................####.................#",
    "#......................................#",
    "#..A...............................B...#",
    "#......................................#",
    "#.......S................S.............#",
    "#......................................#",
    "#......................................#",
    "########################################",
];

impl TileMap {
    pub fn new(data: MapData) -> Result<Self, MapError> {
        for layer in &data.layers {
            if layer.data.len() != data.height {
                return Err(MapError::LayerShape {
                    layer: layer.name.clone(),
                    expected: data.height,
                    found: layer.data.len(),
                });
            }
        }
        Ok(Self { data })
    }

    pub fn from_json(json: &str) -> Result<Self, MapError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Builds a single-layer map from text rows.
    ///
    /// `#` is solid, `S` is a spawn, `A` and `B` are team spawns, anything else
    /// is empty. Spawn points sit at the centre of their cell.
    pub fn from_ascii(name: &str, tile_size: f32, rows: &[&str]) -> Self {
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut objects = Vec::new();
        let mut data = Vec::with_capacity(rows.len());

        for (row, line) in rows.iter().enumerate() {
            let mut cells = vec![None; width];
            for (col, c) in line.chars().enumerate() {
                let centre_x = (col as f32 + 0.5) * tile_size;
                let centre_y = (row as f32 + 0.5) * tile_size;
                match c {
                    '#' => cells[col] = Some(1),
                    'S' | 'A' | 'B' => objects.push(MapObject {
                        kind: "Spawn".to_string(),
                        x: centre_x,
                        y: centre_y,
                        properties: ObjectProperties {
                            team: (c != 'S').then(|| c.to_string()),
                        },
                    }),
                    _ => {}
                }
            }
            data.push(cells);
        }

        Self {
            data: MapData {
                name: name.to_string(),
                tile_width: tile_size,
                tile_height: tile_size,
                width,
                height: rows.len(),
                layers: vec![Layer {
                    name: "ground".to_string(),
                    visible: true,
                    data,
                }],
                objects,
            },
        }
    }

    /// Maps compiled into the binary, looked up by name.
    pub fn builtin(name: &str) -> Result<Self, MapError> {
        match name {
            "m1" => Ok(Self::from_ascii("m1", 32.0, M1)),
            other => Err(MapError::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn cols(&self) -> usize {
        self.data.width
    }

    pub fn rows(&self) -> usize {
        self.data.height
    }

    pub fn pixel_width(&self) -> f32 {
        self.data.width as f32 * self.data.tile_width
    }

    pub fn pixel_height(&self) -> f32 {
        self.data.height as f32 * self.data.tile_height
    }

    pub fn layers(&self) -> &[Layer] {
        &self.data.layers
    }

    fn in_bounds(&self, col: i32, row: i32) -> Option<(usize, usize)> {
        if col < 0 || row < 0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.data.width && row < self.data.height).then_some((col, row))
    }

    /// First non-empty tile id across visible layers.
    pub fn tile_at(&self, col: i32, row: i32) -> Option<u32> {
        let (col, row) = self.in_bounds(col, row)?;
        self.data
            .layers
            .iter()
            .filter(|layer| layer.visible)
            .find_map(|layer| layer.data[row].get(col).copied().flatten())
    }

    pub fn pixel_to_tile(&self, px: f32, py: f32) -> (i32, i32) {
        (
            (px / self.data.tile_width).floor() as i32,
            (py / self.data.tile_height).floor() as i32,
        )
    }

    /// Spawn objects, restricted to `team` when given.
    pub fn spawns(&self, team: Option<&str>) -> Vec<&MapObject> {
        self.data
            .objects
            .iter()
            .filter(|obj| obj.is_spawn())
            .filter(|obj| team.map_or(true, |t| obj.properties.team.as_deref() == Some(t)))
            .collect()
    }

    pub fn random_spawn<R: Rng + ?Sized>(&self, team: Option<&str>, rng: &mut R) -> Option<&MapObject> {
        let spawns = self.spawns(team);
        if spawns.is_empty() {
            return None;
        }
        Some(spawns[rng.gen_range(0..spawns.len())])
    }
}

impl SolidGrid for TileMap {
    fn tile_width(&self) -> f32 {
        self.data.tile_width
    }

    fn tile_height(&self) -> f32 {
        self.data.tile_height
    }

    fn is_solid(&self, col: i32, row: i32) -> bool {
        if self.in_bounds(col, row).is_none() {
            return true;
        }
        self.tile_at(col, row).is_some()
    }
}
