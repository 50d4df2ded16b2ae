//! Height checks that keep waypoints and sampled path points above the ground.
//!
//! The path engine only ever talks to a [`GroundSampler`]. Two ground sources
//! are provided: [`Heightfield`] terrains held in the [`TerrainHeights`]
//! resource, and collision probes cast straight down through a [`RayProbe`]
//! (implemented for avian3d's [`SpatialQuery`]).

use avian3d::prelude::*;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum probe distance when validating waypoint positions.
const POSITION_PROBE_DISTANCE: f32 = 10_000.0;

/// Maximum probe distance when validating lookat locations.
const LOOKAT_PROBE_DISTANCE: f32 = 2_000.0;

/// Which ground source a height check consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum HeightCheckMode {
    /// Positions are used as given.
    None,
    /// Ray cast down against physics colliders.
    Collision,
    /// Sample registered terrain heightfields.
    #[default]
    Terrain,
}

/// Per-waypoint override of the flythrough's height check mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum WaypointHeightCheck {
    /// Use the flythrough's setting.
    #[default]
    Inherit,
    /// Never adjust this waypoint.
    None,
    /// Probe colliders for this waypoint.
    Collision,
    /// Sample terrain for this waypoint.
    Terrain,
}

impl WaypointHeightCheck {
    /// Resolve against the flythrough-wide mode.
    pub fn resolve(self, inherited: HeightCheckMode) -> HeightCheckMode {
        match self {
            Self::Inherit => inherited,
            Self::None => HeightCheckMode::None,
            Self::Collision => HeightCheckMode::Collision,
            Self::Terrain => HeightCheckMode::Terrain,
        }
    }
}

/// Flythrough-wide height check configuration.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Default)]
pub struct HeightSettings {
    /// Mode used by waypoints that inherit.
    pub mode: HeightCheckMode,
    /// Minimum clearance kept between the ground and the driven object.
    pub min_height_above_ground: f32,
    /// How far above a location collision probes start.
    pub collision_height_offset: f32,
}

impl Default for HeightSettings {
    fn default() -> Self {
        Self {
            mode: HeightCheckMode::Terrain,
            min_height_above_ground: 5.0,
            collision_height_offset: 1_000.0,
        }
    }
}

/// Source of ground heights.
///
/// Must be a pure query: it is called many times per segment while step
/// tables are (re)built.
pub trait GroundSampler {
    /// Height of the ground below `position`, or `None` when nothing is found.
    fn ground_height(&self, position: Vec3, mode: HeightCheckMode, max_distance: f32)
        -> Option<f32>;
}

/// A sampler with no ground at all. Every height check passes positions through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGround;

impl GroundSampler for NoGround {
    fn ground_height(&self, _: Vec3, _: HeightCheckMode, _: f32) -> Option<f32> {
        None
    }
}

/// Something that can cast a ray straight down and report the hit height.
pub trait RayProbe {
    /// Cast from `origin` along -Y for up to `max_distance`.
    fn probe_down(&self, origin: Vec3, max_distance: f32) -> Option<f32>;
}

impl RayProbe for SpatialQuery<'_, '_> {
    fn probe_down(&self, origin: Vec3, max_distance: f32) -> Option<f32> {
        let hit = self.cast_ray(
            origin,
            Dir3::NEG_Y,
            max_distance,
            true,
            &SpatialQueryFilter::default(),
        )?;
        Some(origin.y - hit.distance)
    }
}

/// A regular grid of terrain heights covering an axis-aligned XZ rectangle.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct Heightfield {
    /// World position of the grid's minimum corner.
    pub origin: Vec3,
    /// World extent of the grid on X and Z.
    pub size: Vec2,
    /// Samples along X.
    pub columns: usize,
    /// Samples along Z.
    pub rows: usize,
    /// Row-major heights relative to `origin.y`.
    pub heights: Vec<f32>,
}

impl Heightfield {
    /// Create a heightfield. Returns `None` if the sample count does not
    /// match the grid dimensions or the grid is smaller than 2x2.
    pub fn new(origin: Vec3, size: Vec2, columns: usize, rows: usize, heights: Vec<f32>) -> Option<Self> {
        let terrain = Self {
            origin,
            size,
            columns,
            rows,
            heights,
        };
        terrain.is_valid().then_some(terrain)
    }

    /// A flat terrain at `height` covering `size` from `origin`.
    pub fn flat(origin: Vec3, size: Vec2, height: f32) -> Self {
        Self {
            origin,
            size,
            columns: 2,
            rows: 2,
            heights: vec![height; 4],
        }
    }

    /// Check the grid is at least 2x2 and has one height per sample.
    pub fn is_valid(&self) -> bool {
        self.columns >= 2 && self.rows >= 2 && self.heights.len() == self.columns * self.rows
    }

    /// Check if `position` lies over this terrain.
    pub fn contains(&self, position: Vec3) -> bool {
        let local = position - self.origin;
        local.x >= 0.0 && local.x <= self.size.x && local.z >= 0.0 && local.z <= self.size.y
    }

    /// Bilinearly sampled world height below `position`.
    ///
    /// A grid that is not [valid](Self::is_valid) has no height anywhere.
    pub fn sample_height(&self, position: Vec3) -> Option<f32> {
        if !self.is_valid() || !self.contains(position) {
            return None;
        }
        let local = position - self.origin;
        let gx = if self.size.x > 0.0 {
            local.x / self.size.x * (self.columns - 1) as f32
        } else {
            0.0
        };
        let gz = if self.size.y > 0.0 {
            local.z / self.size.y * (self.rows - 1) as f32
        } else {
            0.0
        };

        let x0 = (gx.floor() as usize).min(self.columns - 2);
        let z0 = (gz.floor() as usize).min(self.rows - 2);
        let fx = gx - x0 as f32;
        let fz = gz - z0 as f32;

        let at = |x: usize, z: usize| self.heights[z * self.columns + x];
        let near = at(x0, z0) + (at(x0 + 1, z0) - at(x0, z0)) * fx;
        let far = at(x0, z0 + 1) + (at(x0 + 1, z0 + 1) - at(x0, z0 + 1)) * fx;

        Some(self.origin.y + near + (far - near) * fz)
    }
}

/// All terrains height checks sample from.
#[derive(Resource, Debug, Clone, Default, Reflect)]
#[reflect(Resource, Default)]
pub struct TerrainHeights {
    pub terrains: Vec<Heightfield>,
}

impl TerrainHeights {
    /// Height from the first valid terrain covering `position`.
    pub fn sample(&self, position: Vec3) -> Option<f32> {
        self.terrains
            .iter()
            .find_map(|terrain| terrain.sample_height(position))
    }
}

/// The ground as seen by a running app: terrains plus an optional collision probe.
pub struct WorldGround<'a> {
    pub terrain: &'a TerrainHeights,
    pub probe: Option<&'a dyn RayProbe>,
    pub collision_height_offset: f32,
}

impl GroundSampler for WorldGround<'_> {
    fn ground_height(&self, position: Vec3, mode: HeightCheckMode, max_distance: f32) -> Option<f32> {
        match mode {
            HeightCheckMode::None => None,
            HeightCheckMode::Terrain => self.terrain.sample(position),
            HeightCheckMode::Collision => {
                let origin = position + Vec3::Y * self.collision_height_offset;
                self.probe?.probe_down(origin, max_distance)
            }
        }
    }
}

/// Height validation against a ground sampler.
///
/// Waypoint positions keep `min_height_above_ground` of clearance; lookat
/// locations only have to stay on or above the ground.
#[derive(Clone, Copy)]
pub struct HeightCheck<'a> {
    pub ground: &'a dyn GroundSampler,
    pub min_height_above_ground: f32,
}

impl<'a> HeightCheck<'a> {
    pub fn new(ground: &'a dyn GroundSampler, settings: &HeightSettings) -> Self {
        Self {
            ground,
            min_height_above_ground: settings.min_height_above_ground,
        }
    }

    /// Raise `position` so it keeps the minimum clearance above the ground.
    pub fn validate_height(&self, mut position: Vec3, mode: HeightCheckMode) -> Vec3 {
        if let Some(ground) = self.ground.ground_height(position, mode, POSITION_PROBE_DISTANCE) {
            position.y = position.y.max(ground + self.min_height_above_ground);
        }
        position
    }

    /// Place `position` at exactly the minimum clearance above the ground.
    pub fn lowest_height(&self, mut position: Vec3, mode: HeightCheckMode) -> Vec3 {
        if let Some(ground) = self.ground.ground_height(position, mode, POSITION_PROBE_DISTANCE) {
            position.y = ground + self.min_height_above_ground;
        }
        position
    }

    /// Raise a lookat location so it is not below the ground.
    pub fn validate_lookat_height(&self, mut position: Vec3, mode: HeightCheckMode) -> Vec3 {
        if let Some(ground) = self.ground.ground_height(position, mode, LOOKAT_PROBE_DISTANCE) {
            position.y = position.y.max(ground);
        }
        position
    }

    /// Place a lookat location on the ground.
    pub fn lowest_lookat_height(&self, mut position: Vec3, mode: HeightCheckMode) -> Vec3 {
        if let Some(ground) = self.ground.ground_height(position, mode, LOOKAT_PROBE_DISTANCE) {
            position.y = ground;
        }
        position
    }

    /// Height of a lookat location above the lowest valid lookat height.
    pub fn lookat_height_above_minimum(&self, position: Vec3, mode: HeightCheckMode) -> f32 {
        position.y - self.lowest_lookat_height(position, mode).y
    }
}

/// Run condition that checks if avian3d physics is available.
/// We check for the Gravity resource which is always present when PhysicsPlugins is added.
pub fn physics_available(gravity: Option<Res<Gravity>>) -> bool {
    gravity.is_some()
}
