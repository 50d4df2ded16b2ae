//! Flythroughs stored as RON.
//!
//! ```ron
//! (
//!     topology: SingleShot,
//!     end_action: Quit,
//!     frame_rate: Fps30,
//!     waypoints: [
//!         (position: (0.0, 20.0, 0.0)),
//!         (position: (50.0, 25.0, 0.0), speed: Fast, lookat: Some((60.0, 0.0, 30.0))),
//!         (position: (50.0, 30.0, 60.0), speed: Custom(7.5)),
//!     ],
//! )
//! ```
//!
//! Triggers, the target and the successor flythrough refer to entities and are
//! attached after loading.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::easing::Easing;
use crate::flythrough::{
    EndAction, Flythrough, FrameRate, LookatMode, SpeedTier, Topology, Waypoint,
};
use crate::height::{HeightCheckMode, HeightSettings, WaypointHeightCheck};

/// Errors that can occur while loading a [`FlythroughDefinition`].
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("could not read flythrough definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse flythrough definition: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid flythrough definition: {0}")]
    Validation(String),
}

/// Persisted form of a single [`Waypoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointDefinition {
    pub name: Option<String>,
    pub position: [f32; 3],
    /// Fixed lookat location. Looks along the path when absent.
    pub lookat: Option<[f32; 3]>,
    pub speed: SpeedTier,
    pub velocity_easing: Easing,
    pub position_easing: Easing,
    pub rotation_easing: Easing,
    pub height_check: WaypointHeightCheck,
}

impl Default for WaypointDefinition {
    fn default() -> Self {
        Self {
            name: None,
            position: [0.0; 3],
            lookat: None,
            speed: SpeedTier::Medium,
            velocity_easing: Easing::EaseInOut,
            position_easing: Easing::Linear,
            rotation_easing: Easing::Linear,
            height_check: WaypointHeightCheck::Inherit,
        }
    }
}

impl WaypointDefinition {
    fn to_waypoint(&self) -> Waypoint {
        let mut waypoint = Waypoint::new(Vec3::from_array(self.position))
            .with_speed(self.speed)
            .with_velocity_easing(self.velocity_easing)
            .with_position_easing(self.position_easing)
            .with_rotation_easing(self.rotation_easing)
            .with_height_check(self.height_check);
        if let Some(name) = &self.name {
            waypoint = waypoint.with_name(name.clone());
        }
        if let Some(lookat) = self.lookat {
            waypoint = waypoint.with_lookat(Vec3::from_array(lookat));
        }
        waypoint
    }
}

impl From<&Waypoint> for WaypointDefinition {
    fn from(waypoint: &Waypoint) -> Self {
        Self {
            name: (!waypoint.name.is_empty()).then(|| waypoint.name.clone()),
            position: waypoint.position.to_array(),
            lookat: (waypoint.lookat_mode == LookatMode::Target)
                .then(|| waypoint.lookat_location.to_array()),
            speed: waypoint.speed,
            velocity_easing: waypoint.velocity_easing,
            position_easing: waypoint.position_easing,
            rotation_easing: waypoint.rotation_easing,
            height_check: waypoint.height_check,
        }
    }
}

/// Persisted form of a [`Flythrough`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlythroughDefinition {
    pub topology: Topology,
    pub end_action: EndAction,
    pub frame_rate: FrameRate,
    pub height_check: HeightCheckMode,
    pub min_height_above_ground: f32,
    pub collision_height_offset: f32,
    pub rotation_damping: f32,
    pub position_damping: f32,
    pub auto_start: bool,
    pub waypoints: Vec<WaypointDefinition>,
}

impl Default for FlythroughDefinition {
    fn default() -> Self {
        let flythrough = Flythrough::default();
        Self {
            topology: flythrough.topology,
            end_action: flythrough.end_action,
            frame_rate: flythrough.frame_rate,
            height_check: flythrough.height.mode,
            min_height_above_ground: flythrough.height.min_height_above_ground,
            collision_height_offset: flythrough.height.collision_height_offset,
            rotation_damping: flythrough.rotation_damping,
            position_damping: flythrough.position_damping,
            auto_start: flythrough.auto_start,
            waypoints: Vec::new(),
        }
    }
}

impl FlythroughDefinition {
    /// Parse and validate a definition from RON text.
    pub fn from_ron(text: &str) -> Result<Self, DefinitionError> {
        let definition: Self = ron::from_str(text)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read, parse and validate a definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Serialize to pretty RON.
    pub fn to_ron(&self) -> Result<String, DefinitionError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|err| DefinitionError::Validation(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.waypoints.is_empty() {
            return Err(DefinitionError::Validation(
                "a flythrough needs at least one waypoint".into(),
            ));
        }
        for (name, value) in [
            ("rotation_damping", self.rotation_damping),
            ("position_damping", self.position_damping),
            ("min_height_above_ground", self.min_height_above_ground),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DefinitionError::Validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        for (index, waypoint) in self.waypoints.iter().enumerate() {
            if waypoint.position.iter().any(|v| !v.is_finite()) {
                return Err(DefinitionError::Validation(format!(
                    "waypoint {index} has a non-finite position"
                )));
            }
            if let SpeedTier::Custom(speed) = waypoint.speed {
                if !speed.is_finite() || speed < 0.0 {
                    return Err(DefinitionError::Validation(format!(
                        "waypoint {index} has an invalid custom speed {speed}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build an uninitialised [`Flythrough`]. The plugin initialises it on
    /// its first update.
    pub fn to_flythrough(&self) -> Flythrough {
        Flythrough::new(
            self.waypoints
                .iter()
                .map(WaypointDefinition::to_waypoint)
                .collect(),
        )
        .with_topology(self.topology)
        .with_end_action(self.end_action)
        .with_frame_rate(self.frame_rate)
        .with_height(HeightSettings {
            mode: self.height_check,
            min_height_above_ground: self.min_height_above_ground,
            collision_height_offset: self.collision_height_offset,
        })
        .with_damping(self.position_damping, self.rotation_damping)
        .with_auto_start(self.auto_start)
    }
}

impl From<&Flythrough> for FlythroughDefinition {
    fn from(flythrough: &Flythrough) -> Self {
        Self {
            topology: flythrough.topology,
            end_action: flythrough.end_action,
            frame_rate: flythrough.frame_rate,
            height_check: flythrough.height.mode,
            min_height_above_ground: flythrough.height.min_height_above_ground,
            collision_height_offset: flythrough.height.collision_height_offset,
            rotation_damping: flythrough.rotation_damping,
            position_damping: flythrough.position_damping,
            auto_start: flythrough.auto_start,
            waypoints: flythrough
                .waypoints()
                .iter()
                .map(WaypointDefinition::from)
                .collect(),
        }
    }
}
