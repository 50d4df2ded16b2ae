//! # bevy_flythrough
//!
//! A Bevy plugin for camera flythroughs along smooth paths through waypoints.
//!
//! ## Features
//!
//! - Catmull-Rom paths resampled to equidistant steps, so
//!   travel speed is independent of waypoint spacing
//! - Per-waypoint speed tiers with eased speed, position and rotation
//! - Looped or single-shot paths, with stop, play-next or quit at the end
//! - Waypoints kept above terrain heightfields or avian3d colliders
//! - Triggers on segment start, update and end: animations, screen fades and
//!   control of other flythroughs
//! - Flythroughs stored as RON
//!
//! ## Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_flythrough::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(FlythroughPlugin)
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(mut commands: Commands) {
//!     let camera = commands.spawn((Camera3d::default(), Transform::default())).id();
//!
//!     commands.spawn(
//!         Flythrough::new(vec![
//!             Waypoint::new(Vec3::new(-20.0, 10.0, 0.0)),
//!             Waypoint::new(Vec3::new(0.0, 15.0, 20.0)),
//!             Waypoint::new(Vec3::new(20.0, 10.0, 0.0)).with_speed(SpeedTier::Fast),
//!         ])
//!         .with_target(camera),
//!     );
//! }
//! ```
//!
//! ## Controlling playback
//!
//! Flythroughs start on their own unless `auto_start` is cleared. Send a
//! [`FlythroughControl`](flythrough::FlythroughControl) message to start,
//! pause, resume or stop one, and read
//! [`FlythroughEvent`](flythrough::FlythroughEvent) messages to follow its
//! progress.

pub mod definition;
pub mod easing;
pub mod flythrough;
pub mod geometry;
pub mod height;
pub mod spline;
pub mod trigger;

pub use flythrough::FlythroughPlugin;

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::definition::{DefinitionError, FlythroughDefinition, WaypointDefinition};
    pub use crate::easing::Easing;
    pub use crate::flythrough::{
        EndAction, Flythrough, FlythroughCommand, FlythroughControl, FlythroughEvent,
        FlythroughEventKind, FlythroughPlugin, FrameRate, LookatMode, PlaybackState,
        ScreenFade, SpeedTier, Topology, Waypoint,
    };
    pub use crate::height::{
        HeightCheckMode, HeightSettings, Heightfield, TerrainHeights, WaypointHeightCheck,
    };
    pub use crate::trigger::{
        AnimationAction, AnimationTrigger, Fade, FadeAction, FadeTrigger, FlythroughTrigger,
        LinkedPathAction, LinkedPathTrigger, TriggerContext, TriggerPhases, WaypointTrigger,
    };
}
