//! Camera flythroughs along Catmull-Rom paths through ordered waypoints.
//!
//! A [`Flythrough`] component owns its waypoints and a playback cursor. Each
//! frame the cursor advances along the current segment at the speed eased
//! between the segment's waypoints, and the resulting pose is written to the
//! target entity's [`Transform`], damped unless the pose snaps.
//!
//! # Example
//!
//! ```rust,ignore
//! use bevy::prelude::*;
//! use bevy_flythrough::prelude::*;
//!
//! fn setup(mut commands: Commands) {
//!     let camera = commands.spawn((Camera3d::default(), Transform::default())).id();
//!
//!     commands.spawn(
//!         Flythrough::new(vec![
//!             Waypoint::new(Vec3::new(0.0, 20.0, 0.0)),
//!             Waypoint::new(Vec3::new(40.0, 25.0, 10.0)).with_speed(SpeedTier::Fast),
//!             Waypoint::new(Vec3::new(20.0, 30.0, 50.0)).with_lookat(Vec3::ZERO),
//!         ])
//!         .with_target(camera)
//!         .with_topology(Topology::Looped),
//!     );
//! }
//! ```

mod manager;
mod systems;
mod waypoint;

pub use manager::*;
pub use systems::*;
pub use waypoint::*;

use bevy::prelude::*;

use crate::height::{physics_available, TerrainHeights};

/// Plugin that drives [`Flythrough`] components.
///
/// Collision height checks use avian3d when its physics plugins are added;
/// without them only terrain height checks take effect.
pub struct FlythroughPlugin;

impl Plugin for FlythroughPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Flythrough>()
            .register_type::<Waypoint>()
            .register_type::<Topology>()
            .register_type::<EndAction>()
            .register_type::<FrameRate>()
            .register_type::<PlaybackState>()
            .register_type::<SpeedTier>()
            .register_type::<LookatMode>()
            .register_type::<TerrainHeights>()
            .register_type::<ScreenFade>()
            .init_resource::<TerrainHeights>()
            .init_resource::<ScreenFade>()
            .add_message::<FlythroughControl>()
            .add_message::<FlythroughEvent>()
            .add_systems(
                Update,
                (
                    (
                        systems::control_flythroughs_with_physics.run_if(physics_available),
                        systems::control_flythroughs.run_if(not(physics_available)),
                    ),
                    systems::advance_flythroughs,
                    systems::tick_screen_fade,
                    systems::apply_flythrough_effects,
                    systems::apply_flythrough_poses,
                )
                    .chain(),
            );
    }
}
