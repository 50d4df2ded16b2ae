use avian3d::prelude::*;
use bevy::prelude::*;

use crate::geometry::{damp_position, damp_rotation};
use crate::height::{RayProbe, TerrainHeights, WorldGround};
use crate::trigger::{AnimationAction, Fade, FlythroughEffect};

use super::{Flythrough, FlythroughCommand, FlythroughEventKind};

/// Message asking a flythrough to change its playback.
#[derive(Message, Debug, Clone, Copy)]
pub struct FlythroughControl {
    pub flythrough: Entity,
    pub command: FlythroughCommand,
}

/// Message emitted when a flythrough starts or ends a segment, loops or finishes.
#[derive(Message, Debug, Clone, Copy)]
pub struct FlythroughEvent {
    pub flythrough: Entity,
    pub kind: FlythroughEventKind,
}

/// Screen overlay requested by fade triggers. Draw it however the app likes.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Resource, Default)]
pub struct ScreenFade {
    pub color: Color,
    /// Overlay opacity in `[0, 1]`.
    pub alpha: f32,
    fade: Option<Fade>,
}

impl Default for ScreenFade {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            alpha: 0.0,
            fade: None,
        }
    }
}

impl ScreenFade {
    /// Replace any running fade with `fade`, showing its first level right away.
    pub fn begin(&mut self, fade: Fade) {
        self.color = fade.color;
        self.alpha = fade.level();
        self.fade = (!fade.is_done()).then_some(fade);
    }

    /// Advance the running fade by `delta` seconds.
    pub fn tick(&mut self, delta: f32) {
        if let Some(fade) = &mut self.fade {
            self.alpha = fade.tick(delta);
            if fade.is_done() {
                self.fade = None;
            }
        }
    }

    /// The fade in progress, if any.
    pub fn active(&self) -> Option<&Fade> {
        self.fade.as_ref()
    }
}

/// Initialise, auto start and command flythroughs, probing colliders for heights.
pub fn control_flythroughs_with_physics(
    spatial_query: SpatialQuery,
    terrain: Res<TerrainHeights>,
    mut flythroughs: Query<(Entity, &mut Flythrough)>,
    mut controls: MessageReader<FlythroughControl>,
) {
    let probe: &dyn RayProbe = &spatial_query;
    control_flythroughs_with(&terrain, Some(probe), &mut flythroughs, &mut controls);
}

/// Initialise, auto start and command flythroughs when no physics is present.
/// Collision height checks then leave positions unchanged.
pub fn control_flythroughs(
    terrain: Res<TerrainHeights>,
    mut flythroughs: Query<(Entity, &mut Flythrough)>,
    mut controls: MessageReader<FlythroughControl>,
) {
    control_flythroughs_with(&terrain, None, &mut flythroughs, &mut controls);
}

fn control_flythroughs_with(
    terrain: &TerrainHeights,
    probe: Option<&dyn RayProbe>,
    flythroughs: &mut Query<(Entity, &mut Flythrough)>,
    controls: &mut MessageReader<FlythroughControl>,
) {
    let ground_for = |collision_height_offset: f32| WorldGround {
        terrain,
        probe,
        collision_height_offset,
    };

    for (_, mut flythrough) in flythroughs.iter_mut() {
        let ground = ground_for(flythrough.height.collision_height_offset);
        if flythrough.needs_initialise() {
            flythrough.initialise(&ground);
        }
        if flythrough.auto_start {
            flythrough.auto_start_if_due(&ground);
        }
    }

    for control in controls.read() {
        let Ok((_, mut flythrough)) = flythroughs.get_mut(control.flythrough) else {
            warn!(
                "Flythrough {} not found - ignoring {:?}",
                control.flythrough, control.command
            );
            continue;
        };
        let ground = ground_for(flythrough.height.collision_height_offset);
        flythrough.apply_command(control.command, &ground);
    }
}

/// Move every playing flythrough along its path and publish what happened.
pub fn advance_flythroughs(
    mut flythroughs: Query<(Entity, &mut Flythrough)>,
    time: Res<Time>,
    mut events: MessageWriter<FlythroughEvent>,
) {
    let delta = time.delta_secs();

    for (entity, mut flythrough) in &mut flythroughs {
        if flythrough.is_playing() {
            flythrough.advance(delta);
        }
        for kind in flythrough.drain_events() {
            events.write(FlythroughEvent {
                flythrough: entity,
                kind,
            });
        }
    }
}

/// Apply the effects requested by triggers and end actions.
pub fn apply_flythrough_effects(
    mut flythroughs: Query<&mut Flythrough>,
    mut players: Query<&mut AnimationPlayer>,
    mut fade: ResMut<ScreenFade>,
    mut controls: MessageWriter<FlythroughControl>,
    mut exit: MessageWriter<AppExit>,
) {
    for mut flythrough in &mut flythroughs {
        for effect in flythrough.drain_effects() {
            match effect {
                FlythroughEffect::Animation { player, action } => {
                    let Ok(mut player) = players.get_mut(player) else {
                        warn!("Animation player {} not found - skipping", player);
                        continue;
                    };
                    match action {
                        AnimationAction::Play(node) => {
                            player.play(node);
                        }
                        AnimationAction::Stop => {
                            player.stop_all();
                        }
                        AnimationAction::DoNothing => {}
                    }
                }
                FlythroughEffect::Fade(started) => fade.begin(started),
                FlythroughEffect::Control {
                    flythrough,
                    command,
                } => {
                    controls.write(FlythroughControl {
                        flythrough,
                        command,
                    });
                }
                FlythroughEffect::Exit => {
                    info!("Flythrough finished - exiting");
                    exit.write(AppExit::Success);
                }
            }
        }
    }
}

/// Run the screen fade started by fade triggers.
pub fn tick_screen_fade(time: Res<Time>, mut fade: ResMut<ScreenFade>) {
    if fade.active().is_some() {
        fade.tick(time.delta_secs());
    }
}

/// Write each flythrough's pose to its target, smoothing unless the pose snaps.
pub fn apply_flythrough_poses(
    mut flythroughs: Query<&mut Flythrough>,
    mut targets: Query<&mut Transform>,
    time: Res<Time>,
) {
    let delta = time.delta_secs();

    for mut flythrough in &mut flythroughs {
        let Some(target) = flythrough.target else {
            continue;
        };
        let Some(pose) = flythrough.take_pose() else {
            continue;
        };
        let Ok(mut transform) = targets.get_mut(target) else {
            warn!("Flythrough target {} has no Transform", target);
            continue;
        };

        if pose.snap {
            transform.translation = pose.position;
            transform.rotation = pose.rotation;
        } else {
            transform.translation = damp_position(
                transform.translation,
                pose.position,
                delta,
                flythrough.position_damping,
            );
            transform.rotation = damp_rotation(
                transform.rotation,
                pose.rotation,
                delta,
                flythrough.rotation_damping,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flythrough::{FrameRate, PlaybackState, SpeedTier, Topology, Waypoint};
    use crate::height::{HeightCheckMode, HeightSettings};
    use crate::trigger::{FadeAction, FadeTrigger, WaypointTrigger};

    fn app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>()
            .init_resource::<TerrainHeights>()
            .init_resource::<ScreenFade>()
            .add_message::<FlythroughControl>()
            .add_message::<FlythroughEvent>()
            .add_message::<AppExit>()
            .add_systems(
                Update,
                (
                    control_flythroughs,
                    advance_flythroughs,
                    tick_screen_fade,
                    apply_flythrough_effects,
                    apply_flythrough_poses,
                )
                    .chain(),
            );
        app
    }

    fn spawn_flythrough(app: &mut App, auto_start: bool) -> (Entity, Entity) {
        let camera = app.world_mut().spawn(Transform::default()).id();
        let flythrough = Flythrough::new(vec![
            Waypoint::new(Vec3::new(0.0, 10.0, 0.0)),
            Waypoint::new(Vec3::new(20.0, 10.0, 0.0)),
            Waypoint::new(Vec3::new(20.0, 10.0, 20.0)),
        ])
        .with_target(camera)
        .with_topology(Topology::Looped)
        .with_frame_rate(FrameRate::Fps30)
        .with_height(HeightSettings {
            mode: HeightCheckMode::None,
            ..default()
        })
        .with_auto_start(auto_start);
        let entity = app.world_mut().spawn(flythrough).id();
        (entity, camera)
    }

    #[test]
    fn test_auto_start_snaps_target() {
        let mut app = app();
        let (entity, camera) = spawn_flythrough(&mut app, true);

        app.update();

        let flythrough = app.world().get::<Flythrough>(entity).unwrap();
        assert_eq!(flythrough.state(), PlaybackState::Started);
        assert!(!flythrough.needs_initialise());
        // The first frame has already moved the cursor a little way along
        let transform = app.world().get::<Transform>(camera).unwrap();
        assert!(transform.translation.distance(Vec3::new(0.0, 10.0, 0.0)) < 1.0);
    }

    #[test]
    fn test_control_messages_drive_playback() {
        let mut app = app();
        let (entity, _) = spawn_flythrough(&mut app, false);

        app.update();
        let state = |app: &App| app.world().get::<Flythrough>(entity).unwrap().state();
        assert_eq!(state(&app), PlaybackState::Stopped);

        app.world_mut().write_message(FlythroughControl {
            flythrough: entity,
            command: FlythroughCommand::Play,
        });
        app.update();
        assert_eq!(state(&app), PlaybackState::Started);

        app.world_mut().write_message(FlythroughControl {
            flythrough: entity,
            command: FlythroughCommand::Pause,
        });
        app.update();
        assert_eq!(state(&app), PlaybackState::Paused);

        app.world_mut().write_message(FlythroughControl {
            flythrough: entity,
            command: FlythroughCommand::Stop,
        });
        app.update();
        assert_eq!(state(&app), PlaybackState::Stopped);
    }

    #[test]
    fn test_fade_effect_sets_overlay() {
        let mut app = app();
        let (entity, _) = spawn_flythrough(&mut app, false);
        let fade = Fade::start(Color::WHITE, FadeAction::FadeOut, 0.5).unwrap();
        app.world_mut()
            .get_mut::<Flythrough>(entity)
            .unwrap()
            .push_effect(FlythroughEffect::Fade(fade));

        app.update();

        let screen = app.world().resource::<ScreenFade>();
        assert_eq!(screen.color, Color::WHITE);
        assert_eq!(screen.alpha, 1.0);
        assert!(screen.active().is_some());
    }

    #[test]
    fn test_screen_fade_runs_past_its_segment() {
        let mut screen = ScreenFade::default();
        let fade = Fade::start(Color::BLACK, FadeAction::FadeIn, 1.0).unwrap();
        screen.begin(fade);
        assert_eq!(screen.alpha, 0.0);

        screen.tick(0.4);
        assert!((screen.alpha - 0.4).abs() < 1e-6);
        screen.tick(0.4);
        assert!((screen.alpha - 0.8).abs() < 1e-6);
        screen.tick(0.4);
        assert_eq!(screen.alpha, 1.0);
        assert!(screen.active().is_none());

        // Later ticks leave a finished fade alone
        screen.tick(0.4);
        assert_eq!(screen.alpha, 1.0);

        screen.begin(Fade::start(Color::WHITE, FadeAction::FadeOut, 0.0).unwrap());
        assert_eq!(screen.alpha, 0.0);
        assert!(screen.active().is_none());
    }

    #[test]
    fn test_end_fade_outlives_the_segment() {
        let mut app = app();
        let camera = app.world_mut().spawn(Transform::default()).id();
        // A long end fade on a short first segment
        let flythrough = Flythrough::new(vec![
            Waypoint::new(Vec3::ZERO)
                .with_speed(SpeedTier::ReallyFast)
                .with_trigger(WaypointTrigger::fade(
                    FadeTrigger::default()
                        .with_start(FadeAction::DoNothing, Color::BLACK, 0.0)
                        .with_end(FadeAction::FadeIn, Color::BLACK, 60.0),
                )),
            Waypoint::new(Vec3::X * 2.0).with_speed(SpeedTier::ReallyFast),
            Waypoint::new(Vec3::X * 200.0),
        ])
        .with_target(camera)
        .with_topology(Topology::SingleShot)
        .with_frame_rate(FrameRate::Fps30)
        .with_height(HeightSettings {
            mode: HeightCheckMode::None,
            ..default()
        });
        let entity = app.world_mut().spawn(flythrough).id();

        for _ in 0..30 {
            app.update();
        }

        let flythrough = app.world().get::<Flythrough>(entity).unwrap();
        assert_eq!(flythrough.current_segment(), 1);
        // Time does not advance in this app, so the fade sits at its first level
        let screen = app.world().resource::<ScreenFade>();
        let fade = screen.active().copied();
        assert!(fade.is_some_and(|fade| fade.action == FadeAction::FadeIn));
        assert_eq!(screen.alpha, 0.0);
    }
}
