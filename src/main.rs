//! Example flythrough over a small scene.
//!
//! Run with: `cargo run`, or `cargo run -- path/to/flythrough.ron` to fly a
//! stored definition instead of the built-in tour.

use bevy::prelude::*;
use bevy_flythrough::prelude::*;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(FlythroughPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_hotkeys, sync_fade_overlay, show_help))
        .run();
}

/// Full-screen node tinted from [`ScreenFade`].
#[derive(Component)]
struct FadeOverlay;

/// The flythrough the hotkeys control.
#[derive(Resource)]
struct Tour(Entity);

fn built_in_tour() -> Flythrough {
    Flythrough::new(vec![
        Waypoint::new(Vec3::new(-40.0, 12.0, -40.0))
            .with_name("Gate")
            .with_trigger(WaypointTrigger::fade(FadeTrigger::default().with_start(
                FadeAction::FadeOut,
                Color::BLACK,
                1.5,
            ))),
        Waypoint::new(Vec3::new(0.0, 8.0, -55.0)).with_speed(SpeedTier::Fast),
        Waypoint::new(Vec3::new(45.0, 20.0, -20.0)).with_lookat(Vec3::ZERO),
        Waypoint::new(Vec3::new(30.0, 6.0, 35.0)).with_speed(SpeedTier::Slow),
        Waypoint::new(Vec3::new(-25.0, 15.0, 40.0))
            .with_speed(SpeedTier::ReallyFast)
            .with_rotation_easing(Easing::EaseInOut),
    ])
    .with_topology(Topology::Looped)
}

fn load_tour() -> Flythrough {
    let Some(path) = std::env::args().nth(1) else {
        return built_in_tour();
    };
    match FlythroughDefinition::load(&path) {
        Ok(definition) => {
            info!("Loaded flythrough from {}", path);
            definition.to_flythrough()
        }
        Err(err) => {
            error!("{err} - flying the built-in tour instead");
            built_in_tour()
        }
    }
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut terrain: ResMut<TerrainHeights>,
) {
    let camera = commands
        .spawn((
            Camera3d::default(),
            Transform::from_xyz(0.0, 30.0, 80.0).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id();

    commands.insert_resource(GlobalAmbientLight {
        color: Color::WHITE,
        brightness: 500.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(40.0, 80.0, 40.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Ground, with a matching heightfield for height checks
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(200.0, 200.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.3, 0.5, 0.3))),
    ));
    terrain.terrains.push(Heightfield::flat(
        Vec3::new(-100.0, 0.0, -100.0),
        Vec2::splat(200.0),
        0.0,
    ));

    // Landmarks
    let pillar = meshes.add(Cuboid::new(4.0, 20.0, 4.0));
    let stone = materials.add(Color::srgb(0.7, 0.7, 0.75));
    for position in [
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::new(-30.0, 10.0, 10.0),
        Vec3::new(25.0, 10.0, -30.0),
        Vec3::new(15.0, 10.0, 25.0),
    ] {
        commands.spawn((
            Mesh3d(pillar.clone()),
            MeshMaterial3d(stone.clone()),
            Transform::from_translation(position),
        ));
    }

    commands.spawn((
        Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            position_type: PositionType::Absolute,
            ..default()
        },
        BackgroundColor(Color::NONE),
        FadeOverlay,
    ));

    let tour = commands.spawn(load_tour().with_target(camera)).id();
    commands.insert_resource(Tour(tour));
}

fn handle_hotkeys(
    keyboard: Res<ButtonInput<KeyCode>>,
    tour: Res<Tour>,
    flythroughs: Query<&Flythrough>,
    mut controls: MessageWriter<FlythroughControl>,
) {
    let Ok(flythrough) = flythroughs.get(tour.0) else {
        return;
    };

    let command = if keyboard.just_pressed(KeyCode::Space) {
        match flythrough.state() {
            PlaybackState::Started => Some(FlythroughCommand::Pause),
            _ => Some(FlythroughCommand::Play),
        }
    } else if keyboard.just_pressed(KeyCode::KeyR) {
        Some(FlythroughCommand::Start {
            full_initialise: true,
        })
    } else if keyboard.just_pressed(KeyCode::Escape) {
        Some(FlythroughCommand::Stop)
    } else {
        None
    };

    if let Some(command) = command {
        controls.write(FlythroughControl {
            flythrough: tour.0,
            command,
        });
    }
}

fn sync_fade_overlay(
    fade: Res<ScreenFade>,
    mut overlays: Query<&mut BackgroundColor, With<FadeOverlay>>,
) {
    if !fade.is_changed() {
        return;
    }
    for mut background in &mut overlays {
        background.0 = fade.color.with_alpha(fade.alpha);
    }
}

fn show_help(keyboard: Res<ButtonInput<KeyCode>>, mut shown: Local<bool>) {
    if keyboard.just_pressed(KeyCode::KeyH) {
        *shown = !*shown;
        if *shown {
            println!("\n=== Flythrough Help ===");
            println!("  H      - Toggle this help");
            println!("  Space  - Pause / resume");
            println!("  R      - Restart from the first waypoint");
            println!("  Escape - Stop");
            println!("=======================\n");
        }
    }
}
