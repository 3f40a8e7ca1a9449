use bevy::prelude::*;

use crate::{
    damage::DroneCrashed,
    drone::{Drone, DroneSet, Velocity},
    mission::{MissionScoped, MissionState},
};

pub struct EffectsPlugin;

impl Plugin for EffectsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WeatherStatus>()
            .add_systems(OnEnter(MissionState::Running), spawn_weather_system)
            .add_systems(
                Update,
                (
                    attach_fire_system,
                    weather_follow_system,
                    playback_visibility_system,
                    animate_effects_system,
                )
                    .chain()
                    .after(DroneSet),
            )
            .add_observer(on_drone_crashed);
    }
}

/// Above this altitude the drone counts as flying even when hovering.
const FLYING_ALTITUDE: f32 = 10.0;
const FLYING_SPEED: f32 = 0.1;

#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeatherEffect {
    Snow,
    Fog,
}

#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectPlayback {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// Flames attached to a drone, shown once it crashes.
#[derive(Component)]
pub struct CrashFire;

/// Last flying status the weather was toggled for. `halted` is set by a crash
/// and ends weather updates for the rest of the mission.
#[derive(Resource, Default, Debug)]
pub struct WeatherStatus {
    pub was_flying: Option<bool>,
    pub halted: bool,
}

pub fn is_flying(velocity: Vec3, altitude: f32) -> bool {
    velocity.length() > FLYING_SPEED || altitude > FLYING_ALTITUDE
}

/// The playback to switch to, or `None` when the flying status is unchanged.
pub fn weather_toggle(was_flying: Option<bool>, flying: bool) -> Option<EffectPlayback> {
    if was_flying == Some(flying) {
        return None;
    }
    Some(if flying {
        EffectPlayback::Playing
    } else {
        EffectPlayback::Paused
    })
}

fn spawn_weather_system(
    mut commands: Commands,
    mut status: ResMut<WeatherStatus>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    *status = WeatherStatus::default();

    let snow = materials.add(StandardMaterial {
        base_color: Color::srgba(1.0, 1.0, 1.0, 0.25),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    });
    let fog = materials.add(StandardMaterial {
        base_color: Color::srgba(0.8, 0.85, 0.9, 0.12),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    });

    commands.spawn((
        MissionScoped,
        WeatherEffect::Snow,
        EffectPlayback::Paused,
        Mesh3d(meshes.add(Cuboid::new(30.0, 20.0, 30.0))),
        MeshMaterial3d(snow),
        Transform::default(),
        Visibility::Hidden,
    ));
    commands.spawn((
        MissionScoped,
        WeatherEffect::Fog,
        EffectPlayback::Paused,
        Mesh3d(meshes.add(Sphere::new(60.0))),
        MeshMaterial3d(fog),
        Transform::default(),
        Visibility::Hidden,
    ));
}

pub fn attach_fire_system(
    mut commands: Commands,
    drones: Query<Entity, Added<Drone>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for drone in drones.iter() {
        let flame = materials.add(StandardMaterial {
            base_color: Color::srgb(1.0, 0.45, 0.05),
            emissive: LinearRgba::rgb(4.0, 1.2, 0.1),
            ..default()
        });
        let fire = commands
            .spawn((
                CrashFire,
                EffectPlayback::Stopped,
                Mesh3d(meshes.add(Sphere::new(0.6))),
                MeshMaterial3d(flame),
                Transform::from_xyz(0.0, 0.5, 0.0),
                Visibility::Hidden,
            ))
            .id();
        commands.entity(drone).add_child(fire);
    }
}

pub fn weather_follow_system(
    mut status: ResMut<WeatherStatus>,
    drones: Query<(&Transform, &Velocity), With<Drone>>,
    mut weather: Query<(&mut Transform, &mut EffectPlayback), (With<WeatherEffect>, Without<Drone>)>,
) {
    if status.halted {
        return;
    }
    let Some((drone, velocity)) = drones.iter().next() else {
        return;
    };

    let flying = is_flying(velocity.0, drone.translation.y);
    let toggle = weather_toggle(status.was_flying, flying);
    status.was_flying = Some(flying);

    for (mut transform, mut playback) in weather.iter_mut() {
        transform.translation = drone.translation;
        if let Some(next) = toggle {
            playback.set_if_neq(next);
        }
    }
}

pub fn playback_visibility_system(
    mut effects: Query<(&EffectPlayback, &mut Visibility), Changed<EffectPlayback>>,
) {
    for (playback, mut visibility) in effects.iter_mut() {
        let wanted = match playback {
            EffectPlayback::Playing | EffectPlayback::Paused => Visibility::Inherited,
            EffectPlayback::Stopped => Visibility::Hidden,
        };
        visibility.set_if_neq(wanted);
    }
}

/// Snow drifts and flames flicker while playing. Paused effects hold still.
fn animate_effects_system(
    time: Res<Time>,
    mut weather: Query<(&WeatherEffect, &EffectPlayback, &mut Transform), Without<CrashFire>>,
    mut fires: Query<(&EffectPlayback, &mut Transform), With<CrashFire>>,
) {
    let t = time.elapsed_secs();
    for (effect, playback, mut transform) in weather.iter_mut() {
        if *playback == EffectPlayback::Playing && *effect == WeatherEffect::Snow {
            transform.rotation = Quat::from_rotation_y(t * 0.2);
        }
    }
    for (playback, mut transform) in fires.iter_mut() {
        if *playback == EffectPlayback::Playing {
            transform.scale = Vec3::splat(1.0 + 0.15 * (t * 12.0).sin());
        }
    }
}

pub fn on_drone_crashed(
    crash: On<DroneCrashed>,
    mut status: ResMut<WeatherStatus>,
    mut weather: Query<&mut EffectPlayback, (With<WeatherEffect>, Without<CrashFire>)>,
    mut fires: Query<(&ChildOf, &mut EffectPlayback), With<CrashFire>>,
) {
    status.halted = true;
    for mut playback in weather.iter_mut() {
        *playback = EffectPlayback::Stopped;
    }

    let drone = crash.drone;
    let mut lit = false;
    for (child_of, mut playback) in fires.iter_mut() {
        if child_of.parent() == drone {
            *playback = EffectPlayback::Playing;
            lit = true;
        }
    }
    if !lit {
        warn!("Drone {:?} crashed without a fire effect attached", drone);
    }
}
