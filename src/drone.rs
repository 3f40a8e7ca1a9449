use bevy::{prelude::*, transform::TransformSystems};

use crate::{
    config::{GameConfig, Inert},
    damage::{Crashed, DamageTracker, DroneImpact},
    mission::{MissionScoped, MissionState},
    propeller::Propeller,
    terrain::HeightField,
};

pub struct DronePlugin;

impl Plugin for DronePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera)
            .add_systems(OnEnter(MissionState::Running), spawn_drone_system)
            .add_systems(
                Update,
                (flight_control_system, flight_integration_system)
                    .chain()
                    .in_set(DroneSet),
            )
            .add_systems(PostUpdate, follow_camera_system.before(TransformSystems::Propagate));
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DroneSet;

#[derive(Component)]
pub struct Drone;

/// Linear velocity in units per second. Its presence is what makes an entity a
/// rigid body as far as the game is concerned.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity(pub Vec3);

/// Upward force applied while lift is held.
#[derive(Component, Clone, Copy, Debug)]
pub struct LiftForce(pub f32);

/// Whether lift is held this frame.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct LiftInput {
    pub spinning: bool,
}

/// Ground contact from the previous frame. Impacts are only reported on the
/// frame contact begins.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Grounded(pub bool);

#[derive(Component)]
pub struct FollowCamera;

/// Lift force mapped to [0, 1] over the configured range.
pub fn normalized_lift(lift_force: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return 0.0;
    }
    (lift_force.clamp(min, max) - min) / (max - min)
}

fn spawn_camera(mut commands: Commands) {
    commands.spawn((
        FollowCamera,
        Camera3d::default(),
        Transform::from_xyz(0.0, 60.0, 40.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

pub fn spawn_drone_system(
    mut commands: Commands,
    config: Res<GameConfig>,
    terrain: Res<HeightField>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let start = Vec3::new(0.0, terrain.sample_height(0.0, 0.0) + config.drone.spawn_height, 0.0);
    let body_material = materials.add(Color::srgb(0.15, 0.15, 0.18));
    let prop_mesh = meshes.add(Cuboid::new(1.2, 0.05, 0.12));
    let prop_material = materials.add(Color::srgb(0.8, 0.8, 0.8));

    // FL, RL, RR, FR
    let corners = [
        Vec3::new(-0.8, 0.3, -0.8),
        Vec3::new(-0.8, 0.3, 0.8),
        Vec3::new(0.8, 0.3, 0.8),
        Vec3::new(0.8, 0.3, -0.8),
    ];

    commands
        .spawn((
            MissionScoped,
            Drone,
            Name::new("Drone"),
            Velocity::default(),
            LiftForce(config.drone.min_lift_force),
            LiftInput::default(),
            Grounded::default(),
            DamageTracker::from_config(&config),
            Mesh3d(meshes.add(Cuboid::new(1.2, 0.4, 1.2))),
            MeshMaterial3d(body_material),
            Transform::from_translation(start),
        ))
        .with_children(|parent| {
            for (index, corner) in corners.into_iter().enumerate() {
                parent.spawn((
                    Propeller::new(index),
                    Mesh3d(prop_mesh.clone()),
                    MeshMaterial3d(prop_material.clone()),
                    // Propellers spin around their local Z axis, so lay it vertical.
                    Transform::from_translation(corner)
                        .with_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
                ));
            }
        });
    info!("Drone ready at {}", start);
}

pub fn flight_control_system(
    keys: Res<ButtonInput<KeyCode>>,
    config: Res<GameConfig>,
    time: Res<Time>,
    mut drones: Query<
        (&mut Velocity, &mut LiftForce, &mut LiftInput, Has<Crashed>),
        (With<Drone>, Without<Inert>),
    >,
) {
    let dt = time.delta_secs();
    for (mut velocity, mut lift, mut input, crashed) in drones.iter_mut() {
        if crashed {
            input.spinning = false;
            continue;
        }

        if keys.pressed(KeyCode::ArrowUp) {
            lift.0 += config.drone.lift_step * dt;
        }
        if keys.pressed(KeyCode::ArrowDown) {
            lift.0 -= config.drone.lift_step * dt;
        }
        lift.0 = lift.0.clamp(config.drone.min_lift_force, config.drone.max_lift_force);
        input.spinning = keys.pressed(KeyCode::Space);

        let mut direction = Vec3::ZERO;
        if keys.pressed(KeyCode::KeyW) {
            direction.z -= 1.0;
        }
        if keys.pressed(KeyCode::KeyS) {
            direction.z += 1.0;
        }
        if keys.pressed(KeyCode::KeyA) {
            direction.x -= 1.0;
        }
        if keys.pressed(KeyCode::KeyD) {
            direction.x += 1.0;
        }

        let horizontal = direction.normalize_or_zero() * config.drone.horizontal_speed;
        // Ease toward the commanded horizontal velocity.
        let blend = (4.0 * dt).min(1.0);
        velocity.0.x += (horizontal.x - velocity.0.x) * blend;
        velocity.0.z += (horizontal.z - velocity.0.z) * blend;
    }
}

pub fn flight_integration_system(
    config: Res<GameConfig>,
    time: Res<Time>,
    terrain: Option<Res<HeightField>>,
    mut impacts: MessageWriter<DroneImpact>,
    mut drones: Query<
        (Entity, &mut Transform, &mut Velocity, &LiftForce, &LiftInput, &mut Grounded),
        (With<Drone>, Without<Inert>),
    >,
) {
    let dt = time.delta_secs();
    for (entity, mut transform, mut velocity, lift, input, mut grounded) in drones.iter_mut() {
        let lift_accel = if input.spinning { lift.0 } else { 0.0 };
        velocity.0.y += (lift_accel - config.drone.gravity) * dt;
        transform.translation += velocity.0 * dt;

        let ground = terrain
            .as_ref()
            .map(|t| t.sample_height(transform.translation.x, transform.translation.z))
            .unwrap_or(0.0)
            + 0.2;

        if transform.translation.y > ground {
            grounded.0 = false;
            continue;
        }

        transform.translation.y = ground;
        if !grounded.0 {
            grounded.0 = true;
            // Ground is static, so the relative velocity is the drone's own.
            impacts.write(DroneImpact {
                drone: entity,
                relative_velocity: velocity.0.length(),
            });
        }
        velocity.0.y = velocity.0.y.max(0.0);
        velocity.0.x *= 0.8;
        velocity.0.z *= 0.8;
    }
}

fn follow_camera_system(
    drones: Query<&Transform, (With<Drone>, Without<FollowCamera>)>,
    mut cameras: Query<&mut Transform, With<FollowCamera>>,
) {
    let Some(drone) = drones.iter().next() else {
        return;
    };
    for mut camera in cameras.iter_mut() {
        let target = drone.translation + Vec3::new(0.0, 8.0, 18.0);
        camera.translation = camera.translation.lerp(target, 0.1);
        camera.look_at(drone.translation, Vec3::Y);
    }
}
