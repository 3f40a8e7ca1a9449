use bevy::prelude::*;

use crate::{
    config::{ConfigError, GameConfig},
    drone::{normalized_lift, Drone, DroneSet, LiftForce, LiftInput},
};

pub struct PropellerPlugin;

impl Plugin for PropellerPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<PropellerSound>().add_systems(
            Update,
            (validate_rig_system, spin_propellers_system)
                .chain()
                .after(DroneSet),
        );
    }
}

pub const PROPELLER_COUNT: usize = 4;

/// Sound request for the propeller loop, written every frame.
#[derive(Message, Clone, Copy, Debug)]
pub struct PropellerSound {
    pub spinning: bool,
    pub normalized_speed: f32,
}

/// One rotor. Index order is FL, RL, RR, FR.
#[derive(Component, Clone, Debug)]
pub struct Propeller {
    pub index: usize,
    /// Degrees per second, signed by direction
    speed: f32,
    damp_velocity: f32,
}

impl Propeller {
    pub fn new(index: usize) -> Self {
        Propeller {
            index,
            speed: 0.0,
            damp_velocity: 0.0,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

/// Present on a drone whose rotors passed validation.
#[derive(Component, Clone, Debug, Default)]
pub struct PropellerRig {
    pub average_speed: f32,
}

/// +1 or -1 per rotor. Alternating pairs FL/RR against RL/FR.
pub fn direction_multipliers(alternate: bool) -> [f32; PROPELLER_COUNT] {
    if alternate {
        [1.0, -1.0, 1.0, -1.0]
    } else {
        [1.0; PROPELLER_COUNT]
    }
}

/// Critically damped approach of `current` toward `target`, the usual game
/// engine "smooth damp". `velocity` carries state between calls.
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }

    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;

    // Never overshoot the target.
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = 0.0;
    }
    output
}

pub fn validate_rig_system(
    mut commands: Commands,
    drones: Query<(Entity, Option<&Children>), Added<Drone>>,
    propellers: Query<&Propeller>,
) {
    for (drone, children) in drones.iter() {
        let found = children
            .map(|children| children.iter().filter(|c| propellers.contains(*c)).count())
            .unwrap_or(0);

        if found == PROPELLER_COUNT {
            commands.entity(drone).insert(PropellerRig::default());
        } else {
            let e = ConfigError::InvalidPropellerRig { found };
            error!("{}. Propellers disabled on {:?}.", e, drone);
        }
    }
}

pub fn spin_propellers_system(
    config: Res<GameConfig>,
    time: Res<Time>,
    mut sound: MessageWriter<PropellerSound>,
    mut drones: Query<(&LiftForce, &LiftInput, &Children, &mut PropellerRig), With<Drone>>,
    mut propellers: Query<(&mut Propeller, &mut Transform)>,
) {
    let dt = time.delta_secs();
    let directions = direction_multipliers(config.propeller.alternate_directions);

    for (lift, input, children, mut rig) in drones.iter_mut() {
        let normalized = normalized_lift(
            lift.0,
            config.drone.min_lift_force,
            config.drone.max_lift_force,
        );
        let target = if input.spinning {
            normalized * config.propeller.max_rotation_speed
        } else {
            0.0
        };

        let mut total = 0.0;
        let mut count = 0;
        for child in children.iter() {
            let Ok((mut propeller, mut transform)) = propellers.get_mut(child) else {
                continue;
            };

            let mut damp_velocity = propeller.damp_velocity;
            propeller.speed = smooth_damp(
                propeller.speed,
                target,
                &mut damp_velocity,
                config.propeller.spin_smooth_time,
                dt,
            );
            propeller.damp_velocity = damp_velocity;

            let direction = directions[propeller.index % PROPELLER_COUNT];
            let angle = (propeller.speed * dt * direction).to_radians();
            transform.rotate_local_z(angle);

            total += propeller.speed.abs();
            count += 1;
        }
        rig.average_speed = if count > 0 { total / count as f32 } else { 0.0 };

        sound.write(PropellerSound {
            spinning: input.spinning,
            normalized_speed: normalized,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_damp_converges_without_overshoot() {
        let mut velocity = 0.0;
        let mut speed = 0.0;
        for _ in 0..240 {
            speed = smooth_damp(speed, 1200.0, &mut velocity, 0.15, 1.0 / 60.0);
            assert!(speed <= 1200.0);
        }
        assert!((speed - 1200.0).abs() < 1.0);

        for _ in 0..240 {
            speed = smooth_damp(speed, 0.0, &mut velocity, 0.15, 1.0 / 60.0);
            assert!(speed >= 0.0);
        }
        assert!(speed.abs() < 1.0);
    }

    #[test]
    fn smooth_damp_is_idle_without_time() {
        let mut velocity = 3.0;
        assert_eq!(smooth_damp(10.0, 100.0, &mut velocity, 0.15, 0.0), 10.0);
        assert_eq!(velocity, 3.0);
    }

    #[test]
    fn alternating_directions() {
        assert_eq!(direction_multipliers(true), [1.0, -1.0, 1.0, -1.0]);
        assert_eq!(direction_multipliers(false), [1.0; 4]);
    }

    fn rig_app(propeller_count: usize) -> (App, Entity) {
        let mut app = App::new();
        app.add_systems(Update, validate_rig_system);
        let drone = app
            .world_mut()
            .spawn(Drone)
            .with_children(|parent| {
                for index in 0..propeller_count {
                    parent.spawn(Propeller::new(index));
                }
            })
            .id();
        (app, drone)
    }

    #[test]
    fn four_rotors_activate_the_rig() {
        let (mut app, drone) = rig_app(4);
        app.update();
        assert!(app.world().entity(drone).contains::<PropellerRig>());
    }

    #[test]
    fn wrong_rotor_count_disables_the_rig() {
        let (mut app, drone) = rig_app(3);
        app.update();
        assert!(!app.world().entity(drone).contains::<PropellerRig>());
    }
}
