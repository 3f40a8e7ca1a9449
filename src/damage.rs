use std::time::Duration;

use bevy::prelude::*;

use crate::{
    config::{require_collaborator, GameConfig, Inert},
    drone::Velocity,
};

pub struct DamagePlugin;

impl Plugin for DamagePlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<DroneImpact>().add_systems(
            Update,
            (validate_drone_system, immunity_timer_system, apply_impacts_system)
                .chain()
                .after(crate::drone::DroneSet),
        );
    }
}

/// Collision input: the drone touched something at `relative_velocity`.
///
/// A buffered message rather than an observer event: the flight step writes
/// it and `apply_impacts_system` drains it with a `MessageReader` later in the
/// same frame, in order.
#[derive(Message, Clone, Copy, Debug)]
pub struct DroneImpact {
    pub drone: Entity,
    pub relative_velocity: f32,
}

/// Fired once per drone, on the hit that saturates the hit count.
#[derive(Event, Clone, Copy, Debug)]
pub struct DroneCrashed {
    pub drone: Entity,
}

/// Marker added alongside the crash so other systems can filter on it.
#[derive(Component)]
pub struct Crashed;

#[derive(Clone, Debug)]
pub enum DroneCondition {
    Normal,
    Immune(Timer),
    Crashed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpactOutcome {
    Ignored,
    Damaged { hits: u32 },
    Crashed,
}

/// Counts hard impacts, grants timed immunity after each one and declares a
/// crash when the hit count reaches `max_hits`.
#[derive(Component, Clone, Debug)]
pub struct DamageTracker {
    hits: u32,
    max_hits: u32,
    damage_velocity_threshold: f32,
    immunity_duration: f32,
    condition: DroneCondition,
}

impl DamageTracker {
    pub fn new(max_hits: u32, damage_velocity_threshold: f32, immunity_duration: f32) -> Self {
        DamageTracker {
            hits: 0,
            max_hits,
            damage_velocity_threshold,
            immunity_duration,
            condition: DroneCondition::Normal,
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(
            config.drone.max_hits,
            config.drone.damage_velocity_threshold,
            config.drone.immunity_duration,
        )
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn max_hits(&self) -> u32 {
        self.max_hits
    }

    pub fn is_immune(&self) -> bool {
        matches!(self.condition, DroneCondition::Immune(_))
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self.condition, DroneCondition::Crashed)
    }

    pub fn on_impact(&mut self, relative_velocity: f32) -> ImpactOutcome {
        if !matches!(self.condition, DroneCondition::Normal) {
            return ImpactOutcome::Ignored;
        }
        if relative_velocity <= self.damage_velocity_threshold {
            return ImpactOutcome::Ignored;
        }

        self.hits += 1;
        if self.hits >= self.max_hits {
            self.hits = self.max_hits;
            self.condition = DroneCondition::Crashed;
            ImpactOutcome::Crashed
        } else {
            self.condition = DroneCondition::Immune(Timer::from_seconds(
                self.immunity_duration,
                TimerMode::Once,
            ));
            ImpactOutcome::Damaged { hits: self.hits }
        }
    }

    /// Advances the immunity window. Returns true on the frame immunity ends.
    pub fn tick(&mut self, delta: Duration) -> bool {
        let DroneCondition::Immune(timer) = &mut self.condition else {
            return false;
        };

        timer.tick(delta);
        if timer.is_finished() {
            self.condition = DroneCondition::Normal;
            true
        } else {
            false
        }
    }
}

/// A drone without a rigid body can never be hit, so refuse to run it at all.
pub fn validate_drone_system(
    mut commands: Commands,
    query: Query<(Entity, Has<Velocity>), Added<DamageTracker>>,
) {
    for (entity, has_velocity) in query.iter() {
        if let Err(e) = require_collaborator("DamageTracker", "Velocity", has_velocity) {
            error!("{}. Disabling drone {:?}.", e, entity);
            commands.entity(entity).insert(Inert);
        }
    }
}

pub fn immunity_timer_system(
    mut query: Query<&mut DamageTracker, Without<Inert>>,
    time: Res<Time>,
) {
    for mut tracker in query.iter_mut() {
        if tracker.tick(time.delta()) {
            info!("Drone is no longer immune.");
        }
    }
}

pub fn apply_impacts_system(
    mut commands: Commands,
    mut impacts: MessageReader<DroneImpact>,
    mut query: Query<&mut DamageTracker, Without<Inert>>,
) {
    for impact in impacts.read() {
        let Ok(mut tracker) = query.get_mut(impact.drone) else {
            continue;
        };

        match tracker.on_impact(impact.relative_velocity) {
            ImpactOutcome::Ignored => {}
            ImpactOutcome::Damaged { hits } => {
                info!(
                    "Drone hit! Total hits: {}. Immune for {} seconds.",
                    hits, tracker.immunity_duration
                );
            }
            ImpactOutcome::Crashed => {
                // `trigger` runs every `On<DroneCrashed>` observer (mission
                // failure, crash fire) when commands are applied, not on
                // some later frame. Crashed trackers ignore further impacts,
                // so this branch is reached once per drone.
                info!("Drone hit! Total hits: {}. Mission Failed !", tracker.hits());
                commands.entity(impact.drone).insert(Crashed);
                commands.trigger(DroneCrashed {
                    drone: impact.drone,
                });
            }
        }
    }
}
