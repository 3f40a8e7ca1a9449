use bevy::prelude::*;

use crate::{
    animation::{Animator, Clip},
    config::{require_collaborator, GameConfig, Inert},
    drone::Drone,
    kit::FirstAidKit,
    terrain::HeightField,
};

pub struct RescuePlugin;

impl Plugin for RescuePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (validate_character_system, rescue_system, face_and_walk_system)
                .chain()
                .in_set(RescueSet),
        );
    }
}

/// Kit systems are ordered before this set. Because they spawn through
/// `Commands`, Bevy inserts a sync point on that edge, so a kit dropped this
/// frame already exists when the rescue step looks it up.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RescueSet;

/// A stranded character waiting for a first aid kit.
#[derive(Component)]
pub struct Character;

/// Where a character is in the rescue sequence.
///
/// The targeted kit lives inside the approach variants, so a character can
/// never track more than one kit, and waving can never overlap an approach.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RescueState {
    #[default]
    Idle,
    Waving,
    Targeting(Entity),
    Turning(Entity),
    Walking(Entity),
    PickingUp(Entity),
    Saved,
}

#[derive(Clone, Debug)]
pub struct RescueSettings {
    pub detection_distance: f32,
    pub pickup_distance: f32,
    pub arrival_distance: f32,
    pub turn_complete: f32,
    pub pickup_complete: f32,
}

impl RescueSettings {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            detection_distance: config.character.detection_distance,
            pickup_distance: config.character.pickup_distance,
            arrival_distance: config.character.arrival_distance,
            turn_complete: config.character.turn_complete,
            pickup_complete: config.character.pickup_complete,
        }
    }
}

/// Everything the state machine looks at in one tick.
#[derive(Clone, Copy, Debug)]
pub struct RescueObservation {
    pub drone_distance: f32,
    /// `None` once the targeted kit no longer exists
    pub kit_distance: Option<f32>,
    pub clip: Clip,
    pub clip_progress: f32,
}

impl RescueObservation {
    fn clip_done(&self, clip: Clip, threshold: f32) -> bool {
        self.clip == clip && self.clip_progress >= threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RescueTransition {
    pub next: RescueState,
    /// Set on the `PickingUp -> Saved` step only
    pub consumed_kit: Option<Entity>,
}

impl RescueTransition {
    fn to(next: RescueState) -> Self {
        Self {
            next,
            consumed_kit: None,
        }
    }
}

impl RescueState {
    pub fn is_saved(&self) -> bool {
        matches!(self, RescueState::Saved)
    }

    pub fn target(&self) -> Option<Entity> {
        match *self {
            RescueState::Targeting(kit)
            | RescueState::Turning(kit)
            | RescueState::Walking(kit)
            | RescueState::PickingUp(kit) => Some(kit),
            RescueState::Idle | RescueState::Waving | RescueState::Saved => None,
        }
    }

    /// Hands a dropped kit to this character. Ignored once saved or while
    /// another kit is already tracked.
    pub fn assign_kit(&mut self, kit: Entity) -> bool {
        match self {
            RescueState::Idle | RescueState::Waving => {
                *self = RescueState::Targeting(kit);
                true
            }
            _ => false,
        }
    }

    /// One tick of the rescue sequence.
    pub fn advance(&self, settings: &RescueSettings, obs: &RescueObservation) -> RescueTransition {
        let state = *self;
        match state {
            RescueState::Saved => RescueTransition::to(state),
            RescueState::Idle if obs.drone_distance <= settings.detection_distance => {
                RescueTransition::to(RescueState::Waving)
            }
            RescueState::Waving if obs.drone_distance > settings.detection_distance => {
                RescueTransition::to(RescueState::Idle)
            }
            RescueState::Idle | RescueState::Waving => RescueTransition::to(state),
            RescueState::Targeting(kit)
            | RescueState::Turning(kit)
            | RescueState::Walking(kit)
            | RescueState::PickingUp(kit) => {
                let Some(kit_distance) = obs.kit_distance else {
                    return RescueTransition::to(RescueState::Idle);
                };
                if kit_distance > settings.pickup_distance {
                    return RescueTransition::to(RescueState::Idle);
                }

                match state {
                    RescueState::Targeting(_) => RescueTransition::to(RescueState::Turning(kit)),
                    RescueState::Turning(_) if obs.clip_done(Clip::TurnRight, settings.turn_complete) => {
                        RescueTransition::to(RescueState::Walking(kit))
                    }
                    RescueState::Walking(_) if kit_distance < settings.arrival_distance => {
                        RescueTransition::to(RescueState::PickingUp(kit))
                    }
                    RescueState::PickingUp(_)
                        if obs.clip_done(Clip::Pickup, settings.pickup_complete) =>
                    {
                        RescueTransition {
                            next: RescueState::Saved,
                            consumed_kit: Some(kit),
                        }
                    }
                    _ => RescueTransition::to(state),
                }
            }
        }
    }
}

fn describe(state: &RescueState) -> &'static str {
    match state {
        RescueState::Idle => "Idle",
        RescueState::Waving => "Waving",
        RescueState::Targeting(_) => "Targeting kit",
        RescueState::Turning(_) => "Turning",
        RescueState::Walking(_) => "Walking",
        RescueState::PickingUp(_) => "Picking up",
        RescueState::Saved => "Saved",
    }
}

/// The state machine cannot progress without animation-completion signals,
/// so a character without an animator never activates.
pub fn validate_character_system(
    mut commands: Commands,
    query: Query<(Entity, Option<&Name>, Has<Animator>), Added<RescueState>>,
) {
    for (entity, name, has_animator) in query.iter() {
        if let Err(e) = require_collaborator("RescueState", "Animator", has_animator) {
            match name {
                Some(name) => error!("{}. Disabling {}.", e, name),
                None => error!("{}. Disabling {:?}.", e, entity),
            }
            commands.entity(entity).insert(Inert);
        }
    }
}

pub fn rescue_system(
    mut commands: Commands,
    config: Res<GameConfig>,
    drones: Query<&Transform, With<Drone>>,
    kits: Query<&Transform, With<FirstAidKit>>,
    mut characters: Query<
        (&Name, &Transform, &Animator, &mut RescueState),
        (With<Character>, Without<Inert>),
    >,
) {
    // Nothing to wave at without a drone.
    let Some(drone) = drones.iter().next() else {
        return;
    };
    let drone_position = drone.translation;
    let settings = RescueSettings::from_config(&config);

    for (name, transform, animator, mut state) in characters.iter_mut() {
        if state.is_saved() {
            continue;
        }

        let position = transform.translation;
        let kit_distance = state
            .target()
            .and_then(|kit| kits.get(kit).ok())
            .map(|kit| position.distance(kit.translation));
        let observation = RescueObservation {
            drone_distance: position.distance(drone_position),
            kit_distance,
            clip: animator.clip(),
            clip_progress: animator.normalized_time(),
        };
        debug!(
            "{}: drone at {:.1}, kit at {:?}, {}",
            name,
            observation.drone_distance,
            observation.kit_distance,
            describe(&state)
        );

        let transition = state.advance(&settings, &observation);
        if transition.next == *state {
            continue;
        }

        if state.target().is_some() && transition.next == RescueState::Idle {
            info!("{}: kit out of reach, reset to initial state", name);
        } else {
            info!("{}: {} -> {}", name, describe(&state), describe(&transition.next));
        }
        // Deferred: the kit is still visible to later systems this frame,
        // but the character is already `Saved` and no longer looks at it.
        if let Some(kit) = transition.consumed_kit {
            commands.entity(kit).despawn();
        }
        *state = transition.next;
    }
}

/// Turning faces the kit, walking closes the distance. The engine would do
/// this with root motion; here it is a plain kinematic step.
///
/// Walking characters are kept on the terrain surface. Arrival is measured in
/// 3-D, so a character left at its spawn height could stand right over a kit
/// on higher ground and never count as arrived.
pub fn face_and_walk_system(
    config: Res<GameConfig>,
    time: Res<Time>,
    terrain: Option<Res<HeightField>>,
    kits: Query<&Transform, (With<FirstAidKit>, Without<Character>)>,
    mut characters: Query<(&RescueState, &mut Transform), (With<Character>, Without<Inert>)>,
) {
    let step = config.character.walk_speed * time.delta_secs();
    for (state, mut transform) in characters.iter_mut() {
        let (RescueState::Turning(kit) | RescueState::Walking(kit)) = *state else {
            continue;
        };
        let Ok(kit_transform) = kits.get(kit) else {
            continue;
        };

        let mut to_kit = kit_transform.translation - transform.translation;
        to_kit.y = 0.0;
        if to_kit.length() < 0.01 {
            continue;
        }

        let direction = to_kit.normalize();
        transform.look_to(direction, Vec3::Y);
        if matches!(state, RescueState::Walking(_)) {
            transform.translation += direction * step.min(to_kit.length());
            if let Some(field) = terrain.as_ref() {
                let Vec3 { x, z, .. } = transform.translation;
                transform.translation.y = field.sample_height(x, z) + config.spawner.height_offset;
            }
        }
    }
}
