use bevy::prelude::*;

use crate::{
    config::{GameConfig, Inert},
    drone::{Drone, DroneSet, Velocity},
    mission::{MissionRoster, MissionScoped},
    rescue::{RescueSet, RescueState},
    terrain::HeightField,
};

pub struct KitPlugin;

impl Plugin for KitPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_kit_assets).add_systems(
            Update,
            (drop_kit_system, kit_fall_system)
                .chain()
                .after(DroneSet)
                .before(RescueSet),
        );
    }
}

/// A dropped first aid kit. `collided` flips on the first ground contact
/// and never flips back.
#[derive(Component, Default, Debug)]
pub struct FirstAidKit {
    pub collided: bool,
}

#[derive(Resource)]
pub struct KitAssets {
    pub mesh: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
}

fn load_kit_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.insert_resource(KitAssets {
        mesh: meshes.add(Cuboid::new(0.6, 0.4, 0.4)),
        material: materials.add(Color::srgb(0.85, 0.1, 0.1)),
    });
}

/// The nearest candidate strictly inside `pickup_distance` of the kit.
/// Saved characters are expected to be filtered out by the caller.
pub fn closest_claimant(
    kit_position: Vec3,
    candidates: impl IntoIterator<Item = (Entity, Vec3, f32)>,
) -> Option<Entity> {
    candidates
        .into_iter()
        .map(|(entity, position, pickup_distance)| {
            (entity, position.distance(kit_position), pickup_distance)
        })
        .filter(|(_, distance, pickup_distance)| distance < pickup_distance)
        .min_by(|(_, a, _), (_, b, _)| a.total_cmp(b))
        .map(|(entity, _, _)| entity)
}

/// Enter drops a kit under the drone, carrying the drone's momentum, and hands
/// it to the closest unsaved character in reach.
pub fn drop_kit_system(
    mut commands: Commands,
    keys: Res<ButtonInput<KeyCode>>,
    config: Res<GameConfig>,
    assets: Res<KitAssets>,
    roster: Res<MissionRoster>,
    drones: Query<(&Transform, Option<&Velocity>), (With<Drone>, Without<Inert>)>,
    mut characters: Query<(&Name, &Transform, &mut RescueState), Without<Inert>>,
) {
    if !keys.just_pressed(KeyCode::Enter) {
        return;
    }
    let Some((drone_transform, drone_velocity)) = drones.iter().next() else {
        return;
    };

    let drop_point = drone_transform.translation - Vec3::Y * config.drone.drop_offset;
    let velocity = drone_velocity.map(|v| v.0).unwrap_or(Vec3::ZERO);
    let kit = commands
        .spawn((
            MissionScoped,
            Name::new("First Aid Kit"),
            FirstAidKit::default(),
            Velocity(velocity),
            Mesh3d(assets.mesh.clone()),
            MeshMaterial3d(assets.material.clone()),
            Transform::from_translation(drop_point),
        ))
        .id();
    info!("Dropped first aid kit at {}", drop_point);

    let pickup_distance = config.character.pickup_distance;
    let candidates = roster.0.iter().filter_map(|entity| {
        let (_, transform, state) = characters.get(*entity).ok()?;
        (!state.is_saved()).then_some((*entity, transform.translation, pickup_distance))
    });
    let Some(claimant) = closest_claimant(drop_point, candidates.collect::<Vec<_>>()) else {
        return;
    };

    if let Ok((name, _, mut state)) = characters.get_mut(claimant) {
        if state.assign_kit(kit) {
            info!("{} is going for the kit", name);
        }
    }
}

/// Kits fall until they hit the ground. A hard landing breaks them.
pub fn kit_fall_system(
    mut commands: Commands,
    config: Res<GameConfig>,
    time: Res<Time>,
    terrain: Option<Res<HeightField>>,
    mut kits: Query<(Entity, &mut Transform, &mut Velocity, &mut FirstAidKit)>,
) {
    let dt = time.delta_secs();
    for (entity, mut transform, mut velocity, mut kit) in kits.iter_mut() {
        let ground = terrain
            .as_ref()
            .map(|t| t.sample_height(transform.translation.x, transform.translation.z))
            .unwrap_or(0.0)
            + 0.2;

        if transform.translation.y > ground {
            velocity.0.y -= config.drone.gravity * dt;
            transform.translation += velocity.0 * dt;
        }
        if transform.translation.y > ground {
            continue;
        }

        transform.translation.y = ground;
        if !kit.collided {
            kit.collided = true;
            let impact = velocity.0.length();
            debug!("Kit impact velocity: {:.2}", impact);
            if impact > config.kit.break_velocity {
                info!("Kit broke on impact ({:.2})", impact);
                commands.entity(entity).despawn();
                continue;
            }
        }
        velocity.0 = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> [Entity; 3] {
        let mut world = World::new();
        [
            world.spawn_empty().id(),
            world.spawn_empty().id(),
            world.spawn_empty().id(),
        ]
    }

    #[test]
    fn nearest_in_reach_wins() {
        let [a, b, c] = ids();
        let claimant = closest_claimant(
            Vec3::ZERO,
            [
                (a, Vec3::new(8.0, 0.0, 0.0), 10.0),
                (b, Vec3::new(0.0, 0.0, 3.0), 10.0),
                (c, Vec3::new(30.0, 0.0, 0.0), 10.0),
            ],
        );
        assert_eq!(claimant, Some(b));
    }

    #[test]
    fn reach_is_strict() {
        let [a, ..] = ids();
        assert_eq!(
            closest_claimant(Vec3::ZERO, [(a, Vec3::new(10.0, 0.0, 0.0), 10.0)]),
            None
        );
        assert_eq!(closest_claimant(Vec3::ZERO, []), None);
    }

    fn fall_app() -> App {
        let mut app = App::new();
        app.insert_resource(GameConfig::default())
            .init_resource::<Time>()
            .add_systems(Update, kit_fall_system);
        app
    }

    #[test]
    fn hard_landing_destroys_the_kit() {
        let mut app = fall_app();
        let kit = app
            .world_mut()
            .spawn((
                FirstAidKit::default(),
                Velocity(Vec3::new(0.0, -12.0, 0.0)),
                Transform::from_xyz(0.0, 0.1, 0.0),
            ))
            .id();

        app.update();
        assert!(app.world().get_entity(kit).is_err());
    }

    #[test]
    fn soft_landing_keeps_the_kit() {
        let mut app = fall_app();
        let kit = app
            .world_mut()
            .spawn((
                FirstAidKit::default(),
                Velocity(Vec3::new(1.0, -2.0, 0.0)),
                Transform::from_xyz(0.0, 0.1, 0.0),
            ))
            .id();

        app.update();
        let world = app.world();
        assert!(world.get::<FirstAidKit>(kit).unwrap().collided);
        assert_eq!(world.get::<Velocity>(kit).unwrap().0, Vec3::ZERO);
        assert_eq!(world.get::<Transform>(kit).unwrap().translation.y, 0.2);
    }

    fn drop_app() -> App {
        let mut app = App::new();
        app.insert_resource(GameConfig::default())
            .insert_resource(KitAssets {
                mesh: Handle::default(),
                material: Handle::default(),
            })
            .init_resource::<MissionRoster>()
            .init_resource::<ButtonInput<KeyCode>>()
            .add_systems(Update, drop_kit_system);
        app.world_mut()
            .spawn((Drone, Transform::from_xyz(0.0, 2.0, 0.0), Velocity(Vec3::X)));
        app
    }

    fn press_enter(app: &mut App) {
        let mut keys = app.world_mut().resource_mut::<ButtonInput<KeyCode>>();
        keys.release(KeyCode::Enter);
        keys.clear();
        keys.press(KeyCode::Enter);
    }

    fn character(app: &mut App, name: &str, x: f32, state: RescueState) -> Entity {
        let entity = app
            .world_mut()
            .spawn((Name::new(name.to_string()), Transform::from_xyz(x, 0.0, 0.0), state))
            .id();
        app.world_mut().resource_mut::<MissionRoster>().0.push(entity);
        entity
    }

    fn kits(app: &mut App) -> Vec<(Entity, Vec3, Vec3)> {
        let mut query = app
            .world_mut()
            .query_filtered::<(Entity, &Transform, &Velocity), With<FirstAidKit>>();
        query
            .iter(app.world())
            .map(|(entity, transform, velocity)| (entity, transform.translation, velocity.0))
            .collect()
    }

    fn state(app: &App, entity: Entity) -> RescueState {
        *app.world().get::<RescueState>(entity).unwrap()
    }

    #[test]
    fn no_kit_without_enter() {
        let mut app = drop_app();
        app.update();
        assert!(kits(&mut app).is_empty());
    }

    #[test]
    fn kit_drops_under_the_drone_with_its_momentum() {
        let mut app = drop_app();
        press_enter(&mut app);
        app.update();

        let dropped = kits(&mut app);
        assert_eq!(dropped.len(), 1);
        let (_, position, velocity) = dropped[0];
        assert_eq!(position, Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(velocity, Vec3::X);
    }

    #[test]
    fn saved_characters_are_never_offered_a_kit() {
        let mut app = drop_app();
        let saved = character(&mut app, "Kate", 1.0, RescueState::Saved);
        let waiting = character(&mut app, "Pete", 4.0, RescueState::Waving);

        press_enter(&mut app);
        app.update();

        let kit = kits(&mut app)[0].0;
        assert_eq!(state(&app, saved), RescueState::Saved);
        assert_eq!(state(&app, waiting), RescueState::Targeting(kit));
    }

    #[test]
    fn first_kit_is_kept_when_another_drops() {
        let mut app = drop_app();
        let steve = character(&mut app, "Steve", 2.0, RescueState::Idle);

        press_enter(&mut app);
        app.update();
        let first = state(&app, steve).target().unwrap();

        press_enter(&mut app);
        app.update();

        assert_eq!(kits(&mut app).len(), 2);
        assert_eq!(state(&app, steve), RescueState::Targeting(first));
    }

    #[test]
    fn characters_out_of_reach_are_left_alone() {
        let mut app = drop_app();
        let far = character(&mut app, "Pete", 30.0, RescueState::Idle);

        press_enter(&mut app);
        app.update();

        assert_eq!(kits(&mut app).len(), 1);
        assert_eq!(state(&app, far), RescueState::Idle);
    }
}
