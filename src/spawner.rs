use bevy::prelude::*;
use rand::Rng;

use crate::{
    animation::{Animator, ClipDurations},
    config::{ConfigError, GameConfig},
    mission::{MissionRoster, MissionScoped, MissionState},
    rescue::{Character, RescueState},
    terrain::HeightField,
};

pub struct SpawnerPlugin;

impl Plugin for SpawnerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(MissionState::Running), spawn_characters_system);
    }
}

/// The stranded people, in roster order.
#[derive(Component, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Survivor {
    Steve,
    Pete,
    Kate,
}

pub static SURVIVORS: [Survivor; 3] = [Survivor::Steve, Survivor::Pete, Survivor::Kate];

impl Survivor {
    pub fn name(self) -> &'static str {
        match self {
            Survivor::Steve => "Steve",
            Survivor::Pete => "Pete",
            Survivor::Kate => "Kate",
        }
    }

    fn color(self) -> Color {
        match self {
            Survivor::Steve => Color::srgb(0.9, 0.55, 0.1),
            Survivor::Pete => Color::srgb(0.2, 0.5, 0.9),
            Survivor::Kate => Color::srgb(0.3, 0.75, 0.3),
        }
    }
}

/// The first `count` survivor profiles, or an error if there are not enough.
pub fn pick_survivors(count: usize) -> Result<&'static [Survivor], ConfigError> {
    SURVIVORS
        .get(..count)
        .ok_or(ConfigError::NotEnoughCharacters {
            requested: count,
            available: SURVIVORS.len(),
        })
}

/// A random point on gentle ground, or `None` after `attempts` misses.
pub fn find_spawn_position(
    terrain: &HeightField,
    rng: &mut impl Rng,
    attempts: u32,
    max_slope_degrees: f32,
    height_offset: f32,
) -> Option<Vec3> {
    let half = terrain.size() * 0.5;
    for _ in 0..attempts {
        let x = rng.gen_range(-half..half);
        let z = rng.gen_range(-half..half);
        if terrain.slope_degrees(x, z) < max_slope_degrees {
            return Some(Vec3::new(x, terrain.sample_height(x, z) + height_offset, z));
        }
    }
    None
}

pub fn spawn_characters_system(
    mut commands: Commands,
    config: Res<GameConfig>,
    terrain: Res<HeightField>,
    mut roster: ResMut<MissionRoster>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let survivors = match pick_survivors(config.spawner.character_count) {
        Ok(survivors) => survivors,
        Err(e) => {
            error!("{}. No characters spawned.", e);
            return;
        }
    };

    let mut rng = rand::thread_rng();
    let body = meshes.add(Capsule3d::new(0.3, 1.1));
    let durations = ClipDurations::from_config(&config);

    roster.0.clear();
    for survivor in survivors {
        let position = find_spawn_position(
            &terrain,
            &mut rng,
            config.spawner.max_spawn_attempts,
            config.spawner.max_slope_degrees,
            config.spawner.height_offset,
        )
        .unwrap_or_else(|| {
            warn!(
                "Could not find valid spawn position after {} attempts!",
                config.spawner.max_spawn_attempts
            );
            Vec3::ZERO
        });

        let entity = commands
            .spawn((
                MissionScoped,
                Character,
                *survivor,
                Name::new(survivor.name()),
                RescueState::default(),
                Animator::new(durations.clone()),
                Mesh3d(body.clone()),
                MeshMaterial3d(materials.add(survivor.color())),
                Transform::from_translation(position),
            ))
            .id();
        roster.0.push(entity);
        info!("Spawned {} at {}", survivor.name(), position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn too_many_characters_is_a_config_error() {
        assert_eq!(pick_survivors(2).unwrap(), &[Survivor::Steve, Survivor::Pete]);
        assert_eq!(pick_survivors(3).unwrap().len(), 3);
        assert!(matches!(
            pick_survivors(4),
            Err(ConfigError::NotEnoughCharacters {
                requested: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn spawns_on_flat_ground_at_surface_height() {
        let flat = HeightField::new(200.0, 5, vec![12.0; 25]);
        let mut rng = StdRng::seed_from_u64(3);

        let position = find_spawn_position(&flat, &mut rng, 100, 10.0, 0.1).unwrap();
        assert!((position.y - 12.1).abs() < 1e-4);
        assert!(position.x.abs() <= 100.0 && position.z.abs() <= 100.0);
    }

    #[test]
    fn steep_ground_exhausts_attempts() {
        // 45 degree ramp everywhere
        let mut heights = Vec::new();
        for _row in 0..5 {
            for col in 0..5 {
                heights.push(col as f32 * 25.0);
            }
        }
        let ramp = HeightField::new(100.0, 5, heights);
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(find_spawn_position(&ramp, &mut rng, 100, 10.0, 0.1), None);
    }
}
