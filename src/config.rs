use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreStartup, load_config_system);
    }
}

/// Problems that stop a component from activating.
///
/// Gameplay code never retries on these: the owning entity is marked `Inert`
/// and the error is logged once.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{component}: required {collaborator} is missing")]
    MissingCollaborator {
        component: &'static str,
        collaborator: &'static str,
    },
    #[error("not enough character profiles: {requested} requested, {available} available")]
    NotEnoughCharacters { requested: usize, available: usize },
    #[error("propeller rig must have exactly 4 propellers, found {found}")]
    InvalidPropellerRig { found: usize },
    #[error("invalid config value {field} = {value}")]
    InvalidValue { field: &'static str, value: f32 },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Marker: the entity failed activation and every gameplay system skips it.
#[derive(Component)]
pub struct Inert;

/// Turns a missing capability into a `ConfigError`.
pub fn require_collaborator(
    component: &'static str,
    collaborator: &'static str,
    present: bool,
) -> Result<(), ConfigError> {
    if present {
        Ok(())
    } else {
        Err(ConfigError::MissingCollaborator {
            component,
            collaborator,
        })
    }
}

/// All gameplay tunables, loaded once from `rescue_config.ron`.
///
/// Every section is `#[serde(default)]`, so a file only needs the values it
/// wants to change.
#[derive(Resource, Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GameConfig {
    pub drone: DroneConfig,
    pub character: CharacterConfig,
    pub kit: KitConfig,
    pub mission: MissionConfig,
    pub spawner: SpawnerConfig,
    pub terrain: TerrainConfig,
    pub hud: HudConfig,
    pub propeller: PropellerConfig,
    pub audio: AudioConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DroneConfig {
    pub max_hits: u32,
    pub damage_velocity_threshold: f32,
    /// Seconds
    pub immunity_duration: f32,
    pub gravity: f32,
    pub min_lift_force: f32,
    pub max_lift_force: f32,
    /// Lift force change per second while Up/Down is held
    pub lift_step: f32,
    pub horizontal_speed: f32,
    pub drop_offset: f32,
    pub spawn_height: f32,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            max_hits: 3,
            damage_velocity_threshold: 3.0,
            immunity_duration: 5.0,
            gravity: 9.81,
            min_lift_force: 5.0,
            max_lift_force: 25.0,
            lift_step: 10.0,
            horizontal_speed: 12.0,
            drop_offset: 1.5,
            spawn_height: 30.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CharacterConfig {
    pub detection_distance: f32,
    pub pickup_distance: f32,
    pub arrival_distance: f32,
    /// Normalized progress of the turn clip that counts as "done"
    pub turn_complete: f32,
    pub pickup_complete: f32,
    pub walk_speed: f32,
    pub turn_duration: f32,
    pub pickup_duration: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            detection_distance: 50.0,
            pickup_distance: 10.0,
            arrival_distance: 1.0,
            turn_complete: 0.9,
            pickup_complete: 0.95,
            walk_speed: 1.2,
            turn_duration: 1.2,
            pickup_duration: 2.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KitConfig {
    pub break_velocity: f32,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            break_velocity: 8.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MissionConfig {
    /// Seconds between a mission outcome and the restart
    pub outcome_delay: f32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            outcome_delay: 10.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SpawnerConfig {
    pub character_count: usize,
    pub max_spawn_attempts: u32,
    pub max_slope_degrees: f32,
    pub height_offset: f32,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            character_count: 3,
            max_spawn_attempts: 100,
            max_slope_degrees: 10.0,
            height_offset: 0.1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TerrainConfig {
    pub size: f32,
    /// Grid points per side, shared by the height field and the alphamap
    pub resolution: usize,
    pub max_height: f32,
    pub height_noise_scale: f32,
    pub texture_noise_scale: f32,
    pub snow_bias: f32,
    pub seed: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: 1000.0,
            resolution: 129,
            max_height: 60.0,
            height_noise_scale: 0.004,
            texture_noise_scale: 0.05,
            snow_bias: 0.8,
            seed: 7,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HudConfig {
    pub display_range: f32,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            display_range: 800.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PropellerConfig {
    /// Degrees per second at maximum lift
    pub max_rotation_speed: f32,
    pub spin_smooth_time: f32,
    pub alternate_directions: bool,
}

impl Default for PropellerConfig {
    fn default() -> Self {
        Self {
            max_rotation_speed: 1200.0,
            spin_smooth_time: 0.15,
            alternate_directions: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub min_pitch: f32,
    pub max_pitch: f32,
    pub min_volume: f32,
    pub max_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            min_pitch: 0.8,
            max_pitch: 1.2,
            min_volume: 0.0,
            max_volume: 1.0,
        }
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}

impl GameConfig {
    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str::<GameConfig>(contents)?)
    }

    /// Rejects values the game cannot run with. Durations feed `Timer`s and
    /// the terrain size feeds spawn ranges, both of which panic on bad input.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negatives = [
            ("drone.damage_velocity_threshold", self.drone.damage_velocity_threshold),
            ("drone.immunity_duration", self.drone.immunity_duration),
            ("drone.gravity", self.drone.gravity),
            ("drone.min_lift_force", self.drone.min_lift_force),
            ("drone.lift_step", self.drone.lift_step),
            ("drone.horizontal_speed", self.drone.horizontal_speed),
            ("drone.drop_offset", self.drone.drop_offset),
            ("drone.spawn_height", self.drone.spawn_height),
            ("character.detection_distance", self.character.detection_distance),
            ("character.pickup_distance", self.character.pickup_distance),
            ("character.arrival_distance", self.character.arrival_distance),
            ("character.turn_complete", self.character.turn_complete),
            ("character.pickup_complete", self.character.pickup_complete),
            ("character.walk_speed", self.character.walk_speed),
            ("character.turn_duration", self.character.turn_duration),
            ("character.pickup_duration", self.character.pickup_duration),
            ("kit.break_velocity", self.kit.break_velocity),
            ("mission.outcome_delay", self.mission.outcome_delay),
            ("spawner.max_slope_degrees", self.spawner.max_slope_degrees),
            ("spawner.height_offset", self.spawner.height_offset),
            ("terrain.max_height", self.terrain.max_height),
            ("terrain.height_noise_scale", self.terrain.height_noise_scale),
            ("terrain.texture_noise_scale", self.terrain.texture_noise_scale),
            ("terrain.snow_bias", self.terrain.snow_bias),
            ("hud.display_range", self.hud.display_range),
            ("propeller.max_rotation_speed", self.propeller.max_rotation_speed),
            ("propeller.spin_smooth_time", self.propeller.spin_smooth_time),
            ("audio.min_pitch", self.audio.min_pitch),
            ("audio.max_pitch", self.audio.max_pitch),
            ("audio.min_volume", self.audio.min_volume),
            ("audio.max_volume", self.audio.max_volume),
        ];
        for (field, value) in non_negatives {
            non_negative(field, value)?;
        }

        positive("terrain.size", self.terrain.size)?;
        if self.terrain.resolution < 2 {
            return Err(ConfigError::InvalidValue {
                field: "terrain.resolution",
                value: self.terrain.resolution as f32,
            });
        }
        // Lift is clamped into [min, max], which needs a non-empty range.
        let max_lift = self.drone.max_lift_force;
        if max_lift.is_nan() || max_lift < self.drone.min_lift_force {
            return Err(ConfigError::InvalidValue {
                field: "drone.max_lift_force",
                value: max_lift,
            });
        }
        Ok(())
    }
}

// Native builds read the file from disk; the browser build has no filesystem
// and always runs with defaults.

#[cfg(not(target_arch = "wasm32"))]
mod storage {
    use super::{ConfigError, GameConfig};
    use bevy::prelude::*;
    use std::path::PathBuf;

    const FILE_NAME: &str = "rescue_config.ron";

    /// User config dir first, then the working directory.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("rescue-drone").join(FILE_NAME));
        }
        paths.push(PathBuf::from(FILE_NAME));
        paths
    }

    fn read(path: &PathBuf) -> Result<GameConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = GameConfig::from_ron(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Option<GameConfig> {
        let Some(path) = candidate_paths().into_iter().find(|path| path.exists()) else {
            info!("No {} found. Using default tunables.", FILE_NAME);
            return None;
        };

        match read(&path) {
            Ok(config) => {
                info!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                error!("{} ({:?}). Using default tunables.", e, path);
                None
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod storage {
    use super::GameConfig;

    pub fn load() -> Option<GameConfig> {
        None
    }
}

fn load_config_system(mut commands: Commands) {
    let config = storage::load().unwrap_or_default();
    commands.insert_resource(config);
}
