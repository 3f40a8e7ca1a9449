use bevy::prelude::*;

pub mod animation;
pub mod audio;
pub mod config;
pub mod damage;
pub mod drone;
pub mod effects;
pub mod hud;
pub mod kit;
pub mod mission;
pub mod propeller;
pub mod rescue;
pub mod spawner;
pub mod terrain;

/// Everything the game needs on top of `DefaultPlugins`.
pub struct RescueGamePlugin;

impl Plugin for RescueGamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            config::ConfigPlugin,
            terrain::TerrainPlugin,
            mission::MissionPlugin,
            drone::DronePlugin,
            propeller::PropellerPlugin,
            damage::DamagePlugin,
            kit::KitPlugin,
            rescue::RescuePlugin,
            animation::AnimationPlugin,
            spawner::SpawnerPlugin,
            hud::HudPlugin,
            audio::AudioPlugin,
            effects::EffectsPlugin,
        ));
    }
}
