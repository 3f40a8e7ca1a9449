use bevy::prelude::*;

use rescue_drone::RescueGamePlugin;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Rescue Drone".into(),
                    ..default()
                }),
                ..default()
            }),
            RescueGamePlugin,
        ))
        .run();
}
