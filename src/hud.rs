use bevy::prelude::*;

use crate::{
    config::GameConfig,
    damage::DamageTracker,
    drone::Drone,
    mission::{MissionBanner, MissionRoster, MissionScoped, MissionState},
    propeller::PropellerRig,
    rescue::{RescueSet, RescueState},
    spawner::{Survivor, SURVIVORS},
};

pub struct HudPlugin;

impl Plugin for HudPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(MissionState::Running), spawn_hud_system)
            .add_systems(
                Update,
                (distance_display_system, profile_checkmark_system, drone_status_system)
                    .after(RescueSet),
            );
    }
}

#[derive(Component)]
pub struct DistanceText;

#[derive(Component)]
pub struct DroneStatusText;

/// Shown next to a survivor's profile once they are saved.
#[derive(Component)]
pub struct Checkmark(pub Survivor);

pub const MISSING_REFERENCES: &str = "Error: Missing References";

/// Text for the distance readout given the nearest unsaved character.
pub fn distance_readout(nearest: Option<f32>, display_range: f32) -> String {
    match nearest {
        Some(distance) if distance <= display_range => format!("Distance: {:.2} m", distance),
        Some(_) => "OUT OF RANGE".to_string(),
        None => "No stranded persons found".to_string(),
    }
}

/// Distance from `from` to the closest position in `positions`.
pub fn nearest_distance(from: Vec3, positions: impl IntoIterator<Item = Vec3>) -> Option<f32> {
    positions
        .into_iter()
        .map(|position| from.distance(position))
        .min_by(f32::total_cmp)
}

fn spawn_hud_system(mut commands: Commands) {
    commands
        .spawn((
            MissionScoped,
            Node {
                position_type: PositionType::Absolute,
                top: Val::Px(12.0),
                left: Val::Px(12.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(6.0),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn((
                DistanceText,
                Text::new("No stranded persons found"),
                TextFont {
                    font_size: 24.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
            parent.spawn((
                DroneStatusText,
                Text::new(""),
                TextFont {
                    font_size: 18.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
            for survivor in SURVIVORS {
                parent
                    .spawn(Node {
                        column_gap: Val::Px(8.0),
                        ..default()
                    })
                    .with_children(|row| {
                        row.spawn((
                            Text::new(survivor.name()),
                            TextFont {
                                font_size: 18.0,
                                ..default()
                            },
                            TextColor(Color::WHITE),
                        ));
                        row.spawn((
                            Checkmark(survivor),
                            Text::new("\u{2713}"),
                            TextFont {
                                font_size: 18.0,
                                ..default()
                            },
                            TextColor(Color::srgb(0.2, 0.9, 0.3)),
                            Visibility::Hidden,
                        ));
                    });
            }
        });

    // Full-screen centered container for the outcome banner
    commands
        .spawn((
            MissionScoped,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn((
                MissionBanner,
                Text::new(""),
                TextFont {
                    font_size: 72.0,
                    ..default()
                },
                TextColor(Color::WHITE),
                TextLayout::new_with_justify(Justify::Center),
                Visibility::Hidden,
            ));
        });
}

pub fn distance_display_system(
    config: Res<GameConfig>,
    roster: Res<MissionRoster>,
    drones: Query<&Transform, With<Drone>>,
    characters: Query<(&Transform, &RescueState)>,
    mut texts: Query<&mut Text, With<DistanceText>>,
) {
    let readout = match drones.iter().next() {
        None => MISSING_REFERENCES.to_string(),
        Some(drone) => {
            let stranded = roster
                .0
                .iter()
                .filter_map(|entity| characters.get(*entity).ok())
                .filter(|(_, state)| !state.is_saved())
                .map(|(transform, _)| transform.translation);
            distance_readout(
                nearest_distance(drone.translation, stranded),
                config.hud.display_range,
            )
        }
    };

    for mut text in texts.iter_mut() {
        if text.0 != readout {
            text.0.clone_from(&readout);
        }
    }
}

pub fn profile_checkmark_system(
    characters: Query<(&Survivor, &RescueState)>,
    mut checkmarks: Query<(&Checkmark, &mut Visibility)>,
) {
    for (checkmark, mut visibility) in checkmarks.iter_mut() {
        let saved = characters
            .iter()
            .any(|(survivor, state)| *survivor == checkmark.0 && state.is_saved());
        let wanted = if saved {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        visibility.set_if_neq(wanted);
    }
}

pub fn drone_status_system(
    drones: Query<(&DamageTracker, Option<&PropellerRig>), With<Drone>>,
    mut texts: Query<&mut Text, With<DroneStatusText>>,
) {
    let Some((tracker, rig)) = drones.iter().next() else {
        return;
    };

    let mut status = format!("Hits: {}/{}", tracker.hits(), tracker.max_hits());
    if tracker.is_immune() {
        status.push_str("  (immune)");
    }
    if let Some(rig) = rig {
        status.push_str(&format!("  Rotors: {:.0} deg/s", rig.average_speed));
    }

    for mut text in texts.iter_mut() {
        if text.0 != status {
            text.0.clone_from(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readout_formats() {
        assert_eq!(distance_readout(Some(123.456), 800.0), "Distance: 123.46 m");
        assert_eq!(distance_readout(Some(800.0), 800.0), "Distance: 800.00 m");
        assert_eq!(distance_readout(Some(800.5), 800.0), "OUT OF RANGE");
        assert_eq!(distance_readout(None, 800.0), "No stranded persons found");
    }

    #[test]
    fn nearest_of_several() {
        let nearest = nearest_distance(
            Vec3::ZERO,
            [Vec3::new(0.0, 0.0, 30.0), Vec3::new(4.0, 3.0, 0.0)],
        );
        assert_eq!(nearest, Some(5.0));
        assert_eq!(nearest_distance(Vec3::ZERO, Vec::new()), None);
    }

    fn hud_app() -> App {
        let mut app = App::new();
        app.insert_resource(GameConfig::default())
            .init_resource::<MissionRoster>()
            .add_systems(Update, distance_display_system);
        app.world_mut().spawn((DistanceText, Text::new("")));
        app
    }

    fn readout(app: &mut App) -> String {
        let mut texts = app
            .world_mut()
            .query_filtered::<&Text, With<DistanceText>>();
        texts.single(app.world()).unwrap().0.clone()
    }

    #[test]
    fn missing_drone_is_reported() {
        let mut app = hud_app();
        app.update();
        assert_eq!(readout(&mut app), MISSING_REFERENCES);
    }

    #[test]
    fn saved_characters_are_not_tracked() {
        let mut app = hud_app();
        let world = app.world_mut();
        world.spawn((Drone, Transform::IDENTITY));
        let saved = world
            .spawn((Transform::from_xyz(3.0, 0.0, 4.0), RescueState::Saved))
            .id();
        let waiting = world
            .spawn((Transform::from_xyz(0.0, 0.0, 20.0), RescueState::Waving))
            .id();
        world.resource_mut::<MissionRoster>().0 = vec![saved, waiting];

        app.update();
        assert_eq!(readout(&mut app), "Distance: 20.00 m");

        *app.world_mut().get_mut::<RescueState>(waiting).unwrap() = RescueState::Saved;
        app.update();
        assert_eq!(readout(&mut app), "No stranded persons found");
    }
}
