use bevy::{
    audio::{AudioSinkPlayback, Volume},
    prelude::*,
};

use crate::{
    config::GameConfig,
    mission::{MissionScoped, MissionState},
    propeller::PropellerSound,
};

pub struct AudioPlugin;

impl Plugin for AudioPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_audio)
            .add_systems(OnEnter(MissionState::Running), start_ambience_system)
            .add_systems(Update, propeller_audio_system);
    }
}

#[derive(Resource)]
pub struct GameAudio {
    pub background_music: Handle<AudioSource>,
    pub blizzard: Handle<AudioSource>,
    pub propeller: Handle<AudioSource>,
}

/// The looping rotor sound source.
#[derive(Component)]
pub struct PropellerAudio;

pub fn setup_audio(mut commands: Commands, asset_server: Res<AssetServer>) {
    commands.insert_resource(GameAudio {
        background_music: asset_server.load("audio/background.mp3"),
        blizzard: asset_server.load("audio/blizzard.mp3"),
        propeller: asset_server.load("audio/propeller.wav"),
    });
}

/// Pitch and linear volume for the rotor loop at a normalized lift.
pub fn propeller_pitch_volume(config: &GameConfig, normalized_speed: f32) -> (f32, f32) {
    let s = normalized_speed.clamp(0.0, 1.0);
    let audio = &config.audio;
    (
        audio.min_pitch + (audio.max_pitch - audio.min_pitch) * s,
        audio.min_volume + (audio.max_volume - audio.min_volume) * s,
    )
}

fn start_ambience_system(mut commands: Commands, audio: Res<GameAudio>) {
    commands.spawn((
        MissionScoped,
        AudioPlayer::new(audio.background_music.clone()),
        PlaybackSettings::LOOP.with_volume(Volume::Linear(0.5)),
    ));
    commands.spawn((
        MissionScoped,
        AudioPlayer::new(audio.blizzard.clone()),
        PlaybackSettings::LOOP,
    ));
    commands.spawn((
        MissionScoped,
        PropellerAudio,
        AudioPlayer::new(audio.propeller.clone()),
        PlaybackSettings::LOOP.paused(),
    ));
}

/// Follows the most recent propeller sound request. The sink only exists once
/// the asset has loaded, so early requests are dropped.
pub fn propeller_audio_system(
    config: Res<GameConfig>,
    mut requests: MessageReader<PropellerSound>,
    mut sinks: Query<&mut AudioSink, With<PropellerAudio>>,
) {
    let Some(request) = requests.read().last().copied() else {
        return;
    };

    let (pitch, volume) = propeller_pitch_volume(&config, request.normalized_speed);
    for mut sink in sinks.iter_mut() {
        if request.spinning {
            sink.set_speed(pitch);
            sink.set_volume(Volume::Linear(volume));
            if sink.is_paused() {
                sink.play();
            }
        } else if !sink.is_paused() {
            sink.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: (f32, f32), expected: (f32, f32)) -> bool {
        (actual.0 - expected.0).abs() < 1e-5 && (actual.1 - expected.1).abs() < 1e-5
    }

    #[test]
    fn pitch_and_volume_follow_lift() {
        let config = GameConfig::default();
        assert!(close(propeller_pitch_volume(&config, 0.0), (0.8, 0.0)));
        assert!(close(propeller_pitch_volume(&config, 0.5), (1.0, 0.5)));
        assert!(close(propeller_pitch_volume(&config, 1.0), (1.2, 1.0)));
    }

    #[test]
    fn out_of_range_speed_is_clamped() {
        let config = GameConfig::default();
        assert!(close(propeller_pitch_volume(&config, 3.0), (1.2, 1.0)));
        assert!(close(propeller_pitch_volume(&config, -1.0), (0.8, 0.0)));
    }
}
