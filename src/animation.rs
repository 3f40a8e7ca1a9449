use bevy::prelude::*;

use crate::{
    config::{GameConfig, Inert},
    rescue::RescueState,
};

pub struct AnimationPlugin;

impl Plugin for AnimationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (switch_clip_system, animation_system)
                .chain()
                .after(crate::rescue::RescueSet),
        );
    }
}

/// Character animation clips. Playback itself (blending, skinning) belongs to
/// the engine; here a clip is only a named duration the rescue logic can wait on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Clip {
    Sitting,
    Waving,
    TurnRight,
    InjuredWalk,
    Pickup,
    SavedIdle,
}

impl Clip {
    pub fn looping(self) -> bool {
        !matches!(self, Clip::TurnRight | Clip::Pickup)
    }
}

#[derive(Clone, Debug)]
pub struct ClipDurations {
    pub turn: f32,
    pub pickup: f32,
}

impl ClipDurations {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            turn: config.character.turn_duration,
            pickup: config.character.pickup_duration,
        }
    }

    pub fn duration(&self, clip: Clip) -> f32 {
        match clip {
            Clip::TurnRight => self.turn,
            Clip::Pickup => self.pickup,
            Clip::Waving => 1.5,
            Clip::InjuredWalk => 1.0,
            Clip::Sitting | Clip::SavedIdle => 4.0,
        }
    }
}

/// The animation-progress capability of a character.
#[derive(Component, Clone, Debug)]
pub struct Animator {
    clip: Clip,
    elapsed: f32,
    durations: ClipDurations,
}

impl Animator {
    pub fn new(durations: ClipDurations) -> Self {
        Animator {
            clip: Clip::Sitting,
            elapsed: 0.0,
            durations,
        }
    }

    pub fn clip(&self) -> Clip {
        self.clip
    }

    /// Switches clip. Playing the clip that is already active keeps its progress.
    pub fn play(&mut self, clip: Clip) {
        if self.clip != clip {
            self.clip = clip;
            self.elapsed = 0.0;
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        self.elapsed += delta_time;
    }

    /// Normalized progress of the active clip, in [0, 1].
    pub fn normalized_time(&self) -> f32 {
        let duration = self.durations.duration(self.clip);
        if duration <= 0.0 {
            return 1.0;
        }

        let t = self.elapsed / duration;
        if self.clip.looping() {
            t.fract()
        } else {
            t.min(1.0)
        }
    }

    /// Progress of `clip` if it is the active clip, `None` otherwise.
    pub fn progress(&self, clip: Clip) -> Option<f32> {
        (self.clip == clip).then(|| self.normalized_time())
    }
}

/// Which clip each rescue state shows.
pub fn clip_for(state: &RescueState) -> Clip {
    match state {
        RescueState::Idle | RescueState::Targeting(_) => Clip::Sitting,
        RescueState::Waving => Clip::Waving,
        RescueState::Turning(_) => Clip::TurnRight,
        RescueState::Walking(_) => Clip::InjuredWalk,
        RescueState::PickingUp(_) => Clip::Pickup,
        RescueState::Saved => Clip::SavedIdle,
    }
}

// `Changed<RescueState>` only matches characters whose state was written
// since this system last ran, so clips are not restarted every frame. The
// rescue step only writes the state on a real transition.
//
// Runs after the rescue step, so a clip started this frame is first observed
// next frame with progress 0.
pub fn switch_clip_system(
    mut query: Query<(&RescueState, &mut Animator), (Changed<RescueState>, Without<Inert>)>,
) {
    for (state, mut animator) in query.iter_mut() {
        animator.play(clip_for(state));
    }
}

pub fn animation_system(mut query: Query<&mut Animator, Without<Inert>>, time: Res<Time>) {
    let delta = time.delta_secs();
    for mut animator in query.iter_mut() {
        animator.update(delta);
    }
}
