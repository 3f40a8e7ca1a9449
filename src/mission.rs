use std::time::Duration;

use bevy::prelude::*;

use crate::{
    config::GameConfig,
    damage::DroneCrashed,
    rescue::{RescueSet, RescueState},
};

pub struct MissionPlugin;

impl Plugin for MissionPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<MissionState>()
            .init_resource::<MissionRoster>()
            .init_resource::<MissionOutcome>()
            .add_systems(PostStartup, begin_mission_system)
            .add_systems(OnExit(MissionState::Running), despawn_mission_system)
            .add_systems(OnEnter(MissionState::Restarting), restart_mission_system)
            .add_systems(
                Update,
                (check_success_system, restart_countdown_system)
                    .chain()
                    .after(RescueSet)
                    .run_if(in_state(MissionState::Running)),
            )
            .add_observer(on_drone_crashed);
    }
}

/// `Loading` holds until config and terrain exist. `Running` spawns the whole
/// scene on enter and despawns it on exit. `Restarting` lasts one frame and
/// exists so `Running` can be entered again.
#[derive(States, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MissionState {
    #[default]
    Loading,
    Running,
    Restarting,
}

/// Everything spawned for one mission. Cleared on restart.
#[derive(Component)]
pub struct MissionScoped;

/// The characters that have to be saved, in spawn order.
#[derive(Resource, Default, Debug)]
pub struct MissionRoster(pub Vec<Entity>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accomplished,
    Failed,
}

impl Outcome {
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Accomplished => "Mission Accomplished !",
            Outcome::Failed => "Mission Failed !",
        }
    }
}

/// Success and failure latches plus the delayed restart they schedule.
#[derive(Resource, Default, Debug)]
pub struct MissionOutcome {
    success: bool,
    failure: bool,
    restart: Option<Timer>,
}

impl MissionOutcome {
    pub fn succeeded(&self) -> bool {
        self.success
    }

    pub fn failed(&self) -> bool {
        self.failure
    }

    pub fn restart_pending(&self) -> bool {
        self.restart.is_some()
    }

    fn schedule_restart(&mut self, delay: f32) {
        if self.restart.is_none() {
            self.restart = Some(Timer::from_seconds(delay, TimerMode::Once));
        }
    }

    /// Returns true only the first time.
    pub fn latch_success(&mut self, delay: f32) -> bool {
        if self.success {
            return false;
        }
        self.success = true;
        self.schedule_restart(delay);
        true
    }

    /// Returns true only the first time.
    pub fn latch_failure(&mut self, delay: f32) -> bool {
        if self.failure {
            return false;
        }
        self.failure = true;
        self.schedule_restart(delay);
        true
    }

    /// True exactly once, when the restart delay has elapsed.
    pub fn tick(&mut self, delta: Duration) -> bool {
        let Some(timer) = self.restart.as_mut() else {
            return false;
        };
        if timer.is_finished() {
            return false;
        }
        timer.tick(delta);
        timer.is_finished()
    }
}

/// True iff there is at least one character and all of them are saved.
pub fn all_saved<'a>(states: impl IntoIterator<Item = &'a RescueState>) -> bool {
    let mut any = false;
    for state in states {
        if !state.is_saved() {
            return false;
        }
        any = true;
    }
    any
}

/// Banner text for mission outcomes, hidden until one happens.
#[derive(Component)]
pub struct MissionBanner;

pub fn show_banner(banner: &mut Query<(&mut Text, &mut Visibility), With<MissionBanner>>, outcome: Outcome) {
    for (mut text, mut visibility) in banner.iter_mut() {
        text.0 = outcome.message().to_string();
        *visibility = Visibility::Visible;
    }
}

pub fn check_success_system(
    config: Res<GameConfig>,
    roster: Res<MissionRoster>,
    mut outcome: ResMut<MissionOutcome>,
    characters: Query<&RescueState>,
    mut banner: Query<(&mut Text, &mut Visibility), With<MissionBanner>>,
) {
    if outcome.succeeded() {
        return;
    }
    if roster.0.is_empty() {
        warn_once!("No characters in the mission roster.");
        return;
    }

    // Characters missing from the world are skipped, not counted as unsaved.
    let states: Vec<&RescueState> = roster
        .0
        .iter()
        .filter_map(|entity| characters.get(*entity).ok())
        .collect();
    if all_saved(states) && outcome.latch_success(config.mission.outcome_delay) {
        info!("Mission Accomplished! All characters saved.");
        show_banner(&mut banner, Outcome::Accomplished);
    }
}

pub fn on_drone_crashed(
    _trigger: On<DroneCrashed>,
    config: Res<GameConfig>,
    mut outcome: ResMut<MissionOutcome>,
    mut banner: Query<(&mut Text, &mut Visibility), With<MissionBanner>>,
) {
    if outcome.latch_failure(config.mission.outcome_delay) {
        info!("Mission Failed !");
        show_banner(&mut banner, Outcome::Failed);
    }
}

pub fn restart_countdown_system(
    time: Res<Time>,
    mut outcome: ResMut<MissionOutcome>,
    mut next_state: ResMut<NextState<MissionState>>,
) {
    if outcome.tick(time.delta()) {
        info!("Restarting mission.");
        next_state.set(MissionState::Restarting);
    }
}

// Bevy runs the initial state's `OnEnter` before the startup schedules, so
// starting in `Running` would spawn the scene before the config and height
// field exist. Starting in `Loading` and switching here defers the first
// `OnEnter(Running)` to the first frame's state transition.
fn begin_mission_system(mut next_state: ResMut<NextState<MissionState>>) {
    next_state.set(MissionState::Running);
}

fn despawn_mission_system(mut commands: Commands, scoped: Query<Entity, With<MissionScoped>>) {
    for entity in scoped.iter() {
        commands.entity(entity).despawn();
    }
}

// Entering `Restarting` exits `Running`, which despawns everything
// `MissionScoped`. Setting `Running` again re-runs every `OnEnter(Running)`
// spawner on the next frame.
fn restart_mission_system(
    mut commands: Commands,
    mut next_state: ResMut<NextState<MissionState>>,
) {
    commands.insert_resource(MissionOutcome::default());
    commands.insert_resource(MissionRoster::default());
    next_state.set(MissionState::Running);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_needs_every_character_saved() {
        let two_of_three = [RescueState::Saved, RescueState::Saved, RescueState::Waving];
        assert!(!all_saved(&two_of_three));

        let all = [RescueState::Saved; 3];
        assert!(all_saved(&all));

        let none: [RescueState; 0] = [];
        assert!(!all_saved(&none));
    }

    #[test]
    fn latches_fire_once() {
        let mut outcome = MissionOutcome::default();
        assert!(outcome.latch_success(10.0));
        assert!(!outcome.latch_success(10.0));
        assert!(outcome.succeeded());

        assert!(outcome.latch_failure(10.0));
        assert!(!outcome.latch_failure(10.0));
        assert!(outcome.failed());
    }

    #[test]
    fn restart_fires_once_after_delay() {
        let mut outcome = MissionOutcome::default();
        assert!(!outcome.tick(Duration::from_secs(60)));

        outcome.latch_failure(10.0);
        assert!(outcome.restart_pending());
        assert!(!outcome.tick(Duration::from_secs(9)));
        assert!(outcome.tick(Duration::from_secs(1)));
        assert!(!outcome.tick(Duration::from_secs(1)));
    }

    #[test]
    fn second_latch_does_not_push_restart_back() {
        let mut outcome = MissionOutcome::default();
        outcome.latch_failure(10.0);
        assert!(!outcome.tick(Duration::from_secs(8)));

        outcome.latch_success(10.0);
        assert!(outcome.tick(Duration::from_secs(2)));
    }

    fn outcome_app() -> App {
        let mut app = App::new();
        app.insert_resource(GameConfig::default())
            .init_resource::<MissionOutcome>()
            .init_resource::<MissionRoster>()
            .add_observer(on_drone_crashed)
            .add_systems(Update, check_success_system);
        app
    }

    #[test]
    fn latches_success_when_roster_is_saved() {
        let mut app = outcome_app();
        let saved = app.world_mut().spawn(RescueState::Saved).id();
        let waiting = app.world_mut().spawn(RescueState::Waving).id();
        app.world_mut().resource_mut::<MissionRoster>().0 = vec![saved, waiting];

        app.update();
        assert!(!app.world().resource::<MissionOutcome>().succeeded());

        *app.world_mut().get_mut::<RescueState>(waiting).unwrap() = RescueState::Saved;
        app.update();
        app.update();

        let outcome = app.world().resource::<MissionOutcome>();
        assert!(outcome.succeeded());
        assert!(outcome.restart_pending());
    }

    #[test]
    fn empty_roster_never_succeeds() {
        let mut app = outcome_app();
        app.world_mut().spawn(RescueState::Saved);
        app.update();
        assert!(!app.world().resource::<MissionOutcome>().succeeded());
    }

    #[test]
    fn crash_latches_failure() {
        let mut app = outcome_app();
        let drone = app.world_mut().spawn_empty().id();
        app.world_mut().trigger(DroneCrashed { drone });
        app.world_mut().trigger(DroneCrashed { drone });

        let outcome = app.world().resource::<MissionOutcome>();
        assert!(outcome.failed());
        assert!(!outcome.succeeded());
    }
}
