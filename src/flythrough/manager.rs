use std::time::Duration;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::height::{GroundSampler, HeightCheck, HeightCheckMode, HeightSettings};
use crate::spline::{SplineWindow, MIN_SPEED};
use crate::trigger::FlythroughEffect;

use super::waypoint::{LookatMode, TriggerPhase, Waypoint, PATH_LOOKAT_PROGRESS};

/// How the path behaves at its last waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum Topology {
    /// Runs from the first waypoint to the last, then applies the [`EndAction`].
    SingleShot,
    /// Wraps from the last waypoint back to the first.
    #[default]
    Looped,
}

/// What happens when a single-shot flythrough reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum EndAction {
    #[default]
    Stop,
    /// Stop and start [`Flythrough::next_flythrough`].
    PlayNext,
    /// Stop and exit the app.
    Quit,
}

/// Frame time used to advance the flythrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum FrameRate {
    Fps9,
    Fps15,
    Fps24,
    Fps25,
    Fps30,
    Fps60,
    Fps90,
    /// Use the measured frame delta.
    #[default]
    Uncapped,
}

impl FrameRate {
    pub fn fps(self) -> Option<f32> {
        match self {
            Self::Fps9 => Some(9.0),
            Self::Fps15 => Some(15.0),
            Self::Fps24 => Some(24.0),
            Self::Fps25 => Some(25.0),
            Self::Fps30 => Some(30.0),
            Self::Fps60 => Some(60.0),
            Self::Fps90 => Some(90.0),
            Self::Uncapped => None,
        }
    }

    /// Seconds advanced per update given the host's measured delta.
    pub fn frame_time(self, host_delta: f32) -> f32 {
        self.fps().map_or(host_delta, |fps| 1.0 / fps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
#[reflect(Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Initialising,
    Started,
    Paused,
}

/// A request to change a flythrough's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum FlythroughCommand {
    /// Start from the first waypoint, optionally rebuilding every segment first.
    Start { full_initialise: bool },
    /// Resume if paused, otherwise start.
    Play,
    Pause,
    Resume,
    Stop,
}

/// Something that happened during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlythroughEventKind {
    SegmentStarted(usize),
    SegmentEnded(usize),
    /// A looped flythrough wrapped back to its first waypoint.
    Looped,
    /// A single-shot flythrough reached its end.
    Finished,
}

/// Where the driven object should be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlythroughPose {
    pub position: Vec3,
    pub rotation: Quat,
    /// Apply without damping.
    pub snap: bool,
}

/// A camera path through an ordered list of waypoints.
///
/// The path is plain data plus the playback cursor. Height checks are
/// supplied by the caller through a [`GroundSampler`] whenever segments are
/// (re)built, and side effects produced during playback are collected for
/// the host to apply with [`Flythrough::drain_effects`].
#[derive(Component, Debug, Reflect)]
#[reflect(Component, Default)]
pub struct Flythrough {
    /// Entity whose [`Transform`] is driven.
    pub target: Option<Entity>,
    pub topology: Topology,
    pub end_action: EndAction,
    /// Started by [`EndAction::PlayNext`].
    pub next_flythrough: Option<Entity>,
    pub frame_rate: FrameRate,
    pub height: HeightSettings,
    /// Rotation smoothing time constant in seconds. Zero disables smoothing.
    pub rotation_damping: f32,
    /// Position smoothing time constant in seconds. Zero disables smoothing.
    pub position_damping: f32,
    /// Start as soon as the host has initialised the flythrough.
    pub auto_start: bool,

    waypoints: Vec<Waypoint>,
    state: PlaybackState,
    current_segment: usize,
    segment_distance_travelled: f32,
    total_distance_travelled: f32,
    total_distance_travelled_pct: f32,
    total_distance: f32,
    total_duration: Duration,
    current_velocity: f32,
    current_position: Vec3,
    current_rotation: Quat,
    pose_ready: bool,
    snap_pose: bool,
    initialised: bool,
    auto_started: bool,
    #[reflect(ignore)]
    effects: Vec<FlythroughEffect>,
    #[reflect(ignore)]
    events: Vec<FlythroughEventKind>,
}

impl Default for Flythrough {
    fn default() -> Self {
        Self {
            target: None,
            topology: Topology::Looped,
            end_action: EndAction::Stop,
            next_flythrough: None,
            frame_rate: FrameRate::Uncapped,
            height: HeightSettings::default(),
            rotation_damping: 0.75,
            position_damping: 0.3,
            auto_start: true,
            waypoints: Vec::new(),
            state: PlaybackState::Stopped,
            current_segment: 0,
            segment_distance_travelled: 0.0,
            total_distance_travelled: 0.0,
            total_distance_travelled_pct: 0.0,
            total_distance: 0.0,
            total_duration: Duration::ZERO,
            current_velocity: 0.0,
            current_position: Vec3::ZERO,
            current_rotation: Quat::IDENTITY,
            pose_ready: false,
            snap_pose: false,
            initialised: false,
            auto_started: false,
            effects: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl Flythrough {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            ..default()
        }
    }

    pub fn with_target(mut self, target: Entity) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_end_action(mut self, end_action: EndAction) -> Self {
        self.end_action = end_action;
        self
    }

    pub fn with_next_flythrough(mut self, next: Entity) -> Self {
        self.next_flythrough = Some(next);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_height(mut self, height: HeightSettings) -> Self {
        self.height = height;
        self
    }

    pub fn with_damping(mut self, position: f32, rotation: f32) -> Self {
        self.position_damping = position;
        self.rotation_damping = rotation;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Started
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn current_segment(&self) -> usize {
        self.current_segment
    }

    pub fn segment_distance_travelled(&self) -> f32 {
        self.segment_distance_travelled
    }

    pub fn total_distance_travelled(&self) -> f32 {
        self.total_distance_travelled
    }

    /// Fraction of the total distance travelled, in `[0, 1]` for single-shot paths.
    pub fn total_distance_travelled_pct(&self) -> f32 {
        self.total_distance_travelled_pct
    }

    pub fn total_distance(&self) -> f32 {
        self.total_distance
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn current_velocity(&self) -> f32 {
        self.current_velocity
    }

    pub fn current_position(&self) -> Vec3 {
        self.current_position
    }

    pub fn current_rotation(&self) -> Quat {
        self.current_rotation
    }

    /// True until [`Flythrough::initialise`] has run since the last request.
    pub fn needs_initialise(&self) -> bool {
        !self.initialised
    }

    /// Ask the host to run a full initialisation on its next update.
    pub fn request_initialise(&mut self) {
        self.initialised = false;
    }

    /// Number of segments playback moves through.
    ///
    /// The last waypoint of a single-shot path has no outgoing segment.
    pub fn traversable_segments(&self) -> usize {
        match self.topology {
            Topology::Looped => self.waypoints.len(),
            Topology::SingleShot => self.waypoints.len().saturating_sub(1),
        }
    }

    /// The pose computed by the last update, if it has not been taken yet.
    pub fn take_pose(&mut self) -> Option<FlythroughPose> {
        if !self.pose_ready {
            return None;
        }
        self.pose_ready = false;
        Some(FlythroughPose {
            position: self.current_position,
            rotation: self.current_rotation,
            snap: std::mem::take(&mut self.snap_pose),
        })
    }

    pub fn drain_effects(&mut self) -> Vec<FlythroughEffect> {
        std::mem::take(&mut self.effects)
    }

    pub fn drain_events(&mut self) -> Vec<FlythroughEventKind> {
        std::mem::take(&mut self.events)
    }

    #[cfg(test)]
    pub(crate) fn push_effect(&mut self, effect: FlythroughEffect) {
        self.effects.push(effect);
    }

    // Initialisation

    /// Rebuild every segment and the path totals, and reset the cursor.
    ///
    /// Leaves the flythrough stopped.
    pub fn initialise(&mut self, ground: &dyn GroundSampler) {
        debug!("Initialising flythrough with {} waypoints", self.waypoints.len());
        self.state = PlaybackState::Initialising;

        self.wire_neighbors();

        let check = HeightCheck::new(ground, &self.height);
        // Segment rotations read the next waypoint's lookat, so every lookat
        // has to exist before segments are built
        for index in 0..self.waypoints.len() {
            self.initialise_waypoint(index, false, &check);
        }
        for index in 0..self.waypoints.len() {
            self.initialise_waypoint(index, true, &check);
        }

        self.update_metadata();
        self.reset_cursor();
        self.initialised = true;
        self.state = PlaybackState::Stopped;
    }

    /// Recompute the segments whose spline window contains `index`
    /// (`index - 2 ..= index + 1`), then the path totals.
    pub fn update_segment_with_dependencies(&mut self, index: usize, ground: &dyn GroundSampler) {
        if index >= self.waypoints.len() {
            error!(
                "Attempting to update missing segment {} of {}",
                index,
                self.waypoints.len()
            );
            return;
        }

        let affected: Vec<usize> = (-2..=1)
            .filter_map(|offset| self.offset_index(index, offset))
            .collect();

        let check = HeightCheck::new(ground, &self.height);
        for &affected_index in &affected {
            self.initialise_waypoint(affected_index, false, &check);
        }
        for &affected_index in &affected {
            self.initialise_waypoint(affected_index, true, &check);
        }

        self.update_metadata();
    }

    /// Re-sum total distance and duration and each segment's start time.
    pub fn update_metadata(&mut self) {
        self.total_distance = 0.0;
        self.total_duration = Duration::ZERO;
        for waypoint in &mut self.waypoints {
            waypoint.segment_start_time = self.total_duration;
            self.total_distance += waypoint.segment_distance;
            self.total_duration += waypoint.segment_duration;
        }
    }

    fn wire_neighbors(&mut self) {
        let count = self.waypoints.len();
        let topology = self.topology;
        for (index, waypoint) in self.waypoints.iter_mut().enumerate() {
            waypoint.index = index;
            waypoint.is_first = index == 0;
            waypoint.is_last = index + 1 == count;
            if waypoint.name.is_empty() {
                waypoint.name = format!("Waypoint {index}");
            }

            let (prev, next) = match topology {
                Topology::Looped => ((index + count - 1) % count, (index + 1) % count),
                // The far neighbor at each end is the adjacent waypoint, which
                // keeps every spline window in range
                Topology::SingleShot => {
                    let prev = if index == 0 { 1usize.min(count - 1) } else { index - 1 };
                    let next = if index + 1 == count {
                        index.saturating_sub(1)
                    } else {
                        index + 1
                    };
                    (prev, next)
                }
            };
            waypoint.prev = prev;
            waypoint.next = next;
        }
    }

    fn offset_index(&self, index: usize, offset: isize) -> Option<usize> {
        let count = self.waypoints.len() as isize;
        let target = index as isize + offset;
        match self.topology {
            Topology::Looped => Some(target.rem_euclid(count) as usize),
            Topology::SingleShot => (0..count).contains(&target).then_some(target as usize),
        }
    }

    fn spline_window(&self, index: usize) -> SplineWindow {
        let waypoint = &self.waypoints[index];
        let next = &self.waypoints[waypoint.next];
        SplineWindow::new(
            self.waypoints[waypoint.prev].position,
            waypoint.position,
            next.position,
            self.waypoints[next.next].position,
        )
    }

    fn is_traversable(&self, index: usize) -> bool {
        index < self.traversable_segments()
    }

    fn height_mode(&self, index: usize) -> HeightCheckMode {
        self.waypoints[index].height_check.resolve(self.height.mode)
    }

    fn initialise_waypoint(&mut self, index: usize, update_segment: bool, check: &HeightCheck) {
        let mode = self.height_mode(index);
        let position = check.validate_height(self.waypoints[index].position, mode);
        self.waypoints[index].position = position;

        let path_lookat = if self.is_traversable(index) {
            self.spline_window(index).evaluate(PATH_LOOKAT_PROGRESS)
        } else {
            // Terminal waypoint: keep looking the way the path arrives
            let prev = self.waypoints[index].prev;
            let arriving = self.spline_window(prev).evaluate(1.0 - PATH_LOOKAT_PROGRESS);
            position + (position - arriving)
        };
        self.waypoints[index].refresh_lookat(path_lookat, check, mode);

        let next = &self.waypoints[self.waypoints[index].next];
        let (next_speed, next_facing) = (next.speed.speed(), next.facing());
        self.waypoints[index].link_next(next_speed, next_facing);

        if update_segment {
            let window = self
                .is_traversable(index)
                .then(|| self.spline_window(index));
            self.waypoints[index].build_segment(window, check, mode);
        }
    }

    fn reset_cursor(&mut self) {
        self.current_segment = 0;
        self.segment_distance_travelled = 0.0;
        self.total_distance_travelled = 0.0;
        self.total_distance_travelled_pct = 0.0;
    }

    // Playback

    /// Put the cursor back on the first waypoint without rebuilding anything.
    fn restart(&mut self) {
        debug!("Restarting flythrough");
        self.state = PlaybackState::Initialising;
        self.reset_cursor();
    }

    /// Start from the first waypoint.
    ///
    /// Runs a full initialisation when asked to, or when the flythrough has
    /// never been initialised; otherwise only the cursor is reset. Stays
    /// stopped when there is no target or no waypoints.
    pub fn start(&mut self, full_initialise: bool, ground: &dyn GroundSampler) {
        if full_initialise || !self.initialised {
            self.initialise(ground);
        } else {
            self.restart();
        }

        if self.target.is_none() {
            warn!("Can not start flythrough - no target has been assigned");
            self.state = PlaybackState::Stopped;
            return;
        }
        if self.waypoints.is_empty() {
            warn!("Can not start flythrough - it has no waypoints");
            self.state = PlaybackState::Stopped;
            return;
        }

        debug!("Starting flythrough");
        self.set_pose_at(0, 0.0, true);

        self.waypoints[0].dispatch(TriggerPhase::Start, 0.0, &mut self.effects);
        self.events.push(FlythroughEventKind::SegmentStarted(0));

        self.state = PlaybackState::Started;
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Started {
            warn!("Can not pause flythrough - it is not playing");
            return;
        }
        debug!("Pausing flythrough");
        self.state = PlaybackState::Paused;
    }

    /// Continue a paused flythrough. Returns false, leaving the state
    /// unchanged, when it was not paused.
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            warn!("Can not resume flythrough - it was not paused");
            return false;
        }
        debug!("Resuming flythrough");
        self.state = PlaybackState::Started;
        true
    }

    /// Stop playback. A stopped flythrough can only be started again.
    pub fn stop(&mut self) {
        debug!("Stopping flythrough");
        self.state = PlaybackState::Stopped;
        self.pose_ready = false;
        self.snap_pose = false;
    }

    pub fn apply_command(&mut self, command: FlythroughCommand, ground: &dyn GroundSampler) {
        match command {
            FlythroughCommand::Start { full_initialise } => self.start(full_initialise, ground),
            FlythroughCommand::Play => {
                if self.state == PlaybackState::Paused {
                    self.resume();
                } else {
                    self.start(false, ground);
                }
            }
            FlythroughCommand::Pause => self.pause(),
            FlythroughCommand::Resume => {
                self.resume();
            }
            FlythroughCommand::Stop => self.stop(),
        }
    }

    /// Start the flythrough once, the first time the host has initialised it.
    pub(crate) fn auto_start_if_due(&mut self, ground: &dyn GroundSampler) {
        if self.auto_start && !self.auto_started {
            self.auto_started = true;
            self.start(false, ground);
        }
    }

    /// Advance playback by one frame.
    ///
    /// `host_delta` is the measured frame time; it is only used when the
    /// frame rate is uncapped.
    pub fn advance(&mut self, host_delta: f32) {
        if self.state != PlaybackState::Started || self.waypoints.is_empty() {
            return;
        }
        if self.total_distance <= 0.0 {
            warn!("Flythrough has no length - stopping");
            self.stop();
            return;
        }

        let frame_time = self.frame_rate.frame_time(host_delta);
        let index = self.current_segment;
        let progress = self.segment_progress();
        self.set_pose_at(index, progress, false);

        // A waypoint at rest would otherwise never be left
        let frame_distance = frame_time * self.current_velocity.max(MIN_SPEED);
        self.segment_distance_travelled += frame_distance;
        self.total_distance_travelled += frame_distance;
        self.total_distance_travelled_pct = self.total_distance_travelled / self.total_distance;

        let segment_distance = self.waypoints[index].segment_distance;
        if self.segment_distance_travelled >= segment_distance {
            self.waypoints[index].dispatch(TriggerPhase::End, frame_time, &mut self.effects);
            self.events.push(FlythroughEventKind::SegmentEnded(index));

            let next = index + 1;
            if next >= self.traversable_segments() {
                match self.topology {
                    Topology::Looped => {
                        self.current_segment = 0;
                        self.segment_distance_travelled -= segment_distance;
                        self.total_distance_travelled = self.segment_distance_travelled;
                        self.events.push(FlythroughEventKind::Looped);
                    }
                    Topology::SingleShot => {
                        self.segment_distance_travelled = segment_distance;
                        self.total_distance_travelled = self.total_distance;
                        self.total_distance_travelled_pct = 1.0;
                        self.events.push(FlythroughEventKind::Finished);
                        self.finish();
                        return;
                    }
                }
            } else {
                self.segment_distance_travelled -= segment_distance;
                self.current_segment = next;
            }
            self.total_distance_travelled_pct =
                self.total_distance_travelled / self.total_distance;

            let current = self.current_segment;
            self.waypoints[current].dispatch(TriggerPhase::Start, frame_time, &mut self.effects);
            self.events.push(FlythroughEventKind::SegmentStarted(current));
        }

        let current = self.current_segment;
        let progress = self.segment_progress();
        self.waypoints[current].dispatch(
            TriggerPhase::Update(progress),
            frame_time,
            &mut self.effects,
        );

        self.pose_ready = true;
    }

    fn finish(&mut self) {
        self.stop();
        match self.end_action {
            EndAction::Stop => {}
            EndAction::Quit => self.effects.push(FlythroughEffect::Exit),
            EndAction::PlayNext => match self.next_flythrough {
                Some(flythrough) => self.effects.push(FlythroughEffect::Control {
                    flythrough,
                    command: FlythroughCommand::Start {
                        full_initialise: false,
                    },
                }),
                None => info!("Next flythrough has not been configured. Can not start."),
            },
        }
    }

    fn segment_progress(&self) -> f32 {
        let distance = self.waypoints[self.current_segment].segment_distance;
        if distance > 0.0 {
            (self.segment_distance_travelled / distance).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn set_pose_at(&mut self, index: usize, progress: f32, snap: bool) {
        let sample = self.waypoints[index].sample(progress);
        self.current_velocity = sample.velocity;
        self.current_position = sample.position;
        self.current_rotation = sample.rotation;
        self.pose_ready = true;
        // A snap stays pending until the pose is taken
        self.snap_pose |= snap;
    }

    // Scrubbing

    /// Move the cursor to `percent` of the total distance and pose the target there.
    pub fn scrub_to(&mut self, percent: f32) {
        if self.target.is_none() {
            warn!("Can not move target as none has been set");
            return;
        }
        if self.total_distance <= 0.0 {
            return;
        }

        let target_distance = percent.clamp(0.0, 1.0) * self.total_distance;
        let mut segment_start = 0.0;
        let segments = self.traversable_segments();
        for index in 0..segments {
            let segment_distance = self.waypoints[index].segment_distance;
            let segment_end = segment_start + segment_distance;
            if target_distance <= segment_end || index + 1 == segments {
                let within = (target_distance - segment_start).clamp(0.0, segment_distance);
                self.current_segment = index;
                self.segment_distance_travelled = within;
                self.total_distance_travelled = target_distance;
                self.total_distance_travelled_pct = target_distance / self.total_distance;
                let progress = if segment_distance > 0.0 {
                    within / segment_distance
                } else {
                    0.0
                };
                self.set_pose_at(index, progress, true);
                return;
            }
            segment_start = segment_end;
        }
    }

    /// Move the cursor to the start of waypoint `index`'s segment.
    pub fn scrub_to_waypoint(&mut self, index: usize) {
        if index >= self.waypoints.len() {
            warn!("Can not move target to missing waypoint {}", index);
            return;
        }
        if !self.is_traversable(index) {
            self.scrub_to(1.0);
            return;
        }
        if self.target.is_none() {
            warn!("Can not move target as none has been set");
            return;
        }

        self.current_segment = index;
        self.segment_distance_travelled = 0.0;
        self.total_distance_travelled = self.waypoints[..index]
            .iter()
            .map(|waypoint| waypoint.segment_distance)
            .sum();
        self.total_distance_travelled_pct = if self.total_distance > 0.0 {
            self.total_distance_travelled / self.total_distance
        } else {
            0.0
        };
        self.set_pose_at(index, 0.0, true);
    }

    pub fn step_forward(&mut self, distance: f32) {
        self.step_by(distance);
    }

    pub fn step_backward(&mut self, distance: f32) {
        self.step_by(-distance);
    }

    fn step_by(&mut self, distance: f32) {
        if self.total_distance <= 0.0 {
            return;
        }
        let travelled = (self.total_distance_travelled + distance).clamp(0.0, self.total_distance);
        self.scrub_to(travelled / self.total_distance);
    }

    // Waypoint editing

    pub fn first_waypoint(&self) -> Option<&Waypoint> {
        self.waypoints.first()
    }

    pub fn waypoint(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// Mutable access for configuration changes. Call
    /// [`Flythrough::update_segment_with_dependencies`] or
    /// [`Flythrough::request_initialise`] afterwards.
    pub fn waypoint_mut(&mut self, index: usize) -> Option<&mut Waypoint> {
        self.waypoints.get_mut(index)
    }

    /// Index before `index`, wrapping to the last waypoint when `wrap` is set.
    pub fn prev_index(&self, index: usize, wrap: bool) -> Option<usize> {
        if index >= self.waypoints.len() {
            return None;
        }
        match index {
            0 if wrap => Some(self.waypoints.len() - 1),
            0 => None,
            _ => Some(index - 1),
        }
    }

    /// Index after `index`, wrapping to the first waypoint when `wrap` is set.
    pub fn next_index(&self, index: usize, wrap: bool) -> Option<usize> {
        if index >= self.waypoints.len() {
            return None;
        }
        if index + 1 < self.waypoints.len() {
            Some(index + 1)
        } else {
            wrap.then_some(0)
        }
    }

    /// Append a waypoint and rebuild the path. Returns its index.
    pub fn add_waypoint(&mut self, waypoint: Waypoint, ground: &dyn GroundSampler) -> usize {
        self.waypoints.push(waypoint);
        self.initialise(ground);
        self.waypoints.len() - 1
    }

    /// Insert a waypoint halfway along the segment leaving `index`.
    pub fn insert_waypoint_after(
        &mut self,
        index: usize,
        ground: &dyn GroundSampler,
    ) -> Option<usize> {
        let Some(current) = self.waypoints.get(index) else {
            error!("Can not insert after missing waypoint {}", index);
            return None;
        };

        let midpoint = current.position_at(0.5);
        let check = HeightCheck::new(ground, &self.height);
        let position = check.validate_height(midpoint, self.height.mode);

        self.waypoints.insert(index + 1, Waypoint::new(position));
        self.initialise(ground);
        Some(index + 1)
    }

    /// Insert a waypoint halfway along the segment arriving at `index`.
    pub fn insert_waypoint_before(
        &mut self,
        index: usize,
        ground: &dyn GroundSampler,
    ) -> Option<usize> {
        let prev = self.prev_index(index, true)?;
        self.insert_waypoint_after(prev, ground)
    }

    pub fn remove_waypoint(&mut self, index: usize, ground: &dyn GroundSampler) -> Option<Waypoint> {
        if index >= self.waypoints.len() {
            error!("Can not remove missing waypoint {}", index);
            return None;
        }
        let removed = self.waypoints.remove(index);
        self.initialise(ground);
        Some(removed)
    }

    /// Move a waypoint by `movement`, keeping it above the ground.
    pub fn move_waypoint(&mut self, index: usize, movement: Vec3, ground: &dyn GroundSampler) {
        if index >= self.waypoints.len() {
            error!("Can not move missing waypoint {}", index);
            return;
        }
        let mode = self.height_mode(index);
        let check = HeightCheck::new(ground, &self.height);
        let waypoint = &mut self.waypoints[index];
        waypoint.position = check.validate_height(waypoint.position + movement, mode);
        waypoint.refresh_offsets(&check, mode);
        self.update_segment_with_dependencies(index, ground);
    }

    /// Move a waypoint's lookat location by `movement` and switch it to target mode.
    pub fn move_waypoint_lookat(
        &mut self,
        index: usize,
        movement: Vec3,
        ground: &dyn GroundSampler,
    ) {
        if index >= self.waypoints.len() {
            error!("Can not move lookat of missing waypoint {}", index);
            return;
        }
        let mode = self.height_mode(index);
        let check = HeightCheck::new(ground, &self.height);
        let waypoint = &mut self.waypoints[index];
        waypoint.lookat_mode = LookatMode::Target;
        let location = check.validate_lookat_height(waypoint.lookat_location + movement, mode);
        if location != waypoint.lookat_location {
            waypoint.lookat_location = location;
            waypoint.refresh_offsets(&check, mode);
            self.update_segment_with_dependencies(index, ground);
        }
    }

    /// Drop every waypoint to the minimum height above the ground and rebuild.
    pub fn set_waypoints_to_min_height(&mut self, ground: &dyn GroundSampler) {
        let check = HeightCheck::new(ground, &self.height);
        for index in 0..self.waypoints.len() {
            let mode = self.height_mode(index);
            let waypoint = &mut self.waypoints[index];
            waypoint.position = check.lowest_height(waypoint.position, mode);
        }
        self.initialise(ground);
    }

    /// Mark one waypoint as selected, or clear the selection.
    pub fn select_waypoint(&mut self, index: Option<usize>) {
        for (i, waypoint) in self.waypoints.iter_mut().enumerate() {
            waypoint.selected = Some(i) == index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;
    use crate::flythrough::SpeedTier;
    use crate::height::tests::FlatGround;
    use crate::height::NoGround;
    use crate::trigger::tests::Recorder;
    use crate::trigger::WaypointTrigger;

    fn no_height() -> HeightSettings {
        HeightSettings {
            mode: HeightCheckMode::None,
            ..default()
        }
    }

    fn target() -> Entity {
        World::new().spawn_empty().id()
    }

    fn flythrough(points: &[Vec3], topology: Topology) -> Flythrough {
        let waypoints = points.iter().map(|&point| Waypoint::new(point)).collect();
        let mut flythrough = Flythrough::new(waypoints)
            .with_target(target())
            .with_topology(topology)
            .with_height(no_height())
            .with_frame_rate(FrameRate::Fps60);
        flythrough.initialise(&NoGround);
        flythrough
    }

    fn triangle() -> Vec<Vec3> {
        let height = 10.0 * 3f32.sqrt() / 2.0;
        vec![
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, height),
        ]
    }

    fn circle(count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * std::f32::consts::TAU;
                Vec3::new(angle.cos() * 30.0, 0.0, angle.sin() * 30.0)
            })
            .collect()
    }

    #[test]
    fn test_looped_topology_closes() {
        let flythrough = flythrough(&triangle(), Topology::Looped);
        let waypoints = flythrough.waypoints();
        assert_eq!(waypoints[2].next(), 0);
        assert_eq!(waypoints[0].prev(), 2);
        assert_eq!(flythrough.traversable_segments(), 3);

        let distance: f32 = waypoints.iter().map(|w| w.segment_distance()).sum();
        let duration: Duration = waypoints.iter().map(|w| w.segment_duration()).sum();
        assert!(waypoints.iter().all(|w| w.segment_distance() > 10.0));
        assert_eq!(flythrough.total_distance(), distance);
        assert_eq!(flythrough.total_duration(), duration);
        assert_eq!(waypoints[2].steps().steps.last().copied(), Some(Vec3::ZERO));
    }

    #[test]
    fn test_single_shot_neighbors_use_adjacent_waypoint() {
        let flythrough = flythrough(
            &[Vec3::ZERO, Vec3::X * 10.0, Vec3::X * 20.0],
            Topology::SingleShot,
        );
        let waypoints = flythrough.waypoints();
        assert_eq!(waypoints[0].prev(), 1);
        assert_eq!(waypoints[2].next(), 1);
        assert!(waypoints[0].is_first() && waypoints[2].is_last());

        assert_eq!(flythrough.traversable_segments(), 2);
        assert_eq!(waypoints[2].segment_distance(), 0.0);
        assert_eq!(waypoints[2].segment_duration(), Duration::ZERO);
        assert!(waypoints[2].steps().is_empty());
        assert_eq!(waypoints[1].segment_start_time(), waypoints[0].segment_duration());

        let single = flythrough_with_one(Topology::SingleShot);
        assert_eq!(single.waypoints()[0].prev(), 0);
        assert_eq!(single.waypoints()[0].next(), 0);
    }

    fn flythrough_with_one(topology: Topology) -> Flythrough {
        flythrough(&[Vec3::ONE], topology)
    }

    #[test]
    fn test_scenario_a_loop_returns_to_start() {
        let mut flythrough = flythrough(&triangle(), Topology::Looped);
        let total = flythrough.total_distance();
        assert!(total > 30.0 && total < 40.0, "total distance {total}");

        flythrough.start(false, &NoGround);
        // One extra frame so float drift can not leave the cursor short of the wrap
        let frames = (total / 5.0 * 60.0).round() as usize + 1;
        for _ in 0..frames {
            flythrough.advance(0.0);
        }

        let events = flythrough.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == FlythroughEventKind::Looped)
                .count(),
            1
        );
        assert_eq!(flythrough.current_segment(), 0);
        let cursor = flythrough.waypoints()[0].position_at(flythrough.segment_progress());
        assert!(cursor.distance(Vec3::ZERO) < 0.25, "cursor at {cursor}");
        assert!(flythrough.total_distance_travelled() < 0.25);
    }

    #[test]
    fn test_scenario_b_single_shot_stops_at_end() {
        let mut flythrough = flythrough(&[Vec3::ZERO, Vec3::X * 10.0], Topology::SingleShot);
        flythrough.frame_rate = FrameRate::Fps30;
        flythrough.start(false, &NoGround);

        let total_secs = flythrough.total_duration().as_secs_f32();
        assert!((total_secs - 2.0).abs() < 0.1, "duration {total_secs}");

        let frames = (total_secs * 30.0).ceil() as usize + 5;
        for _ in 0..frames {
            flythrough.advance(0.0);
            // The terminal waypoint never becomes current
            assert_eq!(flythrough.current_segment(), 0);
        }

        assert_eq!(flythrough.state(), PlaybackState::Stopped);
        assert_eq!(flythrough.total_distance_travelled_pct(), 1.0);
        assert_eq!(flythrough.total_distance_travelled(), flythrough.total_distance());
        assert!(flythrough.take_pose().is_none());
        assert!(flythrough
            .drain_events()
            .contains(&FlythroughEventKind::Finished));
    }

    #[test]
    fn test_scenario_c_dependency_update_is_local() {
        let mut flythrough = flythrough(&circle(10), Topology::Looped);
        let before: Vec<_> = flythrough
            .waypoints()
            .iter()
            .map(|w| w.steps().clone())
            .collect();

        let edited = 0;
        flythrough.move_waypoint(edited, Vec3::new(3.0, 2.0, -1.0), &NoGround);

        let changed: Vec<usize> = flythrough
            .waypoints()
            .iter()
            .enumerate()
            .filter(|(i, w)| *w.steps() != before[*i])
            .map(|(i, _)| i)
            .collect();
        assert_eq!(changed, vec![0, 1, 8, 9]);

        let distance: f32 = flythrough.waypoints().iter().map(|w| w.segment_distance()).sum();
        assert_eq!(flythrough.total_distance(), distance);
    }

    #[test]
    fn test_dependency_update_single_shot_skips_out_of_range() {
        let mut flythrough = flythrough(&circle(6), Topology::SingleShot);
        let before: Vec<_> = flythrough
            .waypoints()
            .iter()
            .map(|w| w.steps().clone())
            .collect();

        flythrough.move_waypoint(0, Vec3::Y * 2.0, &NoGround);
        for (i, waypoint) in flythrough.waypoints().iter().enumerate() {
            // Segment 5 is terminal and stays empty; 2.. do not see waypoint 0
            if i >= 2 {
                assert_eq!(*waypoint.steps(), before[i]);
            }
        }
        assert_ne!(*flythrough.waypoints()[0].steps(), before[0]);

        // Missing index is reported and ignored
        flythrough.update_segment_with_dependencies(42, &NoGround);
    }

    #[test]
    fn test_state_machine() {
        let mut flythrough = flythrough(&triangle(), Topology::Looped);
        assert_eq!(flythrough.state(), PlaybackState::Stopped);

        assert!(!flythrough.resume());
        assert_eq!(flythrough.state(), PlaybackState::Stopped);

        flythrough.start(false, &NoGround);
        assert_eq!(flythrough.state(), PlaybackState::Started);
        let pose = flythrough.take_pose().unwrap();
        assert!(pose.snap);
        assert_eq!(pose.position, Vec3::ZERO);

        assert!(!flythrough.resume());
        assert_eq!(flythrough.state(), PlaybackState::Started);

        flythrough.pause();
        assert_eq!(flythrough.state(), PlaybackState::Paused);
        let travelled = flythrough.total_distance_travelled();
        flythrough.advance(0.0);
        assert_eq!(flythrough.total_distance_travelled(), travelled);

        assert!(flythrough.resume());
        assert_eq!(flythrough.state(), PlaybackState::Started);
        flythrough.advance(0.0);
        assert!(!flythrough.take_pose().unwrap().snap);

        flythrough.stop();
        assert_eq!(flythrough.state(), PlaybackState::Stopped);
        assert!(flythrough.take_pose().is_none());
        flythrough.advance(0.0);
        assert!(flythrough.take_pose().is_none());

        flythrough.pause();
        assert_eq!(flythrough.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_start_requires_target_and_waypoints() {
        let mut untargeted = flythrough(&triangle(), Topology::Looped);
        untargeted.target = None;
        untargeted.start(true, &NoGround);
        assert_eq!(untargeted.state(), PlaybackState::Stopped);

        let mut empty = Flythrough::default().with_target(target());
        empty.start(false, &NoGround);
        assert_eq!(empty.state(), PlaybackState::Stopped);
        empty.advance(0.1);
    }

    #[test]
    fn test_zero_length_path_stops() {
        let mut flythrough = flythrough(&[Vec3::ONE, Vec3::ONE], Topology::Looped);
        flythrough.start(false, &NoGround);
        assert_eq!(flythrough.state(), PlaybackState::Started);
        flythrough.advance(0.1);
        assert_eq!(flythrough.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_uncapped_uses_host_delta() {
        let mut flythrough = flythrough(&triangle(), Topology::Looped);
        flythrough.frame_rate = FrameRate::Uncapped;
        flythrough.start(false, &NoGround);
        flythrough.advance(0.5);
        // Starts at Medium speed
        assert!((flythrough.total_distance_travelled() - 2.5).abs() < 1e-4);

        assert_eq!(FrameRate::Fps25.frame_time(0.5), 1.0 / 25.0);
    }

    #[test]
    fn test_triggers_fire_in_order() {
        let recorder = Recorder::default();
        let points = [Vec3::ZERO, Vec3::X * 2.0, Vec3::X * 4.0];
        let waypoints = points
            .iter()
            .map(|&point| {
                Waypoint::new(point)
                    .with_speed(SpeedTier::Fast)
                    .with_trigger(WaypointTrigger::custom(recorder.clone()).with_on_update(true))
            })
            .collect();
        let mut flythrough = Flythrough::new(waypoints)
            .with_target(target())
            .with_topology(Topology::SingleShot)
            .with_height(no_height())
            .with_frame_rate(FrameRate::Fps30);

        flythrough.start(false, &NoGround);
        assert_eq!(recorder.calls(), vec!["start:0".to_string()]);

        for _ in 0..30 {
            flythrough.advance(0.0);
        }
        assert_eq!(flythrough.state(), PlaybackState::Stopped);

        let calls = recorder.calls();
        let first_end = calls.iter().position(|c| c == "end:0").unwrap();
        assert!(calls[..first_end].iter().all(|c| c == "start:0" || c == "update:0"));
        assert_eq!(calls[first_end + 1], "start:1");
        assert_eq!(calls[first_end + 2], "update:1");
        assert_eq!(calls.last().map(String::as_str), Some("end:1"));
        assert!(!calls.iter().any(|c| c.ends_with(":2")));
    }

    #[test]
    fn test_end_actions_emit_effects() {
        let next = target();
        let mut flythrough = flythrough(&[Vec3::ZERO, Vec3::X * 3.0], Topology::SingleShot)
            .with_end_action(EndAction::PlayNext)
            .with_next_flythrough(next);
        flythrough.start(false, &NoGround);
        while flythrough.is_playing() {
            flythrough.advance(0.0);
        }
        assert_eq!(
            flythrough.drain_effects(),
            vec![FlythroughEffect::Control {
                flythrough: next,
                command: FlythroughCommand::Start {
                    full_initialise: false
                },
            }]
        );

        flythrough.end_action = EndAction::Quit;
        flythrough.start(false, &NoGround);
        while flythrough.is_playing() {
            flythrough.advance(0.0);
        }
        assert_eq!(flythrough.drain_effects(), vec![FlythroughEffect::Exit]);

        flythrough.end_action = EndAction::PlayNext;
        flythrough.next_flythrough = None;
        flythrough.start(false, &NoGround);
        while flythrough.is_playing() {
            flythrough.advance(0.0);
        }
        assert!(flythrough.drain_effects().is_empty());
    }

    #[test]
    fn test_scrubbing() {
        let mut flythrough = flythrough(&triangle(), Topology::Looped);
        let total = flythrough.total_distance();
        let first = flythrough.waypoints()[0].segment_distance();

        flythrough.scrub_to(0.0);
        assert_eq!(flythrough.current_segment(), 0);
        assert_eq!(flythrough.take_pose().unwrap().position, Vec3::ZERO);

        flythrough.scrub_to((first + 1.0) / total);
        assert_eq!(flythrough.current_segment(), 1);
        assert!((flythrough.segment_distance_travelled() - 1.0).abs() < 1e-3);

        flythrough.scrub_to_waypoint(2);
        assert_eq!(flythrough.current_segment(), 2);
        let pose = flythrough.take_pose().unwrap();
        assert!(pose.snap);
        assert_eq!(pose.position, flythrough.waypoints()[2].position);

        flythrough.step_backward(0.5);
        assert_eq!(flythrough.current_segment(), 1);
        flythrough.step_forward(1000.0);
        assert_eq!(flythrough.total_distance_travelled(), total);
        assert_eq!(flythrough.total_distance_travelled_pct(), 1.0);
    }

    #[test]
    fn test_waypoint_editing() {
        let mut flythrough = flythrough(&[Vec3::ZERO, Vec3::X * 10.0], Topology::SingleShot);

        let inserted = flythrough.insert_waypoint_after(0, &NoGround).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(flythrough.waypoints().len(), 3);
        assert!(flythrough.waypoints()[1].position.distance(Vec3::X * 5.0) < 0.1);
        assert_eq!(flythrough.waypoints()[2].index(), 2);
        assert_eq!(flythrough.waypoints()[1].name, "Waypoint 1");

        let appended = flythrough.add_waypoint(Waypoint::new(Vec3::X * 20.0), &NoGround);
        assert_eq!(appended, 3);
        assert_eq!(flythrough.prev_index(0, false), None);
        assert_eq!(flythrough.prev_index(0, true), Some(3));
        assert_eq!(flythrough.next_index(3, false), None);
        assert_eq!(flythrough.next_index(3, true), Some(0));
        assert_eq!(flythrough.next_index(9, true), None);

        let removed = flythrough.remove_waypoint(1, &NoGround).unwrap();
        assert!(removed.position.distance(Vec3::X * 5.0) < 0.1);
        assert_eq!(flythrough.waypoints().len(), 3);
        assert!(flythrough.remove_waypoint(7, &NoGround).is_none());

        flythrough.select_waypoint(Some(1));
        assert!(flythrough.waypoints()[1].is_selected());
        assert!(!flythrough.waypoints()[0].is_selected());
        flythrough.select_waypoint(None);
        assert!(flythrough.waypoints().iter().all(|w| !w.is_selected()));

        assert_eq!(flythrough.first_waypoint().map(|w| w.position), Some(Vec3::ZERO));
        assert!(flythrough.waypoint(5).is_none());
    }

    #[test]
    fn test_height_checks_apply_to_waypoints_and_lookats() {
        let ground = FlatGround(3.0);
        let mut flythrough = Flythrough::new(vec![
            Waypoint::new(Vec3::ZERO),
            Waypoint::new(Vec3::new(20.0, 40.0, 0.0)),
            Waypoint::new(Vec3::new(20.0, 0.0, 20.0)),
        ])
        .with_target(target())
        .with_height(HeightSettings {
            mode: HeightCheckMode::Terrain,
            min_height_above_ground: 2.0,
            ..default()
        });
        flythrough.initialise(&ground);

        assert_eq!(flythrough.waypoints()[0].position.y, 5.0);
        assert_eq!(flythrough.waypoints()[1].position.y, 40.0);
        for waypoint in flythrough.waypoints() {
            assert!(waypoint.steps().steps.iter().all(|p| p.y >= 5.0 - 1e-4));
        }

        flythrough.move_waypoint_lookat(0, Vec3::new(0.0, -100.0, -10.0), &ground);
        let waypoint = &flythrough.waypoints()[0];
        assert_eq!(waypoint.lookat_mode, LookatMode::Target);
        assert_eq!(waypoint.lookat_location.y, 3.0);
        assert_eq!(waypoint.lookat.height, 0.0);

        flythrough.set_waypoints_to_min_height(&ground);
        assert!(flythrough.waypoints().iter().all(|w| w.position.y == 5.0));
    }

    #[test]
    fn test_velocity_easing_shapes_speed() {
        let mut flythrough = Flythrough::new(vec![
            Waypoint::new(Vec3::ZERO).with_speed(SpeedTier::Slow),
            Waypoint::new(Vec3::X * 10.0)
                .with_speed(SpeedTier::Fast)
                .with_velocity_easing(Easing::Linear),
        ])
        .with_target(target())
        .with_topology(Topology::SingleShot)
        .with_height(no_height());
        flythrough.initialise(&NoGround);

        let waypoint = &flythrough.waypoints()[0];
        assert_eq!(waypoint.start_speed(), 2.0);
        assert_eq!(waypoint.end_speed(), 10.0);
        // EaseInOut by default, so the midpoint is halfway between speeds
        assert!((waypoint.velocity_at(0.5) - 6.0).abs() < 1e-5);
        assert!(waypoint.velocity_at(0.25) < 4.0);
    }

    #[test]
    fn test_playback_leaves_a_waypoint_at_rest() {
        let mut flythrough = Flythrough::new(vec![
            Waypoint::new(Vec3::ZERO)
                .with_speed(SpeedTier::Custom(0.0))
                .with_velocity_easing(Easing::Linear),
            Waypoint::new(Vec3::X * 10.0),
        ])
        .with_target(target())
        .with_topology(Topology::SingleShot)
        .with_height(no_height())
        .with_frame_rate(FrameRate::Fps30);
        flythrough.initialise(&NoGround);
        flythrough.start(false, &NoGround);
        assert_eq!(flythrough.current_velocity(), 0.0);

        // Speed grows from the floor, so allow a few times the estimated duration
        let frames = (flythrough.total_duration().as_secs_f32() * 4.0 * 30.0).ceil() as usize;
        assert!(frames > 0);
        let mut travelled = 0;
        while flythrough.is_playing() && travelled < frames {
            flythrough.advance(0.0);
            travelled += 1;
        }

        assert_eq!(flythrough.state(), PlaybackState::Stopped);
        assert_eq!(flythrough.total_distance_travelled_pct(), 1.0);
        assert!(flythrough
            .drain_events()
            .contains(&FlythroughEventKind::Finished));
    }
}
