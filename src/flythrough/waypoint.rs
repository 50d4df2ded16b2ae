use std::time::Duration;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::geometry::{look_rotation, planar_direction, planar_yaw_degrees};
use crate::height::{HeightCheck, HeightCheckMode, WaypointHeightCheck};
use crate::spline::{sample_duration, SplineWindow, StepTable};
use crate::trigger::{
    FlythroughEffect, TriggerContext, TriggerPhases, WaypointTrigger, WaypointView,
};

/// Spline progress used to place a path-following lookat just ahead of the waypoint.
pub const PATH_LOOKAT_PROGRESS: f32 = 0.005;

/// Where the driven object looks while traversing a waypoint's segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum LookatMode {
    /// Look along the path.
    #[default]
    Path,
    /// Look at the waypoint's lookat location.
    Target,
}

/// Start speed of a segment, in units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum SpeedTier {
    ReallySlow,
    Slow,
    #[default]
    Medium,
    Fast,
    ReallyFast,
    Custom(f32),
}

impl SpeedTier {
    pub fn speed(self) -> f32 {
        match self {
            Self::ReallySlow => 0.5,
            Self::Slow => 2.0,
            Self::Medium => 5.0,
            Self::Fast => 10.0,
            Self::ReallyFast => 20.0,
            Self::Custom(speed) => speed.max(0.0),
        }
    }
}

/// A lookat location relative to its waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct LookatOffsets {
    /// Yaw in degrees of the direction from the lookat location back to the waypoint.
    pub angle: f32,
    /// Horizontal distance between waypoint and lookat location.
    pub distance: f32,
    /// Height of the lookat location above the lowest valid lookat height.
    pub height: f32,
}

/// Decompose `target` relative to `source` into planar distance, height above
/// the minimum lookat height and planar yaw.
pub fn relative_offsets(
    source: Vec3,
    target: Vec3,
    check: &HeightCheck,
    mode: HeightCheckMode,
) -> LookatOffsets {
    let planar_target = Vec3::new(target.x, source.y, target.z);
    LookatOffsets {
        angle: planar_yaw_degrees(source - target),
        distance: source.distance(planar_target),
        height: check.lookat_height_above_minimum(target, mode),
    }
}

/// Rebuild a lookat location from offsets relative to `source`.
///
/// `reference_height` is used as the base height when no ground is found
/// below the location.
pub fn lookat_from_offsets(
    source: Vec3,
    offsets: LookatOffsets,
    reference_height: f32,
    check: &HeightCheck,
    mode: HeightCheckMode,
) -> Vec3 {
    let mut location = source - planar_direction(offsets.angle) * offsets.distance;
    location.y = reference_height;
    location.y = check.lowest_lookat_height(location, mode).y + offsets.height;
    location
}

/// Velocity, position and rotation at one point of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSample {
    pub velocity: f32,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TriggerPhase {
    Start,
    Update(f32),
    End,
}

/// An ordered control point of a flythrough, and the segment that leaves it.
#[derive(Debug, Reflect)]
pub struct Waypoint {
    /// Used in log messages. Empty names are filled in when the flythrough is initialised.
    pub name: String,
    pub position: Vec3,
    /// Extra rotation composed onto the look rotation.
    pub local_rotation: Quat,
    pub lookat_mode: LookatMode,
    pub lookat_location: Vec3,
    pub lookat: LookatOffsets,
    pub speed: SpeedTier,
    pub velocity_easing: Easing,
    pub position_easing: Easing,
    pub rotation_easing: Easing,
    pub height_check: WaypointHeightCheck,
    #[reflect(ignore)]
    pub triggers: Vec<WaypointTrigger>,

    pub(crate) index: usize,
    pub(crate) prev: usize,
    pub(crate) next: usize,
    pub(crate) is_first: bool,
    pub(crate) is_last: bool,
    pub(crate) selected: bool,
    start_speed: f32,
    end_speed: f32,
    rotation_start: Quat,
    rotation_end: Quat,
    steps: StepTable,
    pub(crate) segment_distance: f32,
    pub(crate) segment_start_time: Duration,
    pub(crate) segment_duration: Duration,
}

impl Default for Waypoint {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            lookat_mode: LookatMode::Path,
            lookat_location: Vec3::ZERO,
            lookat: LookatOffsets::default(),
            speed: SpeedTier::Medium,
            velocity_easing: Easing::EaseInOut,
            position_easing: Easing::Linear,
            rotation_easing: Easing::Linear,
            height_check: WaypointHeightCheck::Inherit,
            triggers: Vec::new(),
            index: 0,
            prev: 0,
            next: 0,
            is_first: true,
            is_last: true,
            selected: false,
            start_speed: SpeedTier::Medium.speed(),
            end_speed: SpeedTier::Medium.speed(),
            rotation_start: Quat::IDENTITY,
            rotation_end: Quat::IDENTITY,
            steps: StepTable::empty(),
            segment_distance: 0.0,
            segment_start_time: Duration::ZERO,
            segment_duration: Duration::ZERO,
        }
    }
}

impl Waypoint {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Look at a fixed location instead of along the path.
    pub fn with_lookat(mut self, location: Vec3) -> Self {
        self.lookat_mode = LookatMode::Target;
        self.lookat_location = location;
        self
    }

    pub fn with_speed(mut self, speed: SpeedTier) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_velocity_easing(mut self, easing: Easing) -> Self {
        self.velocity_easing = easing;
        self
    }

    pub fn with_position_easing(mut self, easing: Easing) -> Self {
        self.position_easing = easing;
        self
    }

    pub fn with_rotation_easing(mut self, easing: Easing) -> Self {
        self.rotation_easing = easing;
        self
    }

    pub fn with_height_check(mut self, height_check: WaypointHeightCheck) -> Self {
        self.height_check = height_check;
        self
    }

    pub fn with_local_rotation(mut self, rotation: Quat) -> Self {
        self.local_rotation = rotation;
        self
    }

    pub fn with_trigger(mut self, trigger: WaypointTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn prev(&self) -> usize {
        self.prev
    }

    pub fn next(&self) -> usize {
        self.next
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn start_speed(&self) -> f32 {
        self.start_speed
    }

    /// Start speed of the next waypoint, which this segment eases towards.
    pub fn end_speed(&self) -> f32 {
        self.end_speed
    }

    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    /// Travel distance of the segment leaving this waypoint.
    pub fn segment_distance(&self) -> f32 {
        self.segment_distance
    }

    /// Time into the flythrough at which this segment starts.
    pub fn segment_start_time(&self) -> Duration {
        self.segment_start_time
    }

    pub fn segment_duration(&self) -> Duration {
        self.segment_duration
    }

    /// Rotation looking from this waypoint at its lookat location.
    pub fn facing(&self) -> Quat {
        look_rotation(self.lookat_location - self.position)
            .map_or(self.local_rotation, |rotation| rotation * self.local_rotation)
    }

    /// Position along the segment at `progress` in `[0, 1]`.
    pub fn position_at(&self, progress: f32) -> Vec3 {
        self.steps
            .position(self.position_easing.ease(progress))
            .unwrap_or(self.position)
    }

    /// Speed at `progress`, easing from this waypoint's start speed to the next one's.
    pub fn velocity_at(&self, progress: f32) -> f32 {
        let t = self.velocity_easing.ease(progress);
        self.start_speed + (self.end_speed - self.start_speed) * t
    }

    pub fn rotation_at(&self, progress: f32) -> Quat {
        self.rotation_start
            .slerp(self.rotation_end, self.rotation_easing.ease(progress))
    }

    pub fn sample(&self, progress: f32) -> SegmentSample {
        SegmentSample {
            velocity: self.velocity_at(progress),
            position: self.position_at(progress),
            rotation: self.rotation_at(progress),
        }
    }

    /// Replace the lookat location using offsets relative to the waypoint.
    /// Switches the waypoint to [`LookatMode::Target`].
    pub fn set_lookat_offsets(
        &mut self,
        offsets: LookatOffsets,
        check: &HeightCheck,
        inherited: HeightCheckMode,
    ) {
        let mode = self.height_check.resolve(inherited);
        let location = lookat_from_offsets(
            self.position,
            offsets,
            self.lookat_location.y,
            check,
            mode,
        );
        self.lookat_mode = LookatMode::Target;
        self.lookat_location = check.validate_lookat_height(location, mode);
        self.refresh_offsets(check, mode);
    }

    pub(crate) fn refresh_offsets(&mut self, check: &HeightCheck, mode: HeightCheckMode) {
        self.lookat = relative_offsets(self.position, self.lookat_location, check, mode);
    }

    /// Recompute the lookat location (path mode) and the offsets describing it.
    pub(crate) fn refresh_lookat(
        &mut self,
        path_lookat: Vec3,
        check: &HeightCheck,
        mode: HeightCheckMode,
    ) {
        if self.lookat_mode == LookatMode::Path {
            self.lookat_location = path_lookat;
        }
        self.refresh_offsets(check, mode);
    }

    /// Cache the values this segment needs from the next waypoint.
    pub(crate) fn link_next(&mut self, next_speed: f32, next_facing: Quat) {
        self.start_speed = self.speed.speed();
        self.end_speed = next_speed;
        self.rotation_start = self.facing();
        self.rotation_end = next_facing;
    }

    /// Rebuild the step table, distance and duration of the leaving segment.
    ///
    /// `None` marks a segment that is never traversed.
    pub(crate) fn build_segment(
        &mut self,
        window: Option<SplineWindow>,
        check: &HeightCheck,
        mode: HeightCheckMode,
    ) {
        match window {
            Some(window) => {
                self.steps = StepTable::build(&window, |point| check.validate_height(point, mode));
                self.segment_distance = self.steps.distance;
                self.segment_duration =
                    sample_duration(|t| self.position_at(t), |t| self.velocity_at(t));
            }
            None => {
                self.steps = StepTable::empty();
                self.segment_distance = 0.0;
                self.segment_duration = Duration::ZERO;
            }
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        phase: TriggerPhase,
        delta: f32,
        effects: &mut Vec<FlythroughEffect>,
    ) {
        let mut ctx = TriggerContext {
            waypoint: WaypointView {
                index: self.index,
                name: &self.name,
                segment_distance: self.segment_distance,
                segment_duration: self.segment_duration,
            },
            phases: TriggerPhases::default(),
            delta,
            effects,
        };
        for trigger in &mut self.triggers {
            match phase {
                TriggerPhase::Start => trigger.start(&mut ctx),
                TriggerPhase::Update(progress) => trigger.update(&mut ctx, progress),
                TriggerPhase::End => trigger.end(&mut ctx),
            }
        }
    }
}
