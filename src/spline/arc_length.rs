//! Arc length resampling of a spline segment into a near-equidistant step table.
//!
//! Stepping a Catmull-Rom curve by its parameter gives visibly uneven speed,
//! so each segment is measured at fine resolution and re-walked to emit points
//! a fixed physical distance apart. Playback then interpolates linearly
//! through the table, which moves the driven object at constant speed.

use std::time::Duration;

use bevy::prelude::*;

use super::SplineWindow;

/// Target number of steps per unit of path length.
pub const STEPS_PER_UNIT: f32 = 3.0;

/// Fine measurements taken per step.
pub const MEASUREMENTS_PER_STEP: f32 = 20.0;

/// Lower bound on measurements for any segment.
pub const MIN_MEASUREMENTS: usize = 60;

/// Segments shorter than this get denser steps for smoother movement.
pub const SHORT_SEGMENT_LENGTH: f32 = 2.0;

/// Step density multiplier applied to short segments.
pub const SHORT_SEGMENT_STEP_MULTIPLIER: f32 = 3.0;

/// Progress samples used to estimate a segment's traversal duration.
pub const DURATION_SAMPLES: usize = 20;

/// Velocities below this are treated as this when estimating durations.
pub const MIN_SPEED: f32 = 0.01;

/// Near-equidistant points approximating constant-speed travel along one segment.
#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct StepTable {
    /// Resampled points, first at the segment start, last exactly at its end.
    pub steps: Vec<Vec3>,
    /// Sum of the distances between consecutive steps.
    pub distance: f32,
    /// Arc length measured on the fine samples.
    pub arc_length: f32,
    /// Target distance between consecutive steps.
    pub spacing: f32,
}

impl StepTable {
    /// A table for a segment that is never traversed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resample the segment described by `window`.
    ///
    /// Every fine sample is passed through `validate` (the height check)
    /// before it is measured, so the table follows the validated path.
    pub fn build(window: &SplineWindow, validate: impl Fn(Vec3) -> Vec3) -> Self {
        let start = window.p1;
        let end = window.p2;

        // More measurements for longer segments
        let measurements = ((STEPS_PER_UNIT * MEASUREMENTS_PER_STEP * window.chord_length()).ceil()
            as usize)
            .max(MIN_MEASUREMENTS);

        // Fine samples are regenerated for each pass rather than stored
        let validate = &validate;
        let fine_samples = move || {
            (1..=measurements)
                .map(move |i| validate(window.evaluate(i as f32 / measurements as f32)))
        };

        let mut arc_length = 0.0;
        let mut previous = start;
        for sample in fine_samples() {
            arc_length += previous.distance(sample);
            previous = sample;
        }
        if arc_length <= f32::EPSILON {
            return Self {
                steps: vec![end],
                distance: 0.0,
                arc_length,
                spacing: 0.0,
            };
        }

        let steps_per_unit = if arc_length < SHORT_SEGMENT_LENGTH {
            STEPS_PER_UNIT * SHORT_SEGMENT_STEP_MULTIPLIER
        } else {
            STEPS_PER_UNIT
        };

        // Nearest spacing to 1 / steps_per_unit that divides the segment evenly
        let step_count = (arc_length * steps_per_unit).floor().max(1.0);
        let spacing = arc_length / step_count;

        let mut steps = Vec::with_capacity(step_count as usize + 2);
        steps.push(start);
        let mut last_step = start;
        let mut stepped = 0.0;
        let mut total_stepped = 0.0;

        let mut previous = start;
        for sample in fine_samples() {
            stepped += previous.distance(sample);
            previous = sample;
            while stepped >= spacing {
                last_step = last_step.lerp(sample, spacing / stepped);
                steps.push(last_step);
                stepped -= spacing;
                total_stepped += spacing;
            }
        }

        // Snap the tail onto the next waypoint: a near miss gets one more
        // point, otherwise the last step is moved onto it.
        if steps.len() < 2 || (total_stepped - arc_length) / spacing < -0.5 {
            steps.push(end);
        } else if let Some(last) = steps.last_mut() {
            *last = end;
        }

        let distance = steps.windows(2).map(|pair| pair[0].distance(pair[1])).sum();

        Self {
            steps,
            distance,
            arc_length,
            spacing,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the step at or before `progress`, and the blend towards the next one.
    pub fn locate(&self, progress: f32) -> Option<(usize, f32)> {
        match self.steps.len() {
            0 => None,
            1 => Some((0, 0.0)),
            len => {
                let last = len - 1;
                let scaled = progress.clamp(0.0, 1.0) * last as f32;
                let index = (scaled as usize).min(last);
                if index == last {
                    Some((last, 0.0))
                } else {
                    Some((index, scaled - index as f32))
                }
            }
        }
    }

    /// Position at `progress` in `[0, 1]`, interpolating between adjacent steps.
    pub fn position(&self, progress: f32) -> Option<Vec3> {
        let (index, blend) = self.locate(progress)?;
        match self.steps.get(index + 1) {
            Some(next) if blend > 0.0 => Some(self.steps[index].lerp(*next, blend)),
            _ => Some(self.steps[index]),
        }
    }

    /// Distances between consecutive steps.
    pub fn step_lengths(&self) -> impl Iterator<Item = f32> + '_ {
        self.steps.windows(2).map(|pair| pair[0].distance(pair[1]))
    }
}

/// Estimate how long a segment takes to traverse.
///
/// Samples `position` and `velocity` at [`DURATION_SAMPLES`] equal progress
/// increments and sums `distance / velocity` over the increments.
pub fn sample_duration(position: impl Fn(f32) -> Vec3, velocity: impl Fn(f32) -> f32) -> Duration {
    let mut seconds = 0.0;
    let mut last = position(0.0);
    for i in 1..=DURATION_SAMPLES {
        let progress = i as f32 / DURATION_SAMPLES as f32;
        let current = position(progress);
        seconds += last.distance(current) / velocity(progress).max(MIN_SPEED);
        last = current;
    }
    Duration::try_from_secs_f32(seconds).unwrap_or(Duration::ZERO)
}
