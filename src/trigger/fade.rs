use bevy::prelude::*;

use super::{FlythroughEffect, FlythroughTrigger, TriggerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum FadeAction {
    #[default]
    DoNothing,
    /// Ramp the overlay level from 0 to 1.
    FadeIn,
    /// Ramp the overlay level from 1 to 0.
    FadeOut,
}

/// A running fade, advanced by the frame clock.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct Fade {
    pub color: Color,
    pub action: FadeAction,
    pub duration: f32,
    elapsed: f32,
}

impl Fade {
    /// Start a fade. Returns `None` for [`FadeAction::DoNothing`].
    pub fn start(color: Color, action: FadeAction, duration: f32) -> Option<Self> {
        if action == FadeAction::DoNothing {
            return None;
        }
        Some(Self {
            color,
            action,
            duration: duration.max(0.0),
            elapsed: 0.0,
        })
    }

    /// Advance the fade by `delta` seconds and return the new overlay level.
    pub fn tick(&mut self, delta: f32) -> f32 {
        self.elapsed = (self.elapsed + delta.max(0.0)).min(self.duration);
        self.level()
    }

    /// Current overlay level in `[0, 1]`.
    pub fn level(&self) -> f32 {
        let progress = if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        };
        match self.action {
            FadeAction::FadeOut => 1.0 - progress,
            _ => progress,
        }
    }

    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Fades a screen overlay when a segment starts, and again so that a second
/// fade finishes as the segment ends.
///
/// The start fade runs when `at_start` is enabled. The end fade runs when
/// `at_end` is enabled: it is scheduled from the segment duration when the
/// segment starts and begins on the first update past that point, or when the
/// segment ends if playback got there sooner. Fades are handed to the host,
/// which runs them to completion even after the segment is left.
#[derive(Debug, Clone)]
pub struct FadeTrigger {
    pub action_on_start: FadeAction,
    pub action_on_end: FadeAction,
    pub start_color: Color,
    pub end_color: Color,
    /// Seconds.
    pub start_duration: f32,
    /// Seconds.
    pub end_duration: f32,
    elapsed: f32,
    end_fade_at: Option<f32>,
}

impl Default for FadeTrigger {
    fn default() -> Self {
        Self {
            action_on_start: FadeAction::FadeIn,
            action_on_end: FadeAction::DoNothing,
            start_color: Color::BLACK,
            end_color: Color::BLACK,
            start_duration: 0.25,
            end_duration: 0.25,
            elapsed: 0.0,
            end_fade_at: None,
        }
    }
}

impl FadeTrigger {
    pub fn with_start(mut self, action: FadeAction, color: Color, duration: f32) -> Self {
        self.action_on_start = action;
        self.start_color = color;
        self.start_duration = duration;
        self
    }

    pub fn with_end(mut self, action: FadeAction, color: Color, duration: f32) -> Self {
        self.action_on_end = action;
        self.end_color = color;
        self.end_duration = duration;
        self
    }

    /// Seconds into the segment at which the end fade begins, while it is pending.
    pub fn end_fade_at(&self) -> Option<f32> {
        self.end_fade_at
    }

    fn begin_end_fade(&mut self, ctx: &mut TriggerContext) {
        self.end_fade_at = None;
        if let Some(fade) = Fade::start(self.end_color, self.action_on_end, self.end_duration) {
            ctx.push(FlythroughEffect::Fade(fade));
        }
    }
}

impl FlythroughTrigger for FadeTrigger {
    fn handles_phases(&self) -> bool {
        true
    }

    fn on_start(&mut self, ctx: &mut TriggerContext) {
        if ctx.phases.at_start {
            if let Some(fade) =
                Fade::start(self.start_color, self.action_on_start, self.start_duration)
            {
                ctx.push(FlythroughEffect::Fade(fade));
            }
        }

        self.elapsed = 0.0;
        self.end_fade_at = None;
        if ctx.phases.at_end && self.action_on_end != FadeAction::DoNothing {
            let segment_secs = ctx.waypoint.segment_duration.as_secs_f32();
            let lead = self.end_duration.min(segment_secs);
            self.end_fade_at = Some(segment_secs - lead);
        }
    }

    fn on_update(&mut self, ctx: &mut TriggerContext, _progress: f32) {
        let Some(at) = self.end_fade_at else {
            return;
        };
        self.elapsed += ctx.delta;
        if self.elapsed >= at {
            self.begin_end_fade(ctx);
        }
    }

    fn on_end(&mut self, ctx: &mut TriggerContext) {
        if self.end_fade_at.is_some() {
            self.begin_end_fade(ctx);
        }
    }
}
