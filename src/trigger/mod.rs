//! Triggers fired by waypoints as the flythrough moves through their segments.
//!
//! Each waypoint owns any number of [`WaypointTrigger`]s. A trigger is called
//! when its segment starts (before any position update on that segment), once
//! per frame while the segment is traversed, and when the segment ends (before
//! the flythrough moves to the next one). Whether each phase fires is
//! configured per trigger. A trigger that [handles its own
//! phases](FlythroughTrigger::handles_phases) is called in every phase and
//! reads the enabled ones from [`TriggerContext::phases`].
//!
//! Triggers never reach into the world directly. They push
//! [`FlythroughEffect`]s that the host applies after the flythrough update,
//! so a trigger cannot change path topology while it is being dispatched.

mod animation;
mod fade;
mod linked;

pub use animation::*;
pub use fade::*;
pub use linked::*;

use std::fmt;
use std::time::Duration;

use bevy::prelude::*;

use crate::flythrough::FlythroughCommand;

/// Side effect requested by a trigger or by the flythrough itself.
#[derive(Debug, Clone, PartialEq)]
pub enum FlythroughEffect {
    /// Drive an animation player.
    Animation {
        player: Entity,
        action: AnimationAction,
    },
    /// Start a screen fade. The host runs it to completion on its own clock.
    Fade(Fade),
    /// Control another flythrough.
    Control {
        flythrough: Entity,
        command: FlythroughCommand,
    },
    /// Terminate the host application.
    Exit,
}

/// Read-only view of the waypoint a trigger belongs to.
#[derive(Debug, Clone, Copy)]
pub struct WaypointView<'a> {
    pub index: usize,
    pub name: &'a str,
    pub segment_distance: f32,
    pub segment_duration: Duration,
}

/// The phases a [`WaypointTrigger`] is enabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPhases {
    pub at_start: bool,
    pub on_update: bool,
    pub at_end: bool,
}

impl Default for TriggerPhases {
    fn default() -> Self {
        Self {
            at_start: true,
            on_update: false,
            at_end: true,
        }
    }
}

/// Everything a trigger gets to see and do while it is dispatched.
pub struct TriggerContext<'a> {
    pub waypoint: WaypointView<'a>,
    /// Phases enabled on the trigger being dispatched.
    pub phases: TriggerPhases,
    /// Frame time of the current update, in seconds.
    pub delta: f32,
    pub effects: &'a mut Vec<FlythroughEffect>,
}

impl TriggerContext<'_> {
    pub fn push(&mut self, effect: FlythroughEffect) {
        self.effects.push(effect);
    }
}

/// Capability set of a trigger handler.
///
/// Implement this for custom triggers and attach them with
/// [`WaypointTrigger::custom`].
pub trait FlythroughTrigger: Send + Sync + 'static {
    /// Return `true` to be called in every phase and check
    /// [`TriggerContext::phases`] itself. Otherwise only enabled phases are called.
    fn handles_phases(&self) -> bool {
        false
    }

    /// The waypoint's segment has started.
    fn on_start(&mut self, _ctx: &mut TriggerContext) {}

    /// The waypoint's segment is being traversed; `progress` is in `[0, 1]`.
    fn on_update(&mut self, _ctx: &mut TriggerContext, _progress: f32) {}

    /// The waypoint's segment has been completed.
    fn on_end(&mut self, _ctx: &mut TriggerContext) {}
}

/// The built-in trigger variants.
pub enum TriggerKind {
    Animation(AnimationTrigger),
    Fade(FadeTrigger),
    LinkedPath(LinkedPathTrigger),
    Custom(Box<dyn FlythroughTrigger>),
}

impl fmt::Debug for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Animation(trigger) => f.debug_tuple("Animation").field(trigger).finish(),
            Self::Fade(trigger) => f.debug_tuple("Fade").field(trigger).finish(),
            Self::LinkedPath(trigger) => f.debug_tuple("LinkedPath").field(trigger).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl FlythroughTrigger for TriggerKind {
    fn handles_phases(&self) -> bool {
        match self {
            Self::Animation(trigger) => trigger.handles_phases(),
            Self::Fade(trigger) => trigger.handles_phases(),
            Self::LinkedPath(trigger) => trigger.handles_phases(),
            Self::Custom(trigger) => trigger.handles_phases(),
        }
    }

    fn on_start(&mut self, ctx: &mut TriggerContext) {
        match self {
            Self::Animation(trigger) => trigger.on_start(ctx),
            Self::Fade(trigger) => trigger.on_start(ctx),
            Self::LinkedPath(trigger) => trigger.on_start(ctx),
            Self::Custom(trigger) => trigger.on_start(ctx),
        }
    }

    fn on_update(&mut self, ctx: &mut TriggerContext, progress: f32) {
        match self {
            Self::Animation(trigger) => trigger.on_update(ctx, progress),
            Self::Fade(trigger) => trigger.on_update(ctx, progress),
            Self::LinkedPath(trigger) => trigger.on_update(ctx, progress),
            Self::Custom(trigger) => trigger.on_update(ctx, progress),
        }
    }

    fn on_end(&mut self, ctx: &mut TriggerContext) {
        match self {
            Self::Animation(trigger) => trigger.on_end(ctx),
            Self::Fade(trigger) => trigger.on_end(ctx),
            Self::LinkedPath(trigger) => trigger.on_end(ctx),
            Self::Custom(trigger) => trigger.on_end(ctx),
        }
    }
}

/// A trigger attached to a waypoint, with the phases it fires in.
#[derive(Debug)]
pub struct WaypointTrigger {
    /// Fire when the segment starts.
    pub at_start: bool,
    /// Fire every frame while the segment is traversed.
    pub on_update: bool,
    /// Fire when the segment ends.
    pub at_end: bool,
    pub kind: TriggerKind,
}

impl WaypointTrigger {
    /// Wrap a trigger that fires at start and end.
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            at_start: true,
            on_update: false,
            at_end: true,
            kind,
        }
    }

    pub fn animation(trigger: AnimationTrigger) -> Self {
        Self::new(TriggerKind::Animation(trigger))
    }

    pub fn fade(trigger: FadeTrigger) -> Self {
        Self::new(TriggerKind::Fade(trigger))
    }

    pub fn linked_path(trigger: LinkedPathTrigger) -> Self {
        Self::new(TriggerKind::LinkedPath(trigger))
    }

    pub fn custom(trigger: impl FlythroughTrigger) -> Self {
        Self::new(TriggerKind::Custom(Box::new(trigger)))
    }

    /// Enable or disable firing at segment start.
    pub fn with_at_start(mut self, enabled: bool) -> Self {
        self.at_start = enabled;
        self
    }

    /// Enable or disable firing on every update.
    pub fn with_on_update(mut self, enabled: bool) -> Self {
        self.on_update = enabled;
        self
    }

    /// Enable or disable firing at segment end.
    pub fn with_at_end(mut self, enabled: bool) -> Self {
        self.at_end = enabled;
        self
    }

    pub fn phases(&self) -> TriggerPhases {
        TriggerPhases {
            at_start: self.at_start,
            on_update: self.on_update,
            at_end: self.at_end,
        }
    }

    pub(crate) fn start(&mut self, ctx: &mut TriggerContext) {
        ctx.phases = self.phases();
        if self.at_start {
            debug!("Started trigger on {}", ctx.waypoint.name);
        }
        if self.at_start || self.kind.handles_phases() {
            self.kind.on_start(ctx);
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut TriggerContext, progress: f32) {
        ctx.phases = self.phases();
        if self.on_update || self.kind.handles_phases() {
            self.kind.on_update(ctx, progress);
        }
    }

    pub(crate) fn end(&mut self, ctx: &mut TriggerContext) {
        ctx.phases = self.phases();
        if self.at_end {
            debug!("Ended trigger on {}", ctx.waypoint.name);
        }
        if self.at_end || self.kind.handles_phases() {
            self.kind.on_end(ctx);
        }
    }
}
