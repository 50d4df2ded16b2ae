use bevy::prelude::*;

use super::{FlythroughEffect, FlythroughTrigger, TriggerContext};
use crate::flythrough::FlythroughCommand;

/// What to do with a linked flythrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum LinkedPathAction {
    #[default]
    DoNothing,
    /// Start it, or resume it if it is paused.
    Play,
    Pause,
    Resume,
    Stop,
}

impl LinkedPathAction {
    fn command(self) -> Option<FlythroughCommand> {
        match self {
            Self::DoNothing => None,
            Self::Play => Some(FlythroughCommand::Play),
            Self::Pause => Some(FlythroughCommand::Pause),
            Self::Resume => Some(FlythroughCommand::Resume),
            Self::Stop => Some(FlythroughCommand::Stop),
        }
    }
}

/// Controls another flythrough entity when a segment starts or ends.
#[derive(Debug, Clone)]
pub struct LinkedPathTrigger {
    pub flythrough: Option<Entity>,
    pub action_on_start: LinkedPathAction,
    pub action_on_end: LinkedPathAction,
}

impl Default for LinkedPathTrigger {
    fn default() -> Self {
        Self {
            flythrough: None,
            action_on_start: LinkedPathAction::Play,
            action_on_end: LinkedPathAction::Stop,
        }
    }
}

impl LinkedPathTrigger {
    pub fn new(flythrough: Entity) -> Self {
        Self {
            flythrough: Some(flythrough),
            ..default()
        }
    }

    pub fn with_start_action(mut self, action: LinkedPathAction) -> Self {
        self.action_on_start = action;
        self
    }

    pub fn with_end_action(mut self, action: LinkedPathAction) -> Self {
        self.action_on_end = action;
        self
    }

    fn fire(&self, ctx: &mut TriggerContext, action: LinkedPathAction) {
        let Some(flythrough) = self.flythrough else {
            warn!(
                "Linked flythrough was not supplied on {} - skipping trigger",
                ctx.waypoint.name
            );
            return;
        };
        match action.command() {
            Some(command) => {
                debug!("{:?} linked flythrough from {}", action, ctx.waypoint.name);
                ctx.push(FlythroughEffect::Control {
                    flythrough,
                    command,
                });
            }
            None => debug!("Doing nothing from {}", ctx.waypoint.name),
        }
    }
}

impl FlythroughTrigger for LinkedPathTrigger {
    fn on_start(&mut self, ctx: &mut TriggerContext) {
        self.fire(ctx, self.action_on_start);
    }

    fn on_end(&mut self, ctx: &mut TriggerContext) {
        self.fire(ctx, self.action_on_end);
    }
}
