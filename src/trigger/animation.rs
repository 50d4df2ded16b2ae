use bevy::prelude::*;

use super::{FlythroughEffect, FlythroughTrigger, TriggerContext};

/// What to do with an animation player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationAction {
    #[default]
    DoNothing,
    /// Play the given node of the player's animation graph.
    Play(AnimationNodeIndex),
    /// Stop everything the player is playing.
    Stop,
}

/// Plays or stops an animation when a segment starts or ends.
#[derive(Debug, Clone, Default)]
pub struct AnimationTrigger {
    /// Entity with the [`AnimationPlayer`] to drive.
    pub player: Option<Entity>,
    pub action_on_start: AnimationAction,
    pub action_on_end: AnimationAction,
}

impl AnimationTrigger {
    pub fn new(player: Entity) -> Self {
        Self {
            player: Some(player),
            ..default()
        }
    }

    pub fn with_start_action(mut self, action: AnimationAction) -> Self {
        self.action_on_start = action;
        self
    }

    pub fn with_end_action(mut self, action: AnimationAction) -> Self {
        self.action_on_end = action;
        self
    }

    fn fire(&self, ctx: &mut TriggerContext, action: AnimationAction) {
        let Some(player) = self.player else {
            warn!(
                "Animation player was not supplied on {} - skipping trigger",
                ctx.waypoint.name
            );
            return;
        };
        if action != AnimationAction::DoNothing {
            ctx.push(FlythroughEffect::Animation { player, action });
        }
    }
}

impl FlythroughTrigger for AnimationTrigger {
    fn on_start(&mut self, ctx: &mut TriggerContext) {
        self.fire(ctx, self.action_on_start);
    }

    fn on_end(&mut self, ctx: &mut TriggerContext) {
        self.fire(ctx, self.action_on_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::tests::context;

    #[test]
    fn test_start_and_end_actions() {
        let player = World::new().spawn_empty().id();
        let node = AnimationNodeIndex::new(1);
        let mut trigger = AnimationTrigger::new(player)
            .with_start_action(AnimationAction::Play(node))
            .with_end_action(AnimationAction::Stop);

        let mut effects = Vec::new();
        trigger.on_start(&mut context(&mut effects));
        trigger.on_end(&mut context(&mut effects));

        assert_eq!(
            effects,
            vec![
                FlythroughEffect::Animation {
                    player,
                    action: AnimationAction::Play(node),
                },
                FlythroughEffect::Animation {
                    player,
                    action: AnimationAction::Stop,
                },
            ]
        );
    }

    #[test]
    fn test_missing_player_is_skipped() {
        let mut trigger = AnimationTrigger::default().with_start_action(AnimationAction::Stop);
        let mut effects = Vec::new();
        trigger.on_start(&mut context(&mut effects));
        assert!(effects.is_empty());
    }
}
