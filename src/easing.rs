//! Easing curves used to bias segment progress before interpolation.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Scalar remapping of a progress value in `[0, 1]`.
///
/// Each waypoint carries three independent selections: one for velocity,
/// one for position and one for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
#[reflect(Default)]
pub enum Easing {
    /// No remapping.
    #[default]
    Linear,
    /// Quadratic, slow start.
    EaseIn,
    /// Quadratic, slow finish.
    EaseOut,
    /// Quadratic, slow start and finish.
    EaseInOut,
}

impl Easing {
    /// Remap `t`. Input is clamped to `[0, 1]`.
    #[inline]
    pub fn ease(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => -t * (t - 2.0),
            Self::EaseInOut => {
                let t = t * 2.0;
                if t < 1.0 {
                    0.5 * t * t
                } else {
                    let t = t - 1.0;
                    -0.5 * (t * (t - 2.0) - 1.0)
                }
            }
        }
    }

    /// Get the display name for this easing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::EaseIn => "Ease In",
            Self::EaseOut => "Ease Out",
            Self::EaseInOut => "Ease In Out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 4] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
    ];

    #[test]
    fn test_endpoints_are_fixed() {
        for easing in ALL {
            assert!(easing.ease(0.0).abs() < 1e-6, "{}", easing.name());
            assert!((easing.ease(1.0) - 1.0).abs() < 1e-6, "{}", easing.name());
        }
    }

    #[test]
    fn test_curves_are_monotonic() {
        for easing in ALL {
            let mut last = easing.ease(0.0);
            for i in 1..=100 {
                let value = easing.ease(i as f32 / 100.0);
                assert!(value >= last - 1e-6, "{} went backwards", easing.name());
                last = value;
            }
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let easing = Easing::EaseInOut;
        assert!((easing.ease(0.5) - 0.5).abs() < 1e-6);
        assert!((easing.ease(0.25) + easing.ease(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_input_is_clamped() {
        assert_eq!(Easing::EaseIn.ease(-1.0), 0.0);
        assert_eq!(Easing::EaseOut.ease(2.0), 1.0);
    }
}
