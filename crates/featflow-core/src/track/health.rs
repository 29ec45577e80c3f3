use nalgebra::Vector2;

/// What the flow backend reported for one propagated point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Converged,
    Diverged,
    OutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Diverged,
    OutOfBounds,
    ExcessiveDisplacement,
}

/// Keep/drop verdict for a feature after propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackHealth {
    pub displacement: f32,
    pub drop_reason: Option<DropReason>,
}

impl TrackHealth {
    /// A feature survives only if the backend tracked it and, when a veto is
    /// given, it moved no more than `max_displacement` pixels.
    pub fn evaluate(
        previous: Vector2<f32>,
        propagated: Vector2<f32>,
        outcome: TrackOutcome,
        max_displacement: Option<f32>,
    ) -> Self {
        let displacement = (propagated - previous).norm();
        let drop_reason = match outcome {
            TrackOutcome::Diverged => Some(DropReason::Diverged),
            TrackOutcome::OutOfBounds => Some(DropReason::OutOfBounds),
            TrackOutcome::Converged => match max_displacement {
                Some(limit) if !(displacement <= limit) => Some(DropReason::ExcessiveDisplacement),
                _ => None,
            },
        };
        Self {
            displacement,
            drop_reason,
        }
    }

    pub fn kept(&self) -> bool {
        self.drop_reason.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn small_converged_motion_is_kept() {
        let health = TrackHealth::evaluate(
            Vector2::new(10.0, 10.0),
            Vector2::new(13.0, 14.0),
            TrackOutcome::Converged,
            Some(5.0),
        );
        assert!(health.kept());
        assert_relative_eq!(health.displacement, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn displacement_above_limit_is_vetoed() {
        let health = TrackHealth::evaluate(
            Vector2::new(0.0, 0.0),
            Vector2::new(3.0, 4.01),
            TrackOutcome::Converged,
            Some(5.0),
        );
        assert_eq!(health.drop_reason, Some(DropReason::ExcessiveDisplacement));
    }

    #[test]
    fn no_veto_without_limit_but_failures_still_drop() {
        let far = TrackHealth::evaluate(
            Vector2::zeros(),
            Vector2::new(400.0, 0.0),
            TrackOutcome::Converged,
            None,
        );
        assert!(far.kept());

        let lost = TrackHealth::evaluate(
            Vector2::zeros(),
            Vector2::zeros(),
            TrackOutcome::OutOfBounds,
            None,
        );
        assert_eq!(lost.drop_reason, Some(DropReason::OutOfBounds));
    }

    #[test]
    fn nan_displacement_is_vetoed() {
        let health = TrackHealth::evaluate(
            Vector2::zeros(),
            Vector2::new(f32::NAN, 0.0),
            TrackOutcome::Converged,
            Some(5.0),
        );
        assert!(!health.kept());
    }
}
