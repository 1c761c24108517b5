//! Trust region management for the Newton refiner.
//!
//! The radius bounds the step length in the scaled norm `‖D·p‖`. It adapts
//! to the agreement between predicted and actual reduction in cost.

/// Trust region state.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    /// Current radius in the scaled norm
    pub radius: f64,

    /// Maximum allowed radius
    pub max_radius: f64,

    /// Minimum gain ratio required to accept a step
    pub min_gain_ratio: f64,

    /// Gain ratio below which the radius shrinks
    pub poor_gain_ratio: f64,

    /// Gain ratio above which a boundary step expands the radius
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self {
            radius: 1.0,
            max_radius: 1e10,
            min_gain_ratio: 1e-4,
            poor_gain_ratio: 0.25,
            good_gain_ratio: 0.75,
        }
    }
}

impl TrustRegion {
    /// Creates a trust region with the given initial and maximum radius.
    pub fn new(radius: f64, max_radius: f64) -> Self {
        Self {
            radius: radius.min(max_radius),
            max_radius,
            ..Default::default()
        }
    }

    /// Updates the radius and decides whether the step is accepted.
    ///
    /// # Arguments
    ///
    /// * `gain_ratio` - The ratio of actual reduction to predicted reduction
    /// * `step_norm` - Scaled length `‖D·p‖` of the trial step
    /// * `on_boundary` - Whether the step was limited by the radius
    pub fn update(&mut self, gain_ratio: f64, step_norm: f64, on_boundary: bool) -> bool {
        if gain_ratio < self.poor_gain_ratio {
            self.radius = 0.25 * step_norm;
        } else if gain_ratio > self.good_gain_ratio && on_boundary {
            self.radius = (2.0 * self.radius).min(self.max_radius);
        }
        gain_ratio > self.min_gain_ratio
    }

    /// Calculates the gain ratio between actual and predicted reduction.
    ///
    /// A non-finite trial cost gives `-inf`, which always shrinks the radius.
    /// When the predicted reduction is negligible relative to the cost, any
    /// non-increase counts as full agreement.
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        if !new_cost.is_finite() {
            return f64::NEG_INFINITY;
        }
        let actual_reduction = current_cost - new_cost;

        if predicted_reduction.abs() <= 1e-15 * current_cost.abs() {
            if actual_reduction >= 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            actual_reduction / predicted_reduction
        }
    }
}
