//! Adam as described in [Adam: A Method for Stochastic
//! Optimization](https://arxiv.org/pdf/1412.6980.pdf), on flat f32
//! parameter arrays with bias-corrected moments.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamConfig {
    pub beta_1: f32,
    pub beta_2: f32,
    /// A value required for numerical stability.
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Persistent first/second moment state for one parameter group.
#[derive(Debug, Clone)]
pub struct AdamState {
    moment_1: Vec<f32>,
    moment_2: Vec<f32>,
    time: u32,
}

impl AdamState {
    pub fn new(len: usize) -> Self {
        Self {
            moment_1: vec![0.0; len],
            moment_2: vec![0.0; len],
            time: 0,
        }
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    /// One bias-corrected update step in place.
    ///
    /// Length mismatches are a caller contract violation: parameter groups
    /// never change size once created.
    pub fn update(&mut self, config: &AdamConfig, lr: f64, params: &mut [f32], grads: &[f32]) {
        assert_eq!(params.len(), self.moment_1.len(), "parameter group resized");
        assert_eq!(grads.len(), params.len(), "gradient length mismatch");

        self.time += 1;
        let bias_1 = 1.0 - config.beta_1.powi(self.time as i32);
        let bias_2 = 1.0 - config.beta_2.powi(self.time as i32);

        for ((p, g), (m1, m2)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.moment_1.iter_mut().zip(self.moment_2.iter_mut()))
        {
            *m1 = config.beta_1 * *m1 + (1.0 - config.beta_1) * g;
            *m2 = config.beta_2 * *m2 + (1.0 - config.beta_2) * g * g;

            let m1_hat = *m1 / bias_1;
            let m2_hat = *m2 / bias_2;
            *p -= lr as f32 * m1_hat / (m2_hat.sqrt() + config.epsilon);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_lr() {
        // With zero moments, the bias-corrected first step is lr * sign(g)
        // (up to epsilon).
        let mut state = AdamState::new(2);
        let mut params = vec![1.0f32, -2.0];
        state.update(&AdamConfig::default(), 0.1, &mut params, &[0.5, -3.0]);

        assert!((params[0] - 0.9).abs() < 1e-4);
        assert!((params[1] + 1.9).abs() < 1e-4);
        assert_eq!(state.time(), 1);
    }

    #[test]
    fn converges_on_quadratic() {
        // Minimize (p - 3)^2 with gradient 2(p - 3).
        let mut state = AdamState::new(1);
        let config = AdamConfig::default();
        let mut params = vec![0.0f32];
        for _ in 0..2000 {
            let grad = 2.0 * (params[0] - 3.0);
            state.update(&config, 0.05, &mut params, &[grad]);
        }
        assert!((params[0] - 3.0).abs() < 0.05, "ended at {}", params[0]);
    }

    #[test]
    #[should_panic(expected = "gradient length mismatch")]
    fn rejects_mismatched_gradients() {
        let mut state = AdamState::new(2);
        let mut params = vec![0.0f32; 2];
        state.update(&AdamConfig::default(), 0.1, &mut params, &[1.0]);
    }
}
