use serde::{Deserialize, Serialize};

use crate::adam::AdamConfig;

/// Per-parameter-group learning rates. The defaults are the documented
/// optimization contract, not incidental values; change them deliberately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Learning rate for splat positions.
    pub lr_mean: f64,

    /// Learning rate for the log-scale parameters.
    pub lr_scale: f64,

    /// Learning rate for the raw rotation quaternions.
    pub lr_rotation: f64,

    /// Learning rate for the opacity logits.
    pub lr_opac: f64,

    /// Learning rate for the base SH (RGB) coefficients.
    pub lr_coeffs_dc: f64,

    pub adam: AdamConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr_mean: 0.0016,
            lr_scale: 0.005,
            lr_rotation: 0.001,
            lr_opac: 0.05,
            lr_coeffs_dc: 0.0025,
            adam: AdamConfig::default(),
        }
    }
}
