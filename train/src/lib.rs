pub mod adam;
pub mod config;
pub mod train;

pub use adam::{AdamConfig, AdamState};
pub use config::TrainConfig;
pub use train::{ParamGroup, SplatTrainer, StepStats, TrainError};
