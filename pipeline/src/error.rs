use thiserror::Error;

use dataset::DatasetError;
use train::TrainError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("projection stage failed: {0}")]
    Projection(#[from] DatasetError),

    #[error("optimization stage failed at iteration {iter}: {source}")]
    Optimization {
        iter: u32,
        #[source]
        source: TrainError,
    },

    #[error("serialization stage failed: {0}")]
    Serialization(DatasetError),

    #[error("invalid input: {0}")]
    Input(#[from] scene::SceneError),
}
