//! End-to-end flows tying projection, optimization and serialization
//! together, with every failure tagged by the stage it happened in.

mod convert;
mod error;
mod optimize;
mod solidify;
mod texture;

pub use convert::{ProjectOptions, convert_image, image_to_cloud};
pub use error::PipelineError;
pub use optimize::optimize;
pub use solidify::{
    DEFAULT_MESH_OPACITY_LOGIT, SOLID_OPACITY_LOGIT, SolidifyOptions, solidify,
};
pub use texture::{TextureOptions, texture_cloud};
