pub mod activation;
pub mod camera;
pub mod splats;

mod error;

pub use camera::{Camera, Intrinsics};
pub use error::SceneError;
pub use splats::{ActivatedSplats, NormalizeInfo, Splats};
