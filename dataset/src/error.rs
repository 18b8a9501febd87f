use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("file does not start with a ply magic line")]
    BadMagic,

    #[error("unsupported ply flavor: {0}")]
    UnsupportedFormat(String),

    #[error("malformed ply header: {0}")]
    MalformedHeader(String),

    #[error("ply vertex element is missing required property `{0}`")]
    MissingProperty(&'static str),

    #[error("ply vertex data truncated: wanted {expected} bytes, file holds {got}")]
    Truncated { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("ply error: {0}")]
    Format(#[from] FormatError),

    #[error("file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("splat store rejected input: {0}")]
    Scene(#[from] scene::SceneError),

    #[error("depth estimation failed: {0}")]
    DepthEstimation(String),
}
