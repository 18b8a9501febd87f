use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("attribute count mismatch: {name} has {got} entries, expected {expected}")]
    ShapeMismatch {
        name: &'static str,
        got: usize,
        expected: usize,
    },
}
