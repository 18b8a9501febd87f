use glam::Vec3;

use crate::error::DatasetError;

/// Index-aligned positions and [0, 1] RGB colors.
#[derive(Debug, Clone)]
pub struct PointCloud {
    positions: Vec<Vec3>,
    colors: Vec<Vec3>,
}

impl PointCloud {
    pub fn new(positions: Vec<Vec3>, colors: Vec<Vec3>) -> Result<Self, DatasetError> {
        if positions.len() != colors.len() {
            return Err(DatasetError::ShapeMismatch(format!(
                "{} positions vs {} colors",
                positions.len(),
                colors.len()
            )));
        }
        Ok(Self { positions, colors })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn into_parts(self) -> (Vec<Vec3>, Vec<Vec3>) {
        (self.positions, self.colors)
    }
}
