//! Helpers for the camera's 4x4 world model matrix

use super::types::{ModelMatrix, Position, Rotation, Transform};
use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};

/// Translation column of a model matrix
pub fn translation(matrix: &ModelMatrix) -> Position {
    Position::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Rotation part of a model matrix, assuming unit scale
pub fn rotation(matrix: &ModelMatrix) -> Rotation {
    let upper: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&upper))
}

/// Model matrix for a position and rotation with unit scale
pub fn model_matrix(position: &Position, rotation: &Rotation) -> ModelMatrix {
    Transform::from_parts(Translation3::from(*position), *rotation).to_homogeneous()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rotation::{euler_to_rotation, same_orientation};

    #[test]
    fn decomposes_what_it_composes() {
        let position = Position::new(1.5, -0.25, 3.0);
        let rot = euler_to_rotation(&Position::new(10.0, 70.0, -5.0));
        let matrix = model_matrix(&position, &rot);

        assert_eq!(translation(&matrix), position);
        assert!(same_orientation(&rotation(&matrix), &rot, 1e-9));
    }

    #[test]
    fn translation_reads_last_column() {
        let mut matrix = ModelMatrix::identity();
        matrix[(0, 3)] = 4.0;
        matrix[(1, 3)] = 5.0;
        matrix[(2, 3)] = 6.0;
        assert_eq!(translation(&matrix), Position::new(4.0, 5.0, 6.0));
    }
}
