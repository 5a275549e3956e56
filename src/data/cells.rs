//! Per-cell physical input supplied by the mesh collaborator.

use crate::data::bc::{FACES_PER_CELL, FaceType, unpack_face_codes};
use crate::lts_error::LtsWeightsError;

/// Extra-cost boundary features a cell touches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CellFlags {
    pub dynamic_rupture: bool,
    pub free_surface_with_gravity: bool,
}

/// Read-only per-cell data of the local partition, indexed by local cell id.
#[derive(Debug, Clone, PartialEq)]
pub struct CellData {
    velocities: Vec<f64>,
    element_lengths: Vec<f64>,
    faces: Vec<[u8; FACES_PER_CELL]>,
}

impl CellData {
    /// Build from wave velocities, element length factors and per-face codes.
    ///
    /// The element length is the numerator of `dt = length / velocity`, i.e.
    /// the insphere-based CFL length of the cell.
    pub fn new(
        velocities: Vec<f64>,
        element_lengths: Vec<f64>,
        faces: Vec<[u8; FACES_PER_CELL]>,
    ) -> Result<Self, LtsWeightsError> {
        let n = velocities.len();
        if element_lengths.len() != n {
            return Err(LtsWeightsError::LengthMismatch {
                what: "element_lengths",
                expected: n,
                found: element_lengths.len(),
            });
        }
        if faces.len() != n {
            return Err(LtsWeightsError::LengthMismatch {
                what: "boundary codes",
                expected: n,
                found: faces.len(),
            });
        }
        Ok(Self {
            velocities,
            element_lengths,
            faces,
        })
    }

    /// Like [`CellData::new`], with boundary codes packed 8 bits per face.
    pub fn from_packed(
        velocities: Vec<f64>,
        element_lengths: Vec<f64>,
        packed: &[u32],
    ) -> Result<Self, LtsWeightsError> {
        let faces = packed.iter().map(|&p| unpack_face_codes(p)).collect();
        Self::new(velocities, element_lengths, faces)
    }

    /// Interior cells only, all sharing one element length.
    pub fn interior(velocities: Vec<f64>, element_length: f64) -> Self {
        let n = velocities.len();
        Self {
            velocities,
            element_lengths: vec![element_length; n],
            faces: vec![[0; FACES_PER_CELL]; n],
        }
    }

    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn element_lengths(&self) -> &[f64] {
        &self.element_lengths
    }

    pub fn face_type(&self, cell: usize, face: usize) -> FaceType {
        FaceType::from(self.faces[cell][face])
    }

    pub fn face_types(&self, cell: usize) -> [FaceType; FACES_PER_CELL] {
        self.faces[cell].map(FaceType::from)
    }

    pub fn has_face(&self, cell: usize, kind: FaceType) -> bool {
        self.face_types(cell).contains(&kind)
    }

    pub fn flags(&self, cell: usize) -> CellFlags {
        CellFlags {
            dynamic_rupture: self.has_face(cell, FaceType::DynamicRupture),
            free_surface_with_gravity: self.has_face(cell, FaceType::FreeSurfaceGravity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_face_codes() {
        let cells = CellData::from_packed(
            vec![1.0, 1.0, 1.0],
            vec![1.0; 3],
            &[0, 0x0300, 0x02_00_00_03],
        )
        .unwrap();
        assert_eq!(cells.flags(0), CellFlags::default());
        assert!(cells.flags(1).dynamic_rupture);
        assert!(!cells.flags(1).free_surface_with_gravity);
        assert_eq!(
            cells.flags(2),
            CellFlags {
                dynamic_rupture: true,
                free_surface_with_gravity: true
            }
        );
        assert_eq!(cells.face_type(1, 1), FaceType::DynamicRupture);
    }

    #[test]
    fn lengths_must_agree() {
        let err = CellData::new(vec![1.0, 2.0], vec![1.0], vec![[0; 4]; 2]).unwrap_err();
        assert!(matches!(
            err,
            LtsWeightsError::LengthMismatch {
                what: "element_lengths",
                expected: 2,
                found: 1
            }
        ));
    }
}
