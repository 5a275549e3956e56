//! Per-face boundary condition codes of tetrahedral cells.
//!
//! Mesh readers hand over one code per face. The packed form stores the four
//! codes of a cell in one `u32`, 8 bits per face, face 0 in the low byte.

use serde::{Deserialize, Serialize};

/// Faces per tetrahedron.
pub const FACES_PER_CELL: usize = 4;

/// Classification of a cell face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceType {
    /// Interior face (code 0).
    Regular,
    /// Free surface (code 1).
    FreeSurface,
    /// Free surface with gravity (code 2).
    FreeSurfaceGravity,
    /// Dynamic rupture fault face (code 3).
    DynamicRupture,
    /// Absorbing / outflow boundary (code 5).
    Absorbing,
    /// Periodic boundary (code 6).
    Periodic,
    /// Analytical boundary (code 7).
    Analytical,
    /// Any other code; carries no extra cost.
    Other(u8),
}

impl From<u8> for FaceType {
    fn from(code: u8) -> Self {
        match code {
            0 => FaceType::Regular,
            1 => FaceType::FreeSurface,
            2 => FaceType::FreeSurfaceGravity,
            3 => FaceType::DynamicRupture,
            5 => FaceType::Absorbing,
            6 => FaceType::Periodic,
            7 => FaceType::Analytical,
            other => FaceType::Other(other),
        }
    }
}

impl From<FaceType> for u8 {
    fn from(face: FaceType) -> Self {
        match face {
            FaceType::Regular => 0,
            FaceType::FreeSurface => 1,
            FaceType::FreeSurfaceGravity => 2,
            FaceType::DynamicRupture => 3,
            FaceType::Absorbing => 5,
            FaceType::Periodic => 6,
            FaceType::Analytical => 7,
            FaceType::Other(code) => code,
        }
    }
}

/// Code of `face` in a packed per-cell word.
#[inline]
pub fn packed_face_code(packed: u32, face: usize) -> u8 {
    debug_assert!(face < FACES_PER_CELL);
    ((packed >> (8 * face)) & 0xFF) as u8
}

/// Split a packed word into its four face codes.
pub fn unpack_face_codes(packed: u32) -> [u8; FACES_PER_CELL] {
    std::array::from_fn(|face| packed_face_code(packed, face))
}

/// Inverse of [`unpack_face_codes`].
pub fn pack_face_codes(codes: [u8; FACES_PER_CELL]) -> u32 {
    codes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (face, &c)| acc | (u32::from(c) << (8 * face)))
}
