//! Fixed, versioned, little-endian wire types for the ghost-layer protocol.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into owned records.
///
/// Received buffers carry no alignment guarantee, so this copies instead of
/// casting in place.
pub fn decode_records<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, String> {
    let sz = size_of::<T>();
    if bytes.len() % sz != 0 {
        return Err(format!(
            "payload of {} bytes is not a multiple of the {sz}-byte record size",
            bytes.len()
        ));
    }
    Ok(bytes.chunks_exact(sz).map(bytemuck::pod_read_unaligned).collect())
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Count header preceding every ghost payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub version_le: u16,
    pub reserved_le: u16,
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            reserved_le: 0,
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// One boundary cell: global id plus its current cluster id.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct WireGhost {
    pub cell_le: u64,
    pub cluster_le: u32,
    pub reserved_le: u32,
}

impl WireGhost {
    pub fn new(cell: u64, cluster: u32) -> Self {
        Self {
            cell_le: cell.to_le(),
            cluster_le: cluster.to_le(),
            reserved_le: 0,
        }
    }
    pub fn cell(&self) -> u64 {
        u64::from_le(self.cell_le)
    }
    pub fn cluster(&self) -> u32 {
        u32::from_le(self.cluster_le)
    }
}

const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireGhost>(), 16);
