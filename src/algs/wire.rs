//! Fixed, versioned, little-endian wire types for collective and exchange paths.

use bytemuck::{Pod, Zeroable};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode records from a received buffer. The buffer length must be a
/// multiple of the record size; received `Vec<u8>` data carries no alignment
/// guarantee, so records are copied out.
pub fn cast_slice_from<T: Pod>(v: &[u8]) -> Vec<T> {
    v.chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
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

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

/// Length prefix of a variable-size payload.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireLen {
    pub n_le: u64,
}

impl WireLen {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// Count of following records.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// One rank's request in a communicator split.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireSplit {
    pub version_le: u16,
    pub has_color_le: u16,
    pub reserved_le: u32,
    pub color_le: u64,
    pub key_le: u64,
}

impl WireSplit {
    pub fn new(color: Option<usize>, key: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            has_color_le: (color.is_some() as u16).to_le(),
            reserved_le: 0,
            color_le: (color.unwrap_or(0) as u64).to_le(),
            key_le: (key as u64).to_le(),
        }
    }
    pub fn color(&self) -> Option<usize> {
        (u16::from_le(self.has_color_le) != 0).then(|| u64::from_le(self.color_le) as usize)
    }
    pub fn key(&self) -> usize {
        u64::from_le(self.key_le) as usize
    }
}

/// A fixed-size scalar carried through reductions and gathers.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireI64 {
    pub v_le: i64,
}

impl WireI64 {
    pub fn of(v: i64) -> Self {
        Self { v_le: v.to_le() }
    }
    pub fn get(&self) -> i64 {
        i64::from_le(self.v_le)
    }
}

/// An `f64` carried as its little-endian bit pattern.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireF64 {
    pub bits_le: u64,
}

impl WireF64 {
    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

/// A force contribution to one interface dof.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireDofValue {
    pub gid_le: u64,
    pub bits_le: u64,
}

impl WireDofValue {
    pub fn new(gid: usize, value: f64) -> Self {
        Self {
            gid_le: (gid as u64).to_le(),
            bits_le: value.to_bits().to_le(),
        }
    }
    pub fn gid(&self) -> usize {
        u64::from_le(self.gid_le) as usize
    }
    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}
