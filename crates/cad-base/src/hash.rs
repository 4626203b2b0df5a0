//! Stable content hashing for graph nodes.
//!
//! Node identity is a 64-bit fingerprint over the node kind, its constant
//! parameters, and the hashes of its inputs. The fingerprint doubles as the
//! on-disk cache key, so it must be identical across processes; blake3 gives
//! that where the std hasher (randomly keyed SipHash) would not.

use std::fmt;

/// A 64-bit content fingerprint identifying a node's inputs-plus-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashId(u64);

impl HashId {
    pub const fn from_raw(v: u64) -> Self {
        Self(v)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Fixed-width lowercase hex form, used verbatim as the cache file stem.
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental hash builder. Nodes feed their kind tag, parameters and input
/// hashes in a fixed order; `finish` yields the node's `HashId`.
pub struct HashAccumulator {
    inner: blake3::Hasher,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        // Length prefix keeps concatenated fields unambiguous.
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }

    pub fn add_str(&mut self, s: &str) {
        self.add_bytes(s.as_bytes());
    }

    pub fn add_u64(&mut self, v: u64) {
        self.inner.update(&v.to_le_bytes());
    }

    pub fn add_i64(&mut self, v: i64) {
        self.inner.update(&v.to_le_bytes());
    }

    pub fn add_bool(&mut self, v: bool) {
        self.inner.update(&[v as u8]);
    }

    /// Raw bit pattern of the value. Use for parameters that are reproduced
    /// exactly on every run.
    pub fn add_f64(&mut self, v: f64) {
        self.inner.update(&v.to_bits().to_le_bytes());
    }

    /// Quantized value for derived quantities (volumes, tessellated vertex
    /// locations) where the last few ulps may differ between equivalent
    /// builds.
    pub fn add_f64_quantized(&mut self, v: f64, resolution: f64) {
        let q = (v / resolution).round();
        // +0.0 and -0.0 must agree.
        let q = if q == 0.0 { 0.0 } else { q };
        self.inner.update(&(q as i64).to_le_bytes());
    }

    pub fn add_hash(&mut self, h: HashId) {
        self.add_u64(h.raw());
    }

    pub fn finish(self) -> HashId {
        let digest = self.inner.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest.as_bytes()[..8]);
        HashId(u64::from_le_bytes(first))
    }
}

impl Default for HashAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_yields_identical_hash() {
        let mut a = HashAccumulator::new();
        a.add_str("box");
        a.add_f64(2.0);
        let mut b = HashAccumulator::new();
        b.add_str("box");
        b.add_f64(2.0);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let mut a = HashAccumulator::new();
        a.add_str("ab");
        a.add_str("c");
        let mut b = HashAccumulator::new();
        b.add_str("a");
        b.add_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn quantized_values_absorb_roundoff() {
        let mut a = HashAccumulator::new();
        a.add_f64_quantized(24.0, 1e-9);
        let mut b = HashAccumulator::new();
        b.add_f64_quantized(24.0 + 1e-13, 1e-9);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn negative_zero_quantizes_like_zero() {
        let mut a = HashAccumulator::new();
        a.add_f64_quantized(0.0, 1e-9);
        let mut b = HashAccumulator::new();
        b.add_f64_quantized(-1e-15, 1e-9);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn hex_form_is_fixed_width() {
        assert_eq!(HashId::from_raw(0x1a).to_hex().len(), 16);
        assert_eq!(HashId::from_raw(0x1a).to_hex(), "000000000000001a");
    }
}
