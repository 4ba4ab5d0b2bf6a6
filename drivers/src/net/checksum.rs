//! Internet checksum (one's-complement sum over 16-bit words).
//!
//! The accumulator form lets a caller sum a pseudo-header, a protocol
//! header, and a payload in one logical pass without staging them in a
//! contiguous buffer; TCP uses exactly that. Finalization folds the
//! end-around carries and complements. The result is a host-order `u16`;
//! write sites put it on the wire with `to_be_bytes`.

/// Incremental one's-complement accumulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChecksumAccumulator {
    sum: u32,
}

impl ChecksumAccumulator {
    #[inline]
    pub const fn new() -> Self {
        Self { sum: 0 }
    }

    /// Fold `data` into the sum as big-endian 16-bit words; an odd trailing
    /// byte counts as the high byte of a final word.
    pub fn accumulate(&mut self, data: &[u8]) -> &mut Self {
        let mut chunks = data.chunks_exact(2);
        for pair in &mut chunks {
            self.sum += u16::from_be_bytes([pair[0], pair[1]]) as u32;
        }
        if let [last] = chunks.remainder() {
            self.sum += (*last as u32) << 8;
        }
        self
    }

    /// Add one 16-bit value directly (pseudo-header fields).
    #[inline]
    pub fn accumulate_u16(&mut self, value: u16) -> &mut Self {
        self.sum += value as u32;
        self
    }

    /// Fold carries and complement. Idempotent: finalizing the same
    /// accumulator twice yields the same checksum.
    pub fn finalize(&self) -> u16 {
        let mut sum = self.sum;
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }
}

/// One-shot checksum of a contiguous buffer.
pub fn checksum(data: &[u8]) -> u16 {
    let mut acc = ChecksumAccumulator::new();
    acc.accumulate(data);
    acc.finalize()
}

/// `true` if `data` (which embeds its checksum field) re-sums to zero.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}
