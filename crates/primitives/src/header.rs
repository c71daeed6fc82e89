use crate::{hash256, BlockHash, U256};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A block header.
///
/// The proof-of-work commitment is the double SHA-256 of the 80 byte
/// consensus encoding, compared against the target decoded from `bits`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Block version, interpreted against the minimum version schedule.
    pub version: u32,
    /// Hash of the parent block header.
    pub previous_block_hash: BlockHash,
    /// Merkle root committing to the block's transactions.
    pub merkle_root: BlockHash,
    /// Unix timestamp claimed by the miner.
    pub timestamp: u32,
    /// Compact encoding of the proof-of-work target.
    pub bits: u32,
    /// Arbitrary nonce ground by the miner.
    pub nonce: u32,
}

impl Header {
    /// Consensus encoding of the header, 80 bytes, all integers little endian.
    pub fn encode(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.previous_block_hash.as_slice());
        out[36..68].copy_from_slice(self.merkle_root.as_slice());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Computes the hash of the header.
    ///
    /// This is expensive, see [`Header::seal_slow`] to cache it.
    pub fn hash_slow(&self) -> BlockHash {
        hash256(&self.encode())
    }

    /// Proof contributed by this header, derived from its compact target.
    pub fn proof(&self) -> U256 {
        proof(self.bits)
    }

    /// Returns true if the header hash satisfies its own compact target.
    ///
    /// Hashes are compared as little endian integers, per consensus.
    pub fn is_valid_proof_of_work(&self) -> bool {
        let Some(target) = compact_to_target(self.bits) else { return false };
        let value = U256::from_le_slice(self.hash_slow().as_slice());
        value <= target
    }

    /// Seals the header, caching its hash.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] with its hash sealed in.
///
/// Sealing is one way: the inner header is immutable once sealed, so the
/// cached hash can never go stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedHeader {
    header: Header,
    hash: BlockHash,
}

impl SealedHeader {
    /// Assembles a sealed header from parts.
    ///
    /// The caller asserts that `hash` is the hash of `header`.
    pub const fn new(header: Header, hash: BlockHash) -> Self {
        Self { header, hash }
    }

    /// The cached header hash.
    pub const fn hash(&self) -> BlockHash {
        self.hash
    }

    /// The inner header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Recovers the unsealed header.
    pub fn unseal(self) -> Header {
        self.header
    }

    /// Height-and-hash pair of the parent.
    pub const fn parent_hash(&self) -> BlockHash {
        self.header.previous_block_hash
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

/// Decodes the compact target encoding.
///
/// Returns `None` for negative or overflowing encodings, which can never be
/// satisfied by any hash.
pub fn compact_to_target(bits: u32) -> Option<U256> {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;

    // Sign bit set encodes a negative target.
    if bits & 0x0080_0000 != 0 {
        return None;
    }
    if mantissa == 0 {
        return None;
    }
    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        let shift = 8 * (exponent - 3);
        // Mantissa occupies 23 bits; anything shifted past 256 overflows.
        if shift > 256 - 24 {
            return None;
        }
        U256::from(mantissa) << shift
    };
    (!target.is_zero()).then_some(target)
}

/// Work contributed by a header with the given compact target.
///
/// `(~target / (target + 1)) + 1`, i.e. the expected number of hashes needed
/// to meet the target. Invalid encodings contribute zero.
pub fn proof(bits: u32) -> U256 {
    let Some(target) = compact_to_target(bits) else { return U256::ZERO };
    (!target / (target + U256::from(1u8))) + U256::from(1u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn header_encoding_is_80_bytes_little_endian() {
        let header = Header {
            version: 2,
            previous_block_hash: BlockHash::with_last_byte(0xaa),
            merkle_root: BlockHash::with_last_byte(0xbb),
            timestamp: 0x5eadbeef,
            bits: 0x1d00ffff,
            nonce: 7,
        };
        let encoded = header.encode();
        assert_eq!(encoded[0..4], hex!("02000000"));
        assert_eq!(encoded[68..72], hex!("efbead5e"));
        assert_eq!(encoded[72..76], hex!("ffff001d"));
    }

    #[test]
    fn sealing_caches_hash() {
        let header = Header { nonce: 42, ..Default::default() };
        let expected = header.hash_slow();
        let sealed = header.seal_slow();
        assert_eq!(sealed.hash(), expected);
        assert_eq!(sealed.clone().unseal().hash_slow(), expected);
    }

    #[test]
    fn compact_target_round_numbers() {
        // The original mainnet limit: 0x00000000ffff << 208.
        let target = compact_to_target(0x1d00ffff).unwrap();
        assert_eq!(target, U256::from(0xffffu64) << 208);

        // Exponent of 3 is an identity encoding of the mantissa.
        assert_eq!(compact_to_target(0x03123456).unwrap(), U256::from(0x123456u64));

        // Exponents below 3 shift the mantissa down.
        assert_eq!(compact_to_target(0x01120000).unwrap(), U256::from(0x12u64));
    }

    #[test]
    fn compact_target_rejects_negative_and_overflow() {
        assert_eq!(compact_to_target(0x01803456), None); // sign bit
        assert_eq!(compact_to_target(0x04000000), None); // zero mantissa
        assert_eq!(compact_to_target(0xff123456), None); // overflow
    }

    #[test]
    fn proof_is_monotone_in_difficulty() {
        // A smaller target (more difficulty) must contribute more work.
        let easy = proof(0x1d00ffff);
        let hard = proof(0x1c00ffff);
        assert!(hard > easy);
        assert_eq!(proof(0x01803456), U256::ZERO);
    }

    #[test]
    fn proof_of_work_respects_target() {
        // Grinding against an easy target terminates quickly.
        let mut header = Header { bits: 0x207fffff, ..Default::default() };
        while !header.is_valid_proof_of_work() {
            header.nonce += 1;
        }

        // No realistic grind satisfies a one-unit target.
        let hard = Header { bits: 0x03000001, ..header.clone() };
        assert!(!hard.is_valid_proof_of_work());

        // Invalid encodings can never be satisfied.
        let negative = Header { bits: 0x01803456, ..header };
        assert!(!negative.is_valid_proof_of_work());
    }
}
