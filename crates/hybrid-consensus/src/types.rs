// CHAIN PRIMITIVES
// Header, block and fixed-size identifiers consumed by the engine.
//
// INVARIANTS:
// 1. A header's hash covers every field, its seal hash every field except nonce and mix digest
// 2. Hashes are Keccak-256 over a fixed field order; any two nodes derive identical values
// 3. Headers are read-only inputs; only finalization writes the state root

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Keccak-256 of the RLP encoding of an empty list: the uncle hash of a block without uncles.
pub const EMPTY_UNCLE_HASH: Hash = Hash([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4, 0x1a,
    0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4, 0x93, 0x47,
]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseBytesError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

fn parse_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseBytesError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| ParseBytesError::Hex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseBytesError::Length { expected: N, got: bytes.len() });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }
        }

        impl FromStr for $name {
            type Err = ParseBytesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_fixed::<$len>(s).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

fixed_bytes!(Hash, 32, "32-byte Keccak-256 digest.");
fixed_bytes!(Address, 20, "20-byte account address.");
fixed_bytes!(Nonce, 8, "Big-endian 64-bit proof-of-work nonce.");

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Keccak-256 of `data`.
    pub fn keccak(data: &[u8]) -> Hash {
        Hash(Keccak256::digest(data).into())
    }
}

impl Nonce {
    pub fn from_u64(value: u64) -> Self {
        Nonce(value.to_be_bytes())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

/// Block header as seen by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeader {
    pub parent_hash: Hash,
    pub uncle_hash: Hash,
    /// Beneficiary of the block and uncle rewards
    pub coinbase: Address,
    /// State root, written by finalization
    pub root: Hash,
    pub tx_hash: Hash,
    pub receipt_hash: Hash,
    pub difficulty: BigUint,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Seconds since the unix epoch
    pub time: u64,
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: Nonce,
    /// Present from the London fork onward
    pub base_fee: Option<BigUint>,
}

impl Default for ChainHeader {
    fn default() -> Self {
        ChainHeader {
            parent_hash: Hash::ZERO,
            uncle_hash: EMPTY_UNCLE_HASH,
            coinbase: Address::default(),
            root: Hash::ZERO,
            tx_hash: Hash::ZERO,
            receipt_hash: Hash::ZERO,
            difficulty: BigUint::default(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            time: 0,
            extra: Vec::new(),
            mix_digest: Hash::ZERO,
            nonce: Nonce::default(),
            base_fee: None,
        }
    }
}

impl ChainHeader {
    /// Hash identifying this header on chain.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        self.absorb_sealless(&mut hasher);
        hasher.update(self.mix_digest.0);
        hasher.update(self.nonce.0);
        Hash(hasher.finalize().into())
    }

    /// Hash of the header prior to sealing; this is what the PoW commits to.
    pub fn seal_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        self.absorb_sealless(&mut hasher);
        Hash(hasher.finalize().into())
    }

    fn absorb_sealless(&self, hasher: &mut Keccak256) {
        hasher.update(self.parent_hash.0);
        hasher.update(self.uncle_hash.0);
        hasher.update(self.coinbase.0);
        hasher.update(self.root.0);
        hasher.update(self.tx_hash.0);
        hasher.update(self.receipt_hash.0);
        absorb_bytes(hasher, &self.difficulty.to_bytes_be());
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update(self.gas_used.to_be_bytes());
        hasher.update(self.time.to_be_bytes());
        absorb_bytes(hasher, &self.extra);
        if let Some(base_fee) = &self.base_fee {
            absorb_bytes(hasher, &base_fee.to_bytes_be());
        }
    }

    pub fn has_uncles(&self) -> bool {
        self.uncle_hash != EMPTY_UNCLE_HASH
    }
}

// Length-prefixed so variable-width fields cannot alias each other.
fn absorb_bytes(hasher: &mut Keccak256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Uncle hash committing to an ordered list of uncle headers.
pub fn calc_uncle_hash(uncles: &[ChainHeader]) -> Hash {
    if uncles.is_empty() {
        return EMPTY_UNCLE_HASH;
    }
    let mut hasher = Keccak256::new();
    for uncle in uncles {
        hasher.update(uncle.hash().0);
    }
    Hash(hasher.finalize().into())
}

/// A header together with the uncles it includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: ChainHeader,
    pub uncles: Vec<ChainHeader>,
}

impl Block {
    pub fn new(mut header: ChainHeader, uncles: Vec<ChainHeader>) -> Self {
        header.uncle_hash = calc_uncle_hash(&uncles);
        Block { header, uncles }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }
}
