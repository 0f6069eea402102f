//! # GCS Filters (Golomb-Coded Sets)
//!
//! Deterministic per-block membership filters over transaction hashes.
//!
//! ## Algorithm
//!
//! 1. Hash every element with SipHash-2-4 keyed by the 16-byte filter key
//! 2. Map each hash into `[0, N * 2^P)` with a multiply-shift range reduction
//! 3. Sort the values and take consecutive differences
//! 4. Golomb-Rice encode each difference: quotient in unary, `P`-bit remainder
//!
//! ## Serialized Form
//!
//! ```text
//! +----------------+---------------------------------------------+
//! | N (u32, BE)    | Golomb-Rice bit stream, MSB first, 0-padded |
//! +----------------+---------------------------------------------+
//! ```
//!
//! The output depends only on `(P, key, multiset of elements)`. Element
//! order does not matter because values are sorted before encoding, and
//! duplicates are kept (they encode as zero deltas).

use bitvec::prelude::*;
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

use crate::domain::config::FilterIndexConfig;
use crate::error::{GcsError, IndexError};
use crate::ports::ChainBlock;

/// Size of the SipHash key in bytes.
pub const KEY_SIZE: usize = 16;

/// Default false-positive parameter (collision probability ~2^-20).
pub const DEFAULT_P: u8 = 20;

/// Largest supported false-positive parameter.
pub const MAX_P: u8 = 32;

/// Length of the element-count header in serialized filters.
pub const N_HEADER_LEN: usize = 4;

/// Golomb-Coded Set filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcsFilter {
    n: u32,
    p: u8,
    key: [u8; KEY_SIZE],
    data: Vec<u8>,
}

impl GcsFilter {
    /// Build a filter over `elements`.
    pub fn build<E: AsRef<[u8]>>(
        p: u8,
        key: [u8; KEY_SIZE],
        elements: &[E],
    ) -> Result<Self, GcsError> {
        validate_p(p)?;

        let n = u32::try_from(elements.len()).map_err(|_| GcsError::TooManyElements {
            count: elements.len(),
        })?;
        let modulus = range_modulus(n, p);

        let mut values: Vec<u64> = elements
            .iter()
            .map(|e| hash_to_range(e.as_ref(), &key, modulus))
            .collect();
        values.sort_unstable();

        let mut deltas = Vec::with_capacity(values.len());
        let mut prev = 0u64;
        for v in values {
            deltas.push(v - prev);
            prev = v;
        }

        Ok(Self {
            n,
            p,
            key,
            data: golomb_encode(&deltas, p),
        })
    }

    /// Parse a filter previously produced by [`GcsFilter::to_bytes`].
    ///
    /// `p` and `key` are not part of the serialized form and must match the
    /// values the filter was built with.
    pub fn from_bytes(p: u8, key: [u8; KEY_SIZE], bytes: &[u8]) -> Result<Self, GcsError> {
        validate_p(p)?;

        if bytes.len() < N_HEADER_LEN {
            return Err(GcsError::Truncated { len: bytes.len() });
        }

        let mut header = [0u8; N_HEADER_LEN];
        header.copy_from_slice(&bytes[..N_HEADER_LEN]);
        let n = u32::from_be_bytes(header);
        let data = &bytes[N_HEADER_LEN..];

        // Every coded element takes at least a terminator bit plus P remainder bits.
        let max_elements = data.len().saturating_mul(8) / (p as usize + 1);
        if n as usize > max_elements {
            return Err(GcsError::Truncated { len: bytes.len() });
        }

        Ok(Self {
            n,
            p,
            key,
            data: data.to_vec(),
        })
    }

    /// Serialize as `N || data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(N_HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.n.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Number of elements the filter was built from.
    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn p(&self) -> u8 {
        self.p
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Golomb-Rice encoded body (without the `N` header).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Expected false positive rate (1 / 2^P).
    pub fn false_positive_rate(&self) -> f64 {
        1.0 / (1u64 << self.p) as f64
    }

    /// Check whether `element` may be in the set.
    ///
    /// `Ok(false)` is definitive; `Ok(true)` may be a false positive.
    pub fn matches(&self, element: &[u8]) -> Result<bool, GcsError> {
        if self.n == 0 {
            return Ok(false);
        }

        let target = hash_to_range(element, &self.key, range_modulus(self.n, self.p));
        Ok(self.decode_values()?.binary_search(&target).is_ok())
    }

    /// Check whether any of `elements` may be in the set.
    pub fn match_any<E: AsRef<[u8]>>(&self, elements: &[E]) -> Result<bool, GcsError> {
        if self.n == 0 || elements.is_empty() {
            return Ok(false);
        }

        let modulus = range_modulus(self.n, self.p);
        let mut queries: Vec<u64> = elements
            .iter()
            .map(|e| hash_to_range(e.as_ref(), &self.key, modulus))
            .collect();
        queries.sort_unstable();

        let values = self.decode_values()?;
        let (mut i, mut j) = (0, 0);
        while i < values.len() && j < queries.len() {
            match values[i].cmp(&queries[j]) {
                std::cmp::Ordering::Equal => return Ok(true),
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }

        Ok(false)
    }

    /// Decode the sorted set of hashed values.
    fn decode_values(&self) -> Result<Vec<u64>, GcsError> {
        let deltas = golomb_decode(&self.data, self.n as usize, self.p).ok_or(
            GcsError::Truncated {
                len: N_HEADER_LEN + self.data.len(),
            },
        )?;

        let mut values = Vec::with_capacity(deltas.len());
        let mut sum = 0u64;
        for delta in deltas {
            sum = sum.wrapping_add(delta);
            values.push(sum);
        }
        Ok(values)
    }
}

/// Build the filter for a block: one element per transaction hash, in
/// block order.
pub fn build_block_filter(
    block: &dyn ChainBlock,
    config: &FilterIndexConfig,
) -> Result<GcsFilter, IndexError> {
    let count = block.transaction_count();
    let mut tx_hashes = Vec::with_capacity(count);
    for i in 0..count {
        tx_hashes.push(block.tx_hash(i)?);
    }

    Ok(GcsFilter::build(config.p, config.key, &tx_hashes)?)
}

fn validate_p(p: u8) -> Result<(), GcsError> {
    if p == 0 || p > MAX_P {
        return Err(GcsError::InvalidP { p });
    }
    Ok(())
}

/// `N << P`; cannot overflow since N < 2^32 and P <= 32.
fn range_modulus(n: u32, p: u8) -> u64 {
    u64::from(n) << p
}

/// SipHash-2-4 the element and reduce it into `[0, modulus)`.
fn hash_to_range(element: &[u8], key: &[u8; KEY_SIZE], modulus: u64) -> u64 {
    let mut k0 = [0u8; 8];
    let mut k1 = [0u8; 8];
    k0.copy_from_slice(&key[..8]);
    k1.copy_from_slice(&key[8..]);

    let mut hasher = SipHasher24::new_with_keys(u64::from_le_bytes(k0), u64::from_le_bytes(k1));
    hasher.write(element);

    ((u128::from(hasher.finish()) * u128::from(modulus)) >> 64) as u64
}

/// Golomb-Rice encode deltas into MSB-first packed bytes.
fn golomb_encode(deltas: &[u64], p: u8) -> Vec<u8> {
    let total_bits: usize = deltas
        .iter()
        .map(|d| (d >> p) as usize + 1 + p as usize)
        .sum();

    let mut bits = bitvec![u8, Msb0; 0; total_bits];
    let mut pos = 0usize;

    for &delta in deltas {
        let q = (delta >> p) as usize;
        let r = delta & ((1u64 << p) - 1);

        // q ones, then the zero terminator already present in the buffer
        bits[pos..pos + q].fill(true);
        pos += q + 1;

        for i in (0..p).rev() {
            bits.set(pos, (r >> i) & 1 == 1);
            pos += 1;
        }
    }

    bits.as_raw_slice().to_vec()
}

/// Decode `n` Golomb-Rice deltas; `None` if the stream ends early.
fn golomb_decode(data: &[u8], n: usize, p: u8) -> Option<Vec<u64>> {
    let bits = data.view_bits::<Msb0>();
    let mut deltas = Vec::with_capacity(n);
    let mut pos = 0usize;

    for _ in 0..n {
        let mut q = 0u64;
        loop {
            let bit = *bits.get(pos)?;
            pos += 1;
            if !bit {
                break;
            }
            q += 1;
        }

        let end = pos + p as usize;
        if end > bits.len() {
            return None;
        }
        let mut r = 0u64;
        for bit in bits[pos..end].iter().by_vals() {
            r = (r << 1) | u64::from(bit);
        }
        pos = end;

        deltas.push((q << p) | r);
    }

    Some(deltas)
}
