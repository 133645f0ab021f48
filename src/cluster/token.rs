//! The token space that ringdb partitions.
//!
//! A [`Token`] locates a key on the ring: keys are hashed with murmur3 (128 bit variant)
//! and the hash is mapped into the signed token domain `[MIN_TOKEN, MAX_TOKEN]`.
//! The mapping is deterministic - the same key produces the same token across
//! processes and restarts, which is what allows every node to independently compute
//! identical partition tables from the same membership view.
use murmur3::murmur3_x86_128;
use std::io::Cursor;

/// A position in the ring. 128 bits wide to keep collision probability negligible.
pub type Token = i128;

pub const MIN_TOKEN: Token = i128::MIN;
pub const MAX_TOKEN: Token = i128::MAX;

/// Signature for the hash function used to place keys on the ring.
/// Injectable so tests can use small hand-crafted hash tables
/// instead of murmur3 outputs.
pub type HashFn = fn(&[u8]) -> Token;

/// Hashes `key` and returns its position in the token domain.
///
/// Implementation notes:
///  1. murmur3 yields a u128; the sign-bit flip below maps unsigned order onto
///     signed order, so `a < b` in hash space implies `a < b` in token space.
///  2. Passing a function pointer instead of a Hasher trait is fine here - keys
///     are small byte slices, never streamed.
pub fn build_token(key: &[u8]) -> Token {
    let hash = murmur3_x86_128(&mut Cursor::new(key), 0).unwrap();
    token_from_offset(hash)
}

/// Maps an unsigned ring offset (distance from the start of the domain) into a [`Token`].
pub(crate) fn token_from_offset(offset: u128) -> Token {
    (offset ^ (1 << 127)) as i128
}

/// Inverse of [`token_from_offset`].
#[cfg(test)]
pub(crate) fn token_offset(token: Token) -> u128 {
    (token as u128) ^ (1 << 127)
}
