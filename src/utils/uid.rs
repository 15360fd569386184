//! User id generation for synthetic sessions.

use rand::Rng;
use rand::seq::IndexedRandom;

const UID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated uids
pub const UID_LENGTH: usize = 8;

/// Random `[a-z0-9]` identifier of `len` characters.
pub fn random_uid<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| UID_ALPHABET[rng.random_range(0..UID_ALPHABET.len())] as char)
        .collect()
}

/// `count` random uids for a pool.
pub fn generate_pool<R: Rng>(rng: &mut R, count: usize) -> Vec<String> {
    (0..count).map(|_| random_uid(rng, UID_LENGTH)).collect()
}

/// Where each session's uid comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSource {
    /// Every session uses the same uid
    Fixed(String),
    /// Fresh random uid per session
    Random,
    /// Uniform choice from a pre-generated pool
    Pool(Vec<String>),
}

impl UidSource {
    pub fn next_uid<R: Rng>(&self, rng: &mut R) -> String {
        match self {
            Self::Fixed(uid) => uid.clone(),
            Self::Random => random_uid(rng, UID_LENGTH),
            Self::Pool(pool) => pool
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| random_uid(rng, UID_LENGTH)),
        }
    }
}
