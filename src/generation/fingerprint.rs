//! Step fingerprints for change detection
//!
//! A fingerprint is a short, deterministic digest of the fields that shape a
//! generated task. A cached task stays valid only while the step's current
//! fingerprint matches the one it was generated for.

use crate::types::PlanStep;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between hashed fields (ASCII unit separator).
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// Number of digest bytes kept; hex-encoded this yields 16 characters.
const FINGERPRINT_BYTES: usize = 8;

/// Hex-encoded digest of a step's generation-relevant fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Fingerprint(value.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a step
///
/// Fingerprint = hex(blake3(title || SEP || description || SEP || type || SEP || difficulty)[..8])
///
/// Step number, videos and stage are deliberately excluded: they do not change
/// what the generator produces for the step.
pub fn fingerprint(step: &PlanStep) -> Fingerprint {
    let mut hasher = Hasher::new();
    hasher.update(step.title.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(step.description.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(step.kind.as_str().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(step.difficulty.as_bytes());

    let digest = hasher.finalize();
    Fingerprint(hex::encode(&digest.as_bytes()[..FINGERPRINT_BYTES]))
}

/// True when no fingerprint is stored or the stored one no longer matches.
pub fn is_stale(step: &PlanStep, stored: Option<&Fingerprint>) -> bool {
    match stored {
        Some(stored) => *stored != fingerprint(step),
        None => true,
    }
}
