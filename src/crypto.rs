//! BLAKE2b-256, the protocol hash (service-id derivation, preimage keys).

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// 32-byte BLAKE2b digest.
#[must_use]
pub fn blake2b256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).expect("32 is a valid BLAKE2b output size");
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches digest size");
    out
}

#[cfg(test)]
mod tests {
    use super::blake2b256;

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            hex::encode(blake2b256(&[])),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn distinct_inputs_distinct_digests() {
        assert_ne!(blake2b256(b"jam"), blake2b256(b"jam "));
    }
}
