//! Constant-time byte comparisons for handshake/session MAC checks.
//!
//! Nonce, `msg_key` and answer-hash comparisons must not leak timing
//! information about how many leading bytes matched, since that mismatch
//! signal can otherwise be used to mount a byte-at-a-time forgery search.

use subtle::ConstantTimeEq;

/// Constant-time equality for equal-length byte slices.
///
/// Returns `false` (not a panic) on length mismatch — that comparison
/// itself is not secret-dependent, so leaking it is fine.
pub fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_slices_match() {
        assert!(bytes_eq(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn differing_slices_do_not_match() {
        assert!(!bytes_eq(&[1, 2, 3], &[1, 2, 4]));
    }

    #[test]
    fn differing_lengths_do_not_match() {
        assert!(!bytes_eq(&[1, 2, 3], &[1, 2]));
    }
}
