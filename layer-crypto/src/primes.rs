//! Safe-prime allow-list for the DH group (C4).
//!
//! The client never verifies primality of a `dh_prime` the server offers;
//! it checks the value against a short fixed allow-list curated out of
//! band, the same way every production MTProto client does.

use num_bigint::BigUint;

struct SafePrime {
    hex: &'static str,
    generators: &'static [i32],
}

// The well-known 2048-bit MTProto DH prime, paired with the generator
// values production servers are documented to send.
const SAFE_PRIMES: &[SafePrime] = &[SafePrime {
    hex: "C71CAEB9C6B1C9048E6C522F70F13F73980D40238E3E21C14934D037563D930F48198A0AA7C14058229493D22530F4DBFA336F6E0AC925139543AED44CCE7C3720FD51F69458705AC68CD4FE6B6B13ABDC9746512969328454F18FAF8C595F642477FE96BB2A941D5BCD1D4AC8CC49880708FA9B378E3C4F3A9060BEE67CF9A4A4A695811051907E162753B56B0F6B410DBA74D8A84B2A14B3144E0EF1284754FD17ED950D5965B4B9DD46582DB1178D169C6BC465B0D6FF9CA3928FEF5B9AE4E418FC15E83EBEA0F87FA9FF5EED70050DED2849F47BF959D956850CE929851F0D8115F635B105EE2E4E15D04B2454BF6F4FADF034B10403119CD8E3B92FCC5B",
    generators: &[2, 3, 4, 5, 6, 7],
}];

/// True if `dh_prime`, paired with generator `g`, appears in the allow-list.
pub fn is_safe_dh_prime(g: i32, dh_prime: &BigUint) -> bool {
    SAFE_PRIMES.iter().any(|entry| {
        entry.generators.contains(&g)
            && BigUint::parse_bytes(entry.hex.as_bytes(), 16).as_ref() == Some(dh_prime)
    })
}

/// The allow-listed prime itself, exposed for building deterministic
/// handshake test fixtures in other crates.
pub fn fixture_dh_prime() -> BigUint {
    BigUint::parse_bytes(SAFE_PRIMES[0].hex.as_bytes(), 16).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prime_with_known_generator_is_safe() {
        let p = fixture_dh_prime();
        assert!(is_safe_dh_prime(3, &p));
    }

    #[test]
    fn unknown_generator_is_rejected() {
        let p = fixture_dh_prime();
        assert!(!is_safe_dh_prime(11, &p));
    }

    #[test]
    fn unknown_prime_is_rejected() {
        assert!(!is_safe_dh_prime(3, &BigUint::from(12345u32)));
    }
}
