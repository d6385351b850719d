//! Primality checks for server-chosen Diffie-Hellman groups.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// The 2048-bit safe prime Telegram servers currently hand out.
/// Matching it skips the (slow) probabilistic checks.
pub const KNOWN_DH_PRIME: &str = "\
    c71caeb9c6b1c9048e6c522f70f13f73980d40238e3e21c14934d037563d930f\
    48198a0aa7c14058229493d22530f4dbfa336f6e0ac925139543aed44cce7c37\
    20fd51f69458705ac68cd4fe6b6b13abdc9746512969328454f18faf8c595f64\
    2477fe96bb2a941d5bcd1d4ac8cc49880708fa9b378e3c4f3a9060bee67cf9a4\
    a4a695811051907e162753b56b0f6b410dba74d8a84b2a14b3144e0ef1284754\
    fd17ed950d5965b4b9dd46582db1178d169c6bc465b0d6ff9ca3928fef5b9ae4\
    e418fc15e83ebea0f87fa9ff5eed70050ded2849f47bf959d956850ce929851f\
    0d8115f635b105ee2e4e15d04b2454bf6f4fadf034b10403119cd8e3b92fcc5b";

const SMALL_PRIMES: [u32; 24] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
];

/// Miller-Rabin rounds per candidate.
const ROUNDS: usize = 20;

pub fn known_dh_prime() -> BigUint {
    // The constant is valid hex; parsing cannot fail.
    BigUint::parse_bytes(KNOWN_DH_PRIME.as_bytes(), 16).unwrap_or_default()
}

/// A uniformly random witness in `[2, n - 2]`.
fn random_witness(n: &BigUint) -> BigUint {
    let mut bytes = vec![0u8; n.to_bytes_be().len() + 8];
    crate::fill_random(&mut bytes);
    BigUint::from_bytes_be(&bytes) % (n - 3u32) + 2u32
}

/// Miller-Rabin with random witnesses. False positives occur with
/// probability below `4^-ROUNDS`.
pub fn is_probable_prime(n: &BigUint) -> bool {
    for p in SMALL_PRIMES {
        if *n == BigUint::from(p) {
            return true;
        }
        if (n % p).is_zero() {
            return false;
        }
    }
    if *n < BigUint::from(2u32) {
        return false;
    }

    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;
    let two = BigUint::from(2u32);

    'witness: for _ in 0..ROUNDS {
        let mut x = random_witness(n).modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// `p` is prime and so is `(p - 1) / 2`.
pub fn is_safe_prime(p: &BigUint) -> bool {
    if *p == known_dh_prime() {
        return true;
    }
    let half = (p - 1u32) >> 1u32;
    is_probable_prime(&half) && is_probable_prime(p)
}
