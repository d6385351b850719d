//! Pollard's rho with Brent's cycle detection, for the 64-bit `pq` the
//! server sends during the handshake.

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn abs_diff(a: u128, b: u128) -> u128 { a.max(b) - a.min(b) }

/// Gives up once the cycle length passes this bound.
const MAX_CYCLE: u128 = 1 << 24;

fn brent(n: u128, c: u128) -> Option<u128> {
    let f = |x: u128| (x * x + c) % n;
    let m = 128u128;

    let (mut x, mut y, mut ys) = (0u128, 2u128, 2u128);
    let (mut g, mut r, mut q) = (1u128, 1u128, 1u128);

    while g == 1 {
        x = y;
        for _ in 0..r {
            y = f(y);
        }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..m.min(r - k) {
                y = f(y);
                q = q * abs_diff(x, y) % n;
            }
            g = gcd(q, n);
            k += m;
        }
        r *= 2;
        if r > MAX_CYCLE {
            return None;
        }
    }

    if g == n {
        // The batched product overshot; walk back one step at a time.
        loop {
            ys = f(ys);
            g = gcd(abs_diff(x, ys), n);
            if g > 1 {
                break;
            }
        }
    }

    (g != n).then_some(g)
}

/// Split `pq` into two factors `(p, q)` with `p ≤ q` and `p * q == pq`.
///
/// Returns `None` when `pq` is prime or too small to split.
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 {
        return None;
    }
    if pq % 2 == 0 {
        return Some((2, pq / 2));
    }
    let n = pq as u128;
    for c in [1u128, 3, 5, 7, 11, 13] {
        if let Some(g) = brent(n, c) {
            let p = g as u64;
            let q = pq / p;
            return Some((p.min(q), p.max(q)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_samples() {
        assert_eq!(factorize(1470626929934143021), Some((1206429347, 1218991343)));
        assert_eq!(factorize(2363612107535801713), Some((1518968219, 1556064227)));
        assert_eq!(factorize(0x17ED48941A08F981), Some((0x494C553B, 0x53911073)));
    }

    #[test]
    fn small_and_even() {
        assert_eq!(factorize(15), Some((3, 5)));
        assert_eq!(factorize(14), Some((2, 7)));
        assert_eq!(factorize(3), None);
    }

    #[test]
    fn prime_is_rejected() {
        assert_eq!(factorize(1_000_000_007), None);
    }
}
