use std::cmp::Ordering;

use alloy_primitives::U256;

use crate::SwarmAddress;

pub trait Distance {
    /// Returns true if self is closer to `a` than `y` is.
    fn closer(&self, a: &Self, y: &Self) -> bool;
}

impl Distance for SwarmAddress {
    fn closer(&self, a: &Self, y: &Self) -> bool {
        matches!(distance_cmp(a, self, y), Ordering::Greater)
    }
}

/// Returns the distance between address `x` and address `y` as a big-endian
/// 256-bit integer.
pub fn distance(x: &SwarmAddress, y: &SwarmAddress) -> U256 {
    let mut xor = [0u8; 32];
    for (i, b) in xor.iter_mut().enumerate() {
        *b = x.0[i] ^ y.0[i];
    }
    U256::from_be_slice(&xor)
}

/// Compares `x` and `y` in terms of their distance to `a`:
///   - `Ordering::Greater` if `x` is closer to `a` than `y`
///   - `Ordering::Equal` if `x` and `y` are equidistant from `a` (which
///     implies `x == y`)
///   - `Ordering::Less` if `x` is farther from `a` than `y`
pub fn distance_cmp(a: &SwarmAddress, x: &SwarmAddress, y: &SwarmAddress) -> Ordering {
    let (ab, xb, yb) = (&a.0, &x.0, &y.0);

    for i in 0..ab.len() {
        let dx = xb[i] ^ ab[i];
        let dy = yb[i] ^ ab[i];

        if dx != dy {
            return match dx < dy {
                true => Ordering::Greater,
                false => Ordering::Less,
            };
        }
    }

    Ordering::Equal
}
