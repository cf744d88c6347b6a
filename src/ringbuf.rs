//! Ring-buffer arithmetic over a half-open device address interval
//! `[begin, end)`. Every family's "how many bytes does this dive occupy on
//! flash" computation goes through here — no ad-hoc modulus in family code.

use crate::error::{Error, Result};

/// Forward distance from `a` to `b` within `[begin, end)`, optionally
/// including the endpoint. `a`/`b` must lie in the region.
///
/// `distance(0x1FFE, 0x0002, 0, 0, 0x2000) == 4`.
pub fn distance(a: u32, b: u32, inclusive: bool, begin: u32, end: u32) -> Result<u32> {
    validate(a, begin, end)?;
    validate(b, begin, end)?;
    let n = end - begin;
    let d = (b.wrapping_sub(a)) % n;
    Ok(if inclusive { d + 1 } else { d })
}

/// Advance `a` by `n` positions within `[begin, end)`, wrapping.
pub fn increment(a: u32, n: u32, begin: u32, end: u32) -> Result<u32> {
    validate(a, begin, end)?;
    let size = end - begin;
    Ok(begin + ((a - begin + n) % size))
}

fn validate(a: u32, begin: u32, end: u32) -> Result<()> {
    if a < begin || a >= end {
        return Err(Error::DataFormat(format!(
            "address {a:#x} outside ring [{begin:#x}, {end:#x})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_distance_seed_scenario() {
        assert_eq!(distance(0x1FFE, 0x0002, false, 0x0000, 0x2000).unwrap(), 4);
        assert_eq!(
            distance(0x0002, 0x1FFE, false, 0x0000, 0x2000).unwrap(),
            0x1FFC
        );
    }

    #[test]
    fn distance_sum_identity() {
        // Invariant 5: distance(a,b,0,..) + distance(b,a,0,..) in {0, N}.
        let (begin, end) = (0u32, 0x2000u32);
        for (a, b) in [(0x0010, 0x0020), (0x1FF0, 0x0010), (0x0000, 0x0000)] {
            let fwd = distance(a, b, false, begin, end).unwrap();
            let back = distance(b, a, false, begin, end).unwrap();
            let n = end - begin;
            assert!(fwd + back == 0 || fwd + back == n);
        }
    }

    #[test]
    fn out_of_range_is_data_format() {
        assert!(matches!(
            distance(0x3000, 0x0010, false, 0, 0x2000),
            Err(Error::DataFormat(_))
        ));
    }

    #[test]
    fn increment_wraps() {
        assert_eq!(increment(0x1FF0, 0x20, 0, 0x2000).unwrap(), 0x0010);
    }
}
