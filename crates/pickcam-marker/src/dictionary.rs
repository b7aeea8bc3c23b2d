//! Marker families and the deterministic built-in table.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// A fixed marker family.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dictionary {
    /// Human-readable name (for logging).
    pub name: String,
    /// Marker side length (number of inner bits per side).
    pub marker_size: usize,
    /// Hamming budget available for error correction when matching.
    pub max_correction_bits: u8,
    /// One `u64` per marker id, encoding the inner bits in row-major order
    /// with **black = 1**.
    pub codes: Vec<u64>,
}

impl Dictionary {
    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }
}

/// Rotate a code stored in row-major bits: `idx = y * N + x`.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    #[inline]
    fn get(code: u64, idx: usize) -> u64 {
        (code >> idx) & 1
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                0 => (x, y),
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            let sidx = sy * n + sx;
            let didx = y * n + x;
            out |= get(code, sidx) << didx;
        }
    }
    out
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

const GENERATOR_SEED: u64 = 0x5049_434b_4341_4d31;
const MIN_ROTATION_DISTANCE: u32 = 4;

/// Generate a marker family from a fixed seed.
///
/// Candidates come from a splitmix64 stream and are accepted when every
/// rotation stays at least `MIN_ROTATION_DISTANCE` bits away from every
/// rotation of every accepted code, and from the candidate's own other
/// rotations. The same seed always produces the same table, so the capture
/// side and the detector agree without an embedded data file.
pub fn generate_dictionary(
    name: &str,
    marker_size: usize,
    count: usize,
    max_correction_bits: u8,
    seed: u64,
) -> Dictionary {
    let bits = marker_size * marker_size;
    assert!(bits <= 64, "marker_size {marker_size} implies {bits} bits > 64");

    let bit_mask = if bits == 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    };

    let mut state = seed;
    let mut codes: Vec<u64> = Vec::with_capacity(count);
    let mut accepted_rots: Vec<[u64; 4]> = Vec::with_capacity(count);
    let mut attempts = 0usize;

    'candidates: while codes.len() < count {
        attempts += 1;
        assert!(
            attempts < 5_000_000,
            "family parameters too strict for {name}: stalled at {} of {count} codes",
            codes.len()
        );

        let cand = splitmix64(&mut state) & bit_mask;
        let rots = [
            cand,
            rotate_code_u64(cand, marker_size, 1),
            rotate_code_u64(cand, marker_size, 2),
            rotate_code_u64(cand, marker_size, 3),
        ];

        for a in 0..4 {
            for b in (a + 1)..4 {
                if (rots[a] ^ rots[b]).count_ones() < MIN_ROTATION_DISTANCE {
                    continue 'candidates;
                }
            }
        }
        for prev in &accepted_rots {
            for &r in &rots {
                for &p in prev {
                    if (r ^ p).count_ones() < MIN_ROTATION_DISTANCE {
                        continue 'candidates;
                    }
                }
            }
        }

        accepted_rots.push(rots);
        codes.push(cand);
    }

    Dictionary {
        name: name.to_string(),
        marker_size,
        max_correction_bits,
        codes,
    }
}

/// The default 4x4, 50-marker family used by the service.
pub fn dict_4x4_50() -> &'static Dictionary {
    static DICT: OnceLock<Dictionary> = OnceLock::new();
    DICT.get_or_init(|| generate_dictionary("GEN_4X4_50", 4, 50, 1, GENERATOR_SEED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let n = 8;
        let r = rotate_code_u64(code, n, 1);
        let r = rotate_code_u64(r, n, 1);
        let r = rotate_code_u64(r, n, 1);
        let r = rotate_code_u64(r, n, 1);
        assert_eq!(code, r);
    }

    #[test]
    fn builtin_family_is_deterministic() {
        let again = generate_dictionary("GEN_4X4_50", 4, 50, 1, GENERATOR_SEED);
        let dict = dict_4x4_50();
        assert_eq!(dict.codes, again.codes);
        assert_eq!(dict.codes.len(), 50);
        assert_eq!(dict.marker_size, 4);
    }

    #[test]
    fn builtin_family_keeps_rotation_distance() {
        let dict = dict_4x4_50();
        for (i, &a) in dict.codes.iter().enumerate() {
            for (j, &b) in dict.codes.iter().enumerate() {
                for rot in 0..4u8 {
                    let rb = rotate_code_u64(b, dict.marker_size, rot);
                    if i == j && rot == 0 {
                        continue;
                    }
                    let d = (a ^ rb).count_ones();
                    assert!(
                        d >= MIN_ROTATION_DISTANCE,
                        "codes {i}/{j} rot {rot} too close: distance {d}"
                    );
                }
            }
        }
    }

    #[test]
    fn seed_change_produces_a_different_table() {
        let other = generate_dictionary("GEN_4X4_50_ALT", 4, 50, 1, GENERATOR_SEED + 1);
        assert_ne!(other.codes, dict_4x4_50().codes);
    }
}
