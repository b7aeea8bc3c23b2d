//! Matching observed codes against a family.

use crate::{rotate_code_u64, Dictionary};

/// A family match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the family.
    pub id: u32,
    /// Rotation `0..=3` such that `observed == rotate(code, rotation)`.
    pub rotation: u8,
    /// Hamming distance after rotation.
    pub hamming: u8,
}

/// Brute-force matcher over a fixed family.
///
/// All four rotations of every code are precomputed once; for family sizes in
/// the tens this beats anything fancier and keeps memory trivial.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let bits = dict.bit_count();
        assert!(
            bits <= 64,
            "marker_size {} implies {} bits > 64 (unsupported)",
            dict.marker_size,
            bits
        );

        let rotated = dict
            .codes
            .iter()
            .map(|&base| {
                [
                    base,
                    rotate_code_u64(base, dict.marker_size, 1),
                    rotate_code_u64(base, dict.marker_size, 2),
                    rotate_code_u64(base, dict.marker_size, 3),
                ]
            })
            .collect();

        Self {
            dict,
            max_hamming,
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Best match within the Hamming budget, exact matches win immediately.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let h = (observed ^ cand).count_ones() as u8;
                if h > self.max_hamming {
                    continue;
                }
                if best.map_or(true, |b| h < b.hamming) {
                    best = Some(Match {
                        id: id as u32,
                        rotation: rot as u8,
                        hamming: h,
                    });
                    if h == 0 {
                        return best;
                    }
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict_4x4_50;

    #[test]
    fn matcher_finds_rotated_code() {
        let dict = dict_4x4_50().clone();
        let base = dict.codes[7];
        let n = dict.marker_size;
        let matcher = Matcher::new(dict, 0);

        let observed = rotate_code_u64(base, n, 3);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m.id, 7);
        assert_eq!(m.rotation, 3);
        assert_eq!(m.hamming, 0);
    }

    #[test]
    fn single_bit_error_is_corrected_within_budget() {
        let dict = dict_4x4_50().clone();
        let base = dict.codes[3];
        let matcher = Matcher::new(dict, 1);

        let observed = base ^ 0b100; // flip one inner bit
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m.id, 3);
        assert_eq!(m.hamming, 1);
    }

    #[test]
    fn garbage_code_stays_unmatched() {
        let matcher = Matcher::new(dict_4x4_50().clone(), 1);
        // distance-4 guarantee means a 2-bit corruption can never reach
        // another id within a budget of 1
        let observed = matcher.dictionary().codes[0] ^ 0b11;
        assert!(matcher.match_code(observed).is_none());
    }
}
