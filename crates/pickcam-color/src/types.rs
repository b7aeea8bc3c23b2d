//! Color categories and their fixed HSV ranges.

use pickcam_core::{HsvRange, Rgb};
use serde::{Deserialize, Serialize};

/// Saturation floor shared by every category range.
pub const S_MIN: u8 = 40;
/// Value floor shared by every category range.
pub const V_MIN: u8 = 40;

/// The block colors the robot knows how to pick.
///
/// A closed set: query responses, range tables, and annotation colors key on
/// this enum, so an unknown color can never leak past the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorCategory {
    Red,
    Green,
    Blue,
    Yellow,
}

impl ColorCategory {
    pub const ALL: [ColorCategory; 4] = [
        ColorCategory::Red,
        ColorCategory::Green,
        ColorCategory::Blue,
        ColorCategory::Yellow,
    ];

    /// HSV sub-ranges for this category. Red wraps the hue origin and needs
    /// two; the others are single boxes.
    pub fn hsv_ranges(self) -> &'static [HsvRange] {
        const RED: [HsvRange; 2] = [
            HsvRange::new([0, S_MIN, V_MIN], [10, 255, 255]),
            HsvRange::new([150, S_MIN, V_MIN], [179, 255, 255]),
        ];
        const GREEN: [HsvRange; 1] = [HsvRange::new([35, S_MIN, V_MIN], [85, 255, 255])];
        const BLUE: [HsvRange; 1] = [HsvRange::new([70, S_MIN, V_MIN], [170, 255, 255])];
        const YELLOW: [HsvRange; 1] = [HsvRange::new([20, S_MIN, V_MIN], [35, 255, 255])];

        match self {
            ColorCategory::Red => &RED,
            ColorCategory::Green => &GREEN,
            ColorCategory::Blue => &BLUE,
            ColorCategory::Yellow => &YELLOW,
        }
    }

    /// Annotation color for display copies.
    pub fn draw_color(self) -> Rgb {
        match self {
            ColorCategory::Red => [255, 0, 0],
            ColorCategory::Green => [0, 255, 0],
            ColorCategory::Blue => [0, 0, 255],
            ColorCategory::Yellow => [255, 255, 0],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorCategory::Red => "red",
            ColorCategory::Green => "green",
            ColorCategory::Blue => "blue",
            ColorCategory::Yellow => "yellow",
        }
    }

    #[inline]
    pub fn matches(self, hsv: [u8; 3]) -> bool {
        self.hsv_ranges().iter().any(|r| r.contains(hsv))
    }
}

fn default_min_contour_area() -> f64 {
    400.0
}

fn default_approx_eps_frac() -> f64 {
    0.04
}

fn default_morph_iterations() -> usize {
    2
}

/// Locator tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocatorParams {
    /// Discard contours below this shoelace area, in px^2.
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: f64,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    #[serde(default = "default_approx_eps_frac")]
    pub approx_eps_frac: f64,
    /// Erode then dilate iterations applied to each category mask.
    #[serde(default = "default_morph_iterations")]
    pub morph_iterations: usize,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            min_contour_area: default_min_contour_area(),
            approx_eps_frac: default_approx_eps_frac(),
            morph_iterations: default_morph_iterations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickcam_core::rgb_to_hsv;

    #[test]
    fn saturated_primaries_hit_their_category() {
        assert!(ColorCategory::Red.matches(rgb_to_hsv([220, 30, 40])));
        assert!(ColorCategory::Green.matches(rgb_to_hsv([40, 200, 60])));
        assert!(ColorCategory::Blue.matches(rgb_to_hsv([30, 40, 200])));
        assert!(ColorCategory::Yellow.matches(rgb_to_hsv([230, 210, 30])));
    }

    #[test]
    fn dark_and_washed_out_pixels_match_nothing() {
        let dark = rgb_to_hsv([20, 10, 10]);
        let washed = rgb_to_hsv([250, 245, 246]);
        for c in ColorCategory::ALL {
            assert!(!c.matches(dark), "{c:?} matched dark");
            assert!(!c.matches(washed), "{c:?} matched washed-out");
        }
    }

    #[test]
    fn red_wraps_the_hue_origin() {
        // hue just below 180 is still red
        assert!(ColorCategory::Red.matches([178, 200, 200]));
        assert!(ColorCategory::Red.matches([2, 200, 200]));
        assert!(!ColorCategory::Red.matches([60, 200, 200]));
    }

    #[test]
    fn category_names_round_trip_through_serde() {
        for c in ColorCategory::ALL {
            let json = serde_json::to_string(&c).expect("serialize");
            assert_eq!(json, format!("\"{}\"", c.name()));
        }
    }
}
