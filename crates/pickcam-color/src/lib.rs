//! Colored-block segmentation and location.
//!
//! The robot picks blocks in a small closed set of colors. Each category
//! carries fixed HSV ranges (tuned against the deployed camera), objects are
//! accepted only when their contour simplifies to a quadrilateral, and every
//! accepted object is mapped to robot coordinates through the current
//! calibration when one exists.

mod locator;
mod prefilter;
mod types;

pub use locator::{ColorLocator, ColorObject};
pub use prefilter::{
    prefilter, PREFILTER_MIN_AREA, S_DESATURATED_THRESHOLD, S_WHITE_MAX, V_WHITE_MIN,
};
pub use types::{ColorCategory, LocatorParams, S_MIN, V_MIN};
