//! Imaging and geometry primitives for the pickcam vision service.
//!
//! This crate is intentionally small and free of I/O: raster containers,
//! color conversion, binary-mask morphology, contour extraction, and the
//! pixel-to-robot affine estimation used by the calibration flow. Networked
//! and stateful concerns live in the service crate.

mod affine;
mod contour;
mod draw;
mod geom;
mod hsv;
mod image;
mod logger;
mod mask;

pub use affine::{
    fit_affine_consensus, fit_affine_exact, fit_affine_least_squares, AffineFit, AffineFitError,
    AffineTransform,
};
pub use contour::{
    approx_polygon_closed, find_external_contours, polygon_area, polygon_centroid,
    polygon_perimeter,
};
pub use draw::{draw_cross, draw_disc, draw_line, draw_polyline_closed, draw_rect_outline, Rgb};
pub use geom::{PixelPoint, RobotPoint};
pub use hsv::{hsv_to_rgb, rgb_to_hsv, HsvRange};
pub use image::{
    otsu_threshold, sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, RgbFrame,
};
pub use mask::{dilate3, erode3, fill_polygon, morph_open3, retain_min_area, Mask};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
