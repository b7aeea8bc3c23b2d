//! Square fiducial marker dictionaries and full-frame detection.
//!
//! This crate covers:
//! - a generated built-in marker family plus custom family support,
//! - matching observed codes against a family with rotation compensation,
//! - finding candidate quads in a grayscale frame and decoding them.
//!
//! Detection here is single-marker oriented: the service tracks one physical
//! reference marker on the work surface, so the detector favors robustness on
//! plain scenes over dense multi-marker throughput.

mod detector;
mod dictionary;
mod matcher;
mod tracker;
mod warp;

pub use detector::{DetectorParams, MarkerDetection, MarkerDetector};
pub use dictionary::{dict_4x4_50, generate_dictionary, rotate_code_u64, Dictionary};
pub use matcher::{Match, Matcher};
pub use tracker::MarkerTracker;
pub use warp::QuadMap;
