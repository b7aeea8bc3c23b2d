//! Calibration profiles and the pixel-to-robot transform fit.
//!
//! Each profile pairs one observed marker position with the robot position
//! the operator taught for it. Finishing a calibration fits a 2x3 affine
//! transform over all stored profiles with a consensus search, so a single
//! mistaught point cannot silently skew the mapping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pickcam_core::{fit_affine_consensus, AffineFitError, PixelPoint, RobotPoint};

use crate::state::VisionState;

/// Highest accepted calibration profile id.
pub const MAX_PROFILE_ID: u32 = 5;

/// Robot-space residual (mm) under which a point counts as an inlier.
pub const INLIER_THRESHOLD: f64 = 20.0;

/// Fewest profiles an affine fit needs.
pub const MIN_FIT_POINTS: usize = 3;

/// One taught correspondence between camera and robot space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub id: u32,
    /// Marker center at teach time, in pixels.
    pub origin_point: PixelPoint,
    /// Robot position the operator jogged to, in mm.
    pub robot_pos: RobotPoint,
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration profile id {id} is out of range, must be 0-{MAX_PROFILE_ID}")]
    IdOutOfRange { id: u32 },
    #[error("need at least {MIN_FIT_POINTS} calibration profiles to fit a transform, have {have}")]
    TooFewProfiles { have: usize },
    #[error("calibration points are collinear or duplicated, no transform fits them")]
    DegenerateGeometry,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Persistent calibration profile store.
///
/// Every successful mutation is written straight to disk, so a restart
/// resumes from the last taught state.
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all stored profiles. A missing file is an empty store, not an
    /// error; anything else propagates.
    pub fn load(&self) -> Result<Vec<CalibrationProfile>, CalibrationError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the full profile list, replacing the file atomically so a crash
    /// mid-write cannot leave a half-serialized store behind.
    pub fn save(&self, profiles: &[CalibrationProfile]) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(profiles)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Insert or replace the profile with the given id and persist the list.
    pub fn upsert(
        &self,
        state: &mut VisionState,
        id: u32,
        origin_point: PixelPoint,
        robot_pos: RobotPoint,
    ) -> Result<String, CalibrationError> {
        if id > MAX_PROFILE_ID {
            return Err(CalibrationError::IdOutOfRange { id });
        }
        match state.profiles.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.origin_point = origin_point;
                existing.robot_pos = robot_pos;
            }
            None => state.profiles.push(CalibrationProfile {
                id,
                origin_point,
                robot_pos,
            }),
        }
        self.save(&state.profiles)?;
        log::info!(
            "calibration profile {id} taught at pixel ({:.1}, {:.1}), robot ({:.1}, {:.1})",
            origin_point.x,
            origin_point.y,
            robot_pos.x,
            robot_pos.y
        );
        Ok(format!(
            "calibration profile {id} set to pixel ({:.1}, {:.1}) -> robot ({:.1}, {:.1})",
            origin_point.x, origin_point.y, robot_pos.x, robot_pos.y
        ))
    }

    /// Fit the transform over the stored profiles and install it on success.
    ///
    /// On any failure the previously installed transform is left exactly as
    /// it was; a bad teach session never degrades a working calibration.
    pub fn finish(&self, state: &mut VisionState) -> Result<String, CalibrationError> {
        let have = state.profiles.len();
        if have < MIN_FIT_POINTS {
            return Err(CalibrationError::TooFewProfiles { have });
        }

        let src: Vec<Point2<f64>> = state.profiles.iter().map(|p| p.origin_point.into()).collect();
        let dst: Vec<Point2<f64>> = state.profiles.iter().map(|p| p.robot_pos.into()).collect();
        let fit = fit_affine_consensus(&src, &dst, INLIER_THRESHOLD).map_err(|e| match e {
            AffineFitError::TooFewPoints { have } => CalibrationError::TooFewProfiles { have },
            AffineFitError::Degenerate => CalibrationError::DegenerateGeometry,
        })?;

        let message = format!(
            "stored pixel-to-robot transform fitted from {}/{} calibration points, mean residual {:.2} mm",
            fit.inliers.len(),
            have,
            fit.mean_residual
        );
        log::info!("{message}");
        state.transform = Some(fit.transform);
        Ok(message)
    }

    /// Replace the in-memory profiles from disk and recompute the transform.
    ///
    /// The transform always describes the loaded list: it is refitted when
    /// enough points exist and cleared otherwise, even if a fit was
    /// installed before the reload.
    pub fn reload(&self, state: &mut VisionState) -> Result<String, CalibrationError> {
        state.profiles = self.load()?;
        state.transform = None;

        let loaded = state.profiles.len();
        if loaded >= MIN_FIT_POINTS {
            match self.finish(state) {
                Ok(message) => return Ok(format!("reloaded {loaded} calibration profiles; {message}")),
                Err(CalibrationError::TooFewProfiles { .. })
                | Err(CalibrationError::DegenerateGeometry) => {
                    log::warn!("reloaded profiles do not support a transform fit");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(format!(
            "reloaded {loaded} calibration profiles, no transform installed"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> CalibrationStore {
        CalibrationStore::new(dir.path().join("marker_origins.json"))
    }

    fn teach(
        store: &CalibrationStore,
        state: &mut VisionState,
        id: u32,
        px: (f64, f64),
        robot: (f64, f64),
    ) {
        store
            .upsert(
                state,
                id,
                PixelPoint::new(px.0, px.1),
                RobotPoint::new(robot.0, robot.1),
            )
            .unwrap();
    }

    #[test]
    fn upsert_replaces_the_profile_with_the_same_id() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();

        teach(&store, &mut state, 2, (10.0, 10.0), (1.0, 1.0));
        teach(&store, &mut state, 3, (20.0, 10.0), (2.0, 1.0));
        teach(&store, &mut state, 2, (11.0, 12.0), (5.0, 6.0));

        assert_eq!(state.profiles.len(), 2);
        let p2 = state.profiles.iter().find(|p| p.id == 2).unwrap();
        assert_eq!(p2.origin_point, PixelPoint::new(11.0, 12.0));
        assert_eq!(p2.robot_pos, RobotPoint::new(5.0, 6.0));
    }

    #[test]
    fn out_of_range_id_is_rejected_without_touching_state() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();

        let err = store
            .upsert(
                &mut state,
                MAX_PROFILE_ID + 1,
                PixelPoint::new(0.0, 0.0),
                RobotPoint::new(0.0, 0.0),
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::IdOutOfRange { id: 6 }));
        assert!(state.profiles.is_empty());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn finish_below_three_points_keeps_the_old_transform() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();
        let old = pickcam_core::AffineTransform::identity();
        state.transform = Some(old);

        teach(&store, &mut state, 0, (0.0, 0.0), (0.0, 0.0));
        teach(&store, &mut state, 1, (100.0, 0.0), (50.0, 0.0));
        let err = store.finish(&mut state).unwrap_err();
        assert!(matches!(err, CalibrationError::TooFewProfiles { have: 2 }));
        assert_eq!(state.transform, Some(old));
    }

    #[test]
    fn collinear_points_keep_the_old_transform() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();

        teach(&store, &mut state, 0, (0.0, 0.0), (0.0, 0.0));
        teach(&store, &mut state, 1, (10.0, 10.0), (5.0, 5.0));
        teach(&store, &mut state, 2, (20.0, 20.0), (10.0, 10.0));
        let err = store.finish(&mut state).unwrap_err();
        assert!(matches!(err, CalibrationError::DegenerateGeometry));
        assert!(state.transform.is_none());
    }

    #[test]
    fn finish_installs_a_transform_that_maps_the_taught_points() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();

        // Scale 0.5, y flipped, translated: robot = (10 + 0.5 px, 200 - 0.5 py).
        teach(&store, &mut state, 0, (0.0, 0.0), (10.0, 200.0));
        teach(&store, &mut state, 1, (100.0, 0.0), (60.0, 200.0));
        teach(&store, &mut state, 2, (0.0, 80.0), (10.0, 160.0));

        let message = store.finish(&mut state).unwrap();
        assert!(message.contains("3/3"));

        let t = state.transform.unwrap();
        let mapped = t.apply(Point2::new(40.0, 40.0));
        approx::assert_abs_diff_eq!(mapped.x, 30.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(mapped.y, 180.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_file_loads_as_an_empty_store() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"not json").unwrap();
        assert!(matches!(store.load(), Err(CalibrationError::Json(_))));
    }

    #[test]
    fn reload_replaces_profiles_and_refits() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let mut state = VisionState::default();

        teach(&store, &mut state, 0, (0.0, 0.0), (0.0, 0.0));
        teach(&store, &mut state, 1, (100.0, 0.0), (50.0, 0.0));
        teach(&store, &mut state, 2, (0.0, 100.0), (0.0, 50.0));
        store.finish(&mut state).unwrap();
        let fitted = state.transform.unwrap();

        let mut fresh = VisionState::default();
        let message = store.reload(&mut fresh).unwrap();
        assert!(message.contains("reloaded 3"));
        assert_eq!(fresh.profiles, state.profiles);
        let refit = fresh.transform.unwrap();
        for (a, b) in fitted.to_array().iter().flatten().zip(refit.to_array().iter().flatten()) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}
