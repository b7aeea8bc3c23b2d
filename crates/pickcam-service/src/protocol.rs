//! JSON request and response shapes for the command endpoint.
//!
//! Requests are tagged by a `type` field. Every response carries `status`
//! and `message`; command-specific payloads ride alongside in optional
//! fields, so a caller can always switch on `status` first.

use serde::{Deserialize, Serialize};

use pickcam_color::ColorObject;
use pickcam_core::RobotPoint;

use crate::state::TelemetrySnapshot;

/// One inbound command.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Calibrate { payload: CalibratePayload },
    Color,
    Sensor,
}

/// Payload of a calibrate request: either one taught point or the finish
/// flag that triggers the transform fit.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum CalibratePayload {
    Finish { finish: bool },
    Point { number: u32, robot_pos: RobotPoint },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// One located object as reported over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorReport {
    pub color: String,
    /// Mean RGB sampled under the object's contour.
    pub rgb: [u8; 3],
    /// Mapped robot position; absent without a finite calibration result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_pos: Option<RobotPoint>,
}

impl From<&ColorObject> for ColorReport {
    fn from(object: &ColorObject) -> Self {
        Self {
            color: object.category.name().to_string(),
            rgb: object.mean_rgb,
            robot_pos: object.robot_pos,
        }
    }
}

/// The single response written back on a command connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    /// Profile id a calibrate command acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Objects visible to the color query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ColorReport>>,
    /// Environment readings for the sensor query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<TelemetrySnapshot>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            id: None,
            objects: None,
            sensor: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            id: None,
            objects: None,
            sensor: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_objects(mut self, objects: Vec<ColorReport>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn with_sensor(mut self, sensor: TelemetrySnapshot) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
