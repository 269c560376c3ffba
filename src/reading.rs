use serde::{Deserialize, Serialize};

/// Device id used when a frame carries no `id` segment.
pub const UNKNOWN_DEVICE: &str = "UNKNOWN";

/// One decoded telemetry frame.
///
/// Field names match the `raw_data` echo in the relay payload and the columns
/// of the raw-reading archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: String,

    // gps
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub gps_alt: f64,
    /// km/h
    pub gps_speed: f64,

    // inertial
    /// km/h
    pub accelero_speed: f64,
    pub accelero_ax: f64,
    pub accelero_ay: f64,
    pub accelero_az: f64,
    pub accelero_gx: f64,
    pub accelero_gy: f64,
    pub accelero_gz: f64,

    /// Degrees clockwise from north.
    pub magnetometer_heading: f64,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            device_id: UNKNOWN_DEVICE.to_string(),
            gps_lat: 0.0,
            gps_lon: 0.0,
            gps_alt: 0.0,
            gps_speed: 0.0,
            accelero_speed: 0.0,
            accelero_ax: 0.0,
            accelero_ay: 0.0,
            accelero_az: 0.0,
            accelero_gx: 0.0,
            accelero_gy: 0.0,
            accelero_gz: 0.0,
            magnetometer_heading: 0.0,
        }
    }
}

impl SensorReading {
    /// A reading at exactly (0, 0) is the "no fix" sentinel, not a position.
    pub fn has_gps_fix(&self) -> bool {
        !(self.gps_lat == 0.0 && self.gps_lon == 0.0)
    }

    /// Speed used for ETA and arrival: GPS speed when the receiver reports
    /// movement, otherwise the inertial estimate.
    pub fn vehicle_speed(&self) -> f64 {
        if self.gps_speed > 0.0 {
            self.gps_speed
        } else {
            self.accelero_speed
        }
    }
}
