//! Parser for pipe-delimited sensor frames.
//!
//! ```text
//! id:10193712,|gps:-6.241128,106.844184,59.80,|gps_speed:0.54,|accel_speed:35.29,|accelero:-1.21,0.03,9.31,-0.01,0.01,-0.01,|magnetometer:210.62
//! ```

use tracing::debug;

use crate::error::TrackingError;
use crate::reading::SensorReading;

/// Decodes a raw frame into a [`SensorReading`].
///
/// Unknown tags are skipped and unparsable numbers become `0.0`, so one bad
/// field never discards the rest of the reading.
///
/// # Errors
///
/// Returns [`TrackingError::MalformedFrame`] if the frame is blank or carries
/// none of the recognized tags.
pub fn parse_frame(raw: &str) -> Result<SensorReading, TrackingError> {
    let mut reading = SensorReading::default();
    let mut recognized = 0usize;

    for segment in raw.split('|').map(str::trim) {
        let Some((tag, value)) = segment.split_once(':') else {
            continue;
        };

        match tag.trim() {
            "id" => {
                let id = value.trim().trim_end_matches(',').trim();
                if !id.is_empty() {
                    reading.device_id = id.to_string();
                }
            }
            "gps" => {
                let [lat, lon, alt] = fields::<3>(tag, value);
                reading.gps_lat = lat;
                reading.gps_lon = lon;
                reading.gps_alt = alt;
            }
            "gps_speed" => {
                let [speed] = fields::<1>(tag, value);
                reading.gps_speed = speed;
            }
            "accel_speed" => {
                let [speed] = fields::<1>(tag, value);
                reading.accelero_speed = speed;
            }
            "accelero" => {
                let [ax, ay, az, gx, gy, gz] = fields::<6>(tag, value);
                reading.accelero_ax = ax;
                reading.accelero_ay = ay;
                reading.accelero_az = az;
                reading.accelero_gx = gx;
                reading.accelero_gy = gy;
                reading.accelero_gz = gz;
            }
            "magnetometer" => {
                let [heading] = fields::<1>(tag, value);
                reading.magnetometer_heading = heading;
            }
            other => {
                debug!(tag = other, "Ignoring unknown frame tag");
                continue;
            }
        }

        recognized += 1;
    }

    if recognized == 0 {
        return Err(TrackingError::MalformedFrame(format!(
            "no recognized segment in {:?}",
            truncate(raw, 64)
        )));
    }

    Ok(reading)
}

/// Splits a comma-separated value list into exactly `N` numbers, defaulting
/// missing or bad tokens to `0.0`.
fn fields<const N: usize>(tag: &str, value: &str) -> [f64; N] {
    let mut out = [0.0; N];
    let mut tokens = value.split(',').map(str::trim);

    for (index, slot) in out.iter_mut().enumerate() {
        if let Some(token) = tokens.next() {
            *slot = number(tag, index, token);
        }
    }

    out
}

fn number(tag: &str, index: usize, token: &str) -> f64 {
    if token.is_empty() {
        return 0.0;
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            debug!(tag, index, token, "Unparsable numeric field, defaulting to 0.0");
            0.0
        }
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((end, _)) => &raw[..end],
        None => raw,
    }
}
