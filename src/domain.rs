//! Domain values composed from raw series.
//!
//! Positions, velocities and attitudes are logged as separate scalar fields
//! or small arrays. These helpers read them together, sample by sample,
//! alongside each sample's `timestamp`.

use serde::Serialize;

use crate::ulog::{ParsedLog, Primitive, QueryError, SeriesReader};

/// Every PX4 topic starts with this `uint64_t` field, in microseconds.
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Attitude quaternion. PX4 logs these as `float[4]` in `[w, x, y, z]`
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub fn from_wxyz(q: [f32; 4]) -> Self {
        Self {
            w: q[0],
            x: q[1],
            y: q[2],
            z: q[3],
        }
    }

    /// Scalar-last order, as most renderers expect.
    pub fn to_xyzw(&self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Roll, pitch and yaw in radians (aerospace ZYX convention).
    pub fn to_euler(&self) -> Vector3 {
        let Quaternion { w, x, y, z } = *self;
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Vector3::new(roll, pitch, yaw)
    }
}

/// Values paired with the timestamp of the sample they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedSeries<T> {
    pub timestamps_us: Vec<u64>,
    pub values: Vec<T>,
}

impl<T> TimedSeries<T> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.timestamps_us.iter().copied().zip(self.values.iter())
    }
}

fn timed<S>(
    log: &ParsedLog,
    type_name: &str,
    mut f: impl FnMut(&SeriesReader<'_>, usize) -> Result<S, QueryError>,
) -> Result<TimedSeries<S>, QueryError> {
    let pairs = log.series(type_name)?.map_samples(|reader, i| {
        Ok((reader.value_at::<u64>(i, TIMESTAMP_FIELD)?, f(reader, i)?))
    })?;
    let (timestamps_us, values) = pairs.into_iter().unzip();
    Ok(TimedSeries {
        timestamps_us,
        values,
    })
}

/// One scalar field with timestamps.
pub fn read_timed<T: Primitive>(
    log: &ParsedLog,
    type_name: &str,
    path: &str,
) -> Result<TimedSeries<T>, QueryError> {
    timed(log, type_name, |reader, i| reader.value_at::<T>(i, path))
}

/// Three `float` fields composed into a vector, e.g. `["x", "y", "z"]` or
/// `["vx", "vy", "vz"]`.
pub fn read_vector3(
    log: &ParsedLog,
    type_name: &str,
    paths: [&str; 3],
) -> Result<TimedSeries<Vector3>, QueryError> {
    timed(log, type_name, |reader, i| {
        Ok(Vector3::new(
            reader.value_at::<f32>(i, paths[0])?,
            reader.value_at::<f32>(i, paths[1])?,
            reader.value_at::<f32>(i, paths[2])?,
        ))
    })
}

/// A `float[4]` quaternion field in `[w, x, y, z]` order.
pub fn read_quaternion(
    log: &ParsedLog,
    type_name: &str,
    path: &str,
) -> Result<TimedSeries<Quaternion>, QueryError> {
    timed(log, type_name, |reader, i| {
        let q = reader.array_at::<f32>(i, path)?;
        match q.as_slice() {
            [w, x, y, z] => Ok(Quaternion::from_wxyz([*w, *x, *y, *z])),
            _ => Err(QueryError::TypeMismatch {
                path: path.to_string(),
                expected: "float[4]".to_string(),
                found: format!("float[{}]", q.len()),
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ulog::frame::MAGIC;
    use crate::ulog::load_log;

    fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u16).to_le_bytes().to_vec();
        out.push(tag);
        out.extend_from_slice(payload);
        out
    }

    fn attitude_log() -> Vec<u8> {
        let mut buf = MAGIC.to_vec();
        buf.push(1);
        buf.extend(0u64.to_le_bytes());
        buf.extend(frame(
            b'F',
            b"vehicle_local_position:uint64_t timestamp;float x;float y;float z;",
        ));
        buf.extend(frame(b'F', b"vehicle_attitude:uint64_t timestamp;float[4] q;"));
        buf.extend(frame(b'A', b"\x00\x01\x00vehicle_local_position"));
        buf.extend(frame(b'A', b"\x00\x02\x00vehicle_attitude"));

        for (i, ts) in [1_000u64, 2_000].iter().enumerate() {
            let mut pos = 1u16.to_le_bytes().to_vec();
            pos.extend(ts.to_le_bytes());
            for v in [i as f32, 2.0, -3.0] {
                pos.extend(v.to_le_bytes());
            }
            buf.extend(frame(b'D', &pos));

            let mut att = 2u16.to_le_bytes().to_vec();
            att.extend((ts + 500).to_le_bytes());
            for v in [1.0f32, 0.0, 0.0, 0.0] {
                att.extend(v.to_le_bytes());
            }
            buf.extend(frame(b'D', &att));
        }
        buf
    }

    #[test]
    fn test_read_vector3() {
        let log = load_log(&attitude_log()).unwrap();
        let pos = read_vector3(&log, "vehicle_local_position", ["x", "y", "z"]).unwrap();
        assert_eq!(pos.timestamps_us, vec![1_000, 2_000]);
        assert_eq!(pos.values[1], Vector3::new(1.0, 2.0, -3.0));
        assert!((pos.values[0].norm() - 13f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_read_quaternion_reorders() {
        let log = load_log(&attitude_log()).unwrap();
        let att = read_quaternion(&log, "vehicle_attitude", "q").unwrap();
        assert_eq!(att.len(), 2);
        let (ts, q) = att.iter().next().unwrap();
        assert_eq!(ts, 1_500);
        assert_eq!(q.to_xyzw(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(q.to_euler(), Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_read_timed() {
        let log = load_log(&attitude_log()).unwrap();
        let x = read_timed::<f32>(&log, "vehicle_local_position", "x").unwrap();
        assert_eq!(x.values, vec![0.0, 1.0]);
        assert!(read_timed::<f64>(&log, "vehicle_local_position", "x").is_err());
    }

    #[test]
    fn test_euler_yaw() {
        let half = std::f32::consts::FRAC_PI_4;
        let q = Quaternion::from_wxyz([half.cos(), 0.0, 0.0, half.sin()]);
        let euler = q.to_euler();
        assert!((euler.z - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert!(euler.x.abs() < 1e-5);
    }
}
