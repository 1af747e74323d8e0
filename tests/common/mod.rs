//! Common test utilities for ulogview integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const MAGIC: [u8; 7] = [0x55, 0x4c, 0x6f, 0x67, 0x01, 0x12, 0x35];

/// Builds a synthetic ULog byte stream frame by frame.
pub struct LogBuilder {
    buf: Vec<u8>,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::with_header(1, 1_000_000)
    }

    pub fn with_header(version: u8, start_timestamp_us: u64) -> Self {
        let mut buf = MAGIC.to_vec();
        buf.push(version);
        buf.extend(start_timestamp_us.to_le_bytes());
        Self { buf }
    }

    pub fn frame(mut self, tag: u8, payload: &[u8]) -> Self {
        self.buf
            .extend((payload.len() as u16).to_le_bytes());
        self.buf.push(tag);
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn format(self, definition: &str) -> Self {
        self.frame(b'F', definition.as_bytes())
    }

    pub fn add_logged(self, multi_id: u8, id: u16, type_name: &str) -> Self {
        let mut payload = vec![multi_id];
        payload.extend(id.to_le_bytes());
        payload.extend(type_name.as_bytes());
        self.frame(b'A', &payload)
    }

    pub fn remove_logged(self, id: u16) -> Self {
        self.frame(b'R', &id.to_le_bytes())
    }

    pub fn data(self, id: u16, body: &[u8]) -> Self {
        let mut payload = id.to_le_bytes().to_vec();
        payload.extend_from_slice(body);
        self.frame(b'D', &payload)
    }

    /// `I`/`P` style record: key length, `"type name"` key, value bytes.
    pub fn key_value(self, tag: u8, key: &str, value: &[u8]) -> Self {
        let mut payload = vec![key.len() as u8];
        payload.extend(key.as_bytes());
        payload.extend_from_slice(value);
        self.frame(tag, &payload)
    }

    pub fn info_text(self, name: &str, value: &str) -> Self {
        let key = format!("char[{}] {name}", value.len());
        self.key_value(b'I', &key, value.as_bytes())
    }

    pub fn param_f32(self, name: &str, value: f32) -> Self {
        self.key_value(b'P', &format!("float {name}"), &value.to_le_bytes())
    }

    pub fn param_i32(self, name: &str, value: i32) -> Self {
        self.key_value(b'P', &format!("int32_t {name}"), &value.to_le_bytes())
    }

    pub fn log_line(self, level: u8, timestamp_us: u64, message: &str) -> Self {
        let mut payload = vec![level];
        payload.extend(timestamp_us.to_le_bytes());
        payload.extend(message.as_bytes());
        self.frame(b'L', &payload)
    }

    pub fn dropout(self, duration_ms: u16) -> Self {
        self.frame(b'O', &duration_ms.to_le_bytes())
    }

    /// Raw bytes appended after the last frame.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// A small flight: positions, attitude, parameters and console output.
pub fn sample_flight() -> Vec<u8> {
    let mut builder = LogBuilder::new()
        .info_text("sys_name", "PX4")
        .param_f32("MPC_XY_VEL_MAX", 12.0)
        .param_i32("SYS_AUTOSTART", 4001)
        .format("vehicle_local_position:uint64_t timestamp;float x;float y;float z;")
        .format("vehicle_attitude:uint64_t timestamp;float[4] q;uint8_t[3] _padding0;")
        .add_logged(0, 1, "vehicle_local_position")
        .add_logged(0, 2, "vehicle_attitude")
        .log_line(b'6', 1_500_000, "Takeoff detected");

    for i in 0..3u64 {
        let ts = 1_000_000 + i * 100_000;
        let mut pos = ts.to_le_bytes().to_vec();
        pos.extend(floats(&[i as f32, 2.0 * i as f32, -10.0]));
        builder = builder.data(1, &pos);

        let mut att = ts.to_le_bytes().to_vec();
        att.extend(floats(&[1.0, 0.0, 0.0, 0.0]));
        att.extend([0u8; 3]);
        builder = builder.data(2, &att);
    }
    builder.dropout(20).build()
}

pub fn write_log(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write log");
    path
}
