//! Position records: rig snapshots and persisted stage positions.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::stage::AxisRole;
use crate::error::AlignResult;

/// Logical x/y/z position of one stage, canonical nanometres in user
/// coordinates.
///
/// Rig snapshots use this form so a restore issues exactly the positions that
/// were read, with no unit round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyzPosition {
    /// x, nm
    pub x: f64,
    /// y, nm
    pub y: f64,
    /// z, nm
    pub z: f64,
}

impl XyzPosition {
    /// Same position in µm.
    pub fn to_um(&self) -> [f64; 3] {
        [self.x / 1e3, self.y / 1e3, self.z / 1e3]
    }
}

/// Stage position as written to disk: linear axes in µm, rotational axes in
/// degrees. Absent axes are omitted.
///
/// ```json
/// { "x": 1250.0, "y": 40.5, "z": 9800.0, "yaw": 0.25 }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePosition {
    /// x, µm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// y, µm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// z, µm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// roll, degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    /// pitch, degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// yaw, degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
}

impl StagePosition {
    /// Value stored for `role`.
    pub fn get(&self, role: AxisRole) -> Option<f64> {
        match role {
            AxisRole::X => self.x,
            AxisRole::Y => self.y,
            AxisRole::Z => self.z,
            AxisRole::Roll => self.roll,
            AxisRole::Pitch => self.pitch,
            AxisRole::Yaw => self.yaw,
        }
    }

    /// Store a value for `role`.
    pub fn set(&mut self, role: AxisRole, value: Option<f64>) {
        let slot = match role {
            AxisRole::X => &mut self.x,
            AxisRole::Y => &mut self.y,
            AxisRole::Z => &mut self.z,
            AxisRole::Roll => &mut self.roll,
            AxisRole::Pitch => &mut self.pitch,
            AxisRole::Yaw => &mut self.yaw,
        };
        *slot = value;
    }

    /// Write as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> AlignResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Read a record written by [`write_json`](Self::write_json).
    pub fn load_json(path: impl AsRef<Path>) -> AlignResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_axes_are_omitted() {
        let position = StagePosition {
            x: Some(1.5),
            yaw: Some(0.25),
            ..Default::default()
        };
        let json = serde_json::to_string(&position).unwrap();
        assert_eq!(json, r#"{"x":1.5,"yaw":0.25}"#);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        let mut position = StagePosition::default();
        position.set(AxisRole::Z, Some(9_800.0));
        position.write_json(&path).unwrap();

        let loaded = StagePosition::load_json(&path).unwrap();
        assert_eq!(loaded.get(AxisRole::Z), Some(9_800.0));
        assert_eq!(loaded.get(AxisRole::X), None);
    }

    #[test]
    fn missing_file_is_a_persistence_error() {
        let err = StagePosition::load_json("/nonexistent/position.json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
    }
}
