//! Move loggers.
//!
//! - [`CsvPositionLogger`] keeps the latest absolute position of every axis it
//!   was created for and appends one CSV row per committed move.
//! - [`TracingMoveLogger`] emits one `tracing` event per committed move.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::axis::{Axis, AxisKind};
use super::stage::Stage;
use crate::error::AlignResult;
use crate::hardware::{MoveLogger, MoveRecord};

struct Column {
    label: String,
    kind: AxisKind,
    position_absolute: f64,
}

struct CsvState {
    writer: csv::Writer<File>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

/// Writes the absolute position of every registered axis after each move.
///
/// Columns are in µm for linear axes and degrees for rotational ones. Positions
/// are absolute (unreversed), exactly as cached by each axis.
pub struct CsvPositionLogger {
    path: PathBuf,
    state: Mutex<CsvState>,
}

impl CsvPositionLogger {
    /// Create the file and write the header; one column per axis of each stage.
    ///
    /// Column order follows the stages, then each stage's physical axes.
    pub fn for_stages(path: impl AsRef<Path>, stages: &[&Stage]) -> AlignResult<Self> {
        let axes: Vec<&Axis> = stages
            .iter()
            .flat_map(|stage| stage.physical_axes().map(|(_, axis)| axis))
            .collect();
        Self::for_axes(path, &axes)
    }

    /// Create the file and write the header for an explicit list of axes.
    pub fn for_axes(path: impl AsRef<Path>, axes: &[&Axis]) -> AlignResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::Writer::from_path(&path)?;

        let columns: Vec<Column> = axes
            .iter()
            .map(|axis| Column {
                label: axis.name().to_string(),
                kind: axis.kind(),
                position_absolute: axis.position_absolute(),
            })
            .collect();
        let header: Vec<String> = columns
            .iter()
            .map(|c| format!("{} [{}]", c.label, c.kind.scan_unit()))
            .collect();
        writer.write_record(&header)?;
        writer.flush()?;

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.label.clone(), i))
            .collect();

        info!(path = %path.display(), columns = header.len(), "position log opened");
        Ok(Self {
            path,
            state: Mutex::new(CsvState {
                writer,
                columns,
                index,
                rows: 0,
            }),
        })
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written after the header.
    pub fn rows(&self) -> usize {
        self.state.lock().rows
    }
}

impl MoveLogger for CsvPositionLogger {
    fn log(&self, record: &MoveRecord) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(&i) = state.index.get(&record.axis) else {
            warn!(axis = %record.axis, "move on an axis the position log does not track");
            return;
        };
        state.columns[i].position_absolute = record.position_absolute;

        let row: Vec<String> = state
            .columns
            .iter()
            .map(|c| c.kind.scan_unit().from_canonical(c.position_absolute).to_string())
            .collect();
        if let Err(err) = state.writer.write_record(&row) {
            warn!(path = %self.path.display(), error = %err, "failed to write position log row");
            return;
        }
        if let Err(err) = state.writer.flush() {
            warn!(path = %self.path.display(), error = %err, "failed to flush position log");
            return;
        }
        state.rows += 1;
    }
}

/// Emits each committed move as a `tracing` event at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMoveLogger;

impl MoveLogger for TracingMoveLogger {
    fn log(&self, record: &MoveRecord) {
        info!(
            target: "rust_align::moves",
            axis = %record.axis,
            position = record.position_absolute,
            unit = record.unit,
            "move"
        );
    }
}
