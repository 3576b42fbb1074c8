//! Shared fixtures for integration tests.

#![allow(dead_code)]

use rust_align::hardware::mock::{MockAxisTransport, TransportJournal};
use rust_align::stage::{Axis, AxisConfig, AxisLimits, AxisRole, Stage};
use std::sync::Arc;

/// Linear axes span 0..25 mm.
pub const MAX_NM: f64 = 25_000_000.0;

/// x/y/z stage whose mock channels are named `{name}.{role}` and all log to
/// `journal`. Every axis starts at `start_um`.
pub fn xyz_stage(name: &str, journal: &TransportJournal, start_um: f64) -> Stage {
    let limits = AxisLimits::new(0.0, MAX_NM).unwrap();
    let mut builder = Stage::builder(name);
    for role in AxisRole::LINEAR {
        let channel = format!("{}.{}", name, role);
        let transport = Arc::new(
            MockAxisTransport::new(channel.clone(), start_um * 1e3).with_journal(journal.clone()),
        );
        let axis = Axis::new(AxisConfig::linear(channel, limits), transport).unwrap();
        builder = builder.axis(role, axis);
    }
    builder.build().unwrap()
}
