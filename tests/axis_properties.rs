//! Axis coordinate properties: reversal, no-op suppression, bounds before I/O
//! and unit conversions.

use rust_align::error::{AlignError, ErrorKind};
use rust_align::hardware::mock::{MockAxisTransport, RecordingLogger, TransportJournal};
use rust_align::hardware::MoveLogger;
use rust_align::stage::{Axis, AxisConfig, AxisLimits, Unit};
use std::sync::Arc;

const MAX_NM: f64 = 10_000_000.0;

fn linear_axis(reversed: bool, initial_nm: f64) -> (Axis, TransportJournal) {
    let journal = TransportJournal::new();
    let transport = Arc::new(MockAxisTransport::new("x", initial_nm).with_journal(journal.clone()));
    let config = AxisConfig::linear("x", AxisLimits::new(0.0, MAX_NM).unwrap()).reversed(reversed);
    let axis = Axis::new(config, transport).unwrap();
    journal.clear();
    (axis, journal)
}

// =============================================================================
// Reversal
// =============================================================================

#[test]
fn reversed_axis_mirrors_about_the_maximum() {
    let (mut axis, journal) = linear_axis(true, 0.0);
    assert_eq!(axis.cached_position(), MAX_NM);

    let targets = [0.0, 1_250_000.0, 5_000_000.0, 7_500_000.0, 9_999_999.0, MAX_NM];
    for target in targets {
        axis.move_abs(target).unwrap();
        assert_eq!(axis.current_position().unwrap(), target);
        assert_eq!(axis.position_absolute(), MAX_NM - target);
    }

    let commanded: Vec<f64> = journal.moves_for("x");
    let expected: Vec<f64> = targets.iter().map(|t| MAX_NM - t).collect();
    assert_eq!(commanded, expected);
}

#[test]
fn reversed_relative_moves_flip_sign() {
    let (mut axis, journal) = linear_axis(true, 4_000_000.0);
    assert_eq!(axis.cached_position(), 6_000_000.0);

    axis.move_rel_um(100.0).unwrap();
    assert_eq!(axis.cached_position(), 6_100_000.0);
    assert_eq!(journal.moves_for("x"), vec![3_900_000.0]);
}

// =============================================================================
// No-op suppression
// =============================================================================

#[test]
fn repeated_target_moves_once() {
    let (mut axis, journal) = linear_axis(false, 0.0);
    let logger = Arc::new(RecordingLogger::new());
    let shared: Arc<dyn MoveLogger> = logger.clone();
    axis.set_logger(Some(shared));

    axis.move_abs(2_000_000.0).unwrap();
    axis.move_abs(2_000_000.0).unwrap();
    axis.move_rel(0.0).unwrap();

    assert_eq!(journal.move_count("x"), 1);
    assert_eq!(logger.count(), 1);
    assert_eq!(logger.records()[0].position_absolute, 2_000_000.0);
}

// =============================================================================
// Bounds
// =============================================================================

#[test]
fn out_of_range_targets_never_reach_hardware() {
    let (mut axis, journal) = linear_axis(false, 1_000_000.0);

    let err = axis.move_abs(MAX_NM + 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    let err = axis.move_rel_um(-2_000.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);

    assert!(journal.is_empty());
    assert_eq!(axis.cached_position(), 1_000_000.0);
}

#[test]
fn range_error_names_axis_and_value_in_scan_units() {
    let (mut axis, _journal) = linear_axis(false, 0.0);
    match axis.move_abs_um(12_000.0).unwrap_err() {
        AlignError::OutOfRange {
            axis,
            value,
            min,
            max,
            unit,
        } => {
            assert_eq!(axis, "x");
            assert_eq!(value, 12_000.0);
            assert_eq!((min, max), (0.0, 10_000.0));
            assert_eq!(unit, "um");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn transport_failure_leaves_cache_untouched() {
    let journal = TransportJournal::new();
    let transport = Arc::new(MockAxisTransport::new("x", 0.0).with_journal(journal.clone()));
    let mut axis = Axis::new(
        AxisConfig::linear("x", AxisLimits::new(0.0, MAX_NM).unwrap()),
        transport.clone(),
    )
    .unwrap();

    transport.fail_next(rust_align::TransportError::timeout("x", "no reply"));
    let err = axis.move_abs(5_000.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(axis.cached_position(), 0.0);
}

// =============================================================================
// Units
// =============================================================================

#[test]
fn micrometre_moves_read_back_at_the_limits() {
    for min_nm in [0.0, -2_500_000.0] {
        let limits = AxisLimits::new(min_nm, MAX_NM).unwrap();
        let transport = Arc::new(MockAxisTransport::new("x", 1_000_000.0));
        let mut axis = Axis::new(AxisConfig::linear("x", limits), transport).unwrap();

        for target_um in [0.0, limits.min / 1000.0, limits.max / 1000.0] {
            axis.move_abs_um(target_um).unwrap();
            let read_back = axis.current_position_um().unwrap();
            assert!(
                (read_back - target_um).abs() < 1e-9,
                "limits [{min_nm}, {MAX_NM}]: moved to {target_um} um, read {read_back} um"
            );
        }
    }
}

#[test]
fn unit_wrappers_round_trip() {
    let (mut axis, journal) = linear_axis(false, 0.0);

    axis.move_abs_um(1_234.5).unwrap();
    assert_eq!(journal.moves_for("x"), vec![1_234_500.0]);
    assert!((axis.current_position_um().unwrap() - 1_234.5).abs() < 1e-9);
    assert!((axis.current_position_mm().unwrap() - 1.2345).abs() < 1e-12);

    axis.move_rel_mm(0.5).unwrap();
    assert!((axis.current_position_um().unwrap() - 1_734.5).abs() < 1e-9);

    for unit in [Unit::Micrometre, Unit::Millimetre, Unit::Degree, Unit::ArcSecond] {
        for value in [-17.25, 0.0, 3.0e-3, 42.0] {
            let back = unit.from_canonical(unit.to_canonical(value));
            assert!((back - value).abs() <= 1e-12 * value.abs().max(1.0));
        }
    }
}

#[test]
fn rotational_axis_works_in_degrees() {
    let journal = TransportJournal::new();
    let transport = Arc::new(MockAxisTransport::new("yaw", 0.0).with_journal(journal.clone()));
    let limits = AxisLimits::new(-36_000.0, 36_000.0).unwrap();
    let mut yaw = Axis::new(AxisConfig::rotate("yaw", limits), transport).unwrap();

    yaw.move_abs_degree(2.5).unwrap();
    assert_eq!(journal.moves_for("yaw"), vec![9_000.0]);
    assert_eq!(yaw.current_position_degree().unwrap(), 2.5);

    let err = yaw.move_abs_um(1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn periodic_refresh_picks_up_manual_jogs() {
    let journal = TransportJournal::new();
    let transport = Arc::new(MockAxisTransport::new("x", 0.0).with_journal(journal.clone()));
    let config = AxisConfig::linear("x", AxisLimits::new(0.0, MAX_NM).unwrap()).refresh_every(3);
    let mut axis = Axis::new(config, transport.clone()).unwrap();

    transport.jog_to(500.0);
    assert_eq!(axis.current_position().unwrap(), 0.0);
    assert_eq!(axis.current_position().unwrap(), 0.0);
    assert_eq!(axis.current_position().unwrap(), 500.0);
}
