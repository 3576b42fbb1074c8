//! Mock Hardware Implementations
//!
//! Provides simulated devices for testing without physical hardware.
//!
//! # Available Mocks
//!
//! - `MockAxisTransport` - Simulated motor channel that settles instantly
//! - `TransportJournal` - Shared, ordered record of every call made to the mock
//!   channels attached to it (used to assert cross-axis move ordering)
//! - `MockPowerMeter` - Scripted readings, or a Gaussian beam profile driven by
//!   the positions of mock channels
//! - `RecordingLogger` - Collects every `MoveRecord` it receives

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::TransportError;
use crate::hardware::capabilities::{AxisTransport, MoveLogger, MoveRecord, PowerMeter};

// =============================================================================
// TransportJournal - ordered call log shared by several mock channels
// =============================================================================

/// One call received by a mock channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `move_to(target)` on `channel`.
    Move {
        /// Channel name.
        channel: String,
        /// Commanded absolute position.
        target: f64,
    },
    /// `read_position()` on `channel`.
    Read {
        /// Channel name.
        channel: String,
    },
}

impl TransportCall {
    /// Channel the call was made on.
    pub fn channel(&self) -> &str {
        match self {
            TransportCall::Move { channel, .. } | TransportCall::Read { channel } => channel,
        }
    }
}

/// Ordered record of calls across any number of mock channels.
///
/// Cloning a journal shares the underlying log.
#[derive(Debug, Clone, Default)]
pub struct TransportJournal {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl TransportJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// `(channel, target)` for every move, in order.
    pub fn moves(&self) -> Vec<(String, f64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Move { channel, target } => Some((channel.clone(), *target)),
                TransportCall::Read { .. } => None,
            })
            .collect()
    }

    /// Targets of every move on one channel, in order.
    pub fn moves_for(&self, channel: &str) -> Vec<f64> {
        self.moves()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, target)| target)
            .collect()
    }

    /// Number of moves issued on one channel.
    pub fn move_count(&self, channel: &str) -> usize {
        self.moves_for(channel).len()
    }

    /// Total number of calls of any kind.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// `true` when no call has been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Forget every call recorded so far.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

// =============================================================================
// MockAxisTransport - simulated motor channel
// =============================================================================

/// Mock motor channel.
///
/// Moves complete instantly and are reported back exactly. Every call is recorded
/// in the attached [`TransportJournal`].
///
/// # Example
///
/// ```
/// use rust_align::hardware::mock::{MockAxisTransport, TransportJournal};
/// use rust_align::hardware::AxisTransport;
///
/// let journal = TransportJournal::new();
/// let x = MockAxisTransport::new("x", 0.0).with_journal(journal.clone());
/// x.move_to(1_000.0).unwrap();
/// assert_eq!(journal.moves_for("x"), vec![1_000.0]);
/// ```
#[derive(Debug)]
pub struct MockAxisTransport {
    channel: String,
    position: Mutex<f64>,
    journal: TransportJournal,
    pending_failure: Mutex<Option<TransportError>>,
}

impl MockAxisTransport {
    /// Create a channel sitting at `initial` (canonical units).
    pub fn new(channel: impl Into<String>, initial: f64) -> Self {
        Self {
            channel: channel.into(),
            position: Mutex::new(initial),
            journal: TransportJournal::new(),
            pending_failure: Mutex::new(None),
        }
    }

    /// Record calls into a shared journal instead of a private one.
    pub fn with_journal(mut self, journal: TransportJournal) -> Self {
        self.journal = journal;
        self
    }

    /// The journal this channel records into.
    pub fn journal(&self) -> &TransportJournal {
        &self.journal
    }

    /// Channel name used in journal entries.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Physical position, without recording a call.
    pub fn position(&self) -> f64 {
        *self.position.lock()
    }

    /// Change the physical position behind the driver's back (manual jog, stall).
    pub fn jog_to(&self, position: f64) {
        *self.position.lock() = position;
    }

    /// Make the next call on this channel fail with `err`.
    pub fn fail_next(&self, err: TransportError) {
        *self.pending_failure.lock() = Some(err);
    }

    fn take_failure(&self) -> Result<(), TransportError> {
        match self.pending_failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AxisTransport for MockAxisTransport {
    fn move_to(&self, position: f64) -> Result<f64, TransportError> {
        self.journal.record(TransportCall::Move {
            channel: self.channel.clone(),
            target: position,
        });
        self.take_failure()?;
        *self.position.lock() = position;
        Ok(position)
    }

    fn read_position(&self) -> Result<f64, TransportError> {
        self.journal.record(TransportCall::Read {
            channel: self.channel.clone(),
        });
        self.take_failure()?;
        Ok(*self.position.lock())
    }
}

// =============================================================================
// MockPowerMeter
// =============================================================================

enum PowerSource {
    /// Scripted readings; the last one repeats once exhausted.
    Sequence(Vec<f64>),
    /// Gaussian spot centred on a point in channel space.
    Beam {
        peak_w: f64,
        waist: f64,
        channels: Vec<(Arc<MockAxisTransport>, f64)>,
    },
}

/// Mock optical power meter.
///
/// ```
/// use rust_align::hardware::mock::MockPowerMeter;
/// use rust_align::hardware::PowerMeter;
///
/// let meter = MockPowerMeter::sequence(vec![1.0, 5.0, 3.0]);
/// assert_eq!(meter.get_power().unwrap(), 1.0);
/// assert_eq!(meter.get_power().unwrap(), 5.0);
/// assert_eq!(meter.readings(), 2);
/// ```
pub struct MockPowerMeter {
    source: PowerSource,
    readings: Mutex<usize>,
}

impl MockPowerMeter {
    /// Return `values` one per call, repeating the last value afterwards.
    pub fn sequence(values: Vec<f64>) -> Self {
        Self {
            source: PowerSource::Sequence(values),
            readings: Mutex::new(0),
        }
    }

    /// Always return `value`.
    pub fn constant(value: f64) -> Self {
        Self::sequence(vec![value])
    }

    /// Gaussian beam of `peak_w` watts and 1/e² radius-like `waist` (canonical
    /// units), centred at `centre` on each listed channel.
    pub fn beam(peak_w: f64, waist: f64, channels: Vec<(Arc<MockAxisTransport>, f64)>) -> Self {
        Self {
            source: PowerSource::Beam {
                peak_w,
                waist,
                channels,
            },
            readings: Mutex::new(0),
        }
    }

    /// Number of readings taken so far.
    pub fn readings(&self) -> usize {
        *self.readings.lock()
    }
}

impl PowerMeter for MockPowerMeter {
    fn get_power(&self) -> Result<f64, TransportError> {
        let mut count = self.readings.lock();
        let index = *count;
        *count += 1;

        match &self.source {
            PowerSource::Sequence(values) => values
                .get(index)
                .or_else(|| values.last())
                .copied()
                .ok_or_else(|| TransportError::malformed("mock_power_meter", "empty sequence")),
            PowerSource::Beam {
                peak_w,
                waist,
                channels,
            } => {
                let r2: f64 = channels
                    .iter()
                    .map(|(channel, centre)| (channel.position() - centre).powi(2))
                    .sum();
                Ok(peak_w * (-r2 / (2.0 * waist * waist)).exp())
            }
        }
    }
}

// =============================================================================
// RecordingLogger
// =============================================================================

/// Move logger that keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<MoveRecord>>,
}

impl RecordingLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `log()` invocations.
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    /// Snapshot of the records received.
    pub fn records(&self) -> Vec<MoveRecord> {
        self.records.lock().clone()
    }
}

impl MoveLogger for RecordingLogger {
    fn log(&self, record: &MoveRecord) {
        self.records.lock().push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_is_shared_between_channels() {
        let journal = TransportJournal::new();
        let x = MockAxisTransport::new("x", 0.0).with_journal(journal.clone());
        let z = MockAxisTransport::new("z", 0.0).with_journal(journal.clone());

        z.move_to(-5.0).unwrap();
        x.move_to(3.0).unwrap();
        x.read_position().unwrap();

        assert_eq!(
            journal.moves(),
            vec![("z".to_string(), -5.0), ("x".to_string(), 3.0)]
        );
        assert_eq!(journal.len(), 3);
    }

    #[test]
    fn injected_failure_fires_once() {
        let x = MockAxisTransport::new("x", 10.0);
        x.fail_next(TransportError::timeout("x", "stalled"));
        assert!(x.move_to(20.0).is_err());
        assert_eq!(x.position(), 10.0);
        assert_eq!(x.move_to(20.0).unwrap(), 20.0);
    }

    #[test]
    fn sequence_repeats_last_reading() {
        let meter = MockPowerMeter::sequence(vec![1.0, 2.0]);
        let got: Vec<f64> = (0..4).map(|_| meter.get_power().unwrap()).collect();
        assert_eq!(got, vec![1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn beam_peaks_at_centre() {
        let x = Arc::new(MockAxisTransport::new("x", 5_000.0));
        let meter = MockPowerMeter::beam(1e-3, 1_000.0, vec![(x.clone(), 5_000.0)]);
        let on_axis = meter.get_power().unwrap();
        x.jog_to(6_000.0);
        let off_axis = meter.get_power().unwrap();
        assert!((on_axis - 1e-3).abs() < 1e-12);
        assert!(off_axis < on_axis);
    }
}
