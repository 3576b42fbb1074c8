//! Shared multi-axis controllers.
//!
//! Several motor channels are often multiplexed on one serial line or GPIB
//! address (a Zaber daisy chain, a Newport ESP300 with three axes). The bus can
//! only carry one request at a time, so every channel goes through the same lock.
//!
//! ```rust,ignore
//! let bus = SharedBus::new("esp300", Esp300::open("/dev/ttyUSB0")?);
//! let x: Arc<dyn AxisTransport> = Arc::new(bus.channel(1));
//! let y: Arc<dyn AxisTransport> = Arc::new(bus.channel(2));
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::TransportError;
use crate::hardware::capabilities::AxisTransport;

/// A controller driving several numbered channels over one link.
pub trait MultiAxisController: Send {
    /// Move `channel` to an absolute position, returning the confirmed position.
    fn move_channel(&mut self, channel: u8, position: f64) -> Result<f64, TransportError>;

    /// Read the absolute position of `channel`.
    fn read_channel(&mut self, channel: u8) -> Result<f64, TransportError>;
}

/// Controller guarded by a mutex so channels never interleave on the wire.
pub struct SharedBus<C> {
    name: String,
    controller: Mutex<C>,
}

impl<C: MultiAxisController> SharedBus<C> {
    /// Wrap a controller.
    pub fn new(name: impl Into<String>, controller: C) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            controller: Mutex::new(controller),
        })
    }

    /// Bus name, used in trace output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport for one channel of this bus.
    pub fn channel(self: &Arc<Self>, channel: u8) -> BusChannel<C> {
        BusChannel {
            bus: Arc::clone(self),
            channel,
        }
    }
}

/// One channel of a [`SharedBus`].
pub struct BusChannel<C> {
    bus: Arc<SharedBus<C>>,
    channel: u8,
}

impl<C> BusChannel<C> {
    /// Channel number on the bus.
    pub fn number(&self) -> u8 {
        self.channel
    }
}

impl<C: MultiAxisController> AxisTransport for BusChannel<C> {
    fn move_to(&self, position: f64) -> Result<f64, TransportError> {
        let mut controller = self.bus.controller.lock();
        tracing::trace!(bus = %self.bus.name, channel = self.channel, position, "bus move");
        controller.move_channel(self.channel, position)
    }

    fn read_position(&self) -> Result<f64, TransportError> {
        let mut controller = self.bus.controller.lock();
        controller.read_channel(self.channel)
    }
}
