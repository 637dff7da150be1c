pub mod topology;

pub use topology::{EntityId, Endpoint, Link, LinkId, Topology};

use crate::protocol::Packet;
use crate::{Port, Timestamp};

/// What a node sees of the network it runs in: a clock and a way to put
/// packets on its links.
pub trait Transport {
    /// Monotonic clock, in seconds.
    fn now(&self) -> Timestamp;

    /// Send `packet` out of `port`, or, when `flood` is set, out of every
    /// attached port except `port`. Ports without a link drop the packet.
    fn send(&mut self, packet: Packet, port: Port, flood: bool);
}

/// Transport that records what would have been sent. Used by unit tests to
/// drive a single node.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub now: Timestamp,
    pub sent: Vec<(Packet, Port, bool)>,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            sent: Vec::new(),
        }
    }

    pub fn take(&mut self) -> Vec<(Packet, Port, bool)> {
        std::mem::take(&mut self.sent)
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn send(&mut self, packet: Packet, port: Port, flood: bool) {
        self.sent.push((packet, port, flood));
    }
}
