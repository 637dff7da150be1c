use log::trace;

use crate::network::{EntityId, Endpoint, LinkId, Topology, Transport};
use crate::protocol::Packet;
use crate::{Cost, Port, Timestamp};

/// Handler-side view of the simulator: the current instant plus an outbox
/// the simulator drains once the handler returns.
pub(crate) struct SimTransport<'a> {
    now: Timestamp,
    node: EntityId,
    topology: &'a Topology,
    outbox: Vec<Outgoing>,
}

pub(crate) struct Outgoing {
    pub to: Endpoint,
    pub link: LinkId,
    pub latency: Cost,
    pub packet: Packet,
}

impl<'a> SimTransport<'a> {
    pub fn new(now: Timestamp, node: EntityId, topology: &'a Topology) -> Self {
        Self {
            now,
            node,
            topology,
            outbox: Vec::new(),
        }
    }

    pub fn into_outbox(self) -> Vec<Outgoing> {
        self.outbox
    }

    fn push(&mut self, packet: Packet, port: Port) {
        let Some(link) = self.topology.link_on(self.node, port) else {
            trace!(
                "{}: {} dropped, no link on port {}",
                self.topology.name(self.node),
                packet.kind(),
                port
            );
            return;
        };
        if let Some(to) = link.peer_of(self.node) {
            self.outbox.push(Outgoing {
                to,
                link: link.id,
                latency: link.latency,
                packet,
            });
        }
    }
}

impl Transport for SimTransport<'_> {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn send(&mut self, packet: Packet, port: Port, flood: bool) {
        if !flood {
            self.push(packet, port);
            return;
        }
        for out in self.topology.ports(self.node) {
            if out != port {
                self.push(packet.clone(), out);
            }
        }
    }
}
