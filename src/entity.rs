use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::Scenario;
use crate::network::Transport;
use crate::protocol::{DataPacket, Packet};
use crate::router::DvRouter;
use crate::{Cost, NodeId, Port, Timestamp};

/// Anything that can sit at the end of a link.
#[derive(Debug, Clone)]
pub enum Entity {
    Router(DvRouter),
    Host(Host),
    Hub(Hub),
}

/// End host: announces itself to attached routers and counts data packets
/// addressed to it.
#[derive(Debug, Clone)]
pub struct Host {
    id: NodeId,
    ports: BTreeSet<Port>,
    received: Vec<Uuid>,
}

/// Repeater that floods everything it receives and keeps count of what
/// went through it.
#[derive(Debug, Clone)]
pub struct Hub {
    id: NodeId,
    data_seen: usize,
    advertisements: Vec<ObservedAdvertisement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedAdvertisement {
    pub destination: NodeId,
    pub cost: Cost,
    pub at: Timestamp,
}

impl Host {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ports: BTreeSet::new(),
            received: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of data packets delivered to this host.
    pub fn received(&self) -> usize {
        self.received.len()
    }

    /// Send a ping to `destination` on every attached link.
    pub fn ping(&self, destination: &str, net: &mut impl Transport) -> Uuid {
        let data = DataPacket::new(self.id.as_str(), destination, "ping");
        if self.ports.is_empty() {
            debug!("{}: no links, ping to {} goes nowhere", self.id, destination);
        }
        for &port in &self.ports {
            net.send(Packet::Data(data.clone()), port, false);
        }
        data.id
    }

    pub fn handle_link_up(&mut self, port: Port, net: &mut impl Transport) {
        self.ports.insert(port);
        net.send(Packet::discovery(self.id.as_str()), port, false);
    }

    pub fn handle_link_down(&mut self, port: Port) {
        self.ports.remove(&port);
    }

    pub fn handle_rx(&mut self, packet: Packet, port: Port) {
        if let Packet::Data(data) = packet {
            if data.destination == self.id {
                trace!("{}: got {} from {} on port {}", self.id, data.id, data.source, port);
                self.received.push(data.id);
            }
        }
    }
}

impl Hub {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            data_seen: 0,
            advertisements: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Data packets that passed through this hub.
    pub fn data_seen(&self) -> usize {
        self.data_seen
    }

    pub fn advertisements(&self) -> &[ObservedAdvertisement] {
        &self.advertisements
    }

    pub fn clear_advertisements(&mut self) {
        self.advertisements.clear();
    }

    pub fn handle_rx(&mut self, packet: Packet, port: Port, net: &mut impl Transport) {
        match &packet {
            Packet::Data(data) => {
                trace!("{}: saw {} heading to {}", self.id, data.id, data.destination);
                self.data_seen += 1;
            }
            Packet::Advertisement { destination, cost } => {
                self.advertisements.push(ObservedAdvertisement {
                    destination: destination.clone(),
                    cost: *cost,
                    at: net.now(),
                });
            }
            Packet::Discovery { .. } => {}
        }
        net.send(packet, port, true);
    }
}

impl Entity {
    /// Every node a scenario declares: routers, then hosts, then hubs.
    pub fn from_scenario(scenario: &Scenario) -> Vec<Entity> {
        let routers = scenario
            .router_configs()
            .map(|(name, config)| Entity::Router(DvRouter::new(name, config)));
        let hosts = scenario.hosts.iter().map(|name| Entity::Host(Host::new(name.as_str())));
        let hubs = scenario.hubs.iter().map(|name| Entity::Hub(Hub::new(name.as_str())));
        routers.chain(hosts).chain(hubs).collect()
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Router(router) => router.id(),
            Entity::Host(host) => host.id(),
            Entity::Hub(hub) => hub.id(),
        }
    }

    /// Period of the entity's timer, if it has one.
    pub fn timer_interval(&self) -> Option<Timestamp> {
        match self {
            Entity::Router(router) => Some(router.config().timer_interval),
            Entity::Host(_) | Entity::Hub(_) => None,
        }
    }

    pub fn handle_link_up(&mut self, port: Port, latency: Cost, net: &mut impl Transport) {
        match self {
            Entity::Router(router) => router.handle_link_up(port, latency, net),
            Entity::Host(host) => host.handle_link_up(port, net),
            Entity::Hub(_) => {}
        }
    }

    pub fn handle_link_down(&mut self, port: Port, net: &mut impl Transport) {
        match self {
            Entity::Router(router) => router.handle_link_down(port, net),
            Entity::Host(host) => host.handle_link_down(port),
            Entity::Hub(_) => {}
        }
    }

    pub fn handle_rx(&mut self, packet: Packet, port: Port, net: &mut impl Transport) {
        match self {
            Entity::Router(router) => router.handle_rx(packet, port, net),
            Entity::Host(host) => host.handle_rx(packet, port),
            Entity::Hub(hub) => hub.handle_rx(packet, port, net),
        }
    }

    pub fn handle_timer(&mut self, net: &mut impl Transport) {
        if let Entity::Router(router) = self {
            router.handle_timer(net);
        }
    }

    pub fn as_router(&self) -> Option<&DvRouter> {
        match self {
            Entity::Router(router) => Some(router),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&Host> {
        match self {
            Entity::Host(host) => Some(host),
            _ => None,
        }
    }

    pub fn as_hub(&self) -> Option<&Hub> {
        match self {
            Entity::Hub(hub) => Some(hub),
            _ => None,
        }
    }

    pub fn as_hub_mut(&mut self) -> Option<&mut Hub> {
        match self {
            Entity::Hub(hub) => Some(hub),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RecordingTransport;

    #[test]
    fn host_announces_itself_on_link_up() {
        let mut host = Host::new("h1");
        let mut net = RecordingTransport::at(0.0);
        host.handle_link_up(0, &mut net);
        assert_eq!(net.take(), vec![(Packet::discovery("h1"), 0, false)]);
    }

    #[test]
    fn host_counts_only_its_own_packets() {
        let mut host = Host::new("h2");
        host.handle_rx(Packet::ping("h1", "h2"), 0);
        host.handle_rx(Packet::ping("h1", "h3"), 0);
        host.handle_rx(Packet::advertisement("h2", 1), 0);
        assert_eq!(host.received(), 1);
    }

    #[test]
    fn host_ping_goes_out_every_link() {
        let mut host = Host::new("h1");
        let mut net = RecordingTransport::at(0.0);
        host.handle_link_up(0, &mut net);
        host.handle_link_up(1, &mut net);
        net.take();

        let id = host.ping("h2", &mut net);
        let sent = net.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(packet, _, _)| matches!(packet, Packet::Data(d) if d.id == id)));
    }

    #[test]
    fn hub_floods_and_counts() {
        let mut hub = Hub::new("c1");
        let mut net = RecordingTransport::at(3.0);
        hub.handle_rx(Packet::ping("h1", "h2"), 1, &mut net);
        hub.handle_rx(Packet::advertisement("h2", 2), 0, &mut net);

        assert_eq!(hub.data_seen(), 1);
        assert_eq!(
            hub.advertisements(),
            &[ObservedAdvertisement {
                destination: "h2".into(),
                cost: 2,
                at: 3.0
            }]
        );
        let sent = net.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, _, flood)| *flood));
        assert_eq!(sent[0].1, 1);

        hub.clear_advertisements();
        assert!(hub.advertisements().is_empty());
    }

    #[test]
    fn only_routers_have_timers() {
        let router = Entity::Router(DvRouter::new("r1", Default::default()));
        assert_eq!(router.timer_interval(), Some(5.0));
        assert_eq!(Entity::Host(Host::new("h1")).timer_interval(), None);
        assert_eq!(Entity::Hub(Hub::new("c1")).timer_interval(), None);
        assert_eq!(router.name(), "r1");
    }
}
