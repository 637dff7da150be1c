use log::{debug, info, trace};
use std::collections::{BTreeMap, BTreeSet};

use crate::network::Transport;
use crate::protocol::{DataPacket, EffectiveRoute, Packet, RoutingTable};
use crate::{Cost, INFINITY, NodeId, POISONED, Port, RouterConfig, Timestamp};

/// A distance vector router.
///
/// The router only knows its own ports: the latency of each active link,
/// which host (if any) announced itself on it, and what its neighbors have
/// advertised. Every handler runs to completion and talks to the outside
/// world exclusively through the [`Transport`] it is handed.
#[derive(Debug, Clone)]
pub struct DvRouter {
    id: NodeId,
    config: RouterConfig,
    ports: BTreeSet<Port>,
    latencies: BTreeMap<Port, Cost>,
    neighbors: BTreeMap<Port, NodeId>,
    table: RoutingTable,
}

impl DvRouter {
    pub fn new(id: impl Into<NodeId>, config: RouterConfig) -> Self {
        Self {
            id: id.into(),
            config,
            ports: BTreeSet::new(),
            latencies: BTreeMap::new(),
            neighbors: BTreeMap::new(),
            table: RoutingTable::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.ports.iter().copied()
    }

    pub fn latency(&self, port: Port) -> Option<Cost> {
        self.latencies.get(&port).copied()
    }

    /// The directly attached host that announced itself on `port`.
    pub fn neighbor(&self, port: Port) -> Option<&str> {
        self.neighbors.get(&port).map(String::as_str)
    }

    pub fn effective_route(&self, destination: &str) -> Option<EffectiveRoute<'_>> {
        self.table.effective_route(destination)
    }

    pub fn handle_link_up(&mut self, port: Port, latency: Cost, net: &mut impl Transport) {
        info!("{}: link up on port {} (latency {})", self.id, port, latency);
        self.latencies.insert(port, latency);
        self.ports.insert(port);
        self.send_update(net);
    }

    pub fn handle_link_down(&mut self, port: Port, net: &mut impl Transport) {
        info!("{}: link down on port {}", self.id, port);
        self.latencies.remove(&port);
        self.ports.remove(&port);
        self.neighbors.remove(&port);

        if self.config.poison_mode {
            let poisoned = self.table.poison_port(port, POISONED, net.now());
            debug!("{}: poisoned {} routes via port {}", self.id, poisoned, port);
        } else {
            let removed = self.table.remove_port(port);
            debug!("{}: dropped {} routes via port {}", self.id, removed, port);
        }
    }

    pub fn handle_rx(&mut self, packet: Packet, port: Port, net: &mut impl Transport) {
        trace!("{}: rx {} on port {}", self.id, packet.kind(), port);
        match packet {
            Packet::Advertisement { destination, cost } => {
                self.handle_update(&destination, cost, port, net.now());
            }
            Packet::Discovery { sender } => self.handle_discovery(sender, port, net.now()),
            Packet::Data(data) => self.forward(data, port, net),
        }
    }

    fn handle_discovery(&mut self, sender: NodeId, port: Port, now: Timestamp) {
        let Some(latency) = self.latency(port) else {
            debug!("{}: discovery from {} on inactive port {}", self.id, sender, port);
            return;
        };
        debug!("{}: {} is attached on port {}", self.id, sender, port);
        self.table.update(&sender, port, latency, now);
        self.neighbors.insert(port, sender);
    }

    fn forward(&self, data: DataPacket, in_port: Port, net: &mut impl Transport) {
        if data.destination == self.id {
            trace!("{}: absorbed packet {} from {}", self.id, data.id, data.source);
            return;
        }

        let Some(route) = self.table.effective_route(&data.destination) else {
            debug!("{}: no route to {}, dropping {}", self.id, data.destination, data.id);
            return;
        };
        if route.cost() >= INFINITY {
            debug!("{}: {} is unreachable, dropping {}", self.id, data.destination, data.id);
            return;
        }
        if route.port == in_port {
            debug!(
                "{}: route to {} points back out port {}, dropping {}",
                self.id, data.destination, in_port, data.id
            );
            return;
        }

        let out_port = route.port;
        trace!("{}: forwarding {} to {} via port {}", self.id, data.id, data.destination, out_port);
        net.send(Packet::Data(data), out_port, false);
    }

    /// Periodic work: expire stale routes, then advertise.
    pub fn handle_timer(&mut self, net: &mut impl Transport) {
        let now = net.now();
        for (destination, port) in self.table.expired(now, self.config.route_timeout) {
            if self.neighbors.contains_key(&port) {
                continue;
            }
            debug!("{}: route to {} via port {} expired", self.id, destination, port);
            self.table.remove(&destination, port);
        }
        self.send_update(net);
    }

    /// Advertise every known destination on every active port.
    pub fn send_update(&self, net: &mut impl Transport) {
        for &port in &self.ports {
            for destination in self.table.destinations() {
                let Some(route) = self.table.effective_route(destination) else {
                    continue;
                };
                if route.port != port {
                    net.send(Packet::advertisement(destination.as_str(), route.cost()), port, false);
                } else if self.config.poison_mode {
                    net.send(Packet::advertisement(destination.as_str(), POISONED), port, false);
                }
            }
        }
    }

    /// Merge one advertisement: the entry for (`destination`, `port`) is
    /// replaced whatever its previous cost.
    pub fn handle_update(&mut self, destination: &str, cost: Cost, port: Port, time: Timestamp) {
        let Some(latency) = self.latency(port) else {
            debug!("{}: advertisement for {} on inactive port {}", self.id, destination, port);
            return;
        };
        self.table.update(destination, port, cost.saturating_add(latency), time);
    }
}
