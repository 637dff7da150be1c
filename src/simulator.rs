mod transport;

pub use crate::network::EntityId;

use log::{debug, trace, warn};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use uuid::Uuid;

use crate::config::{Action, Scenario};
use crate::entity::{Entity, Host, Hub};
use crate::error::{ScenarioError, TopologyError};
use crate::network::{Endpoint, LinkId, Topology};
use crate::protocol::Packet;
use crate::report::Report;
use crate::router::DvRouter;
use crate::{Cost, RouterConfig, Timestamp};

use transport::SimTransport;

/// Deterministic discrete-event network.
///
/// Events at the same instant run in the order they were scheduled, and
/// only one node handler runs at a time.
#[derive(Debug, Default)]
pub struct Simulator {
    now: Timestamp,
    seq: u64,
    queue: BinaryHeap<Event>,
    topology: Topology,
    entities: Vec<Entity>,
}

#[derive(Debug)]
struct Event {
    at: Timestamp,
    seq: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Deliver {
        to: Endpoint,
        link: LinkId,
        packet: Packet,
    },
    Timer(EntityId),
    Action(Action),
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the scenario's network at t=0 and queue its timeline.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let mut sim = Simulator::new();
        for entity in Entity::from_scenario(scenario) {
            sim.add_entity(entity)?;
        }
        for link in &scenario.links {
            let a = sim.lookup(&link.a)?;
            let b = sim.lookup(&link.b)?;
            sim.link(a, b, link.latency)?;
        }
        for scheduled in scenario.timeline() {
            sim.schedule(scheduled.at, EventKind::Action(scheduled.action.clone()));
        }
        Ok(sim)
    }

    /// Run a whole scenario and summarize where every node ended up.
    pub fn run_scenario(scenario: &Scenario) -> Result<Report, ScenarioError> {
        let mut sim = Simulator::from_scenario(scenario)?;
        sim.run_until(scenario.duration);
        Ok(sim.report())
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn add_router(&mut self, name: &str, config: RouterConfig) -> Result<EntityId, TopologyError> {
        self.add_entity(Entity::Router(DvRouter::new(name, config)))
    }

    pub fn add_host(&mut self, name: &str) -> Result<EntityId, TopologyError> {
        self.add_entity(Entity::Host(Host::new(name)))
    }

    pub fn add_hub(&mut self, name: &str) -> Result<EntityId, TopologyError> {
        self.add_entity(Entity::Hub(Hub::new(name)))
    }

    /// Add a node; routers get their first timer tick one interval from now.
    pub fn add_entity(&mut self, entity: Entity) -> Result<EntityId, TopologyError> {
        let id = self.topology.add_node(entity.name())?;
        self.entities.push(entity);
        self.schedule_timer(id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Result<EntityId, TopologyError> {
        self.topology.lookup(name)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn router(&self, id: EntityId) -> Option<&DvRouter> {
        self.entity(id)?.as_router()
    }

    pub fn host(&self, id: EntityId) -> Option<&Host> {
        self.entity(id)?.as_host()
    }

    pub fn hub(&self, id: EntityId) -> Option<&Hub> {
        self.entity(id)?.as_hub()
    }

    pub fn hub_mut(&mut self, id: EntityId) -> Option<&mut Hub> {
        self.entities.get_mut(id.0)?.as_hub_mut()
    }

    /// Connect two nodes now; both ends see the link come up, `a` first.
    pub fn link(&mut self, a: EntityId, b: EntityId, latency: Cost) -> Result<(), TopologyError> {
        let link = self.topology.link(a, b, latency)?;
        debug!(
            "t={:.2} link {} <-> {} (latency {})",
            self.now,
            self.topology.name(a),
            self.topology.name(b),
            latency
        );
        for end in link.ends {
            self.dispatch(end.node, |entity, net| {
                entity.handle_link_up(end.port, latency, net)
            });
        }
        Ok(())
    }

    /// Tear down the link between two nodes now. Packets still travelling on
    /// it are lost.
    pub fn unlink(&mut self, a: EntityId, b: EntityId) -> Result<(), TopologyError> {
        let link = self.topology.unlink(a, b)?;
        debug!(
            "t={:.2} unlink {} <-> {}",
            self.now,
            self.topology.name(a),
            self.topology.name(b)
        );
        for end in link.ends {
            self.dispatch(end.node, |entity, net| entity.handle_link_down(end.port, net));
        }
        Ok(())
    }

    /// Have host `src` send a ping to `dst` now.
    pub fn ping(&mut self, src: EntityId, dst: EntityId) -> Result<Uuid, TopologyError> {
        let destination = self
            .entity(dst)
            .map(|entity| entity.name().to_string())
            .ok_or_else(|| TopologyError::UnknownNode(dst.to_string()))?;
        if self.host(src).is_none() {
            let name = self.entity(src).map_or_else(|| src.to_string(), |e| e.name().to_string());
            return Err(TopologyError::NotAHost(name));
        }

        let mut sent = None;
        self.dispatch(src, |entity, net| {
            if let Entity::Host(host) = entity {
                sent = Some(host.ping(&destination, net));
            }
        });
        sent.ok_or_else(|| TopologyError::NotAHost(destination))
    }

    pub fn run_until(&mut self, until: Timestamp) {
        loop {
            match self.queue.peek() {
                Some(event) if event.at <= until => {}
                _ => break,
            }
            let Some(event) = self.queue.pop() else {
                break;
            };
            self.now = event.at;
            self.process(event.kind);
        }
        if until > self.now {
            self.now = until;
        }
    }

    pub fn run_for(&mut self, duration: Timestamp) {
        self.run_until(self.now + duration);
    }

    pub fn report(&self) -> Report {
        Report::new(self.now, self.entities.iter())
    }

    fn process(&mut self, kind: EventKind) {
        match kind {
            EventKind::Deliver { to, link, packet } => {
                let live = self.topology.link_on(to.node, to.port).map(|l| l.id) == Some(link);
                if !live {
                    trace!(
                        "t={:.2} {} lost on dead link to {}",
                        self.now,
                        packet.kind(),
                        self.topology.name(to.node)
                    );
                    return;
                }
                self.dispatch(to.node, |entity, net| entity.handle_rx(packet, to.port, net));
            }
            EventKind::Timer(node) => {
                self.dispatch(node, |entity, net| entity.handle_timer(net));
                self.schedule_timer(node);
            }
            EventKind::Action(action) => {
                if let Err(e) = self.apply(&action) {
                    warn!("t={:.2} scenario action {:?} failed: {}", self.now, action, e);
                }
            }
        }
    }

    fn apply(&mut self, action: &Action) -> Result<(), TopologyError> {
        match action {
            Action::Ping { src, dst } => {
                let (src, dst) = (self.lookup(src)?, self.lookup(dst)?);
                self.ping(src, dst).map(|_| ())
            }
            Action::Link { a, b, latency } => {
                let (a, b) = (self.lookup(a)?, self.lookup(b)?);
                self.link(a, b, *latency)
            }
            Action::Unlink { a, b } => {
                let (a, b) = (self.lookup(a)?, self.lookup(b)?);
                self.unlink(a, b)
            }
        }
    }

    fn schedule(&mut self, at: Timestamp, kind: EventKind) {
        self.seq += 1;
        self.queue.push(Event {
            at,
            seq: self.seq,
            kind,
        });
    }

    fn schedule_timer(&mut self, node: EntityId) {
        let Some(interval) = self.entities.get(node.0).and_then(Entity::timer_interval) else {
            return;
        };
        if interval.is_finite() && interval > 0.0 {
            self.schedule(self.now + interval, EventKind::Timer(node));
        } else {
            warn!("{}: timer interval {} ignored", self.topology.name(node), interval);
        }
    }

    /// Run one handler on `node`, then put whatever it sent on the wire.
    fn dispatch<F>(&mut self, node: EntityId, handler: F)
    where
        F: FnOnce(&mut Entity, &mut SimTransport<'_>),
    {
        let Some(entity) = self.entities.get_mut(node.0) else {
            return;
        };
        let mut net = SimTransport::new(self.now, node, &self.topology);
        handler(entity, &mut net);

        for out in net.into_outbox() {
            self.schedule(
                self.now + Timestamp::from(out.latency),
                EventKind::Deliver {
                    to: out.to,
                    link: out.link,
                    packet: out.packet,
                },
            );
        }
    }
}
