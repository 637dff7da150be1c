//! Wall-clock runtime: every node is its own tokio task and links are
//! channels with a delay in front of them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::{Action, Scenario};
use crate::entity::Entity;
use crate::network::{Endpoint, EntityId, Link, LinkId, Topology, Transport};
use crate::protocol::Packet;
use crate::report::Report;
use crate::{Cost, NodeId, Port, Timestamp};

type Inbox = mpsc::UnboundedSender<NodeInput>;

#[derive(Debug)]
enum NodeInput {
    LinkUp {
        port: Port,
        latency: Cost,
        link: LinkId,
        peer: Peer,
    },
    LinkDown {
        port: Port,
    },
    Packet {
        port: Port,
        link: LinkId,
        packet: Packet,
    },
    Ping {
        destination: NodeId,
    },
}

/// The far end of a link as seen from one node.
#[derive(Debug, Clone)]
struct Peer {
    inbox: Inbox,
    port: Port,
}

#[derive(Debug)]
struct Attached {
    link: LinkId,
    latency: Cost,
    peer: Peer,
}

/// Maps scenario seconds onto tokio time.
#[derive(Debug, Clone, Copy)]
struct Clock {
    start: Instant,
    scale: Duration,
}

impl Clock {
    fn new(scale: Duration) -> Self {
        Self {
            start: Instant::now(),
            scale,
        }
    }

    fn now(&self) -> Timestamp {
        self.start.elapsed().as_secs_f64() / self.scale.as_secs_f64()
    }

    fn span(&self, seconds: Timestamp) -> Duration {
        self.scale.mul_f64(seconds.max(0.0))
    }

    fn instant_at(&self, at: Timestamp) -> Instant {
        self.start + self.span(at)
    }
}

struct LiveTransport<'a> {
    clock: Clock,
    name: &'a str,
    links: &'a BTreeMap<Port, Attached>,
}

impl LiveTransport<'_> {
    fn push(&self, packet: Packet, port: Port) {
        let Some(attached) = self.links.get(&port) else {
            trace!(node = self.name, port, "{} dropped, no link", packet.kind());
            return;
        };
        let delay = self.clock.span(Timestamp::from(attached.latency));
        let inbox = attached.peer.inbox.clone();
        let input = NodeInput::Packet {
            port: attached.peer.port,
            link: attached.link,
            packet,
        };
        tokio::spawn(async move {
            time::sleep(delay).await;
            // The peer may already have shut down.
            let _ = inbox.send(input);
        });
    }
}

impl Transport for LiveTransport<'_> {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn send(&mut self, packet: Packet, port: Port, flood: bool) {
        if !flood {
            self.push(packet, port);
            return;
        }
        for &out in self.links.keys() {
            if out != port {
                self.push(packet.clone(), out);
            }
        }
    }
}

/// Nodes of a running network plus the bookkeeping needed to wire them.
struct Network {
    clock: Clock,
    topology: Topology,
    inboxes: Vec<Inbox>,
    hosts: BTreeSet<EntityId>,
    handles: Vec<JoinHandle<Entity>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Network {
    fn start(scenario: &Scenario, clock: Clock) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut network = Self {
            clock,
            topology: Topology::new(),
            inboxes: Vec::new(),
            hosts: BTreeSet::new(),
            handles: Vec::new(),
            shutdown_tx,
        };
        for entity in Entity::from_scenario(scenario) {
            network.spawn(entity)?;
        }
        for link in &scenario.links {
            network.link(&link.a, &link.b, link.latency)?;
        }
        info!(nodes = network.topology.node_count(), "network started");
        Ok(network)
    }

    fn spawn(&mut self, entity: Entity) -> Result<EntityId> {
        let id = self.topology.add_node(entity.name())?;
        if matches!(entity, Entity::Host(_)) {
            self.hosts.insert(id);
        }
        let (inbox, rx) = mpsc::unbounded_channel();
        let clock = self.clock;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.inboxes.push(inbox);
        self.handles.push(tokio::spawn(async move {
            node_task(entity, rx, clock, &mut shutdown_rx).await
        }));
        Ok(id)
    }

    fn inbox(&self, id: EntityId) -> Result<&Inbox> {
        self.inboxes
            .get(id.0)
            .with_context(|| format!("no task for node {}", id))
    }

    fn notify(&self, id: EntityId, input: NodeInput) -> Result<()> {
        self.inbox(id)?
            .send(input)
            .map_err(|_| anyhow::anyhow!("node {} has stopped", self.topology.name(id)))
    }

    fn link(&mut self, a: &str, b: &str, latency: Cost) -> Result<()> {
        let (a, b) = (self.topology.lookup(a)?, self.topology.lookup(b)?);
        let link = self.topology.link(a, b, latency)?;
        debug!(a = self.topology.name(a), b = self.topology.name(b), latency, "link up");
        for end in self.link_up_order(&link) {
            let far = link
                .peer_of(end.node)
                .context("link has no far end")?;
            let peer = Peer {
                inbox: self.inbox(far.node)?.clone(),
                port: far.port,
            };
            self.notify(
                end.node,
                NodeInput::LinkUp {
                    port: end.port,
                    latency,
                    link: link.id,
                    peer,
                },
            )?;
        }
        Ok(())
    }

    /// Ends of `link` in the order they are told it is up. A host announces
    /// itself as soon as it sees the link, so its peer must already have the
    /// port queued when that announcement lands.
    fn link_up_order(&self, link: &Link) -> [Endpoint; 2] {
        let [a, b] = link.ends;
        if self.hosts.contains(&a.node) && !self.hosts.contains(&b.node) {
            [b, a]
        } else {
            [a, b]
        }
    }

    fn unlink(&mut self, a: &str, b: &str) -> Result<()> {
        let (a, b) = (self.topology.lookup(a)?, self.topology.lookup(b)?);
        let link = self.topology.unlink(a, b)?;
        debug!(a = self.topology.name(a), b = self.topology.name(b), "link down");
        for end in link.ends {
            self.notify(end.node, NodeInput::LinkDown { port: end.port })?;
        }
        Ok(())
    }

    fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Ping { src, dst } => {
                let src = self.topology.lookup(src)?;
                self.notify(
                    src,
                    NodeInput::Ping {
                        destination: dst.clone(),
                    },
                )
            }
            Action::Link { a, b, latency } => self.link(a, b, *latency),
            Action::Unlink { a, b } => self.unlink(a, b),
        }
    }

    /// Stop every node and collect its final state.
    async fn shutdown(self) -> Result<Vec<Entity>> {
        let _ = self.shutdown_tx.send(());
        let mut entities = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            entities.push(handle.await.context("node task panicked")?);
        }
        Ok(entities)
    }
}

/// Play a scenario against real timers. One scenario second lasts
/// `time_scale` of wall-clock time.
pub async fn run(scenario: &Scenario, time_scale: Duration) -> Result<Report> {
    scenario.validate()?;
    if time_scale.is_zero() {
        anyhow::bail!("time scale must be positive");
    }

    let clock = Clock::new(time_scale);
    let mut network = Network::start(scenario, clock)?;

    for scheduled in scenario.timeline() {
        time::sleep_until(clock.instant_at(scheduled.at)).await;
        if let Err(e) = network.apply(&scheduled.action) {
            warn!(at = scheduled.at, "scenario action {:?} failed: {:#}", scheduled.action, e);
        }
    }
    time::sleep_until(clock.instant_at(scenario.duration)).await;

    let now = clock.now();
    let entities = network.shutdown().await?;
    info!(time = now, "network stopped");
    Ok(Report::new(now, &entities))
}

async fn node_task(
    mut entity: Entity,
    mut inbox: mpsc::UnboundedReceiver<NodeInput>,
    clock: Clock,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Entity {
    let mut links: BTreeMap<Port, Attached> = BTreeMap::new();
    let mut timer = match entity.timer_interval().map(|seconds| clock.span(seconds)) {
        Some(period) if !period.is_zero() => {
            let mut timer = time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(timer)
        }
        Some(_) => {
            warn!(node = entity.name(), "timer period rounds to zero, timer disabled");
            None
        }
        None => None,
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!(node = entity.name(), "node task shutting down");
                break;
            }
            _ = tick(&mut timer) => {
                let name = entity.name().to_string();
                let mut net = LiveTransport { clock, name: &name, links: &links };
                entity.handle_timer(&mut net);
            }
            input = inbox.recv() => {
                let Some(input) = input else {
                    break;
                };
                handle_input(&mut entity, &mut links, clock, input);
            }
        }
    }
    entity
}

fn handle_input(
    entity: &mut Entity,
    links: &mut BTreeMap<Port, Attached>,
    clock: Clock,
    input: NodeInput,
) {
    let name = entity.name().to_string();
    match input {
        NodeInput::LinkUp {
            port,
            latency,
            link,
            peer,
        } => {
            links.insert(port, Attached { link, latency, peer });
            let mut net = LiveTransport { clock, name: &name, links };
            entity.handle_link_up(port, latency, &mut net);
        }
        NodeInput::LinkDown { port } => {
            links.remove(&port);
            let mut net = LiveTransport { clock, name: &name, links };
            entity.handle_link_down(port, &mut net);
        }
        NodeInput::Packet { port, link, packet } => {
            if links.get(&port).map(|attached| attached.link) != Some(link) {
                trace!(node = %name, port, "{} lost on dead link", packet.kind());
                return;
            }
            let mut net = LiveTransport { clock, name: &name, links };
            entity.handle_rx(packet, port, &mut net);
        }
        NodeInput::Ping { destination } => {
            let mut net = LiveTransport { clock, name: &name, links };
            match entity {
                Entity::Host(host) => {
                    let id = host.ping(&destination, &mut net);
                    debug!(node = %name, %id, "ping to {}", destination);
                }
                _ => warn!(node = %name, "only hosts can ping"),
            }
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkSpec, RouterSpec, ScheduledAction};
    use crate::error::ScenarioError;

    fn line() -> Scenario {
        Scenario {
            defaults: Default::default(),
            routers: vec![RouterSpec::new("r1"), RouterSpec::new("r2")],
            hosts: vec!["h1".into(), "h2".into()],
            hubs: vec![],
            links: vec![
                LinkSpec::new("h1", "r1", 1),
                LinkSpec::new("r1", "r2", 1),
                LinkSpec::new("r2", "h2", 1),
            ],
            actions: vec![ScheduledAction::ping(20.0, "h1", "h2")],
            duration: 40.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_after_convergence() {
        let report = run(&line(), Duration::from_millis(100)).await.unwrap();
        assert_eq!(report.received("h2"), Some(1));
        assert!((report.time - 40.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn cut_link_drops_traffic() {
        let mut scenario = line();
        scenario.actions.push(ScheduledAction::unlink(25.0, "r1", "r2"));
        scenario.actions.push(ScheduledAction::ping(30.0, "h1", "h2"));

        let report = run(&scenario, Duration::from_millis(100)).await.unwrap();
        assert_eq!(report.received("h2"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_zero_time_scale() {
        assert!(run(&line(), Duration::ZERO).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_zero_timer_interval() {
        let mut scenario = line();
        scenario.routers[0].timer_interval = Some(0.0);

        let err = run(&scenario, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScenarioError>(),
            Some(ScenarioError::BadTiming { field: "timer_interval", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_too_short_for_the_time_scale_is_disabled() {
        let mut scenario = line();
        scenario.defaults.timer_interval = 0.1;

        let report = run(&scenario, Duration::from_nanos(1)).await.unwrap();
        assert_eq!(report.received("h2"), Some(0));
    }

    #[tokio::test]
    async fn hosts_hear_about_links_last() {
        let clock = Clock::new(Duration::from_millis(100));
        let network = Network::start(&line(), clock).unwrap();
        let h1 = network.topology.lookup("h1").unwrap();
        let r1 = network.topology.lookup("r1").unwrap();
        let r2 = network.topology.lookup("r2").unwrap();

        let host_first = network.topology.link_between(h1, r1).unwrap();
        let order = network.link_up_order(host_first);
        assert_eq!([order[0].node, order[1].node], [r1, h1]);

        let routers = network.topology.link_between(r1, r2).unwrap();
        let order = network.link_up_order(routers);
        assert_eq!([order[0].node, order[1].node], [r1, r2]);

        network.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_latency_hosts_are_discovered() {
        let mut scenario = line();
        scenario.links = vec![
            LinkSpec::new("h1", "r1", 0),
            LinkSpec::new("r1", "r2", 1),
            LinkSpec::new("h2", "r2", 0),
        ];

        let report = run(&scenario, Duration::from_millis(100)).await.unwrap();
        assert_eq!(report.received("h2"), Some(1));
    }
}
