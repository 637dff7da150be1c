use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entity::{Entity, ObservedAdvertisement};
use crate::router::DvRouter;
use crate::{Cost, NodeId, Port, Timestamp};

/// Where every node stood at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub time: Timestamp,
    pub nodes: BTreeMap<NodeId, NodeReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeReport {
    Router { routes: Vec<RouteReport> },
    Host { received: usize },
    Hub {
        data_seen: usize,
        advertisements: Vec<ObservedAdvertisement>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteReport {
    pub destination: NodeId,
    pub port: Port,
    pub cost: Cost,
    pub age: Timestamp,
    /// Whether this is the entry used for forwarding.
    pub effective: bool,
}

impl Report {
    pub fn new<'a>(time: Timestamp, entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        let nodes = entities
            .into_iter()
            .map(|entity| (entity.name().to_string(), NodeReport::of(entity, time)))
            .collect();
        Self { time, nodes }
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.get(name)
    }

    pub fn received(&self, host: &str) -> Option<usize> {
        match self.node(host)? {
            NodeReport::Host { received } => Some(*received),
            _ => None,
        }
    }

    pub fn data_seen(&self, hub: &str) -> Option<usize> {
        match self.node(hub)? {
            NodeReport::Hub { data_seen, .. } => Some(*data_seen),
            _ => None,
        }
    }
}

impl NodeReport {
    fn of(entity: &Entity, now: Timestamp) -> Self {
        match entity {
            Entity::Router(router) => NodeReport::Router {
                routes: routes(router, now),
            },
            Entity::Host(host) => NodeReport::Host {
                received: host.received(),
            },
            Entity::Hub(hub) => NodeReport::Hub {
                data_seen: hub.data_seen(),
                advertisements: hub.advertisements().to_vec(),
            },
        }
    }
}

fn routes(router: &DvRouter, now: Timestamp) -> Vec<RouteReport> {
    let table = router.table();
    table
        .destinations()
        .flat_map(|destination| {
            let best = table.effective_route(destination).map(|route| route.port);
            table.entries(destination).map(move |(port, entry)| RouteReport {
                destination: destination.clone(),
                port,
                cost: entry.cost,
                age: entry.age(now),
                effective: best == Some(port),
            })
        })
        .collect()
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network state at t={:.2}", self.time)?;
        writeln!(f, "{}", "=".repeat(50))?;

        for (name, node) in &self.nodes {
            match node {
                NodeReport::Router { routes } => {
                    writeln!(f, "\nRouter {}:", name)?;
                    writeln!(f, "{:<12} {:<6} {:<6} {:<8} {:<4}", "Destination", "Port", "Cost", "Age", "Best")?;
                    writeln!(f, "{}", "-".repeat(40))?;
                    if routes.is_empty() {
                        writeln!(f, "No routes")?;
                    }
                    for route in routes {
                        writeln!(
                            f,
                            "{:<12} {:<6} {:<6} {:<8.1} {:<4}",
                            route.destination,
                            route.port,
                            route.cost,
                            route.age,
                            if route.effective { "*" } else { "" }
                        )?;
                    }
                }
                NodeReport::Host { received } => {
                    writeln!(f, "\nHost {}: {} packets received", name, received)?;
                }
                NodeReport::Hub {
                    data_seen,
                    advertisements,
                } => {
                    writeln!(
                        f,
                        "\nHub {}: {} data packets, {} advertisements seen",
                        name,
                        data_seen,
                        advertisements.len()
                    )?;
                }
            }
        }
        Ok(())
    }
}
