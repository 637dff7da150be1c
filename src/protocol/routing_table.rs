use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::{Cost, NodeId, Port, Timestamp};

/// Per-destination, per-via-port route store.
///
/// Each destination keeps at most one entry per port it was learned on. The
/// route actually used for a destination (the *effective* route) is never
/// stored; it is recomputed from the entries whenever it is asked for.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<NodeId, BTreeMap<Port, RouteEntry>>,
    next_order: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    /// Total cost from this node through the neighbor on the via port.
    pub cost: Cost,
    pub last_update: Timestamp,
    /// Creation order, used to break cost ties in favour of older entries.
    order: u64,
}

/// The minimum-cost entry for a destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveRoute<'a> {
    pub port: Port,
    pub entry: &'a RouteEntry,
}

impl RouteEntry {
    pub fn age(&self, now: Timestamp) -> Timestamp {
        now - self.last_update
    }
}

impl EffectiveRoute<'_> {
    pub fn cost(&self) -> Cost {
        self.entry.cost
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite (or create) the entry for `destination` learned on `port`.
    ///
    /// An overwritten entry keeps its creation order.
    pub fn update(&mut self, destination: &str, port: Port, cost: Cost, now: Timestamp) {
        let order = self.next_order;
        let per_port = self.routes.entry(destination.to_string()).or_default();
        match per_port.entry(port) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.cost = cost;
                entry.last_update = now;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RouteEntry {
                    cost,
                    last_update: now,
                    order,
                });
                self.next_order += 1;
            }
        }
    }

    pub fn get(&self, destination: &str, port: Port) -> Option<&RouteEntry> {
        self.routes.get(destination)?.get(&port)
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.routes.contains_key(destination)
    }

    /// All entries for a destination, ordered by via port.
    pub fn entries(&self, destination: &str) -> impl Iterator<Item = (Port, &RouteEntry)> {
        self.routes
            .get(destination)
            .into_iter()
            .flat_map(|per_port| per_port.iter().map(|(port, entry)| (*port, entry)))
    }

    /// Minimum-cost entry for `destination`; equal costs go to the oldest entry.
    pub fn effective_route(&self, destination: &str) -> Option<EffectiveRoute<'_>> {
        self.routes
            .get(destination)?
            .iter()
            .min_by(|(_, a), (_, b)| a.cost.cmp(&b.cost).then(a.order.cmp(&b.order)))
            .map(|(port, entry)| EffectiveRoute { port: *port, entry })
    }

    pub fn destinations(&self) -> impl Iterator<Item = &NodeId> {
        self.routes.keys()
    }

    /// Poison every entry learned on `port`. Returns how many were touched.
    pub fn poison_port(&mut self, port: Port, cost: Cost, now: Timestamp) -> usize {
        let mut poisoned = 0;
        for per_port in self.routes.values_mut() {
            if let Some(entry) = per_port.get_mut(&port) {
                entry.cost = cost;
                entry.last_update = now;
                poisoned += 1;
            }
        }
        poisoned
    }

    /// Delete every entry learned on `port`, dropping emptied destinations.
    pub fn remove_port(&mut self, port: Port) -> usize {
        let mut removed = 0;
        self.routes.retain(|_, per_port| {
            if per_port.remove(&port).is_some() {
                removed += 1;
            }
            !per_port.is_empty()
        });
        removed
    }

    pub fn remove(&mut self, destination: &str, port: Port) -> Option<RouteEntry> {
        let per_port = self.routes.get_mut(destination)?;
        let removed = per_port.remove(&port);
        if per_port.is_empty() {
            self.routes.remove(destination);
        }
        removed
    }

    /// Entries older than `timeout` at `now`.
    pub fn expired(&self, now: Timestamp, timeout: Timestamp) -> Vec<(NodeId, Port)> {
        self.routes
            .iter()
            .flat_map(|(destination, per_port)| {
                per_port
                    .iter()
                    .filter(move |(_, entry)| entry.age(now) > timeout)
                    .map(move |(port, _)| (destination.clone(), *port))
            })
            .collect()
    }

    /// Number of destinations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ops() -> impl Strategy<Value = Vec<(u8, Port, Cost)>> {
        prop::collection::vec((0..4u8, 0..5usize, 0..20u32), 1..64)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn effective_cost_is_minimum_entry(updates in ops()) {
            let mut table = RoutingTable::new();
            for (i, (dest, port, cost)) in updates.iter().enumerate() {
                table.update(&format!("h{dest}"), *port, *cost, i as f64);
            }

            for destination in table.destinations() {
                let min = table.entries(destination).map(|(_, e)| e.cost).min().unwrap();
                prop_assert_eq!(table.effective_route(destination).unwrap().cost(), min);
            }
        }

        #[test]
        fn one_entry_per_port(updates in ops()) {
            let mut table = RoutingTable::new();
            for (dest, port, cost) in &updates {
                table.update(&format!("h{dest}"), *port, *cost, 0.0);
            }

            let mut distinct: Vec<(u8, Port)> = updates.iter().map(|(d, p, _)| (*d, *p)).collect();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(table.route_count(), distinct.len());
        }

        #[test]
        fn remove_port_leaves_no_trace(updates in ops(), port in 0..5usize) {
            let mut table = RoutingTable::new();
            for (dest, p, cost) in &updates {
                table.update(&format!("h{dest}"), *p, *cost, 0.0);
            }
            table.remove_port(port);

            for destination in table.destinations() {
                prop_assert!(table.entries(destination).count() > 0);
                prop_assert!(table.get(destination, port).is_none());
            }
        }
    }
}
