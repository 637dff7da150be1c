use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::TopologyError;
use crate::{Cost, NodeId, Port};

/// Index of a node inside a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub node: EntityId,
    pub port: Port,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub ends: [Endpoint; 2],
    pub latency: Cost,
}

/// Named nodes and the point-to-point links between them.
///
/// Ports are allocated per node, lowest free number first, and released
/// when their link is removed.
#[derive(Debug, Default)]
pub struct Topology {
    names: Vec<NodeId>,
    index: HashMap<NodeId, EntityId>,
    ports: Vec<Vec<Option<LinkId>>>,
    links: BTreeMap<LinkId, Link>,
    next_link: u64,
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Link {
    /// The far end of this link as seen from `node`.
    pub fn peer_of(&self, node: EntityId) -> Option<Endpoint> {
        match self.ends {
            [a, b] if a.node == node => Some(b),
            [a, b] if b.node == node => Some(a),
            _ => None,
        }
    }

    pub fn end_of(&self, node: EntityId) -> Option<Endpoint> {
        self.ends.iter().copied().find(|end| end.node == node)
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) -> Result<EntityId, TopologyError> {
        if self.index.contains_key(name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }
        let id = EntityId(self.names.len());
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.ports.push(Vec::new());
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Result<EntityId, TopologyError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))
    }

    pub fn name(&self, id: EntityId) -> &str {
        &self.names[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    fn check(&self, id: EntityId) -> Result<(), TopologyError> {
        if id.0 < self.names.len() {
            Ok(())
        } else {
            Err(TopologyError::UnknownNode(id.to_string()))
        }
    }

    pub fn link_between(&self, a: EntityId, b: EntityId) -> Option<&Link> {
        self.links
            .values()
            .find(|link| link.peer_of(a).is_some_and(|end| end.node == b))
    }

    /// Connect `a` and `b`, allocating one port on each side.
    pub fn link(&mut self, a: EntityId, b: EntityId, latency: Cost) -> Result<Link, TopologyError> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Err(TopologyError::SelfLink(self.name(a).to_string()));
        }
        if self.link_between(a, b).is_some() {
            return Err(TopologyError::AlreadyLinked(
                self.name(a).to_string(),
                self.name(b).to_string(),
            ));
        }

        let id = LinkId(self.next_link);
        self.next_link += 1;
        let ends = [
            Endpoint {
                node: a,
                port: self.allocate_port(a, id),
            },
            Endpoint {
                node: b,
                port: self.allocate_port(b, id),
            },
        ];
        let link = Link { id, ends, latency };
        self.links.insert(id, link.clone());
        Ok(link)
    }

    /// Remove the link between `a` and `b`, freeing its ports.
    pub fn unlink(&mut self, a: EntityId, b: EntityId) -> Result<Link, TopologyError> {
        self.check(a)?;
        self.check(b)?;
        let id = self
            .link_between(a, b)
            .map(|link| link.id)
            .ok_or_else(|| {
                TopologyError::NotLinked(self.name(a).to_string(), self.name(b).to_string())
            })?;
        let link = self
            .links
            .remove(&id)
            .ok_or_else(|| TopologyError::NotLinked(self.name(a).to_string(), self.name(b).to_string()))?;
        for end in link.ends {
            self.ports[end.node.0][end.port] = None;
        }
        Ok(link)
    }

    fn allocate_port(&mut self, node: EntityId, link: LinkId) -> Port {
        let slots = &mut self.ports[node.0];
        match slots.iter().position(Option::is_none) {
            Some(port) => {
                slots[port] = Some(link);
                port
            }
            None => {
                slots.push(Some(link));
                slots.len() - 1
            }
        }
    }

    pub fn link_on(&self, node: EntityId, port: Port) -> Option<&Link> {
        let id = self.ports.get(node.0)?.get(port).copied().flatten()?;
        self.links.get(&id)
    }

    /// Ports of `node` that currently have a link.
    pub fn ports(&self, node: EntityId) -> Vec<Port> {
        self.ports
            .get(node.0)
            .map(|slots| {
                slots
                    .iter()
                    .enumerate()
                    .filter_map(|(port, slot)| slot.map(|_| port))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> (Topology, EntityId, EntityId, EntityId) {
        let mut topo = Topology::new();
        let a = topo.add_node("a").unwrap();
        let b = topo.add_node("b").unwrap();
        let c = topo.add_node("c").unwrap();
        (topo, a, b, c)
    }

    #[test]
    fn ports_are_allocated_lowest_first() {
        let (mut topo, a, b, c) = three();
        let ab = topo.link(a, b, 1).unwrap();
        let ac = topo.link(a, c, 2).unwrap();
        assert_eq!(ab.end_of(a).unwrap().port, 0);
        assert_eq!(ac.end_of(a).unwrap().port, 1);
        assert_eq!(ac.end_of(c).unwrap().port, 0);

        topo.unlink(b, a).unwrap();
        assert_eq!(topo.ports(a), vec![1]);
        let ab = topo.link(a, b, 1).unwrap();
        assert_eq!(ab.end_of(a).unwrap().port, 0);
    }

    #[test]
    fn peer_lookup() {
        let (mut topo, a, b, _) = three();
        topo.link(a, b, 3).unwrap();
        let link = topo.link_on(b, 0).unwrap();
        assert_eq!(link.peer_of(b), Some(Endpoint { node: a, port: 0 }));
        assert_eq!(link.latency, 3);
        assert!(topo.link_on(b, 1).is_none());
    }

    #[test]
    fn misuse_is_reported() {
        let (mut topo, a, b, c) = three();
        topo.link(a, b, 1).unwrap();
        assert!(matches!(topo.link(b, a, 1), Err(TopologyError::AlreadyLinked(..))));
        assert!(matches!(topo.unlink(a, c), Err(TopologyError::NotLinked(..))));
        assert!(matches!(topo.link(a, a, 1), Err(TopologyError::SelfLink(_))));
        assert!(matches!(topo.add_node("a"), Err(TopologyError::DuplicateNode(_))));
        assert!(matches!(topo.lookup("z"), Err(TopologyError::UnknownNode(_))));
    }
}
