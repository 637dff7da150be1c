pub mod config;
pub mod entity;
pub mod error;
pub mod live;
pub mod network;
pub mod protocol;
pub mod report;
pub mod router;
pub mod simulator;

pub use config::RouterConfig;
pub use entity::{Entity, Host, Hub};
pub use error::{ScenarioError, TopologyError};
pub use network::Transport;
pub use protocol::{Packet, RouteEntry, RoutingTable};
pub use router::DvRouter;
pub use simulator::{EntityId, Simulator};

/// Name of a router, host or hub.
pub type NodeId = String;

/// Local identifier of one attached link.
pub type Port = usize;

/// Path cost, in the same units as link latency.
pub type Cost = u32;

/// Clock reading in seconds.
pub type Timestamp = f64;

/// Costs at or above this value are unreachable.
pub const INFINITY: Cost = 16;

/// Cost written into poisoned entries and sent in poison-reverse advertisements.
pub const POISONED: Cost = INFINITY + 1;
