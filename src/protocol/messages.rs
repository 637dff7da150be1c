use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cost, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// Distance vector entry: "I can reach `destination` at `cost`".
    Advertisement { destination: NodeId, cost: Cost },
    /// Sent by a host on every link that comes up.
    Discovery { sender: NodeId },
    Data(DataPacket),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPacket {
    pub id: Uuid,
    pub source: NodeId,
    pub destination: NodeId,
    pub payload: String,
}

impl Packet {
    pub fn advertisement(destination: impl Into<NodeId>, cost: Cost) -> Self {
        Packet::Advertisement {
            destination: destination.into(),
            cost,
        }
    }

    pub fn discovery(sender: impl Into<NodeId>) -> Self {
        Packet::Discovery {
            sender: sender.into(),
        }
    }

    pub fn ping(source: impl Into<NodeId>, destination: impl Into<NodeId>) -> Self {
        Packet::Data(DataPacket::new(source, destination, "ping"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Advertisement { .. } => "advertisement",
            Packet::Discovery { .. } => "discovery",
            Packet::Data(_) => "data",
        }
    }
}

impl DataPacket {
    pub fn new(
        source: impl Into<NodeId>,
        destination: impl Into<NodeId>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            destination: destination.into(),
            payload: payload.into(),
        }
    }
}
