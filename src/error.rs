use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node name already in use: {0}")]
    DuplicateNode(String),

    #[error("{0} and {1} are already linked")]
    AlreadyLinked(String, String),

    #[error("{0} and {1} are not linked")]
    NotLinked(String, String),

    #[error("cannot link {0} to itself")]
    SelfLink(String),

    #[error("{0} is not a host")]
    NotAHost(String),
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("action at t={at} is negative or not a number")]
    BadTime { at: f64 },

    #[error("router {router}: {field} must be {expected}, got {value}")]
    BadTiming {
        router: String,
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}
