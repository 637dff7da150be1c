use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ScenarioError, TopologyError};
use crate::{Cost, NodeId, RouterConfig, Timestamp};

/// A topology plus a timeline of things to do to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Router settings applied unless a router overrides them.
    #[serde(default)]
    pub defaults: RouterConfig,
    #[serde(default)]
    pub routers: Vec<RouterSpec>,
    #[serde(default)]
    pub hosts: Vec<NodeId>,
    #[serde(default)]
    pub hubs: Vec<NodeId>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub actions: Vec<ScheduledAction>,
    #[serde(default = "default_duration")]
    pub duration: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poison_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_timeout: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_interval: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: NodeId,
    pub b: NodeId,
    #[serde(default = "default_latency")]
    pub latency: Cost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub at: Timestamp,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Ping { src: NodeId, dst: NodeId },
    Link {
        a: NodeId,
        b: NodeId,
        #[serde(default = "default_latency")]
        latency: Cost,
    },
    Unlink { a: NodeId, b: NodeId },
}

fn default_duration() -> Timestamp {
    60.0
}

fn default_latency() -> Cost {
    1
}

impl RouterSpec {
    pub fn new(name: impl Into<NodeId>) -> Self {
        Self {
            name: name.into(),
            poison_mode: None,
            route_timeout: None,
            timer_interval: None,
        }
    }

    pub fn config(&self, defaults: &RouterConfig) -> RouterConfig {
        RouterConfig {
            poison_mode: self.poison_mode.unwrap_or(defaults.poison_mode),
            route_timeout: self.route_timeout.unwrap_or(defaults.route_timeout),
            timer_interval: self.timer_interval.unwrap_or(defaults.timer_interval),
        }
    }
}

impl LinkSpec {
    pub fn new(a: impl Into<NodeId>, b: impl Into<NodeId>, latency: Cost) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            latency,
        }
    }
}

impl ScheduledAction {
    pub fn ping(at: Timestamp, src: impl Into<NodeId>, dst: impl Into<NodeId>) -> Self {
        Self {
            at,
            action: Action::Ping {
                src: src.into(),
                dst: dst.into(),
            },
        }
    }

    pub fn unlink(at: Timestamp, a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        Self {
            at,
            action: Action::Unlink {
                a: a.into(),
                b: b.into(),
            },
        }
    }
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Router configuration for every router, in declaration order.
    pub fn router_configs(&self) -> impl Iterator<Item = (&str, RouterConfig)> {
        self.routers
            .iter()
            .map(|spec| (spec.name.as_str(), spec.config(&self.defaults)))
    }

    /// Force poison mode on for every router.
    pub fn force_poison(&mut self) {
        self.defaults.poison_mode = true;
        for router in &mut self.routers {
            router.poison_mode = Some(true);
        }
    }

    /// Actions sorted by time; equal times keep file order.
    pub fn timeline(&self) -> Vec<&ScheduledAction> {
        let mut actions: Vec<_> = self.actions.iter().collect();
        actions.sort_by(|a, b| a.at.total_cmp(&b.at));
        actions
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut names = HashSet::new();
        let all = self
            .routers
            .iter()
            .map(|r| &r.name)
            .chain(&self.hosts)
            .chain(&self.hubs);
        for name in all {
            if !names.insert(name.as_str()) {
                return Err(TopologyError::DuplicateNode(name.clone()).into());
            }
        }

        let known = |name: &NodeId| -> Result<(), ScenarioError> {
            if names.contains(name.as_str()) {
                Ok(())
            } else {
                Err(TopologyError::UnknownNode(name.clone()).into())
            }
        };

        for (name, config) in self.router_configs() {
            let interval = config.timer_interval;
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ScenarioError::BadTiming {
                    router: name.to_string(),
                    field: "timer_interval",
                    expected: "finite and positive",
                    value: interval,
                });
            }
            let timeout = config.route_timeout;
            if !(timeout.is_finite() && timeout >= 0.0) {
                return Err(ScenarioError::BadTiming {
                    router: name.to_string(),
                    field: "route_timeout",
                    expected: "finite and non-negative",
                    value: timeout,
                });
            }
        }

        for link in &self.links {
            known(&link.a)?;
            known(&link.b)?;
        }

        for scheduled in &self.actions {
            if !scheduled.at.is_finite() || scheduled.at < 0.0 {
                return Err(ScenarioError::BadTime { at: scheduled.at });
            }
            match &scheduled.action {
                Action::Ping { src, dst } => {
                    known(src)?;
                    known(dst)?;
                    if !self.hosts.contains(src) {
                        return Err(TopologyError::NotAHost(src.clone()).into());
                    }
                }
                Action::Link { a, b, .. } | Action::Unlink { a, b } => {
                    known(a)?;
                    known(b)?;
                }
            }
        }
        Ok(())
    }

    /// H1 - R1 - C1 - R2 - R3 - H2 with a shortcut R1 - R3 that is cut at
    /// t=30, showing poison reverse steering traffic through C1.
    pub fn sample() -> Self {
        Scenario {
            defaults: RouterConfig::poisoning(),
            routers: ["r1", "r2", "r3"].into_iter().map(RouterSpec::new).collect(),
            hosts: vec!["h1".into(), "h2".into()],
            hubs: vec!["c1".into()],
            links: vec![
                LinkSpec::new("r1", "h1", 1),
                LinkSpec::new("r1", "c1", 1),
                LinkSpec::new("c1", "r2", 0),
                LinkSpec::new("r2", "r3", 1),
                LinkSpec::new("r1", "r3", 1),
                LinkSpec::new("r3", "h2", 1),
            ],
            actions: vec![
                ScheduledAction::ping(20.0, "h1", "h2"),
                ScheduledAction::unlink(30.0, "r1", "r3"),
                ScheduledAction::ping(36.0, "h1", "h2"),
            ],
            duration: 60.0,
        }
    }
}
