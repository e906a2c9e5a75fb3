use serde::{Deserialize, Serialize};

use super::Protocol;

/// One or more target ports under a single protocol.
///
/// Several targets are a union: the spec is reachable when any of them is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub targets: Vec<PortTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortTarget {
    Single(u16),
    /// Closed range `[from, to]`.
    Range(u16, u16),
}

impl PortTarget {
    /// Whether a rule spanning `[from, to]` reaches this target.
    pub fn reached_by(self, from: u16, to: u16) -> bool {
        match self {
            Self::Single(port) => from <= port && to >= port,
            Self::Range(lo, hi) => from <= hi && to >= lo,
        }
    }
}

impl std::fmt::Display for PortTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(port) => write!(f, "{port}"),
            Self::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

impl PortSpec {
    pub fn new(protocol: Protocol, targets: Vec<PortTarget>) -> Self {
        Self { protocol, targets }
    }

    pub fn tcp(ports: &[u16]) -> Self {
        Self::new(
            Protocol::Tcp,
            ports.iter().copied().map(PortTarget::Single).collect(),
        )
    }

    pub fn udp(ports: &[u16]) -> Self {
        Self::new(
            Protocol::Udp,
            ports.iter().copied().map(PortTarget::Single).collect(),
        )
    }
}

impl std::fmt::Display for PortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        write!(f, "{}/{}", self.protocol, targets.join(","))
    }
}
