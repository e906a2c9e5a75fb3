//! Canonical resource and rule model.
//!
//! Collectors hand over provider-native shapes; the normalizer turns rules
//! into `Rule`. Matchers and testers only ever see these types, so provider
//! field names stop at the normalizer boundary.

pub mod cidr;
pub mod port_spec;

use serde::{Deserialize, Serialize};

pub use cidr::Cidr;
pub use port_spec::{PortSpec, PortTarget};

/// A resource in scope of a check. Immutable for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Provider-assigned identifier (`i-…`, `sg-…`, `vpc-…`).
    pub id: String,
    pub kind: ResourceKind,
    /// Display name; for security groups this is the group name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    /// Security groups attached to an instance. `None` when the provider
    /// record did not carry the field, which is not the same as no groups.
    #[serde(default)]
    pub security_groups: Option<Vec<String>>,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            vpc_id: None,
            security_groups: None,
        }
    }

    /// Attached security groups; empty when the field is absent.
    pub fn attached_groups(&self) -> &[String] {
        self.security_groups.as_deref().unwrap_or_default()
    }

    /// Whether this is the VPC's `default` security group.
    pub fn is_default_group(&self) -> bool {
        self.kind == ResourceKind::SecurityGroup && self.name.as_deref() == Some("default")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SecurityGroup,
    Instance,
    Vpc,
    NetworkAcl,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecurityGroup => write!(f, "security_group"),
            Self::Instance => write!(f, "instance"),
            Self::Vpc => write!(f, "vpc"),
            Self::NetworkAcl => write!(f, "network_acl"),
        }
    }
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// IP protocol of a rule or port spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Wildcard: every protocol, every port.
    All,
    /// Any other IANA protocol number (ESP, GRE, ...). Carries no ports.
    Other(u8),
}

impl Protocol {
    /// Parse a provider protocol token: a name or an IANA number, with
    /// `-1` as the wildcard.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "-1" | "all" | "*" => Some(Self::All),
            "tcp" | "6" => Some(Self::Tcp),
            "udp" | "17" => Some(Self::Udp),
            "icmp" | "1" | "icmpv6" | "58" => Some(Self::Icmp),
            other => other.parse::<u8>().ok().map(Self::Other),
        }
    }

    /// Whether rules of this protocol are scoped by port numbers.
    pub fn has_ports(self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp => write!(f, "icmp"),
            Self::All => write!(f, "all"),
            Self::Other(n) => write!(f, "proto-{n}"),
        }
    }
}

/// A normalized firewall rule attached to its owning resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub owner_id: String,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Lower port bound. `None` only for protocols without ports.
    pub from_port: Option<u16>,
    pub to_port: Option<u16>,
    /// Peer address ranges (source for inbound, destination for outbound).
    pub cidrs: Vec<Cidr>,
    /// Security groups referenced as peers instead of a CIDR.
    #[serde(default)]
    pub peer_groups: Vec<String>,
}

impl Rule {
    pub fn is_wildcard(&self) -> bool {
        self.protocol == Protocol::All
    }

    /// A rule with no peer of any kind is implicitly unrestricted.
    pub fn has_implicit_scope(&self) -> bool {
        self.cidrs.is_empty() && self.peer_groups.is_empty()
    }

    /// Inclusive port range, when the rule is port-scoped.
    pub fn port_range(&self) -> Option<(u16, u16)> {
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_tokens() {
        assert_eq!(Protocol::from_token("-1"), Some(Protocol::All));
        assert_eq!(Protocol::from_token("TCP"), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_token("17"), Some(Protocol::Udp));
        assert_eq!(Protocol::from_token("icmpv6"), Some(Protocol::Icmp));
        assert_eq!(Protocol::from_token("50"), Some(Protocol::Other(50)));
        assert_eq!(Protocol::from_token("sctp"), None);
        assert_eq!(Protocol::from_token(""), None);
    }

    #[test]
    fn default_group_detection() {
        let mut sg = Resource::new("sg-1", ResourceKind::SecurityGroup);
        assert!(!sg.is_default_group());
        sg.name = Some("default".into());
        assert!(sg.is_default_group());

        let mut vpc = Resource::new("vpc-1", ResourceKind::Vpc);
        vpc.name = Some("default".into());
        assert!(!vpc.is_default_group());
    }
}
