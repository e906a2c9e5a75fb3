//! Provider rule shapes and their conversion into canonical `Rule`s.
//!
//! Security group APIs return permissions detached from their group, so the
//! owner id and direction are attached here. Anything that cannot be read
//! unambiguously becomes a `NormalizeError`; nothing is defaulted.

use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;
use crate::model::{Cidr, Direction, Protocol, Resource, ResourceKind, Rule};

/// An EC2-style `IpPermission` as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderRule {
    #[serde(default)]
    pub ip_protocol: Option<String>,
    #[serde(default)]
    pub from_port: Option<i64>,
    #[serde(default)]
    pub to_port: Option<i64>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
    #[serde(default)]
    pub ipv6_ranges: Vec<Ipv6Range>,
    #[serde(default)]
    pub user_id_group_pairs: Vec<GroupPair>,
    #[serde(default)]
    pub prefix_list_ids: Vec<PrefixListRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    #[serde(default)]
    pub cidr_ip: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipv6Range {
    #[serde(default)]
    pub cidr_ipv6: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupPair {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrefixListRef {
    #[serde(default)]
    pub prefix_list_id: Option<String>,
}

/// Result of normalizing every rule of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub rules: Vec<Rule>,
    pub malformed: Vec<NormalizeError>,
}

/// Normalize a single provider rule owned by `owner_id`.
pub fn normalize_rule(
    owner_id: &str,
    direction: Direction,
    raw: &ProviderRule,
) -> Result<Rule, NormalizeError> {
    let malformed = |reason: String| NormalizeError {
        owner_id: owner_id.to_string(),
        reason,
    };

    let protocol = match raw.ip_protocol.as_deref() {
        None if raw.from_port.is_none() && raw.to_port.is_none() => {
            return Err(malformed("missing protocol and port information".into()));
        }
        None => return Err(malformed("missing protocol".into())),
        Some(token) => Protocol::from_token(token)
            .ok_or_else(|| malformed(format!("unknown protocol '{token}'")))?,
    };

    let (from_port, to_port) = if protocol.has_ports() {
        let (from, to) = match (raw.from_port, raw.to_port) {
            (Some(from), Some(to)) => (port(from), port(to)),
            _ => return Err(malformed(format!("{protocol} rule without port bounds"))),
        };
        match (from, to) {
            (Some(from), Some(to)) if from <= to => (Some(from), Some(to)),
            (Some(from), Some(to)) => {
                return Err(malformed(format!("inverted port range {from}-{to}")));
            }
            _ => {
                return Err(malformed(format!(
                    "port out of range: {:?}-{:?}",
                    raw.from_port, raw.to_port
                )));
            }
        }
    } else {
        // Wildcard carries no bounds; ICMP type/code are not ports.
        (None, None)
    };

    let mut cidrs = Vec::with_capacity(raw.ip_ranges.len() + raw.ipv6_ranges.len());
    let v4 = raw.ip_ranges.iter().map(|r| r.cidr_ip.as_deref());
    let v6 = raw.ipv6_ranges.iter().map(|r| r.cidr_ipv6.as_deref());
    for entry in v4.chain(v6) {
        let text = entry.ok_or_else(|| malformed("address range without CIDR".into()))?;
        cidrs.push(text.parse::<Cidr>().map_err(malformed)?);
    }

    let mut peer_groups = Vec::new();
    for pair in &raw.user_id_group_pairs {
        let id = pair
            .group_id
            .clone()
            .ok_or_else(|| malformed("group reference without GroupId".into()))?;
        peer_groups.push(id);
    }
    for prefix_list in &raw.prefix_list_ids {
        let id = prefix_list
            .prefix_list_id
            .clone()
            .ok_or_else(|| malformed("prefix list reference without id".into()))?;
        peer_groups.push(id);
    }

    Ok(Rule {
        owner_id: owner_id.to_string(),
        direction,
        protocol,
        from_port,
        to_port,
        cidrs,
        peer_groups,
    })
}

fn port(value: i64) -> Option<u16> {
    u16::try_from(value).ok()
}

/// Normalize every rule of one resource, keeping malformed ones aside so the
/// caller can fail the owning resource closed.
pub fn normalize_rules(owner_id: &str, direction: Direction, raw: &[ProviderRule]) -> Normalized {
    let mut out = Normalized::default();
    for rule in raw {
        match normalize_rule(owner_id, direction, rule) {
            Ok(rule) => out.rules.push(rule),
            Err(err) => {
                tracing::warn!(owner = %owner_id, %direction, error = %err, "malformed rule");
                out.malformed.push(err);
            }
        }
    }
    out
}

/// Check that a resource record carries the fields its kind depends on.
///
/// Instances need `security_groups` (possibly empty) and security groups
/// need `vpc_id`. A record failing this is reported as malformed.
pub fn validate_resource(resource: &Resource) -> Result<(), NormalizeError> {
    let missing = match resource.kind {
        ResourceKind::Instance if resource.security_groups.is_none() => Some("security_groups"),
        ResourceKind::SecurityGroup if resource.vpc_id.is_none() => Some("vpc_id"),
        _ => None,
    };
    match missing {
        Some(field) => Err(NormalizeError {
            owner_id: resource.id.clone(),
            reason: format!("{} record without {field}", resource.kind),
        }),
        None => Ok(()),
    }
}
