//! Port/protocol reachability predicate.
//!
//! A rule reaches a target port when its protocol is the wildcard, or when
//! the protocol is equal and its port range contains the target. Several
//! port specs are a union. A scoped predicate also requires the rule to be
//! open to the required peer networks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Cidr, Direction, PortSpec, Rule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub direction: Direction,
    pub reach: Reach,
    /// Required peer scope: a rule counts only when one of its CIDRs covers
    /// one of these networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<Cidr>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reach {
    /// Reachable on any port of any of the specs.
    Ports(Vec<PortSpec>),
    /// Only wildcard-protocol rules count.
    AnyTraffic,
}

impl Predicate {
    pub fn inbound(specs: Vec<PortSpec>) -> Self {
        Self {
            direction: Direction::Inbound,
            reach: Reach::Ports(specs),
            scope: None,
        }
    }

    pub fn any_traffic(direction: Direction) -> Self {
        Self {
            direction,
            reach: Reach::AnyTraffic,
            scope: None,
        }
    }

    /// Restrict to rules open to the whole internet (`0.0.0.0/0`, `::/0`).
    pub fn from_anywhere(mut self) -> Self {
        self.scope = Some(vec![Cidr::ANY_V4, Cidr::ANY_V6]);
        self
    }

    /// Whether a single rule satisfies the predicate.
    pub fn matches(&self, rule: &Rule) -> bool {
        rule.direction == self.direction && self.reaches(rule) && self.in_scope(rule)
    }

    fn reaches(&self, rule: &Rule) -> bool {
        if rule.is_wildcard() {
            return true;
        }
        match &self.reach {
            Reach::AnyTraffic => false,
            Reach::Ports(specs) => {
                let Some((from, to)) = rule.port_range() else {
                    return false;
                };
                specs.iter().any(|spec| {
                    spec.protocol == rule.protocol
                        && spec.targets.iter().any(|t| t.reached_by(from, to))
                })
            }
        }
    }

    fn in_scope(&self, rule: &Rule) -> bool {
        let Some(required) = &self.scope else {
            return true;
        };
        if rule.is_wildcard() && rule.has_implicit_scope() {
            return true;
        }
        rule.cidrs
            .iter()
            .any(|cidr| required.iter().any(|needed| cidr.covers(needed)))
    }
}

/// Deduplicated ids of the resources owning at least one matching rule.
pub fn matching_owners(predicate: &Predicate, rules: &[Rule]) -> BTreeSet<String> {
    rules
        .iter()
        .filter(|rule| predicate.matches(rule))
        .map(|rule| rule.owner_id.clone())
        .collect()
}
