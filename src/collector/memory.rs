use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Collector, Page};
use crate::checks::Actor;
use crate::error::{CollectError, PostureError, Result};
use crate::model::{Direction, Resource, ResourceKind};
use crate::normalize::ProviderRule;

/// Inventory snapshot: resources, their rules and the calling identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub identity: Actor,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Rules keyed by owning resource id.
    #[serde(default)]
    pub rules: HashMap<String, RuleSets>,
    /// Resource ids, or resource kinds, for which the provider answers
    /// "nothing configured".
    #[serde(default)]
    pub not_configured: HashSet<String>,
}

fn default_provider() -> String {
    "aws".into()
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            identity: Actor::default(),
            resources: Vec::new(),
            rules: HashMap::new(),
            not_configured: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSets {
    #[serde(default)]
    pub inbound: Vec<ProviderRule>,
    #[serde(default)]
    pub outbound: Vec<ProviderRule>,
}

/// Collector over an in-memory `Inventory`, with paging and injectable
/// transient faults.
#[derive(Debug)]
pub struct InMemoryCollector {
    inventory: Inventory,
    page_size: usize,
    /// Remaining transient failures per call target: a resource id for
    /// `list_rules`, a resource kind for `list_resources`, or
    /// `caller_identity`.
    faults: HashMap<String, AtomicU32>,
}

impl InMemoryCollector {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            page_size: 50,
            faults: HashMap::new(),
        }
    }

    /// Load an inventory snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let inventory: Inventory =
            serde_json::from_str(&content).map_err(|e| PostureError::Inventory {
                file: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(
            file = %path.display(),
            resources = inventory.resources.len(),
            "loaded inventory"
        );
        Ok(Self::new(inventory))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the next `times` calls against `target` fail as throttled.
    pub fn with_transient_faults(mut self, target: impl Into<String>, times: u32) -> Self {
        self.faults.insert(target.into(), AtomicU32::new(times));
        self
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    fn inject(&self, target: &str, operation: &str) -> std::result::Result<(), CollectError> {
        let Some(remaining) = self.faults.get(target) else {
            return Ok(());
        };
        let tripped = remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(CollectError::Transient {
                operation: operation.to_string(),
                message: format!("Throttling: rate exceeded for {target}"),
            })
        } else {
            Ok(())
        }
    }
}

impl Collector for InMemoryCollector {
    fn provider(&self) -> &str {
        &self.inventory.provider
    }

    fn caller_identity(&self, _timeout: Duration) -> std::result::Result<Actor, CollectError> {
        self.inject("caller_identity", "caller_identity")?;
        Ok(self.inventory.identity.clone())
    }

    fn list_resources(
        &self,
        kind: ResourceKind,
        page_token: Option<&str>,
        _timeout: Duration,
    ) -> std::result::Result<Page<Resource>, CollectError> {
        let target = kind.to_string();
        self.inject(&target, "list_resources")?;
        if self.inventory.not_configured.contains(&target) {
            return Err(CollectError::NotConfigured {
                resource: target,
                detail: "ValidationError: service not enabled in this region".into(),
            });
        }

        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| CollectError::Contract {
                operation: "list_resources".into(),
                message: format!("invalid page token '{token}'"),
            })?,
        };

        let matching: Vec<&Resource> = self
            .inventory
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .collect();
        let end = offset.saturating_add(self.page_size).min(matching.len());
        let items = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|r| (*r).clone())
            .collect();
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(Page { items, next_token })
    }

    fn list_rules(
        &self,
        resource_id: &str,
        direction: Direction,
        _timeout: Duration,
    ) -> std::result::Result<Vec<ProviderRule>, CollectError> {
        self.inject(resource_id, "list_rules")?;

        if self.inventory.not_configured.contains(resource_id) {
            return Err(CollectError::NotConfigured {
                resource: resource_id.to_string(),
                detail: "ValidationError: no rules configured".into(),
            });
        }
        let known = self.inventory.resources.iter().any(|r| r.id == resource_id);
        if !known {
            return Err(CollectError::Contract {
                operation: "list_rules".into(),
                message: format!("unknown resource '{resource_id}'"),
            });
        }

        let sets = self.inventory.rules.get(resource_id);
        Ok(match (sets, direction) {
            (Some(sets), Direction::Inbound) => sets.inbound.clone(),
            (Some(sets), Direction::Outbound) => sets.outbound.clone(),
            (None, _) => Vec::new(),
        })
    }
}
