//! Resource inventory collection.
//!
//! A `Collector` wraps one provider's API. Testers receive it injected at
//! construction and only go through the helpers here, which add paging,
//! retry with backoff and deadline checks on top of the raw calls.

pub mod memory;
pub mod retry;

use std::time::Duration;

use crate::checks::Actor;
use crate::error::{CheckError, CollectError};
use crate::model::{Direction, Resource, ResourceKind};
use crate::normalize::ProviderRule;

pub use memory::{Inventory, InMemoryCollector};
pub use retry::{Deadline, Fetched, RetryPolicy};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Read-only access to one provider account.
///
/// Implementations must be safe to share between testers running in
/// parallel. Every call receives the timeout it has to honor.
pub trait Collector: Send + Sync {
    /// Provider name, e.g. `aws`.
    fn provider(&self) -> &str;

    /// Identity the calls are made as.
    fn caller_identity(&self, timeout: Duration) -> Result<Actor, CollectError>;

    /// One page of resources of `kind`, starting at `page_token`.
    fn list_resources(
        &self,
        kind: ResourceKind,
        page_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Page<Resource>, CollectError>;

    /// Rules of one resource in one direction, detached from their owner.
    fn list_rules(
        &self,
        resource_id: &str,
        direction: Direction,
        timeout: Duration,
    ) -> Result<Vec<ProviderRule>, CollectError>;
}

/// Identity of the caller; absent identity is an empty actor.
pub fn caller_identity(
    collector: &dyn Collector,
    retry: &RetryPolicy,
    deadline: &Deadline,
) -> Result<Actor, CheckError> {
    match retry.call(deadline, "caller_identity", |timeout| {
        collector.caller_identity(timeout)
    })? {
        Fetched::Found(actor) => Ok(actor),
        Fetched::NotConfigured(_) => Ok(Actor::default()),
    }
}

/// Walk every page of `kind`.
///
/// A "nothing configured" answer on the first page means there are no such
/// resources. The same answer on a later page, a resource of another kind,
/// or a page token that repeats is a contract violation of the collector.
pub fn list_all(
    collector: &dyn Collector,
    kind: ResourceKind,
    retry: &RetryPolicy,
    deadline: &Deadline,
) -> Result<Vec<Resource>, CheckError> {
    let operation = format!("list_resources({kind})");
    let mut resources = Vec::new();
    let mut token: Option<String> = None;
    let mut seen_tokens = std::collections::HashSet::new();

    loop {
        let page = match retry.call(deadline, &operation, |timeout| {
            collector.list_resources(kind, token.as_deref(), timeout)
        })? {
            Fetched::Found(page) => page,
            Fetched::NotConfigured(detail) if token.is_none() => {
                tracing::debug!(%kind, %detail, "no resources configured");
                break;
            }
            Fetched::NotConfigured(detail) => {
                return Err(CheckError::Contract(format!(
                    "{operation} answered 'not configured' after {} resource(s): {detail}",
                    resources.len()
                )));
            }
        };

        if let Some(other) = page.items.iter().find(|r| r.kind != kind) {
            return Err(CheckError::Contract(format!(
                "{operation} returned {} '{}'",
                other.kind, other.id
            )));
        }
        resources.extend(page.items);

        match page.next_token {
            Some(next) if !seen_tokens.insert(next.clone()) => {
                return Err(CheckError::Contract(format!(
                    "{operation} repeated page token '{next}'"
                )));
            }
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(resources)
}

/// Rules of one resource in one direction, unnormalized.
pub fn rules_of(
    collector: &dyn Collector,
    resource_id: &str,
    direction: Direction,
    retry: &RetryPolicy,
    deadline: &Deadline,
) -> Result<Fetched<Vec<ProviderRule>>, CheckError> {
    retry.call(deadline, "list_rules", |timeout| {
        collector.list_rules(resource_id, direction, timeout)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves one page of groups, then claims nothing is configured.
    struct TruncatedPager;

    impl Collector for TruncatedPager {
        fn provider(&self) -> &str {
            "aws"
        }

        fn caller_identity(&self, _timeout: Duration) -> Result<Actor, CollectError> {
            Ok(Actor::default())
        }

        fn list_resources(
            &self,
            kind: ResourceKind,
            page_token: Option<&str>,
            _timeout: Duration,
        ) -> Result<Page<Resource>, CollectError> {
            match page_token {
                None => {
                    let mut group = Resource::new("sg-1", kind);
                    group.vpc_id = Some("vpc-1".into());
                    Ok(Page {
                        items: vec![group],
                        next_token: Some("2".into()),
                    })
                }
                Some(_) => Err(CollectError::NotConfigured {
                    resource: kind.to_string(),
                    detail: "ValidationError".into(),
                }),
            }
        }

        fn list_rules(
            &self,
            _resource_id: &str,
            _direction: Direction,
            _timeout: Duration,
        ) -> Result<Vec<ProviderRule>, CollectError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn not_configured_after_first_page_is_a_contract_error() {
        let err = list_all(
            &TruncatedPager,
            ResourceKind::SecurityGroup,
            &RetryPolicy::no_retry(),
            &Deadline::none(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::Contract(ref msg) if msg.contains("after 1 resource")));
    }

    #[test]
    fn truncated_listing_fails_the_tester() {
        use crate::checks::builtin::PortExposureTester;
        use crate::checks::{RunContext, Scope, Tester};
        use std::sync::Arc;

        let tester = PortExposureTester::new(Arc::new(TruncatedPager), Scope::SecurityGroup);
        let ctx = RunContext::new(Deadline::none(), RetryPolicy::no_retry(), chrono::Utc::now());
        let err = tester.run(&ctx).unwrap_err();
        assert_eq!(err.kind(), "contract_violation");
    }
}
