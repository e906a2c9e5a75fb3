//! Coverage completion: every resource in a check's universe gets exactly
//! one verdict, matched or not.

use std::collections::BTreeSet;

use super::finding::{Finding, Invocation, TestResult};

/// Verdict partition of a universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage {
    /// Nothing was in scope. Reported as one sentinel finding.
    Empty,
    Partitioned {
        flagged: BTreeSet<String>,
        clean: BTreeSet<String>,
    },
}

/// Split `universe` into flagged (`∈ matched`) and clean ids.
///
/// Duplicate universe ids collapse; matched ids outside the universe are
/// dropped.
pub fn complete<I>(universe: I, matched: &BTreeSet<String>) -> Coverage
where
    I: IntoIterator<Item = String>,
{
    let universe: BTreeSet<String> = universe.into_iter().collect();
    if universe.is_empty() {
        return Coverage::Empty;
    }

    let stray = matched.iter().filter(|id| !universe.contains(*id)).count();
    if stray > 0 {
        tracing::debug!(stray, "matched ids outside the check universe ignored");
    }

    let (flagged, clean) = universe.into_iter().partition(|id| matched.contains(id));
    Coverage::Partitioned { flagged, clean }
}

impl Coverage {
    pub fn into_findings(
        self,
        invocation: &Invocation,
        test_name: &str,
        item_type: &str,
    ) -> Vec<Finding> {
        match self {
            Self::Empty => vec![invocation.sentinel(test_name, item_type)],
            Self::Partitioned { flagged, clean } => {
                let flagged = flagged.into_iter().map(|id| (id, TestResult::IssueFound));
                let clean = clean.into_iter().map(|id| (id, TestResult::NoIssueFound));
                flagged
                    .chain(clean)
                    .map(|(id, result)| invocation.finding(test_name, item_type, Some(&id), result))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Actor;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn ids(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn invocation() -> Invocation {
        Invocation::new(Actor::default(), Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn partitions_universe() {
        let cov = complete(ids(&["sg-1", "sg-2", "sg-3"]), &ids(&["sg-1"]));
        assert_eq!(
            cov,
            Coverage::Partitioned {
                flagged: ids(&["sg-1"]),
                clean: ids(&["sg-2", "sg-3"]),
            }
        );
    }

    #[test]
    fn empty_universe_is_explicit() {
        let cov = complete(Vec::<String>::new(), &ids(&["sg-1"]));
        assert_eq!(cov, Coverage::Empty);
        let findings = cov.into_findings(&invocation(), "t", "ec2_instance");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].item, None);
        assert_eq!(findings[0].test_result, TestResult::NoIssueFound);
    }

    #[test]
    fn duplicates_and_strays_do_not_leak() {
        let universe = vec!["i-1".to_string(), "i-1".to_string(), "i-2".to_string()];
        let cov = complete(universe, &ids(&["i-1", "i-9"]));
        let findings = cov.into_findings(&invocation(), "t", "ec2_instance");
        let items: Vec<_> = findings.iter().map(|f| f.item.as_deref().unwrap()).collect();
        assert_eq!(items, vec!["i-1", "i-2"]);
    }

    proptest! {
        #[test]
        fn every_resource_gets_exactly_one_verdict(
            universe in proptest::collection::btree_set("[a-z]{1,4}", 1..40),
            picks in proptest::collection::vec(any::<bool>(), 40),
            strays in proptest::collection::btree_set("[0-9]{1,3}", 0..5),
        ) {
            let matched: BTreeSet<String> = universe
                .iter()
                .zip(picks.iter())
                .filter(|(_, pick)| **pick)
                .map(|(id, _)| id.clone())
                .chain(strays)
                .collect();

            let findings = complete(universe.clone(), &matched)
                .into_findings(&invocation(), "t", "x");

            prop_assert_eq!(findings.len(), universe.len());
            let seen: BTreeSet<String> = findings.iter().filter_map(|f| f.item.clone()).collect();
            prop_assert_eq!(&seen, &universe);
            for f in &findings {
                let id = f.item.as_ref().unwrap();
                prop_assert_eq!(f.test_result.is_issue(), matched.contains(id));
            }
        }
    }
}
