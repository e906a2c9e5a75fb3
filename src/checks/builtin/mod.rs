mod default_security_group;
mod port_exposure;

use std::sync::Arc;

use serde::Serialize;

pub use default_security_group::DefaultSecurityGroupTester;
pub use port_exposure::PortExposureTester;

use super::{catalog, Scope, Tester};
use crate::collector::Collector;

/// Returns all built-in testers, sharing one collector.
pub fn all_testers(collector: Arc<dyn Collector>) -> Vec<Box<dyn Tester>> {
    vec![
        Box::new(PortExposureTester::new(collector.clone(), Scope::Instance)),
        Box::new(PortExposureTester::new(collector.clone(), Scope::SecurityGroup)),
        Box::new(DefaultSecurityGroupTester::new(collector)),
    ]
}

/// Metadata about a built-in check, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInfo {
    pub name: String,
    pub service: &'static str,
    pub item_type: &'static str,
    pub description: String,
}

/// List every built-in check.
pub fn list_checks() -> Vec<CheckInfo> {
    let mut checks: Vec<CheckInfo> = catalog::catalog()
        .iter()
        .map(|c| CheckInfo {
            name: c.name.clone(),
            service: "ec2",
            item_type: c.item_type(),
            description: c.description.clone(),
        })
        .collect();
    checks.push(CheckInfo {
        name: default_security_group::TEST_NAME.into(),
        service: "vpc",
        item_type: default_security_group::ITEM_TYPE,
        description: "Default security group of a VPC allows traffic".into(),
    });
    checks
}
