//! Built-in port exposure checks as data.
//!
//! Each entry names a check, the resources it covers and the reachability
//! predicate that flags them. `PortExposureTester` evaluates the entries of
//! its scope; adding a check is adding a row.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::matcher::Predicate;
use crate::model::{Direction, PortSpec, ResourceKind};

/// Which resources a check produces verdicts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Instances, through the security groups attached to them.
    Instance,
    SecurityGroup,
}

impl Scope {
    pub fn kind(self) -> ResourceKind {
        match self {
            Self::Instance => ResourceKind::Instance,
            Self::SecurityGroup => ResourceKind::SecurityGroup,
        }
    }

    pub fn item_type(self) -> &'static str {
        match self {
            Self::Instance => "ec2_instance",
            Self::SecurityGroup => "ec2_security_group",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance => write!(f, "instance"),
            Self::SecurityGroup => write!(f, "security_group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub name: String,
    pub description: String,
    pub scope: Scope,
    pub predicate: Predicate,
}

impl CheckSpec {
    fn new(name: &str, description: &str, scope: Scope, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            scope,
            predicate,
        }
    }

    pub fn item_type(&self) -> &'static str {
        self.scope.item_type()
    }
}

static CATALOG: Lazy<Vec<CheckSpec>> = Lazy::new(build);

/// Every built-in port exposure check.
pub fn catalog() -> &'static [CheckSpec] {
    &CATALOG
}

/// Checks evaluated for one scope.
pub fn for_scope(scope: Scope) -> Vec<&'static CheckSpec> {
    catalog().iter().filter(|c| c.scope == scope).collect()
}

pub fn find(name: &str) -> Option<&'static CheckSpec> {
    catalog().iter().find(|c| c.name == name)
}

fn build() -> Vec<CheckSpec> {
    let instance = |service: &str, label: &str, specs: Vec<PortSpec>| {
        CheckSpec::new(
            &format!("ec2_inbound_{service}_access_restricted"),
            &format!("Instance accepts inbound {label} traffic"),
            Scope::Instance,
            Predicate::inbound(specs),
        )
    };
    let open = |service: &str, label: &str, specs: Vec<PortSpec>| {
        CheckSpec::new(
            &format!("ec2_security_group_{service}_ingress_from_anywhere"),
            &format!("Security group allows {label} from 0.0.0.0/0 or ::/0"),
            Scope::SecurityGroup,
            Predicate::inbound(specs).from_anywhere(),
        )
    };

    vec![
        instance("http", "HTTP (80/tcp)", vec![PortSpec::tcp(&[80])]),
        instance("https", "HTTPS (443/tcp)", vec![PortSpec::tcp(&[443])]),
        instance("mongodb", "MongoDB (27017/tcp)", vec![PortSpec::tcp(&[27017])]),
        instance("mysql", "MySQL (3306/tcp)", vec![PortSpec::tcp(&[3306])]),
        instance("mssql", "MSSQL (1433/tcp)", vec![PortSpec::tcp(&[1433])]),
        instance("ssh", "SSH (22/tcp)", vec![PortSpec::tcp(&[22])]),
        instance("rdp", "RDP (3389/tcp)", vec![PortSpec::tcp(&[3389])]),
        instance("postgresql", "PostgreSQL (5432/tcp)", vec![PortSpec::tcp(&[5432])]),
        instance("tcp_netbios", "NetBIOS (137,139/tcp)", vec![PortSpec::tcp(&[137, 139])]),
        instance(
            "dns",
            "DNS (53/tcp, 53/udp)",
            vec![PortSpec::tcp(&[53]), PortSpec::udp(&[53])],
        ),
        instance("elasticsearch", "Elasticsearch (9200/tcp)", vec![PortSpec::tcp(&[9200])]),
        instance("smtp", "SMTP (25,587,2525/tcp)", vec![PortSpec::tcp(&[25, 587, 2525])]),
        instance("telnet", "Telnet (23/tcp)", vec![PortSpec::tcp(&[23])]),
        instance("rpc", "RPC (135/tcp)", vec![PortSpec::tcp(&[135])]),
        instance("ftp", "FTP (20,21/tcp)", vec![PortSpec::tcp(&[20, 21])]),
        instance("udp", "NetBIOS (137,138/udp)", vec![PortSpec::udp(&[137, 138])]),
        instance("cifs", "CIFS (445/tcp)", vec![PortSpec::tcp(&[445])]),
        instance("oracle", "Oracle (1521,2483,2484/tcp)", vec![PortSpec::tcp(&[1521, 2483, 2484])]),
        open("ssh", "SSH (22/tcp)", vec![PortSpec::tcp(&[22])]),
        open("rdp", "RDP (3389/tcp)", vec![PortSpec::tcp(&[3389])]),
        open("mysql", "MySQL (3306/tcp)", vec![PortSpec::tcp(&[3306])]),
        open("postgresql", "PostgreSQL (5432/tcp)", vec![PortSpec::tcp(&[5432])]),
        open("mssql", "MSSQL (1433/tcp)", vec![PortSpec::tcp(&[1433])]),
        open("mongodb", "MongoDB (27017/tcp)", vec![PortSpec::tcp(&[27017])]),
        open("elasticsearch", "Elasticsearch (9200/tcp)", vec![PortSpec::tcp(&[9200])]),
        open("oracle", "Oracle (1521,2483,2484/tcp)", vec![PortSpec::tcp(&[1521, 2483, 2484])]),
        CheckSpec::new(
            "ec2_security_group_all_traffic_ingress_from_anywhere",
            "Security group allows every protocol and port from anywhere",
            Scope::SecurityGroup,
            Predicate::any_traffic(Direction::Inbound).from_anywhere(),
        ),
        CheckSpec::new(
            "ec2_outbound_access_to_all_ports_restricted",
            "Security group allows outbound traffic on every protocol and port",
            Scope::SecurityGroup,
            Predicate::any_traffic(Direction::Outbound),
        ),
    ]
}
