//! Declarative endorsement policies.
//!
//! Policies are YAML documents naming principals and a rule over them:
//!
//! ```yaml
//! identities:
//!   - user1: {"role": {"name": "member", "mspId": "Org1MSP"}}
//!   - user2: {"role": {"name": "member", "mspId": "Org2MSP"}}
//! policy:
//!   1-of:
//!     - signed-by: "user1"
//!     - signed-by: "user2"
//! ```
//!
//! The document is parsed and validated up front so a malformed policy fails
//! deployment before any proposal leaves the process.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a policy document.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("cannot read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("policy is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("policy declares no identities")]
    NoIdentities,

    #[error("duplicate identity {0}")]
    DuplicateIdentity(String),

    #[error("unknown role {0}")]
    UnknownRole(String),

    #[error("signed-by references undeclared identity {0}")]
    UnknownIdentity(String),

    #[error("{n}-of rule has only {len} sub-rules")]
    InvalidThreshold { n: usize, len: usize },

    #[error("malformed rule: {0}")]
    MalformedRule(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Role a principal must hold within its MSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MspRole {
    Member,
    Admin,
    Peer,
    Client,
}

impl MspRole {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "member" => Ok(MspRole::Member),
            "admin" => Ok(MspRole::Admin),
            "peer" => Ok(MspRole::Peer),
            "client" => Ok(MspRole::Client),
            other => Err(PolicyError::UnknownRole(other.to_string())),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MspRole::Member => "member",
            MspRole::Admin => "admin",
            MspRole::Peer => "peer",
            MspRole::Client => "client",
        }
    }
}

/// An MSP ID and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub msp_id: String,
    pub role: MspRole,
}

impl Principal {
    /// Whether an endorsing peer from `msp_id` can sign for this principal.
    /// Endorsers are peers, which are members of their MSP.
    fn admits_endorser(&self, msp_id: &str) -> bool {
        self.msp_id == msp_id && matches!(self.role, MspRole::Member | MspRole::Peer)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}.{}'", self.msp_id, self.role.as_str())
    }
}

/// Rule tree over declared identities (by index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyRule {
    SignedBy(usize),
    NOutOf { n: usize, rules: Vec<PolicyRule> },
}

/// A validated endorsement policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementPolicy {
    identities: Vec<(String, Principal)>,
    rule: PolicyRule,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    identities: Vec<BTreeMap<String, RawIdentity>>,
    policy: Value,
}

#[derive(Deserialize)]
struct RawIdentity {
    role: RawRole,
}

#[derive(Deserialize)]
struct RawRole {
    name: String,
    #[serde(rename = "mspId")]
    msp_id: String,
}

impl EndorsementPolicy {
    pub fn from_yaml_str(doc: &str) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_str(doc)?;

        let mut identities: Vec<(String, Principal)> = Vec::new();
        for entry in raw.identities {
            for (name, ident) in entry {
                if identities.iter().any(|(n, _)| *n == name) {
                    return Err(PolicyError::DuplicateIdentity(name));
                }
                let principal = Principal {
                    msp_id: ident.role.msp_id,
                    role: MspRole::parse(&ident.role.name)?,
                };
                identities.push((name, principal));
            }
        }
        if identities.is_empty() {
            return Err(PolicyError::NoIdentities);
        }

        let rule = parse_rule(&raw.policy, &identities)?;
        Ok(Self { identities, rule })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let doc = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&doc)
    }

    /// `OR` of `member` principals for each MSP.
    pub fn any_member_of(msp_ids: &[&str]) -> Self {
        let identities = msp_ids
            .iter()
            .map(|msp| {
                (
                    msp.to_string(),
                    Principal {
                        msp_id: msp.to_string(),
                        role: MspRole::Member,
                    },
                )
            })
            .collect::<Vec<_>>();
        let rules = (0..identities.len()).map(PolicyRule::SignedBy).collect();
        Self {
            identities,
            rule: PolicyRule::NOutOf { n: 1, rules },
        }
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.identities.iter().map(|(_, p)| p)
    }

    pub fn rule(&self) -> &PolicyRule {
        &self.rule
    }

    /// Evaluate the rule against the MSP IDs of the endorsing peers.
    pub fn is_satisfied_by(&self, endorser_msp_ids: &[&str]) -> bool {
        self.eval(&self.rule, endorser_msp_ids)
    }

    fn eval(&self, rule: &PolicyRule, endorsers: &[&str]) -> bool {
        match rule {
            PolicyRule::SignedBy(idx) => {
                let principal = &self.identities[*idx].1;
                endorsers.iter().any(|msp| principal.admits_endorser(msp))
            }
            PolicyRule::NOutOf { n, rules } => {
                rules.iter().filter(|r| self.eval(r, endorsers)).count() >= *n
            }
        }
    }

    fn fmt_rule(&self, rule: &PolicyRule, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match rule {
            PolicyRule::SignedBy(idx) => write!(f, "{}", self.identities[*idx].1),
            PolicyRule::NOutOf { n, rules } => {
                if *n == 1 && rules.len() > 1 {
                    f.write_str("OR(")?;
                } else if *n == rules.len() {
                    f.write_str("AND(")?;
                } else {
                    write!(f, "OutOf({}, ", n)?;
                }
                for (i, r) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.fmt_rule(r, f)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for EndorsementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_rule(&self.rule, f)
    }
}

fn parse_rule(value: &Value, identities: &[(String, Principal)]) -> Result<PolicyRule> {
    let map = value
        .as_mapping()
        .ok_or_else(|| PolicyError::MalformedRule(format!("expected a mapping, got {:?}", value)))?;
    if map.len() != 1 {
        return Err(PolicyError::MalformedRule(format!(
            "rule must have exactly one key, found {}",
            map.len()
        )));
    }
    let (key, body) = map
        .iter()
        .next()
        .ok_or_else(|| PolicyError::MalformedRule("empty rule".into()))?;
    let key = key
        .as_str()
        .ok_or_else(|| PolicyError::MalformedRule("rule key must be a string".into()))?;

    if key == "signed-by" {
        let name = body
            .as_str()
            .ok_or_else(|| PolicyError::MalformedRule("signed-by expects a name".into()))?;
        let idx = identities
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| PolicyError::UnknownIdentity(name.to_string()))?;
        return Ok(PolicyRule::SignedBy(idx));
    }

    let n = key
        .strip_suffix("-of")
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| PolicyError::MalformedRule(format!("unknown rule {}", key)))?;
    let items = body
        .as_sequence()
        .ok_or_else(|| PolicyError::MalformedRule(format!("{} expects a list", key)))?;
    let rules = items
        .iter()
        .map(|item| parse_rule(item, identities))
        .collect::<Result<Vec<_>>>()?;
    if n == 0 || n > rules.len() {
        return Err(PolicyError::InvalidThreshold {
            n,
            len: rules.len(),
        });
    }
    Ok(PolicyRule::NOutOf { n, rules })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_OF_TWO: &str = r#"
identities:
  - user1: {"role": {"name": "member", "mspId": "Org1MSP"}}
  - user2: {"role": {"name": "member", "mspId": "Org2MSP"}}
policy:
  1-of:
    - signed-by: "user1"
    - signed-by: "user2"
"#;

    #[test]
    fn test_parse_one_of_two() {
        let policy = EndorsementPolicy::from_yaml_str(ONE_OF_TWO).unwrap();
        assert_eq!(
            policy.to_string(),
            "OR('Org1MSP.member', 'Org2MSP.member')"
        );
        assert_eq!(policy.principals().count(), 2);
    }

    #[test]
    fn test_satisfaction() {
        let policy = EndorsementPolicy::from_yaml_str(ONE_OF_TWO).unwrap();
        assert!(policy.is_satisfied_by(&["Org1MSP"]));
        assert!(policy.is_satisfied_by(&["Org2MSP"]));
        assert!(!policy.is_satisfied_by(&["Org3MSP"]));
        assert!(!policy.is_satisfied_by(&[]));
    }

    #[test]
    fn test_nested_and() {
        let doc = r#"
identities:
  - a: {"role": {"name": "member", "mspId": "Org1MSP"}}
  - b: {"role": {"name": "member", "mspId": "Org2MSP"}}
  - c: {"role": {"name": "admin", "mspId": "Org3MSP"}}
policy:
  2-of:
    - signed-by: "a"
    - 1-of:
        - signed-by: "b"
        - signed-by: "c"
"#;
        let policy = EndorsementPolicy::from_yaml_str(doc).unwrap();
        assert_eq!(
            policy.to_string(),
            "AND('Org1MSP.member', OR('Org2MSP.member', 'Org3MSP.admin'))"
        );
        assert!(policy.is_satisfied_by(&["Org1MSP", "Org2MSP"]));
        assert!(!policy.is_satisfied_by(&["Org1MSP"]));
        // admin principals are never satisfied by peer endorsements
        assert!(!policy.is_satisfied_by(&["Org1MSP", "Org3MSP"]));
    }

    #[test]
    fn test_undeclared_identity() {
        let doc = r#"
identities:
  - user1: {"role": {"name": "member", "mspId": "Org1MSP"}}
policy:
  signed-by: "user9"
"#;
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(doc),
            Err(PolicyError::UnknownIdentity(name)) if name == "user9"
        ));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let doc = r#"
identities:
  - user1: {"role": {"name": "member", "mspId": "Org1MSP"}}
policy:
  2-of:
    - signed-by: "user1"
"#;
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(doc),
            Err(PolicyError::InvalidThreshold { n: 2, len: 1 })
        ));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(EndorsementPolicy::from_yaml_str("identities: [").is_err());
        assert!(matches!(
            EndorsementPolicy::from_yaml_str("identities: []\npolicy:\n  signed-by: x\n"),
            Err(PolicyError::NoIdentities)
        ));
        let bad_role = r#"
identities:
  - u: {"role": {"name": "wizard", "mspId": "Org1MSP"}}
policy:
  signed-by: "u"
"#;
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(bad_role),
            Err(PolicyError::UnknownRole(_))
        ));
        let bad_key = r#"
identities:
  - u: {"role": {"name": "member", "mspId": "Org1MSP"}}
policy:
  all-of: []
"#;
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(bad_key),
            Err(PolicyError::MalformedRule(_))
        ));
    }

    #[test]
    fn test_any_member_of() {
        let policy = EndorsementPolicy::any_member_of(&["Org1MSP", "Org2MSP"]);
        assert_eq!(
            policy.to_string(),
            "OR('Org1MSP.member', 'Org2MSP.member')"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = EndorsementPolicy::from_yaml_file(Path::new("/nonexistent/policy.yaml"))
            .unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
