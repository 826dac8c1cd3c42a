//! Chaincode identity and deployment descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Name, version and logical path of a chaincode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChaincodeId {
    pub name: String,
    pub version: String,
    pub path: String,
}

impl ChaincodeId {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path: path.into(),
        }
    }

    /// `name:version`, the key a deployment is tracked under.
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for ChaincodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.name, self.version, self.path)
    }
}

/// Everything needed to install and instantiate one chaincode version.
///
/// A new version is a new descriptor; there is no in-place upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeDescriptor {
    pub id: ChaincodeId,
    /// Root directory the chaincode source is packaged from.
    pub source_location: PathBuf,
    /// Endorsement policy document applied at instantiation.
    pub policy_path: Option<PathBuf>,
}

impl ChaincodeDescriptor {
    pub fn new(id: ChaincodeId, source_location: impl Into<PathBuf>) -> Self {
        Self {
            id,
            source_location: source_location.into(),
            policy_path: None,
        }
    }

    pub fn with_policy(mut self, policy_path: impl Into<PathBuf>) -> Self {
        self.policy_path = Some(policy_path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_distinguishes_versions() {
        let v1 = ChaincodeId::new("car_cc_go", "1", "github.com/car_cc");
        let v2 = ChaincodeId::new("car_cc_go", "2", "github.com/car_cc");
        assert_eq!(v1.key(), "car_cc_go:1");
        assert_ne!(v1.key(), v2.key());
    }
}
