//! Cluster platform version discovery.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{AddonOperatorError, AddonOperatorResult};

use super::kinds;
use super::store::{ObjectKey, ObjectStore};

const CLUSTER_VERSION_NAME: &str = "version";
const COMPLETED: &str = "Completed";

/// Major and minor release of the platform. Patch level and suffixes are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlatformVersion {
    pub major: u64,
    pub minor: u64,
}

impl PlatformVersion {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl PartialOrd for PlatformVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlatformVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PlatformVersion {
    type Err = AddonOperatorError;

    /// Accepts `4.10`, `v4.10.3`, `4.11.0-rc.1+build` and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| AddonOperatorError::InvalidVersion {
            version: s.to_string(),
            message: message.to_string(),
        };

        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+'])
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.');
        let mut number = |what: &str| -> Result<u64, AddonOperatorError> {
            let part = parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| invalid(&format!("missing {what} component")))?;
            part.parse::<u64>()
                .map_err(|e| invalid(&format!("bad {what} component: {e}")))
        };
        let major = number("major")?;
        let minor = number("minor")?;
        Ok(Self { major, minor })
    }
}

#[derive(Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    state: String,
    #[serde(default)]
    version: String,
}

/// Version of the first `Completed` entry of the cluster version history.
pub async fn platform_version(store: &dyn ObjectStore) -> AddonOperatorResult<PlatformVersion> {
    let key = ObjectKey::cluster(kinds::cluster_version(), CLUSTER_VERSION_NAME);
    let cluster_version = store
        .get(&key)
        .await?
        .ok_or(AddonOperatorError::NoCompletedVersion)?;

    let history: Vec<HistoryEntry> = match cluster_version.data.pointer("/status/history") {
        Some(history) => serde_json::from_value(history.clone())?,
        None => Vec::new(),
    };

    let completed = history
        .iter()
        .find(|entry| entry.state == COMPLETED)
        .ok_or(AddonOperatorError::NoCompletedVersion)?;
    completed.version.parse()
}

/// Whether the platform is at least `minimum`, which must itself parse as a version.
pub async fn version_at_least(store: &dyn ObjectStore, minimum: &str) -> AddonOperatorResult<bool> {
    let minimum: PlatformVersion = minimum.parse()?;
    Ok(platform_version(store).await? >= minimum)
}
