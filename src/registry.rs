//! Rule registry: data model, fetch boundary, and load bookkeeping
//!
//! The registry is the authoritative, remotely-defined list of detection
//! rules. This module owns the read-only projection used by the filter
//! control: records are filtered to enabled rules and projected to
//! `{id, name}` references. The transport behind [`RegistryFetcher`] is an
//! external collaborator; implementations are injected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Rule record as fetched from the registry (extra fields ignored)
#[derive(Debug, Clone, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Reference to a rule used as a filter criterion
///
/// Identity is the `id`; `name` is display-only. Change detection between
/// selections compares id sets, never positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub id: String,
    pub name: String,
}

impl RuleRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Registry failure conditions
///
/// None of these are fatal: the control keeps its last good state and
/// retries on the next qualifying notification.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("rule registry unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("rule registry fetch timed out after {after:?}")]
    Timeout { after: Duration },
}

/// Read boundary to the remote rule registry
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    async fn fetch_rules(&self) -> Result<Vec<RuleRecord>, RegistryError>;
}

/// Project fetched records to enabled-rule references
pub fn project_enabled(records: Vec<RuleRecord>) -> Vec<RuleRef> {
    records
        .into_iter()
        .filter(|r| r.enabled)
        .map(|r| RuleRef {
            id: r.id,
            name: r.name,
        })
        .collect()
}

/// Performs registry loads and tags each with a monotonic generation
///
/// Overlapping loads carry no ordering guarantee, so every load takes a
/// generation number when it starts. A completion is only applied while its
/// generation is still the newest started; anything older is discarded.
/// Last request wins, never last completion.
pub struct RegistryLoader {
    fetcher: Arc<dyn RegistryFetcher>,
    generation: AtomicU64,
    timeout: Duration,
}

impl RegistryLoader {
    pub fn new(fetcher: Arc<dyn RegistryFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher,
            generation: AtomicU64::new(0),
            timeout,
        }
    }

    /// Fetch the enabled-rule list, tagged with this load's generation
    pub async fn load(&self) -> (u64, Result<Vec<RuleRef>, RegistryError>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(generation, "Registry load started");

        let result = match tokio::time::timeout(self.timeout, self.fetcher.fetch_rules()).await {
            Ok(Ok(records)) => Ok(project_enabled(records)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RegistryError::Timeout {
                after: self.timeout,
            }),
        };

        (generation, result)
    }

    /// Whether a load generation is still the newest started
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFetcher {
        records: Vec<RuleRecord>,
    }

    #[async_trait]
    impl RegistryFetcher for FixedFetcher {
        async fn fetch_rules(&self) -> Result<Vec<RuleRecord>, RegistryError> {
            Ok(self.records.clone())
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl RegistryFetcher for SlowFetcher {
        async fn fetch_rules(&self) -> Result<Vec<RuleRecord>, RegistryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn record(id: &str, name: &str, enabled: bool) -> RuleRecord {
        RuleRecord {
            id: id.to_string(),
            name: name.to_string(),
            enabled,
        }
    }

    #[test]
    fn test_project_enabled_filters_and_projects() {
        let rules = project_enabled(vec![
            record("r1", "sqlmap", true),
            record("r2", "xss", false),
            record("r3", "lfi", true),
        ]);

        assert_eq!(
            rules,
            vec![RuleRef::new("r1", "sqlmap"), RuleRef::new("r3", "lfi")]
        );
    }

    #[test]
    fn test_record_tolerates_extra_fields() {
        let record: RuleRecord = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "name": "sqlmap",
            "enabled": true,
            "color": "#ff0000",
            "notes": "ignored"
        }))
        .unwrap();

        assert_eq!(record.id, "r1");
        assert!(record.enabled);
    }

    #[tokio::test]
    async fn test_load_generations_are_monotonic() {
        let loader = RegistryLoader::new(
            Arc::new(FixedFetcher {
                records: vec![record("r1", "sqlmap", true)],
            }),
            Duration::from_secs(1),
        );

        let (gen1, res1) = loader.load().await;
        let (gen2, res2) = loader.load().await;

        assert_eq!(gen1, 1);
        assert_eq!(gen2, 2);
        assert!(res1.is_ok());
        assert!(res2.is_ok());
        assert!(!loader.is_current(gen1));
        assert!(loader.is_current(gen2));
    }

    #[tokio::test]
    async fn test_load_times_out() {
        let loader = RegistryLoader::new(Arc::new(SlowFetcher), Duration::from_millis(10));

        let (_, result) = loader.load().await;
        assert!(matches!(result, Err(RegistryError::Timeout { .. })));
    }
}
