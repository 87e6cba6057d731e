//! Cloud control-plane capability and mock implementation.
//!
//! Real provider SDK calls are out of scope; the probe only needs a narrow
//! read-only surface, which the mock satisfies for development and tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProbeError;

/// Read-only control-plane surface used for reachability and region health.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// First page of resource groups visible to the configured identity.
    async fn list_resource_groups(&self, page_size: u32) -> Result<Vec<String>, ProbeError>;

    /// Whether the compute service is available in a region.
    async fn compute_available(&self, region: &str) -> Result<bool, ProbeError>;
}

/// Mock control plane for development and testing.
pub struct MockControlPlane {
    resource_groups: Vec<String>,
    unhealthy_regions: BTreeSet<String>,
    fail_calls: bool,
    calls: AtomicU64,
}

impl MockControlPlane {
    /// A healthy control plane with a single resource group.
    pub fn new() -> Self {
        Self {
            resource_groups: vec!["qorch-validators".to_string()],
            unhealthy_regions: BTreeSet::new(),
            fail_calls: false,
            calls: AtomicU64::new(0),
        }
    }

    /// A control plane whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail_calls: true,
            ..Self::new()
        }
    }

    /// Report compute as unavailable in the given regions.
    pub fn with_unhealthy_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unhealthy_regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the listed resource groups (empty simulates an identity with no access).
    pub fn with_resource_groups(mut self, groups: Vec<String>) -> Self {
        self.resource_groups = groups;
        self
    }

    /// Number of calls served so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlaneClient for MockControlPlane {
    async fn list_resource_groups(&self, page_size: u32) -> Result<Vec<String>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls {
            return Err(ProbeError::Unavailable(
                "[MOCK] control plane configured to fail".to_string(),
            ));
        }

        debug!(page_size, "[MOCK] Listing resource groups");
        Ok(self
            .resource_groups
            .iter()
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn compute_available(&self, region: &str) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls {
            return Err(ProbeError::Unavailable(
                "[MOCK] control plane configured to fail".to_string(),
            ));
        }

        Ok(!self.unhealthy_regions.contains(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_lists_first_page() {
        let mock = MockControlPlane::new()
            .with_resource_groups(vec!["a".to_string(), "b".to_string(), "c".to_string()]);

        let page = mock.list_resource_groups(2).await.unwrap();
        assert_eq!(page, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_region_health() {
        let mock = MockControlPlane::new().with_unhealthy_regions(["westus"]);

        assert!(mock.compute_available("eastus").await.unwrap());
        assert!(!mock.compute_available("westus").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockControlPlane::failing();

        assert!(mock.list_resource_groups(1).await.is_err());
        assert!(mock.compute_available("eastus").await.is_err());
        assert_eq!(mock.call_count(), 2);
    }
}
