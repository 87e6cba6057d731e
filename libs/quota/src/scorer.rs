//! Region/SKU recommendations.
//!
//! Scoring is a fixed heuristic over capacity headroom, region preference
//! and region health. The coefficients live in [`ScoreWeights`]; the
//! ranking step only sorts what [`RecommendationScorer::score`] produces.

use std::collections::BTreeMap;
use std::sync::Arc;

use qorch_connectivity::RegionHealth;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AllocationRejected;
use crate::model::{QuotaTable, ResourceQuota};

/// What the caller wants to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub role: String,

    #[serde(alias = "minimumQuota")]
    pub minimum_quota: i64,

    /// Ordered; the first entry is the primary preference.
    #[serde(default, alias = "preferredRegions")]
    pub preferred_regions: Vec<String>,

    #[serde(default, alias = "requiredFeatures")]
    pub required_features: Vec<String>,
}

impl RecommendationRequest {
    pub fn new(role: impl Into<String>, minimum_quota: i64) -> Self {
        Self {
            role: role.into(),
            minimum_quota,
            preferred_regions: Vec::new(),
            required_features: Vec::new(),
        }
    }

    pub fn with_preferred_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), AllocationRejected> {
        if self.role.trim().is_empty() {
            return Err(AllocationRejected::InvalidParameters(
                "role must not be empty".to_string(),
            ));
        }
        if self.minimum_quota <= 0 {
            return Err(AllocationRejected::InvalidParameters(format!(
                "minimum quota must be positive, got {}",
                self.minimum_quota
            )));
        }
        Ok(())
    }
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub region: String,
    pub sku: String,
    pub available_quota: i64,
    /// Bounded to `[0, 100]`.
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Scoring coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub base: f64,
    /// Scaled by `available / total`.
    pub capacity: f64,
    pub preferred: f64,
    /// On top of `preferred` for the first preference.
    pub primary: f64,
    pub healthy: f64,
    /// Subtracted for unhealthy regions.
    pub unhealthy_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base: 50.0,
            capacity: 20.0,
            preferred: 15.0,
            primary: 5.0,
            healthy: 10.0,
            unhealthy_penalty: 30.0,
        }
    }
}

pub const MIN_CONFIDENCE: f64 = 0.0;
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Ranks region/SKU pairs for a request.
#[derive(Clone, Default)]
pub struct RecommendationScorer {
    weights: ScoreWeights,
    health: Option<Arc<dyn RegionHealth>>,
}

impl RecommendationScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self {
            weights,
            health: None,
        }
    }

    pub fn with_region_health(mut self, health: Arc<dyn RegionHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Score one candidate. Returns the clamped confidence and the reasons
    /// that contributed to it.
    pub fn score(
        &self,
        region: &str,
        quota: &ResourceQuota,
        preferred_regions: &[String],
        healthy: bool,
    ) -> (f64, Vec<String>) {
        let w = &self.weights;
        let mut reasons = Vec::new();
        let mut score = w.base;

        if quota.total > 0 {
            let ratio = (quota.available as f64 / quota.total as f64).clamp(0.0, 1.0);
            score += w.capacity * ratio;
            reasons.push(format!(
                "{} of {} units available ({:.0}% headroom)",
                quota.available,
                quota.total,
                ratio * 100.0
            ));
        }

        if let Some(position) = preferred_regions.iter().position(|r| r == region) {
            score += w.preferred;
            if position == 0 {
                score += w.primary;
                reasons.push("Primary preferred region".to_string());
            } else {
                reasons.push("Preferred region".to_string());
            }
        }

        if healthy {
            score += w.healthy;
            reasons.push("Region compute services healthy".to_string());
        } else {
            score -= w.unhealthy_penalty;
            reasons.push("Region compute services unhealthy".to_string());
        }

        (score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE), reasons)
    }

    /// Eligible region/SKU pairs, best first. Ties keep table order.
    pub async fn recommend(
        &self,
        table: &QuotaTable,
        request: &RecommendationRequest,
    ) -> Vec<RecommendationResult> {
        let candidates: Vec<String> = table
            .regions()
            .filter(|r| {
                request.preferred_regions.is_empty()
                    || request.preferred_regions.iter().any(|p| p == r)
            })
            .map(str::to_string)
            .collect();

        let health = match &self.health {
            Some(source) if !candidates.is_empty() => source.region_health(&candidates).await,
            _ => BTreeMap::new(),
        };

        let mut results = Vec::new();
        for region in &candidates {
            let healthy = health.get(region).copied().unwrap_or(true);
            let Some(skus) = table.region(region) else {
                continue;
            };

            for (sku, quota) in skus {
                if !quota.is_assigned_to(&request.role)
                    || quota.available < request.minimum_quota
                    || !quota.supports_all(&request.required_features)
                {
                    continue;
                }

                let (confidence, reasons) =
                    self.score(region, quota, &request.preferred_regions, healthy);
                debug!(region = %region, sku = %sku, confidence, "Scored candidate");

                results.push(RecommendationResult {
                    region: region.clone(),
                    sku: sku.clone(),
                    available_quota: quota.available,
                    confidence,
                    reasons,
                });
            }
        }

        // sort_by is stable
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        info!(
            role = %request.role,
            minimum_quota = request.minimum_quota,
            candidates = candidates.len(),
            results = results.len(),
            "Computed recommendations"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use super::*;

    struct Unhealthy(BTreeSet<String>);

    #[async_trait]
    impl RegionHealth for Unhealthy {
        async fn region_health(&self, regions: &[String]) -> BTreeMap<String, bool> {
            regions
                .iter()
                .map(|r| (r.clone(), !self.0.contains(r)))
                .collect()
        }
    }

    fn table() -> QuotaTable {
        let mut table = QuotaTable::new();
        table.insert("eastus", "D2", ResourceQuota::new(10, 5).with_roles(["validator"]));
        table.insert(
            "eastus",
            "D4",
            ResourceQuota::new(10, 0)
                .with_roles(["validator"])
                .with_features(["premium-storage"]),
        );
        table.insert("westus", "D2", ResourceQuota::new(10, 5).with_roles(["validator"]));
        table.insert("westus", "E8", ResourceQuota::new(10, 0).with_roles(["rpc"]));
        table
    }

    #[tokio::test]
    async fn test_ranks_by_capacity() {
        let scorer = RecommendationScorer::default();
        let results = scorer
            .recommend(&table(), &RecommendationRequest::new("validator", 1))
            .await;

        let keys: Vec<_> = results.iter().map(|r| (r.region.as_str(), r.sku.as_str())).collect();
        // D4 has full headroom; the two half-full D2s tie and keep table order.
        assert_eq!(keys, vec![("eastus", "D4"), ("eastus", "D2"), ("westus", "D2")]);
        assert_eq!(results[0].confidence, 80.0);
        assert_eq!(results[1].confidence, 70.0);
    }

    #[tokio::test]
    async fn test_preferred_regions_filter_and_boost() {
        let scorer = RecommendationScorer::default();
        let request =
            RecommendationRequest::new("validator", 1).with_preferred_regions(["westus"]);
        let results = scorer.recommend(&table(), &request).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].region, "westus");
        assert_eq!(results[0].confidence, 90.0);
        assert!(results[0].reasons.iter().any(|r| r == "Primary preferred region"));
    }

    #[tokio::test]
    async fn test_minimum_quota_and_features() {
        let scorer = RecommendationScorer::default();

        let results = scorer
            .recommend(&table(), &RecommendationRequest::new("validator", 6))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sku, "D4");

        let request = RecommendationRequest::new("validator", 1)
            .with_required_features(["premium-storage"]);
        let results = scorer.recommend(&table(), &request).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sku, "D4");

        assert!(scorer
            .recommend(&table(), &RecommendationRequest::new("bootnode", 1))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_region_is_degraded_not_dropped() {
        let scorer = RecommendationScorer::default()
            .with_region_health(Arc::new(Unhealthy(BTreeSet::from(["eastus".to_string()]))));
        let results = scorer
            .recommend(&table(), &RecommendationRequest::new("validator", 1))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].region, "westus");
        let last = results.last().unwrap();
        assert_eq!(last.region, "eastus");
        assert_eq!(last.sku, "D2");
        assert_eq!(last.confidence, 30.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let scorer = RecommendationScorer::new(ScoreWeights {
            base: 0.0,
            ..ScoreWeights::default()
        });
        let quota = ResourceQuota::new(10, 10);
        let (confidence, reasons) = scorer.score("eastus", &quota, &[], false);
        assert_eq!(confidence, 0.0);
        assert_eq!(reasons.len(), 2);

        let generous = RecommendationScorer::new(ScoreWeights {
            base: 95.0,
            ..ScoreWeights::default()
        });
        let (confidence, _) =
            generous.score("eastus", &ResourceQuota::new(10, 0), &["eastus".to_string()], true);
        assert_eq!(confidence, 100.0);
    }

    #[test]
    fn test_request_accepts_camel_case() {
        let request: RecommendationRequest = serde_json::from_value(serde_json::json!({
            "role": "validator",
            "minimumQuota": 2,
            "preferredRegions": ["eastus"]
        }))
        .unwrap();
        assert_eq!(request.minimum_quota, 2);
        assert_eq!(request.preferred_regions, vec!["eastus"]);
        assert!(request.required_features.is_empty());
        assert!(request.validate().is_ok());

        assert!(RecommendationRequest::new("validator", 0).validate().is_err());
        assert!(RecommendationRequest::new(" ", 1).validate().is_err());
    }

    const REGIONS: [&str; 4] = ["eastus", "westus", "northeurope", "southeastasia"];
    const ROLES: [&str; 2] = ["validator", "rpc"];
    const FEATURES: [&str; 2] = ["premium-storage", "accelerated-networking"];

    fn pick<const N: usize>(names: [&str; N], mask: u8) -> Vec<String> {
        names
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, n)| n.to_string())
            .collect()
    }

    proptest! {
        #[test]
        fn prop_recommend_bounded_sorted_and_eligible(
            entries in prop::collection::vec(
                (0usize..4, 0usize..3, 0i64..50, 0i64..60, 0u8..4, 0u8..4),
                0..12,
            ),
            unhealthy_mask in 0u8..16,
            role in 0usize..2,
            minimum_quota in 1i64..20,
            preferred in prop::collection::vec(0usize..4, 0..3),
            required_mask in 0u8..4,
        ) {
            let mut table = QuotaTable::new();
            for (region, sku, total, used, roles, features) in entries {
                table.insert(
                    REGIONS[region],
                    format!("sku-{sku}"),
                    ResourceQuota::new(total, used)
                        .with_roles(pick(ROLES, roles))
                        .with_features(pick(FEATURES, features)),
                );
            }
            let unhealthy: BTreeSet<String> = pick(REGIONS, unhealthy_mask).into_iter().collect();
            let request = RecommendationRequest::new(ROLES[role], minimum_quota)
                .with_preferred_regions(preferred.iter().map(|i| REGIONS[*i]))
                .with_required_features(pick(FEATURES, required_mask));

            let scorer = RecommendationScorer::default()
                .with_region_health(Arc::new(Unhealthy(unhealthy.clone())));
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let results = runtime.block_on(scorer.recommend(&table, &request));

            for result in &results {
                prop_assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&result.confidence));

                let quota = table.get(&result.region, &result.sku).unwrap();
                prop_assert!(quota.is_assigned_to(&request.role));
                prop_assert!(quota.available >= request.minimum_quota);
                prop_assert!(quota.supports_all(&request.required_features));

                // Unhealthy regions are penalised, never dropped.
                if unhealthy.contains(&result.region) {
                    prop_assert!(result
                        .reasons
                        .iter()
                        .any(|r| r == "Region compute services unhealthy"));
                }
            }
            for pair in results.windows(2) {
                prop_assert!(pair[0].confidence >= pair[1].confidence);
            }

            let eligible = table
                .iter()
                .filter(|(region, _, quota)| {
                    (request.preferred_regions.is_empty()
                        || request.preferred_regions.iter().any(|p| p == region))
                        && quota.is_assigned_to(&request.role)
                        && quota.available >= request.minimum_quota
                        && quota.supports_all(&request.required_features)
                })
                .count();
            prop_assert_eq!(results.len(), eligible);
        }
    }
}
