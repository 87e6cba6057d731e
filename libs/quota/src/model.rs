//! Quota table and allocation records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

/// Capacity of one SKU in one region.
///
/// `available` is derived: the ledger recomputes it as
/// `total - used - Σ(active allocations)` whenever the table is loaded or
/// replaced. `used` is consumption observed outside this ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub total: i64,

    pub used: i64,

    #[serde(default)]
    pub available: i64,

    /// Roles allowed to consume this quota.
    #[serde(default, deserialize_with = "deserialize_roles")]
    pub assigned_to: BTreeSet<String>,

    /// SKU capabilities matched against required features.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,

    /// Ids of active allocations against this key (display only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<String>,
}

impl ResourceQuota {
    pub fn new(total: i64, used: i64) -> Self {
        Self {
            total,
            used,
            available: total - used,
            assigned_to: BTreeSet::new(),
            features: Vec::new(),
            allocations: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assigned_to = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_assigned_to(&self, role: &str) -> bool {
        self.assigned_to.contains(role)
    }

    /// Capacity reserved by ledger allocations.
    pub fn reserved(&self) -> i64 {
        self.total - self.used - self.available
    }

    /// Every required feature is declared by this SKU.
    pub fn supports_all(&self, required: &[String]) -> bool {
        required.iter().all(|f| self.features.iter().any(|have| have == f))
    }
}

/// Role lists arrive from hand-edited files; accept a list, a single string or null.
fn deserialize_roles<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Roles {
        Many(Vec<Option<String>>),
        One(String),
    }

    let roles = Option::<Roles>::deserialize(deserializer)?;
    Ok(match roles {
        Some(Roles::Many(list)) => list
            .into_iter()
            .flatten()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        Some(Roles::One(role)) if !role.trim().is_empty() => {
            BTreeSet::from([role.trim().to_string()])
        }
        _ => BTreeSet::new(),
    })
}

/// Region → SKU → quota.
///
/// Ordered maps: iteration order (and so recommendation discovery order) is
/// lexical by region, then by SKU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaTable(BTreeMap<String, BTreeMap<String, ResourceQuota>>);

impl QuotaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: impl Into<String>, sku: impl Into<String>, quota: ResourceQuota) {
        self.0
            .entry(region.into())
            .or_default()
            .insert(sku.into(), quota);
    }

    pub fn get(&self, region: &str, sku: &str) -> Option<&ResourceQuota> {
        self.0.get(region).and_then(|skus| skus.get(sku))
    }

    pub fn get_mut(&mut self, region: &str, sku: &str) -> Option<&mut ResourceQuota> {
        self.0.get_mut(region).and_then(|skus| skus.get_mut(sku))
    }

    pub fn contains_region(&self, region: &str) -> bool {
        self.0.contains_key(region)
    }

    pub fn region(&self, region: &str) -> Option<&BTreeMap<String, ResourceQuota>> {
        self.0.get(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every `(region, sku, quota)` in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ResourceQuota)> {
        self.0.iter().flat_map(|(region, skus)| {
            skus.iter()
                .map(move |(sku, quota)| (region.as_str(), sku.as_str(), quota))
        })
    }

    pub fn quotas_mut(&mut self) -> impl Iterator<Item = &mut ResourceQuota> {
        self.0.values_mut().flat_map(|skus| skus.values_mut())
    }

    /// All roles mentioned anywhere in the table.
    pub fn roles(&self) -> BTreeSet<String> {
        self.iter()
            .flat_map(|(_, _, quota)| quota.assigned_to.iter().cloned())
            .collect()
    }

    /// Number of region/SKU entries.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only entries matching the optional region and role filters.
    pub fn filtered(&self, region: Option<&str>, role: Option<&str>) -> QuotaTable {
        let mut out = QuotaTable::new();
        for (r, sku, quota) in self.iter() {
            if region.is_some_and(|want| want != r) {
                continue;
            }
            if role.is_some_and(|want| !quota.is_assigned_to(want)) {
                continue;
            }
            out.insert(r, sku, quota.clone());
        }
        out
    }
}

/// Allocation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Recorded but not reserving capacity.
    Pending,
    /// Reserving capacity.
    Active,
    /// Capacity returned; kept for audit.
    Released,
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Released => "released",
        };
        f.write_str(s)
    }
}

/// A reservation of quota for one application. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaAllocation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub sku: String,
    pub role: String,
    pub amount: i64,
    pub application_id: String,
    pub status: AllocationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl QuotaAllocation {
    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}

/// Prefix for allocation ids.
pub const ALLOCATION_ID_PREFIX: &str = "alloc";

/// Generate a fresh allocation id (`alloc_<ULID>`).
pub fn new_allocation_id() -> String {
    format!("{}_{}", ALLOCATION_ID_PREFIX, Ulid::new())
}

/// Per-region capacity for one role, summed over the role's SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionAvailability {
    pub region: String,
    pub total: i64,
    pub used: i64,
    pub reserved: i64,
    pub available: i64,
    /// `(total - available) / total` as a percentage with two decimals.
    pub usage_percent: String,
}

impl RegionAvailability {
    pub fn usage_percent(total: i64, available: i64) -> String {
        if total <= 0 {
            return "0.00".to_string();
        }
        let consumed = (total - available) as f64;
        format!("{:.2}", consumed / total as f64 * 100.0)
    }
}
