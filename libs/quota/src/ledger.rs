//! Allocation ledger: the single writer of quota reservations.
//!
//! The ledger owns the in-memory quota table and the allocation log. Every
//! mutation follows the same order: validate, persist the would-be state,
//! then commit in memory. A failed write leaves the ledger untouched.
//!
//! After every public call, for every region/SKU key:
//! `available + used + Σ(active allocation amounts) == total`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use qorch_connectivity::RegionHealth;
use tracing::{debug, error, info, warn};

use crate::error::{AllocationRejected, QuotaError};
use crate::model::{
    new_allocation_id, AllocationStatus, QuotaAllocation, QuotaTable, RegionAvailability,
    ResourceQuota,
};
use crate::source::QuotaSource;
use crate::store::{AllocationLog, QuotaStore};

pub struct AllocationLedger {
    store: QuotaStore,
    log: AllocationLog,
    table: QuotaTable,
    allocations: Vec<QuotaAllocation>,
    health: Option<Arc<dyn RegionHealth>>,
}

impl AllocationLedger {
    /// Load the quota table and allocation log, then reconcile them.
    pub fn open(store: QuotaStore, log: AllocationLog) -> Result<Self, QuotaError> {
        let table = store.load()?;
        let allocations = log.load()?;

        let mut ledger = Self {
            store,
            log,
            table,
            allocations,
            health: None,
        };
        ledger.sync_with_quota();
        Ok(ledger)
    }

    /// Consult region health before accepting allocations.
    pub fn with_region_health(mut self, health: Arc<dyn RegionHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn table(&self) -> &QuotaTable {
        &self.table
    }

    /// Full audit trail, including released allocations.
    pub fn allocations(&self) -> &[QuotaAllocation] {
        &self.allocations
    }

    pub fn allocation(&self, id: &str) -> Option<&QuotaAllocation> {
        self.allocations.iter().find(|a| a.id == id)
    }

    /// Recompute every `available` from `total`, `used` and the active
    /// allocations, and rebuild each key's allocation reference list.
    pub fn sync_with_quota(&mut self) {
        let orphaned = reconcile(&mut self.table, &self.allocations);
        for allocation in orphaned {
            warn!(
                allocation_id = %allocation.id,
                region = %allocation.region,
                sku = %allocation.sku,
                "Active allocation references a quota key that no longer exists"
            );
        }
        debug!(entries = self.table.len(), "Synchronized quota with allocations");
    }

    /// Reserve `amount` units of `sku` in `region` for `role`.
    pub async fn allocate(
        &mut self,
        region: &str,
        sku: &str,
        role: &str,
        amount: i64,
        application_id: &str,
    ) -> Result<String, AllocationRejected> {
        let result = self
            .try_allocate(region, sku, role, amount, application_id)
            .await;

        match &result {
            Ok(id) => info!(
                allocation_id = %id,
                region,
                sku,
                role,
                amount,
                application_id,
                "Allocated quota"
            ),
            Err(reason) => warn!(
                region,
                sku,
                role,
                amount,
                application_id,
                reason = %reason,
                "Allocation rejected"
            ),
        }
        result
    }

    async fn try_allocate(
        &mut self,
        region: &str,
        sku: &str,
        role: &str,
        amount: i64,
        application_id: &str,
    ) -> Result<String, AllocationRejected> {
        for (name, value) in [
            ("region", region),
            ("sku", sku),
            ("role", role),
            ("application_id", application_id),
        ] {
            if value.trim().is_empty() {
                return Err(AllocationRejected::InvalidParameters(format!(
                    "{name} must not be empty"
                )));
            }
        }
        if amount <= 0 {
            return Err(AllocationRejected::InvalidParameters(format!(
                "amount must be positive, got {amount}"
            )));
        }

        let quota = self
            .table
            .get(region, sku)
            .ok_or_else(|| AllocationRejected::UnknownQuota {
                region: region.to_string(),
                sku: sku.to_string(),
            })?;

        if !quota.is_assigned_to(role) {
            return Err(AllocationRejected::RoleNotAssigned {
                region: region.to_string(),
                sku: sku.to_string(),
                role: role.to_string(),
            });
        }

        if quota.available < amount {
            return Err(AllocationRejected::InsufficientQuota {
                region: region.to_string(),
                sku: sku.to_string(),
                requested: amount,
                available: quota.available,
            });
        }

        if let Some(health) = &self.health {
            let healthy = health
                .region_health(&[region.to_string()])
                .await
                .get(region)
                .copied()
                .unwrap_or(true);
            if !healthy {
                return Err(AllocationRejected::RegionUnhealthy(region.to_string()));
            }
        }

        let allocation = QuotaAllocation {
            id: new_allocation_id(),
            timestamp: Utc::now(),
            region: region.to_string(),
            sku: sku.to_string(),
            role: role.to_string(),
            amount,
            application_id: application_id.to_string(),
            status: AllocationStatus::Active,
            released_at: None,
        };

        let mut next = self.allocations.clone();
        next.push(allocation.clone());
        self.log
            .save(&next)
            .map_err(|e| AllocationRejected::Persistence(e.to_string()))?;

        self.allocations = next;
        if let Some(quota) = self.table.get_mut(region, sku) {
            quota.available -= amount;
            quota.allocations.push(allocation.id.clone());
        }
        Ok(allocation.id)
    }

    /// Release an allocation.
    ///
    /// Returns `true` if the allocation is released after the call (including
    /// when it already was), `false` for unknown ids or a failed write.
    pub fn release(&mut self, id: &str) -> bool {
        let Some(index) = self.allocations.iter().position(|a| a.id == id) else {
            warn!(allocation_id = %id, "Release requested for unknown allocation");
            return false;
        };

        let current = &self.allocations[index];
        if current.status == AllocationStatus::Released {
            debug!(allocation_id = %id, "Allocation already released");
            return true;
        }
        let restores = current.is_active();

        let mut next = self.allocations.clone();
        next[index].status = AllocationStatus::Released;
        next[index].released_at = Some(Utc::now());

        if let Err(e) = self.log.save(&next) {
            error!(allocation_id = %id, error = %e, "Failed to persist release");
            return false;
        }

        self.allocations = next;
        let released = &self.allocations[index];
        if restores {
            match self.table.get_mut(&released.region, &released.sku) {
                Some(quota) => {
                    quota.available += released.amount;
                    quota.allocations.retain(|a| a != id);
                }
                None => warn!(
                    allocation_id = %id,
                    region = %released.region,
                    sku = %released.sku,
                    "Released allocation's quota key no longer exists"
                ),
            }
        }

        info!(
            allocation_id = %id,
            region = %released.region,
            sku = %released.sku,
            amount = released.amount,
            "Released allocation"
        );
        true
    }

    /// Replace the quota table from an external source.
    ///
    /// The new table is reconciled against the allocation log and written
    /// through to the quota file before it becomes visible.
    pub async fn refresh(&mut self, source: &dyn QuotaSource) -> Result<(), QuotaError> {
        let origin = source.describe();
        info!(source = %origin, "Refreshing quota table");

        let table = source.fetch().await?;
        self.replace_table(table, &origin)
    }

    /// Install a freshly fetched table. Callers that share the ledger fetch
    /// first and only hold their lock for this step.
    pub fn replace_table(&mut self, mut table: QuotaTable, origin: &str) -> Result<(), QuotaError> {
        let orphaned = reconcile(&mut table, &self.allocations);
        for allocation in &orphaned {
            warn!(
                allocation_id = %allocation.id,
                region = %allocation.region,
                sku = %allocation.sku,
                "Refreshed table dropped a key with an active allocation"
            );
        }
        let orphaned = orphaned.len();

        self.store.save(&table)?;
        self.table = table;

        info!(
            source = %origin,
            entries = self.table.len(),
            orphaned,
            "Quota table refreshed"
        );
        Ok(())
    }

    /// Whether any SKU in `region` assigned to `role` has `amount` available.
    ///
    /// Parameters `allocate` would reject (blank region or role, non-positive
    /// amount) are never satisfiable.
    pub fn validate_quota(&self, region: &str, role: &str, amount: i64) -> bool {
        if region.trim().is_empty() || role.trim().is_empty() || amount <= 0 {
            warn!(region, role, amount, "Invalid quota validation parameters");
            return false;
        }
        let Some(skus) = self.table.region(region) else {
            debug!(region, "Region not present in quota table");
            return false;
        };
        skus.values()
            .any(|quota| quota.is_assigned_to(role) && quota.available >= amount)
    }

    /// Per-region capacity for `role`. Regions with no SKU assigned to the
    /// role are omitted.
    pub fn summarize_availability(&self, role: &str) -> Vec<RegionAvailability> {
        let mut totals: BTreeMap<&str, (i64, i64, i64, i64)> = BTreeMap::new();
        for (region, _, quota) in self.table.iter() {
            if !quota.is_assigned_to(role) {
                continue;
            }
            let entry = totals.entry(region).or_default();
            entry.0 += quota.total;
            entry.1 += quota.used;
            entry.2 += quota.reserved();
            entry.3 += quota.available;
        }

        totals
            .into_iter()
            .map(|(region, (total, used, reserved, available))| RegionAvailability {
                region: region.to_string(),
                total,
                used,
                reserved,
                available,
                usage_percent: RegionAvailability::usage_percent(total, available),
            })
            .collect()
    }

    pub fn list_regions(&self) -> Vec<String> {
        self.table.regions().map(str::to_string).collect()
    }

    pub fn list_roles(&self) -> Vec<String> {
        self.table.roles().into_iter().collect()
    }

    pub fn quotas_filtered(&self, region: Option<&str>, role: Option<&str>) -> QuotaTable {
        self.table.filtered(region, role)
    }
}

/// Recompute derived fields of `table` from `allocations`.
///
/// Returns the active allocations whose key is missing from the table.
pub(crate) fn reconcile<'a>(
    table: &mut QuotaTable,
    allocations: &'a [QuotaAllocation],
) -> Vec<&'a QuotaAllocation> {
    for quota in table.quotas_mut() {
        quota.available = quota.total - quota.used;
        quota.allocations.clear();
    }

    let mut orphaned = Vec::new();
    for allocation in allocations.iter().filter(|a| a.is_active()) {
        match table.get_mut(&allocation.region, &allocation.sku) {
            Some(quota) => apply(quota, allocation),
            None => orphaned.push(allocation),
        }
    }
    orphaned
}

fn apply(quota: &mut ResourceQuota, allocation: &QuotaAllocation) {
    quota.available -= allocation.amount;
    quota.allocations.push(allocation.id.clone());
}
