// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Placement strategy (C6), polymorphic over {full-replication,
//! single-placement, min-cost, ...}. For one table, chooses column-placement
//! distributions per partition on the non-freshness (locking) path.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::algebra::{PlanBuilder, PlanId};
use crate::catalog::{ordered_partitions, CatalogView, ColumnId, Distribution, PartitionId, PlacementRole, StoreId, Table};
use crate::error::RoutingError;
use crate::query_info::QueryInformation;
use crate::scan_cache::ScanCache;

pub struct ScanContext<'a> {
    pub scan: PlanId,
    pub table: Table,
    pub query_info: &'a QueryInformation,
    pub catalog: &'a dyn CatalogView,
    pub cache: &'a ScanCache,
}

/// A strategy's per-scan verdict. Modeled as a three-valued return rather
/// than a mutable cooperative-abort flag (spec §9): `Decline` is the
/// cooperative-abort signal, not an error — the driver treats it as "this
/// router declines" and returns an empty plan list upward (spec §4.6, §7).
pub enum StrategyOutcome {
    Plans(Vec<PlanBuilder>),
    Decline,
    Error(RoutingError),
}

/// Find, for each needed column, its candidate stores at a given partition,
/// PRIMARY-holding stores first (ascending `StoreId` among those), then
/// everything else (ascending `StoreId`), for deterministic downstream
/// tie-breaking. `only_store` (set on the horizontal path, which pins a
/// partition to its PRIMARY store) drops every other candidate; `excluded`
/// (set on the vertical/replicated and single-placement paths) drops only
/// the stores holding an OUTDATED placement for this partition — spec §3
/// invariant 4 forbids OUTDATED on a non-tolerant plan. `primary` ranks the
/// remaining candidates so `cover_columns`'s ascending-`StoreId` fallback
/// lands on a PRIMARY store whenever one is available, matching
/// `FullReplication`'s documented preference for the PRIMARY placement.
fn column_candidates(
    catalog: &dyn CatalogView,
    columns: &BTreeSet<ColumnId>,
    partition: PartitionId,
    only_store: Option<StoreId>,
    excluded: &BTreeSet<StoreId>,
    primary: &BTreeSet<StoreId>,
) -> Result<BTreeMap<ColumnId, Vec<StoreId>>, RoutingError> {
    let mut out = BTreeMap::new();
    for column in columns {
        let mut stores: Vec<StoreId> = catalog
            .column_placements(*column, partition)?
            .into_iter()
            .map(|cp| cp.store)
            .filter(|s| only_store.map(|allowed| allowed == *s).unwrap_or(true))
            .filter(|s| !excluded.contains(s))
            .collect();
        stores.sort_by_key(|s| s.0);
        stores.dedup();
        stores.sort_by_key(|s| (!primary.contains(s), s.0));
        out.insert(*column, stores);
    }
    Ok(out)
}

/// Stores holding an OUTDATED-role placement for `partition` — excluded from
/// every non-freshness-path column candidate set (spec §3 invariant 4).
fn outdated_stores(catalog: &dyn CatalogView, partition: PartitionId) -> Result<BTreeSet<StoreId>, RoutingError> {
    Ok(catalog
        .partition_placements(partition)?
        .into_iter()
        .filter(|p| p.role == PlacementRole::Outdated)
        .map(|p| p.store)
        .collect())
}

/// Stores holding the PRIMARY placement for `partition` — `column_candidates`
/// ranks these ahead of every other candidate.
fn primary_stores(catalog: &dyn CatalogView, partition: PartitionId) -> Result<BTreeSet<StoreId>, RoutingError> {
    Ok(catalog
        .partition_placements(partition)?
        .into_iter()
        .filter(|p| p.role == PlacementRole::Primary)
        .map(|p| p.store)
        .collect())
}

/// Strategy-private tie-break rule requested by spec §4.6: ordering inside a
/// strategy is its own business, but the result must be deterministic for
/// identical inputs.
pub trait PlacementStrategy: Send + Sync {
    /// `true` biases column assignment toward the fewest distinct stores
    /// touched (a greedy set cover); `false` biases toward reusing whatever
    /// store already covers other columns only when that is free, otherwise
    /// falls back to the PRIMARY-ranked candidate list (`column_candidates`),
    /// without specifically minimizing store count.
    fn prefers_min_distinct_stores(&self) -> bool;

    fn name(&self) -> &'static str;
}

fn cover_columns(candidates: &BTreeMap<ColumnId, Vec<StoreId>>, minimize_distinct: bool) -> Option<BTreeMap<ColumnId, StoreId>> {
    if candidates.values().any(|c| c.is_empty()) {
        return None;
    }

    if minimize_distinct {
        // Greedy set cover: repeatedly pick the store covering the most
        // still-uncovered columns, tie-broken by ascending `StoreId`.
        let mut remaining: BTreeSet<ColumnId> = candidates.keys().copied().collect();
        let mut assignment = BTreeMap::new();
        while !remaining.is_empty() {
            let mut best_store: Option<StoreId> = None;
            let mut best_covers: Vec<ColumnId> = Vec::new();
            let mut store_to_columns: BTreeMap<StoreId, Vec<ColumnId>> = BTreeMap::new();
            for column in &remaining {
                for store in &candidates[column] {
                    store_to_columns.entry(*store).or_default().push(*column);
                }
            }
            for (store, covers) in &store_to_columns {
                if covers.len() > best_covers.len() || (covers.len() == best_covers.len() && Some(*store) < best_store) {
                    best_store = Some(*store);
                    best_covers = covers.clone();
                }
            }
            let store = best_store?;
            for column in &best_covers {
                assignment.insert(*column, store);
                remaining.remove(column);
            }
        }
        Some(assignment)
    } else {
        // `stores` is PRIMARY-ranked first (`column_candidates`), so the
        // `stores.first()` fallback below lands on a PRIMARY store whenever
        // one is available.
        let mut assignment = BTreeMap::new();
        let mut used: BTreeSet<StoreId> = BTreeSet::new();
        for (column, stores) in candidates {
            let chosen = stores
                .iter()
                .find(|s| used.contains(*s))
                .copied()
                .or_else(|| stores.first().copied())?;
            used.insert(chosen);
            assignment.insert(*column, chosen);
        }
        Some(assignment)
    }
}

fn build_distribution_for_partitions(
    catalog: &dyn CatalogView,
    columns: &BTreeSet<ColumnId>,
    partitions: &[PartitionId],
    only_store: &BTreeMap<PartitionId, StoreId>,
    minimize_distinct: bool,
) -> Result<Option<Distribution>, RoutingError> {
    let mut distribution = Distribution::new();
    for partition in partitions {
        let excluded = outdated_stores(catalog, *partition)?;
        let primary = primary_stores(catalog, *partition)?;
        let candidates = column_candidates(catalog, columns, *partition, only_store.get(partition).copied(), &excluded, &primary)?;
        let Some(assignment) = cover_columns(&candidates, minimize_distinct) else {
            return Ok(None);
        };
        let mut columns_sorted: Vec<ColumnId> = assignment.keys().copied().collect();
        columns_sorted.sort_by_key(|c| c.0);
        let placements = columns_sorted
            .into_iter()
            .map(|c| crate::catalog::ColumnPlacement { column: c, store: assignment[&c] })
            .collect();
        distribution.insert(*partition, placements);
    }
    Ok(Some(distribution))
}

async fn emit_distribution(
    ctx: &ScanContext<'_>,
    mut builders: Vec<PlanBuilder>,
    distribution: Distribution,
) -> StrategyOutcome {
    for builder in &mut builders {
        ctx.cache.build_scan(ctx.scan, &distribution, builder).await;
        builder.record_routing(ctx.scan, distribution.clone());
    }
    StrategyOutcome::Plans(builders)
}

/// Shared implementation of the three handlers, parameterized only by
/// `strategy.prefers_min_distinct_stores()` — the one axis spec §9 calls out
/// as strategy-private.
pub async fn handle_horizontal(
    strategy: &dyn PlacementStrategy,
    ctx: &ScanContext<'_>,
    builders: Vec<PlanBuilder>,
) -> StrategyOutcome {
    let columns: BTreeSet<ColumnId> = ctx.query_info.columns_used(ctx.table.id).into_iter().collect();
    let needed = match ctx.query_info.partitions_accessed(ctx.scan) {
        Some(set) => set,
        None => match ctx.catalog.partitions_of(ctx.table.id) {
            Ok(all) => all.into_iter().map(|p| p.id).collect(),
            Err(e) => return StrategyOutcome::Error(e),
        },
    };
    if needed.is_empty() {
        trace!("{}: handle_horizontal declines, no partitions needed", strategy.name());
        return StrategyOutcome::Decline;
    }

    // Regular (non-freshness) reads always use the PRIMARY placement
    // (spec §3 invariant 4: "no non-tolerant plan includes an OUTDATED
    // placement"); REFRESHABLE copies are reserved for the freshness path.
    let mut partitions = Vec::with_capacity(needed.len());
    let mut primary_store = BTreeMap::new();
    for partition in &needed {
        let placements = match ctx.catalog.partition_placements(*partition) {
            Ok(p) => p,
            Err(e) => return StrategyOutcome::Error(e),
        };
        match placements.iter().find(|p| p.role == PlacementRole::Primary) {
            Some(p) => {
                primary_store.insert(*partition, p.store);
            }
            None => {
                return StrategyOutcome::Error(RoutingError::CatalogInconsistency(format!(
                    "partition {:?} has no PRIMARY placement",
                    partition
                )))
            }
        }
        partitions.push(*partition);
    }
    partitions.sort_by_key(|p| p.0);

    let distribution = match build_distribution_for_partitions(
        ctx.catalog,
        &columns,
        &partitions,
        &primary_store,
        strategy.prefers_min_distinct_stores(),
    ) {
        Ok(Some(d)) => d,
        Ok(None) => {
            return StrategyOutcome::Error(RoutingError::CatalogInconsistency(
                "no column placement covers a required column on its partition's PRIMARY store".into(),
            ))
        }
        Err(e) => return StrategyOutcome::Error(e),
    };

    emit_distribution(ctx, builders, distribution).await
}

pub async fn handle_vertical_or_replicated(
    strategy: &dyn PlacementStrategy,
    ctx: &ScanContext<'_>,
    builders: Vec<PlanBuilder>,
) -> StrategyOutcome {
    let columns: BTreeSet<ColumnId> = ctx.query_info.columns_used(ctx.table.id).into_iter().collect();
    let partitions = match ordered_partitions(ctx.catalog, ctx.table.id, &BTreeSet::new()) {
        Ok(p) => p.into_iter().map(|p| p.id).collect::<Vec<_>>(),
        Err(e) => return StrategyOutcome::Error(e),
    };
    if partitions.is_empty() {
        return StrategyOutcome::Decline;
    }

    let distribution = match build_distribution_for_partitions(
        ctx.catalog,
        &columns,
        &partitions,
        &BTreeMap::new(),
        strategy.prefers_min_distinct_stores(),
    ) {
        Ok(Some(d)) => d,
        Ok(None) => {
            return StrategyOutcome::Error(RoutingError::CatalogInconsistency(
                "no column placement covers a required column for this table".into(),
            ))
        }
        Err(e) => return StrategyOutcome::Error(e),
    };

    emit_distribution(ctx, builders, distribution).await
}

pub async fn handle_none(ctx: &ScanContext<'_>, builders: Vec<PlanBuilder>) -> StrategyOutcome {
    let columns: BTreeSet<ColumnId> = ctx.query_info.columns_used(ctx.table.id).into_iter().collect();
    let partitions = match ordered_partitions(ctx.catalog, ctx.table.id, &BTreeSet::new()) {
        Ok(p) => p.into_iter().map(|p| p.id).collect::<Vec<_>>(),
        Err(e) => return StrategyOutcome::Error(e),
    };
    if partitions.is_empty() {
        return StrategyOutcome::Decline;
    }

    // A single-placement table has exactly one covering store per column;
    // `minimize_distinct` vs. not makes no difference here, so the simpler
    // non-minimizing path is used regardless of which strategy dispatched.
    let distribution = match build_distribution_for_partitions(ctx.catalog, &columns, &partitions, &BTreeMap::new(), false) {
        Ok(Some(d)) => d,
        Ok(None) => {
            return StrategyOutcome::Error(RoutingError::CatalogInconsistency(
                "single-placement table is missing a column placement".into(),
            ))
        }
        Err(e) => return StrategyOutcome::Error(e),
    };

    emit_distribution(ctx, builders, distribution).await
}

/// Prefers the PRIMARY-eligible replica and otherwise reuses whichever
/// store already covers other needed columns — appropriate when the table
/// is (fully or partially) replicated and any single covering store is as
/// good as another.
pub struct FullReplication;

impl PlacementStrategy for FullReplication {
    fn prefers_min_distinct_stores(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "full-replication"
    }
}

/// The table genuinely has one placement; `handle_horizontal` and
/// `handle_vertical_or_replicated` are implemented for completeness (the
/// driver dispatches by table property, not by strategy identity) but in
/// practice only `handle_none` is ever reached for such a table.
pub struct SinglePlacement;

impl PlacementStrategy for SinglePlacement {
    fn prefers_min_distinct_stores(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "single-placement"
    }
}

/// Minimizes the number of distinct stores touched via a greedy set cover
/// over the needed columns.
pub struct MinCost;

impl PlacementStrategy for MinCost {
    fn prefers_min_distinct_stores(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "min-cost"
    }
}

