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

//! Freshness resolver (C4). Picks placements whose staleness is within a
//! transaction's tolerated bound. Entirely private-error: `InsufficientFreshness`
//! never escapes this module, the driver always catches it (spec §7).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::trace;

use crate::catalog::{CatalogView, ColumnId, ColumnPlacement, Distribution, PartitionId, PartitionPlacement, TableId};
use crate::error::RoutingResult;
use crate::transaction::FreshnessBound;

/// Internal-only signal: for some required partition the candidate list was
/// empty, or no full-column distribution could be built. Never part of
/// `RoutingError` (spec §7) — the driver catches this and falls back to the
/// locking path (spec §4.7 step 1).
#[derive(Debug)]
pub struct InsufficientFreshness;

pub trait FreshnessResolver: Send + Sync {
    fn candidate_partition_placements(
        &self,
        table: TableId,
        partitions_needed: &BTreeSet<PartitionId>,
        freshness_spec: FreshnessBound,
    ) -> RoutingResult<Result<BTreeMap<PartitionId, Vec<PartitionPlacement>>, InsufficientFreshness>>;

    fn candidate_column_distributions(
        &self,
        candidate_map: &BTreeMap<PartitionId, Vec<PartitionPlacement>>,
        columns_used: &HashSet<ColumnId>,
    ) -> RoutingResult<Result<Vec<Distribution>, InsufficientFreshness>>;
}

/// The resolution of SPEC_FULL §4.4's open question: among placements
/// satisfying the bound, rank staleness-minimal first, tie-break by the
/// table's declared store preference order, then ascending `StoreId`.
fn rank_candidates(mut placements: Vec<PartitionPlacement>, preferred_stores: &[crate::catalog::StoreId]) -> Vec<PartitionPlacement> {
    placements.sort_by(|a, b| {
        a.staleness
            .magnitude()
            .cmp(&b.staleness.magnitude())
            .then_with(|| {
                let rank = |s: crate::catalog::StoreId| preferred_stores.iter().position(|p| *p == s).unwrap_or(usize::MAX);
                rank(a.store).cmp(&rank(b.store))
            })
            .then_with(|| a.store.0.cmp(&b.store.0))
    });
    placements
}

pub struct CatalogFreshnessResolver<'a> {
    pub catalog: &'a dyn CatalogView,
}

impl<'a> FreshnessResolver for CatalogFreshnessResolver<'a> {
    fn candidate_partition_placements(
        &self,
        table: TableId,
        partitions_needed: &BTreeSet<PartitionId>,
        freshness_spec: FreshnessBound,
    ) -> RoutingResult<Result<BTreeMap<PartitionId, Vec<PartitionPlacement>>, InsufficientFreshness>> {
        let preferred_stores = self.catalog.get_table(table)?.preferred_stores;
        let mut out = BTreeMap::new();
        for partition in partitions_needed {
            let placements = self.catalog.partition_placements(*partition)?;
            let satisfying: Vec<PartitionPlacement> = placements
                .into_iter()
                .filter(|p| p.staleness.within(&freshness_spec) == Some(true))
                .collect();
            if satisfying.is_empty() {
                trace!("no placement for partition {:?} satisfies the freshness bound", partition);
                return Ok(Err(InsufficientFreshness));
            }
            out.insert(*partition, rank_candidates(satisfying, &preferred_stores));
        }
        Ok(Ok(out))
    }

    fn candidate_column_distributions(
        &self,
        candidate_map: &BTreeMap<PartitionId, Vec<PartitionPlacement>>,
        columns_used: &HashSet<ColumnId>,
    ) -> RoutingResult<Result<Vec<Distribution>, InsufficientFreshness>> {
        let mut columns_sorted: Vec<ColumnId> = columns_used.iter().copied().collect();
        columns_sorted.sort_by_key(|c| c.0);

        // Per partition, collect the (ordered, best-first) list of fully
        // covering column-placement sets, one per candidate store.
        let mut per_partition_options: Vec<(PartitionId, Vec<Vec<ColumnPlacement>>)> = Vec::new();
        for (partition, candidates) in candidate_map {
            let mut options = Vec::new();
            for candidate in candidates {
                let mut covering = Vec::with_capacity(columns_sorted.len());
                let mut complete = true;
                for column in &columns_sorted {
                    let placements = self.catalog.column_placements(*column, *partition)?;
                    match placements.into_iter().find(|cp| cp.store == candidate.store) {
                        Some(cp) => covering.push(cp),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete {
                    options.push(covering);
                }
            }
            if options.is_empty() {
                trace!("no candidate store fully covers the used columns for partition {:?}", partition);
                return Ok(Err(InsufficientFreshness));
            }
            per_partition_options.push((*partition, options));
        }

        // Cartesian product across partitions, bounded in practice by the
        // (small) number of freshness-satisfying replicas per partition.
        let mut distributions: Vec<Distribution> = vec![Distribution::new()];
        for (partition, options) in per_partition_options {
            let mut next = Vec::with_capacity(distributions.len() * options.len());
            for base in &distributions {
                for option in &options {
                    let mut extended = base.clone();
                    extended.insert(partition, option.clone());
                    next.push(extended);
                }
            }
            distributions = next;
        }

        if distributions.is_empty() {
            Ok(Err(InsufficientFreshness))
        } else {
            Ok(Ok(distributions))
        }
    }
}
