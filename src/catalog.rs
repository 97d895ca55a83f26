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

//! Read-only catalog view (C1). Entities are snapshots for the lifetime of
//! one query; nothing here mutates the catalog.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::RoutingResult;
use crate::transaction::FreshnessBound;

/// A mapping from each required partition to the ordered set of column
/// placements used to read it. `BTreeMap` keeps iteration in ascending
/// `PartitionId` order, which the joined-scan cache relies on when unioning
/// per-partition scans (spec §4.3).
pub type Distribution = BTreeMap<PartitionId, Vec<ColumnPlacement>>;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

id_newtype!(TableId);
id_newtype!(ColumnId);
id_newtype!(PartitionId);
id_newtype!(StoreId);

/// How a table is split and/or replicated across stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitioningKind {
    None,
    HorizontalRange,
    HorizontalHash,
    Vertical,
    Replicated,
    Mixed,
}

impl PartitioningKind {
    pub fn is_horizontal(self) -> bool {
        matches!(self, PartitioningKind::HorizontalRange | PartitioningKind::HorizontalHash)
    }
}

/// The role a partition placement plays; every partition has exactly one
/// `Primary` placement (catalog invariant, spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlacementRole {
    Primary,
    Refreshable,
    Outdated,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub id: ColumnId,
    pub table: TableId,
    pub declared_type: String,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub id: TableId,
    pub columns: Vec<ColumnId>,
    pub partitioning: PartitioningKind,
    pub data_placements: Vec<StoreId>,
    pub supports_outdated: bool,
    /// Tie-break order used by the freshness resolver (§4.4 of SPEC_FULL).
    pub preferred_stores: Vec<StoreId>,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub id: PartitionId,
    pub table: TableId,
}

/// The pair (column, store). Invariant (spec §3): for every partition of the
/// column's table there exists at least one column placement covering
/// (column, partition) on some store, unless the column is marked unplaced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnPlacement {
    pub column: ColumnId,
    pub store: StoreId,
}

/// The triple (partition, store, role). Invariant: every partition has
/// exactly one PRIMARY placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlacement {
    pub partition: PartitionId,
    pub store: StoreId,
    pub role: PlacementRole,
    pub staleness: FreshnessBound,
}

/// Read-only lookup of tables, columns, partitions, and placements.
///
/// Object-safe so production code injects a live MVCC-snapshotted catalog
/// while tests inject `fixture::FixtureCatalog`.
pub trait CatalogView: Send + Sync {
    fn get_table(&self, id: TableId) -> RoutingResult<Table>;
    fn get_column(&self, id: ColumnId) -> RoutingResult<Column>;
    fn placements_of(&self, table: TableId) -> RoutingResult<Vec<ColumnPlacement>>;
    fn partition_placements(&self, partition: PartitionId) -> RoutingResult<Vec<PartitionPlacement>>;
    fn partitions_of(&self, table: TableId) -> RoutingResult<Vec<Partition>>;
    fn supports_outdated(&self, table: TableId) -> RoutingResult<bool>;

    /// Column placements that cover `column` on `partition`, across all stores.
    fn column_placements(
        &self,
        column: ColumnId,
        partition: PartitionId,
    ) -> RoutingResult<Vec<ColumnPlacement>>;
}

/// `partitions_of(table)` restricted to a caller-supplied set, preserving
/// ascending `PartitionId` order (required for the deterministic union
/// ordering the set-op and horizontal-partitioning scenarios rely on).
pub fn ordered_partitions(
    catalog: &dyn CatalogView,
    table: TableId,
    wanted: &BTreeSet<PartitionId>,
) -> RoutingResult<Vec<Partition>> {
    let mut all = catalog.partitions_of(table)?;
    all.retain(|p| wanted.is_empty() || wanted.contains(&p.id));
    all.sort_by_key(|p| p.id);
    Ok(all)
}

pub mod fixture {
    use std::collections::HashMap;

    use super::*;
    use crate::error::RoutingError;

    /// An in-memory catalog snapshot for tests.
    #[derive(Debug, Default)]
    pub struct FixtureCatalog {
        pub tables: HashMap<TableId, Table>,
        pub columns: HashMap<ColumnId, Column>,
        pub partitions: HashMap<TableId, Vec<Partition>>,
        pub column_placements: HashMap<(ColumnId, PartitionId), Vec<ColumnPlacement>>,
        pub all_placements_of_table: HashMap<TableId, Vec<ColumnPlacement>>,
        pub partition_placements: HashMap<PartitionId, Vec<PartitionPlacement>>,
    }

    impl CatalogView for FixtureCatalog {
        fn get_table(&self, id: TableId) -> RoutingResult<Table> {
            self.tables
                .get(&id)
                .cloned()
                .ok_or_else(|| RoutingError::CatalogInconsistency(format!("no such table {:?}", id)))
        }

        fn get_column(&self, id: ColumnId) -> RoutingResult<Column> {
            self.columns
                .get(&id)
                .cloned()
                .ok_or_else(|| RoutingError::CatalogInconsistency(format!("no such column {:?}", id)))
        }

        fn placements_of(&self, table: TableId) -> RoutingResult<Vec<ColumnPlacement>> {
            Ok(self.all_placements_of_table.get(&table).cloned().unwrap_or_default())
        }

        fn partition_placements(&self, partition: PartitionId) -> RoutingResult<Vec<PartitionPlacement>> {
            self.partition_placements
                .get(&partition)
                .cloned()
                .ok_or_else(|| RoutingError::CatalogInconsistency(format!("no placements for partition {:?}", partition)))
        }

        fn partitions_of(&self, table: TableId) -> RoutingResult<Vec<Partition>> {
            self.partitions
                .get(&table)
                .cloned()
                .ok_or_else(|| RoutingError::CatalogInconsistency(format!("no such table {:?}", table)))
        }

        fn supports_outdated(&self, table: TableId) -> RoutingResult<bool> {
            Ok(self.get_table(table)?.supports_outdated)
        }

        fn column_placements(
            &self,
            column: ColumnId,
            partition: PartitionId,
        ) -> RoutingResult<Vec<ColumnPlacement>> {
            Ok(self.column_placements.get(&(column, partition)).cloned().unwrap_or_default())
        }
    }
}
