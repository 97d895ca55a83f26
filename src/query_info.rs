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

//! Per-query precomputed view (C2): which columns are touched per table,
//! and which partition IDs are touched per scan node. Built upstream by the
//! planner pipeline; read-only here.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::algebra::PlanId;
use crate::catalog::{ColumnId, PartitionId, TableId};

#[derive(Debug, Clone, Default)]
pub struct QueryInformation {
    columns_used: HashMap<TableId, HashSet<ColumnId>>,
    partitions_accessed: HashMap<PlanId, BTreeSet<PartitionId>>,
}

impl QueryInformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns_used(mut self, table: TableId, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.columns_used.entry(table).or_default().extend(columns);
        self
    }

    pub fn with_partitions_accessed(
        mut self,
        scan: PlanId,
        partitions: impl IntoIterator<Item = PartitionId>,
    ) -> Self {
        self.partitions_accessed.entry(scan).or_default().extend(partitions);
        self
    }

    pub fn columns_used(&self, table: TableId) -> HashSet<ColumnId> {
        self.columns_used.get(&table).cloned().unwrap_or_default()
    }

    /// `None` means "no entry for this scan" — the driver treats that as
    /// "all partitions of the table" (spec §4.2), which requires a catalog
    /// lookup the driver, not this read-only view, performs.
    pub fn partitions_accessed(&self, scan: PlanId) -> Option<BTreeSet<PartitionId>> {
        self.partitions_accessed.get(&scan).cloned()
    }
}
