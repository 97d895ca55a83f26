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

//! Rewrites a logical algebra tree into one or more candidate physical
//! algebra trees against Polypheny's polystore placements, honoring a
//! transaction's freshness tolerance and taking the locks a regular read
//! requires. See [`driver::route`] for the entry point.

pub mod algebra;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod freshness;
pub mod locking;
pub mod query_info;
pub mod scan_cache;
pub mod strategy;
pub mod transaction;

pub use algebra::{LogicalArena, LogicalNode, PhysicalNode, PlanArena, PlanBuilder, PlanId, RoutingPlan, SetOpKind, UnsupportedKind};
pub use catalog::{CatalogView, ColumnId, PartitionId, StoreId, TableId};
pub use driver::route;
pub use error::{RoutingError, RoutingResult};
pub use freshness::FreshnessResolver;
pub use locking::LockAcquirer;
pub use query_info::QueryInformation;
pub use scan_cache::ScanCache;
pub use strategy::{FullReplication, MinCost, PlacementStrategy, SinglePlacement};
pub use transaction::{FreshnessBound, TransactionContext};
