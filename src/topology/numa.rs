// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Per-node listing of the machine's NUMA memory domains.

use log::warn;
use std::collections::BTreeMap;

use crate::cpuset::{CpuSet, MemSet};

/// CPUs and memory nodes hosted by one NUMA node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumaNode {
    /// Logical CPU IDs on this node.
    pub cpus: CpuSet,
    /// Memory-node IDs accompanying these CPUs. cpuset.mems works at NUMA-node
    /// granularity, so this is usually the singleton `{node_id}`.
    pub mems: MemSet,
}

/// Immutable NUMA map, supplied fresh or cached by topology discovery.
#[derive(Debug, Clone, Default)]
pub struct NumaTopology {
    /// Number of NUMA nodes.
    pub num_nodes: usize,
    /// Node ID to hosted CPUs and memory nodes.
    pub nodes: BTreeMap<usize, NumaNode>,
}

impl NumaTopology {
    /// Build a NUMA map from per-node listings.
    pub fn new(nodes: BTreeMap<usize, NumaNode>) -> Self {
        NumaTopology {
            num_nodes: nodes.len(),
            nodes,
        }
    }

    /// Memory-node IDs of every NUMA node whose CPU list intersects `cpus`.
    ///
    /// An empty result for a non-empty argument means the NUMA map does not
    /// cover those CPUs; callers degrade to an empty `cpuset.mems`
    /// contribution instead of failing.
    pub fn mems_for_cpus(&self, cpus: &CpuSet) -> MemSet {
        let mut mems = MemSet::new();
        for node in self.nodes.values() {
            if !node.cpus.is_disjoint(cpus) {
                mems.extend(node.mems.iter().copied());
            }
        }

        if mems.is_empty() && !cpus.is_empty() {
            warn!("no NUMA node hosts any CPU of [{:?}]", cpus);
        }
        mems
    }

    /// NUMA node hosting the given CPU, if any.
    pub fn node_for_cpu(&self, cpu_id: usize) -> Option<usize> {
        self.nodes
            .iter()
            .find(|(_, node)| node.cpus.contains(&cpu_id))
            .map(|(node_id, _)| *node_id)
    }
}
