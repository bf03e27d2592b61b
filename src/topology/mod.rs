// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Static description of the host's socket/core/thread hierarchy.

pub mod discovery;
pub mod numa;

use std::collections::{BTreeMap, BTreeSet};

use crate::cpuset::CpuSet;

/// Physical placement of a single hardware thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLocation {
    /// The socket (physical package) hosting the CPU.
    pub socket_id: usize,
    /// The physical core hosting the CPU. Core IDs are unique across the
    /// whole machine, not per socket.
    pub core_id: usize,
}

/// Ordered map from logical CPU ID to its physical placement.
///
/// A full map describes the machine; a map restricted through [`keep_only`]
/// serves as the shrinking view of still-available CPUs during allocation.
///
/// [`keep_only`]: CpuDetails::keep_only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuDetails {
    entries: BTreeMap<usize, CpuLocation>,
}

impl CpuDetails {
    /// Create an empty map.
    pub fn new() -> Self {
        CpuDetails {
            entries: BTreeMap::new(),
        }
    }

    /// Record the placement of one CPU.
    pub fn insert(&mut self, cpu_id: usize, location: CpuLocation) {
        self.entries.insert(cpu_id, location);
    }

    /// Placement of the given CPU, if known.
    pub fn get(&self, cpu_id: usize) -> Option<CpuLocation> {
        self.entries.get(&cpu_id).copied()
    }

    /// Number of CPUs described by this map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff the map describes no CPUs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this map restricted to the given CPU IDs.
    pub fn keep_only(&self, cpus: &CpuSet) -> CpuDetails {
        CpuDetails {
            entries: self
                .entries
                .iter()
                .filter(|(cpu_id, _)| cpus.contains(cpu_id))
                .map(|(cpu_id, location)| (*cpu_id, *location))
                .collect(),
        }
    }

    /// Drop the given CPU IDs from the map.
    pub fn remove_all(&mut self, cpus: &CpuSet) {
        for cpu_id in cpus {
            self.entries.remove(cpu_id);
        }
    }

    /// All CPU IDs in the map.
    pub fn cpus(&self) -> CpuSet {
        self.entries.keys().copied().collect()
    }

    /// All socket IDs with at least one CPU in the map.
    pub fn sockets(&self) -> BTreeSet<usize> {
        self.entries.values().map(|location| location.socket_id).collect()
    }

    /// All core IDs with at least one CPU in the map.
    pub fn cores(&self) -> BTreeSet<usize> {
        self.entries.values().map(|location| location.core_id).collect()
    }

    /// CPU IDs on the given socket.
    pub fn cpus_in_socket(&self, socket_id: usize) -> CpuSet {
        self.entries
            .iter()
            .filter(|(_, location)| location.socket_id == socket_id)
            .map(|(cpu_id, _)| *cpu_id)
            .collect()
    }

    /// CPU IDs on the given core.
    pub fn cpus_in_core(&self, core_id: usize) -> CpuSet {
        self.entries
            .iter()
            .filter(|(_, location)| location.core_id == core_id)
            .map(|(cpu_id, _)| *cpu_id)
            .collect()
    }

    /// Core IDs on the given socket.
    pub fn cores_in_socket(&self, socket_id: usize) -> BTreeSet<usize> {
        self.entries
            .values()
            .filter(|location| location.socket_id == socket_id)
            .map(|location| location.core_id)
            .collect()
    }
}

/// Immutable description of the machine's CPU hierarchy, built once at
/// startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct CpuTopology {
    /// Total number of hardware threads.
    pub num_cpus: usize,
    /// Total number of physical cores.
    pub num_cores: usize,
    /// Total number of sockets.
    pub num_sockets: usize,
    /// Per-CPU placement map.
    pub cpu_details: CpuDetails,
}

impl CpuTopology {
    /// Build a topology from a per-CPU placement map, deriving the counts.
    pub fn new(cpu_details: CpuDetails) -> Self {
        let num_cpus = cpu_details.len();
        let num_cores = cpu_details.cores().len();
        let num_sockets = cpu_details.sockets().len();
        CpuTopology {
            num_cpus,
            num_cores,
            num_sockets,
            cpu_details,
        }
    }

    /// Hardware threads per socket, assuming a uniform machine.
    pub fn cpus_per_socket(&self) -> usize {
        if self.num_sockets == 0 {
            return 0;
        }
        self.num_cpus / self.num_sockets
    }

    /// Hardware threads per core, assuming a uniform machine.
    pub fn cpus_per_core(&self) -> usize {
        if self.num_cores == 0 {
            return 0;
        }
        self.num_cpus / self.num_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_details() -> CpuDetails {
        // 1 socket x 2 cores x 2 threads plus a second socket with one core.
        let mut details = CpuDetails::new();
        details.insert(0, CpuLocation { socket_id: 0, core_id: 0 });
        details.insert(1, CpuLocation { socket_id: 0, core_id: 0 });
        details.insert(2, CpuLocation { socket_id: 0, core_id: 1 });
        details.insert(3, CpuLocation { socket_id: 0, core_id: 1 });
        details.insert(4, CpuLocation { socket_id: 1, core_id: 2 });
        details.insert(5, CpuLocation { socket_id: 1, core_id: 2 });
        details
    }

    #[test]
    fn test_projections() {
        let details = sample_details();

        assert_eq!(details.len(), 6);
        assert_eq!(details.sockets().len(), 2);
        assert_eq!(details.cores().len(), 3);
        assert_eq!(details.cpus_in_socket(0).len(), 4);
        assert_eq!(details.cpus_in_core(2), [4, 5].iter().copied().collect());
        assert_eq!(details.cores_in_socket(0), [0, 1].iter().copied().collect());
        assert_eq!(details.get(4).map(|location| location.socket_id), Some(1));
        assert_eq!(details.get(42), None);
    }

    #[test]
    fn test_keep_only_and_remove_all() {
        let details = sample_details();
        let subset: CpuSet = [1, 2, 5].iter().copied().collect();

        let mut restricted = details.keep_only(&subset);
        assert_eq!(restricted.cpus(), subset);

        let removed: CpuSet = [2].iter().copied().collect();
        restricted.remove_all(&removed);
        assert_eq!(restricted.cpus(), [1, 5].iter().copied().collect());
    }

    #[test]
    fn test_derived_capacities() {
        let mut details = CpuDetails::new();
        for socket in 0..2 {
            for core in 0..2 {
                for thread in 0..2 {
                    let cpu_id = socket * 4 + core * 2 + thread;
                    details.insert(
                        cpu_id,
                        CpuLocation {
                            socket_id: socket,
                            core_id: socket * 2 + core,
                        },
                    );
                }
            }
        }
        let topo = CpuTopology::new(details);

        assert_eq!(topo.num_cpus, 8);
        assert_eq!(topo.num_cores, 4);
        assert_eq!(topo.num_sockets, 2);
        assert_eq!(topo.cpus_per_socket(), 4);
        assert_eq!(topo.cpus_per_core(), 2);
    }
}
