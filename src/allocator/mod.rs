// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Topology-aware CPU selection.
//!
//! [`allocate`] picks a concrete set of hardware threads out of the pool of
//! still-available CPUs: whole sockets first, then whole cores, then single
//! threads, with an optional fast path that confines a small request to one
//! fully-free socket. Every claimed slice immediately contributes the NUMA
//! memory nodes that travel with it, so the returned [`Allocation`] always
//! carries CPUs and memory nodes together.
//!
//! The ranking functions implement a deliberately ordered greedy heuristic,
//! not a globally optimal packing; the tie-break order is an operational
//! contract because it decides which physical CPUs a workload receives.

pub mod policy;

pub use policy::AllocationPolicy;

use log::debug;
use std::cmp::Ordering;

use crate::cpuset::{self, CpuSet, MemSet};
use crate::topology::numa::NumaTopology;
use crate::topology::{CpuDetails, CpuTopology};

/// Result of one allocation call: the chosen CPU IDs and the memory-node IDs
/// that accompany them. The two sets are kept separate end to end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Chosen hardware-thread IDs; always a subset of the caller's pool.
    pub cpus: CpuSet,
    /// Memory-node IDs co-resident with the chosen CPUs; `{0}` for non-NUMA
    /// workloads. May be empty when the NUMA map does not cover the CPUs.
    pub mems: MemSet,
}

impl Allocation {
    /// Canonical range-compressed rendering of the CPU set, as written into
    /// `cpuset.cpus`.
    pub fn cpus_string(&self) -> String {
        cpuset::format_cpu_list(&self.cpus)
    }

    /// Canonical range-compressed rendering of the memory-node set, as
    /// written into `cpuset.mems`.
    pub fn mems_string(&self) -> String {
        cpuset::format_cpu_list(&self.mems)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request can never be satisfied from the supplied pool. Detected
    /// before any phase runs.
    #[error("not enough cpus available to satisfy request: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Number of CPUs asked for.
        requested: usize,
        /// Number of CPUs actually usable from the supplied pool.
        available: usize,
    },
    /// All phases ran without reaching satisfaction despite the capacity
    /// check passing; indicates corrupted bookkeeping or topology data.
    #[error("failed to allocate cpus")]
    Exhausted,
}

/// Tracks the progress of one allocation call: the remaining need, the
/// shrinking view of still-available CPUs and the in-progress result.
struct CpuAccumulator<'a> {
    topo: &'a CpuTopology,
    numa: &'a NumaTopology,
    policy: AllocationPolicy,
    /// Availability view: placements restricted to CPUs not yet taken.
    /// Disjoint from `cpus` at every step.
    details: CpuDetails,
    needed: usize,
    cpus: CpuSet,
    mems: MemSet,
}

/// Per-core sort keys for the free-CPU ranking, in strict priority order.
struct CoreRank {
    /// Count of already-claimed CPUs on the core's socket (descending).
    colo_score: usize,
    /// Count of still-available CPUs on the core's socket (ascending).
    socket_free: usize,
    /// Count of still-available CPUs on the core (ascending).
    core_free: usize,
    socket_id: usize,
    core_id: usize,
}

impl<'a> CpuAccumulator<'a> {
    fn new(
        topo: &'a CpuTopology,
        available: &CpuSet,
        requested: usize,
        policy: AllocationPolicy,
        numa: &'a NumaTopology,
    ) -> Self {
        CpuAccumulator {
            topo,
            numa,
            policy,
            details: topo.cpu_details.keep_only(available),
            needed: requested,
            cpus: CpuSet::new(),
            mems: MemSet::new(),
        }
    }

    /// Claim a slice of CPUs: derive the accompanying memory nodes, move the
    /// slice from the availability view into the result and shrink the need.
    fn take(&mut self, slice: &CpuSet) {
        let mems = if self.policy.numa_aware {
            self.numa.mems_for_cpus(slice)
        } else {
            // Non-NUMA workloads stay on the default memory node.
            std::iter::once(0).collect()
        };

        self.cpus.extend(slice.iter().copied());
        self.mems.extend(mems);
        self.details.remove_all(slice);
        self.needed = self.needed.saturating_sub(slice.len());
    }

    /// True iff no thread of the socket has been taken or excluded.
    fn is_socket_free(&self, socket_id: usize) -> bool {
        self.details.cpus_in_socket(socket_id).len() == self.topo.cpus_per_socket()
    }

    /// True iff no thread of the core has been taken or excluded.
    fn is_core_free(&self, core_id: usize) -> bool {
        self.details.cpus_in_core(core_id).len() == self.topo.cpus_per_core()
    }

    /// Fully-free socket IDs, ascending.
    fn free_sockets(&self) -> Vec<usize> {
        self.details
            .sockets()
            .into_iter()
            .filter(|socket_id| self.is_socket_free(*socket_id))
            .collect()
    }

    /// Fully-free core IDs, sorted by: count of fully-free cores on the
    /// owning socket ascending, then socket ID, then core ID. A valid
    /// `restrict_socket` confines the search to that socket; an unknown one
    /// leaves all sockets in play.
    fn free_cores(&self, restrict_socket: Option<usize>) -> Vec<usize> {
        let mut socket_ids: Vec<usize> = self.details.sockets().into_iter().collect();

        if let Some(socket_id) = restrict_socket {
            if socket_ids.contains(&socket_id) {
                socket_ids = vec![socket_id];
            }
        }

        let free_core_count = |socket_id: usize| -> usize {
            self.details
                .cores_in_socket(socket_id)
                .into_iter()
                .filter(|core_id| self.is_core_free(*core_id))
                .count()
        };
        socket_ids.sort_by(|a, b| {
            free_core_count(*a)
                .cmp(&free_core_count(*b))
                .then_with(|| a.cmp(b))
        });

        let mut core_ids = Vec::new();
        for socket_id in socket_ids {
            core_ids.extend(
                self.details
                    .cores_in_socket(socket_id)
                    .into_iter()
                    .filter(|core_id| self.is_core_free(*core_id)),
            );
        }
        core_ids
    }

    /// Individual CPU IDs, including those on partially-taken cores, ranked
    /// by the five-key comparator: socket co-location with the result
    /// descending, available CPUs on the socket ascending, available CPUs on
    /// the core ascending, socket ID, core ID. Candidates are grouped per
    /// core; each core contributes its available CPUs in ascending ID order.
    fn free_cpus(&self, restrict_socket: Option<usize>) -> Vec<usize> {
        let mut ranked: Vec<CoreRank> = Vec::new();

        for core_id in self.details.cores() {
            let socket_id = match self.socket_of_core(core_id) {
                Some(socket_id) => socket_id,
                None => continue,
            };
            if let Some(restricted) = restrict_socket {
                if socket_id != restricted {
                    continue;
                }
            }

            ranked.push(CoreRank {
                colo_score: self
                    .topo
                    .cpu_details
                    .cpus_in_socket(socket_id)
                    .intersection(&self.cpus)
                    .count(),
                socket_free: self.details.cpus_in_socket(socket_id).len(),
                core_free: self.details.cpus_in_core(core_id).len(),
                socket_id,
                core_id,
            });
        }

        ranked.sort_by(compare_core_ranks);

        let mut cpu_ids = Vec::new();
        for rank in ranked {
            cpu_ids.extend(self.details.cpus_in_core(rank.core_id));
        }
        cpu_ids
    }

    /// Socket hosting the core's first CPU, per the full topology.
    fn socket_of_core(&self, core_id: usize) -> Option<usize> {
        let core_cpus = self.topo.cpu_details.cpus_in_core(core_id);
        let first_cpu = core_cpus.iter().next()?;
        self.topo
            .cpu_details
            .get(*first_cpu)
            .map(|location| location.socket_id)
    }

    fn needs(&self, n: usize) -> bool {
        self.needed >= n
    }

    fn needs_lt(&self, n: usize) -> bool {
        self.needed < n
    }

    fn is_satisfied(&self) -> bool {
        self.needed == 0
    }

    /// True iff the need exceeds everything the availability view still
    /// holds, so not even taking it all would satisfy the request.
    fn is_failed(&self) -> bool {
        self.needed > self.details.len()
    }

    fn into_allocation(self) -> Allocation {
        Allocation {
            cpus: self.cpus,
            mems: self.mems,
        }
    }
}

fn compare_core_ranks(a: &CoreRank, b: &CoreRank) -> Ordering {
    b.colo_score
        .cmp(&a.colo_score)
        .then_with(|| a.socket_free.cmp(&b.socket_free))
        .then_with(|| a.core_free.cmp(&b.core_free))
        .then_with(|| a.socket_id.cmp(&b.socket_id))
        .then_with(|| a.core_id.cmp(&b.core_id))
}

/// Pick `requested` CPUs out of `available`, topology-aware best-fit.
///
/// Deterministic and total: identical inputs always yield the identical
/// result. Either the full request is satisfied or an error is returned;
/// there is no partial result.
pub fn allocate(
    topo: &CpuTopology,
    available: &CpuSet,
    requested: usize,
    policy: AllocationPolicy,
    numa: &NumaTopology,
) -> Result<Allocation, Error> {
    let mut acc = CpuAccumulator::new(topo, available, requested, policy, numa);
    if acc.is_satisfied() {
        return Ok(acc.into_allocation());
    }
    if acc.is_failed() {
        return Err(Error::InsufficientCapacity {
            requested,
            available: acc.details.len(),
        });
    }

    // 0. Socket-exclusive fast path: serve a request that fits inside one
    //    socket entirely from the first fully-free socket. Without a free
    //    socket the request degrades to the general phases below.
    if policy.separate_sockets && acc.needs_lt(topo.cpus_per_socket()) {
        if let Some(socket_id) = acc.free_sockets().first().copied() {
            debug!(
                "allocate: claiming whole or part of socket [{}] for exclusive placement",
                socket_id
            );
            // a) the whole socket, if the need still covers it
            if acc.needs(topo.cpus_per_socket()) {
                let slice = acc.details.cpus_in_socket(socket_id);
                acc.take(&slice);
                if acc.is_satisfied() {
                    return Ok(acc.into_allocation());
                }
            }

            // b) whole free cores of that socket, while the need covers one
            if acc.needs(topo.cpus_per_core()) {
                for core_id in acc.free_cores(Some(socket_id)) {
                    if acc.needs_lt(topo.cpus_per_core()) {
                        break;
                    }
                    let slice = acc.details.cpus_in_core(core_id);
                    acc.take(&slice);
                    if acc.is_satisfied() {
                        return Ok(acc.into_allocation());
                    }
                }
            }

            // c) single threads of that socket
            for cpu_id in acc.free_cpus(Some(socket_id)) {
                if acc.needs(1) {
                    let slice = std::iter::once(cpu_id).collect();
                    acc.take(&slice);
                }
                if acc.is_satisfied() {
                    return Ok(acc.into_allocation());
                }
            }
        }
    }

    // 1. Whole sockets, while the request still covers a socket's worth.
    if acc.needs(topo.cpus_per_socket()) {
        for socket_id in acc.free_sockets() {
            debug!("allocate: claiming socket [{}]", socket_id);
            let slice = acc.details.cpus_in_socket(socket_id);
            acc.take(&slice);
            if acc.is_satisfied() {
                return Ok(acc.into_allocation());
            }
            if !acc.needs(topo.cpus_per_socket()) {
                break;
            }
        }
    }

    // 2. Whole cores, while the request still covers a core's worth.
    if acc.needs(topo.cpus_per_core()) {
        for core_id in acc.free_cores(None) {
            debug!("allocate: claiming core [{}]", core_id);
            let slice = acc.details.cpus_in_core(core_id);
            acc.take(&slice);
            if acc.is_satisfied() {
                return Ok(acc.into_allocation());
            }
            if !acc.needs(topo.cpus_per_core()) {
                break;
            }
        }
    }

    // 3. Single threads, preferring to fill partially-allocated cores on the
    //    sockets already claimed by this request.
    for cpu_id in acc.free_cpus(None) {
        debug!("allocate: claiming CPU [{}]", cpu_id);
        if acc.needs(1) {
            let slice = std::iter::once(cpu_id).collect();
            acc.take(&slice);
        }
        if acc.is_satisfied() {
            return Ok(acc.into_allocation());
        }
    }

    // Unreachable when the capacity pre-check holds; surfaced loudly because
    // it means the bookkeeping or the topology data is corrupted.
    Err(Error::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::topology::numa::NumaNode;
    use crate::topology::CpuLocation;

    /// `sockets` x `cores` x `threads` with sequentially numbered IDs.
    fn uniform_topology(sockets: usize, cores: usize, threads: usize) -> CpuTopology {
        let mut details = CpuDetails::new();
        for socket in 0..sockets {
            for core in 0..cores {
                for thread in 0..threads {
                    let cpu_id = socket * cores * threads + core * threads + thread;
                    details.insert(
                        cpu_id,
                        CpuLocation {
                            socket_id: socket,
                            core_id: socket * cores + core,
                        },
                    );
                }
            }
        }
        CpuTopology::new(details)
    }

    /// One NUMA node per socket, memory node ID equal to the socket ID.
    fn per_socket_numa(topo: &CpuTopology) -> NumaTopology {
        let mut nodes = BTreeMap::new();
        for socket_id in topo.cpu_details.sockets() {
            nodes.insert(
                socket_id,
                NumaNode {
                    cpus: topo.cpu_details.cpus_in_socket(socket_id),
                    mems: std::iter::once(socket_id).collect(),
                },
            );
        }
        NumaTopology::new(nodes)
    }

    fn accumulator<'a>(
        topo: &'a CpuTopology,
        numa: &'a NumaTopology,
        available: &CpuSet,
        requested: usize,
    ) -> CpuAccumulator<'a> {
        CpuAccumulator::new(topo, available, requested, AllocationPolicy::default(), numa)
    }

    #[test]
    fn test_socket_and_core_freeness() {
        let topo = uniform_topology(2, 2, 2);
        let numa = per_socket_numa(&topo);
        let available: CpuSet = (1..8).collect();
        let acc = accumulator(&topo, &numa, &available, 2);

        // CPU 0 is out of the pool: socket 0 and core 0 are not free.
        assert!(!acc.is_socket_free(0));
        assert!(!acc.is_core_free(0));
        assert!(acc.is_socket_free(1));
        assert!(acc.is_core_free(1));
        assert_eq!(acc.free_sockets(), vec![1]);
    }

    /// Tests that free cores are ranked by how close their socket is to
    /// being exhausted, sockets with fewer whole cores first.
    #[test]
    fn test_free_cores_prefers_nearly_full_sockets() {
        let topo = uniform_topology(2, 2, 2);
        let numa = per_socket_numa(&topo);
        let available: CpuSet = (1..8).collect();
        let acc = accumulator(&topo, &numa, &available, 2);

        // Socket 0 has one whole core left (core 1), socket 1 has two.
        assert_eq!(acc.free_cores(None), vec![1, 2, 3]);
        assert_eq!(acc.free_cores(Some(1)), vec![2, 3]);
        // Unknown restriction leaves all sockets in play.
        assert_eq!(acc.free_cores(Some(9)), vec![1, 2, 3]);
    }

    /// Tests the five-key free-CPU ranking: co-location with the result
    /// dominates, then nearly-exhausted sockets, then nearly-full cores.
    #[test]
    fn test_free_cpus_ranking() {
        let topo = uniform_topology(2, 2, 2);
        let numa = per_socket_numa(&topo);
        let available: CpuSet = (0..8).collect();
        let mut acc = accumulator(&topo, &numa, &available, 4);

        let slice: CpuSet = std::iter::once(4).collect();
        acc.take(&slice);

        // Socket 1 hosts the result, so its cores come first; within it the
        // partially-taken core 2 precedes the whole core 3.
        assert_eq!(acc.free_cpus(None), vec![5, 6, 7, 0, 1, 2, 3]);
        assert_eq!(acc.free_cpus(Some(0)), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_take_keeps_result_and_availability_disjoint() {
        let topo = uniform_topology(2, 2, 2);
        let numa = per_socket_numa(&topo);
        let available: CpuSet = (0..8).collect();
        let mut acc = accumulator(&topo, &numa, &available, 4);

        let slice: CpuSet = [0, 1].iter().copied().collect();
        acc.take(&slice);

        assert_eq!(acc.needed, 2);
        assert!(acc.details.cpus().is_disjoint(&acc.cpus));
        assert_eq!(acc.mems, std::iter::once(0).collect());

        let slice: CpuSet = [2, 3].iter().copied().collect();
        acc.take(&slice);

        assert!(acc.is_satisfied());
        assert!(acc.details.cpus().is_disjoint(&acc.cpus));
    }

    #[test]
    fn test_needs_boundaries() {
        let topo = uniform_topology(1, 1, 2);
        let numa = per_socket_numa(&topo);
        let available: CpuSet = (0..2).collect();
        let acc = accumulator(&topo, &numa, &available, 2);

        assert!(acc.needs(2));
        assert!(!acc.needs(3));
        assert!(acc.needs_lt(3));
        assert!(!acc.needs_lt(2));
        assert!(!acc.is_satisfied());
        assert!(!acc.is_failed());

        let acc = accumulator(&topo, &numa, &available, 3);
        assert!(acc.is_failed());
    }
}
