// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Sysfs-based discovery of the CPU and NUMA topologies.
//!
//! The readers are parameterized on their directory roots so tests can point
//! them at synthetic trees; the public entry points bind the standard sysfs
//! locations.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::numa::{NumaNode, NumaTopology};
use super::{CpuDetails, CpuLocation, CpuTopology};
use crate::cpuset;

/// Directory holding one `cpu<N>` entry per possible CPU.
const SYSFS_CPU_DIR: &str = "/sys/devices/system/cpu";

/// Directory holding one `node<N>` entry per NUMA node.
const SYSFS_NODE_DIR: &str = "/sys/devices/system/node";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    #[error(transparent)]
    CpuList(#[from] crate::cpuset::Error),
    #[error("unexpected sysfs file structure")]
    UnexpectedFileStructure,
    #[error("no CPUs found under `{0}`")]
    EmptyTopology(String),
}

/// Read the host CPU topology from sysfs.
pub fn discover_cpu_topology() -> Result<CpuTopology, Error> {
    cpu_topology_from(Path::new(SYSFS_CPU_DIR))
}

/// Read the host NUMA topology from sysfs.
pub fn discover_numa_topology() -> Result<NumaTopology, Error> {
    numa_topology_from(Path::new(SYSFS_NODE_DIR))
}

/// IDs of the `<prefix><N>` entries in a directory, ascending. Entries whose
/// suffix is not numeric (`cpufreq`, `cpuidle`, ...) are skipped.
fn numbered_entries(dir: &Path, prefix: &str) -> Result<Vec<usize>, Error> {
    let mut ids = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_str().ok_or(Error::UnexpectedFileStructure)?;

        if let Some(raw_id) = name.strip_prefix(prefix) {
            if let Ok(id) = raw_id.parse::<usize>() {
                ids.push(id);
            }
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

fn read_id_file(path: &Path) -> Result<usize, Error> {
    Ok(fs::read_to_string(path)?.trim().parse()?)
}

pub(crate) fn cpu_topology_from(cpu_dir: &Path) -> Result<CpuTopology, Error> {
    let mut placements: Vec<(usize, usize, usize)> = Vec::new();

    for cpu_id in numbered_entries(cpu_dir, "cpu")? {
        let topology_dir = cpu_dir.join(format!("cpu{}", cpu_id)).join("topology");
        // A `cpu<N>` entry without a topology directory is an offline CPU.
        if !topology_dir.is_dir() {
            continue;
        }

        let socket_id = read_id_file(&topology_dir.join("physical_package_id"))?;
        let core_id = read_id_file(&topology_dir.join("core_id"))?;
        placements.push((cpu_id, socket_id, core_id));
    }

    if placements.is_empty() {
        return Err(Error::EmptyTopology(cpu_dir.display().to_string()));
    }

    // Sysfs core IDs repeat across sockets; renumber the (socket, core)
    // pairs into machine-unique core IDs, densely, in ascending pair order.
    let pairs: BTreeSet<(usize, usize)> = placements
        .iter()
        .map(|(_, socket_id, core_id)| (*socket_id, *core_id))
        .collect();
    let core_index: BTreeMap<(usize, usize), usize> = pairs
        .into_iter()
        .enumerate()
        .map(|(index, pair)| (pair, index))
        .collect();

    let mut details = CpuDetails::new();
    for (cpu_id, socket_id, core_id) in placements {
        let unique_core_id = core_index
            .get(&(socket_id, core_id))
            .copied()
            .ok_or(Error::UnexpectedFileStructure)?;
        details.insert(
            cpu_id,
            CpuLocation {
                socket_id,
                core_id: unique_core_id,
            },
        );
    }

    let topo = CpuTopology::new(details);
    debug!(
        "discovered {} CPUs over {} cores and {} sockets",
        topo.num_cpus, topo.num_cores, topo.num_sockets
    );
    Ok(topo)
}

pub(crate) fn numa_topology_from(node_dir: &Path) -> Result<NumaTopology, Error> {
    let mut nodes = BTreeMap::new();

    for node_id in numbered_entries(node_dir, "node")? {
        let cpulist_path = node_dir.join(format!("node{}", node_id)).join("cpulist");
        let raw_list = fs::read_to_string(&cpulist_path)?;
        let cpus = cpuset::parse_cpu_list(&raw_list)?;

        // cpuset.mems has NUMA-node granularity, not memory-block granularity.
        let mems = std::iter::once(node_id).collect();
        nodes.insert(node_id, NumaNode { cpus, mems });
    }

    debug!("discovered {} NUMA nodes", nodes.len());
    Ok(NumaTopology::new(nodes))
}
