// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Serializable structures backing the CLI's JSON output.

use serde::Serialize;

use crate::allocator::Allocation;
use crate::config::PinRequest;
use crate::topology::CpuTopology;

/// Description of one allocation, as printed by `cpualloc allocate`.
#[derive(Serialize)]
pub struct AllocationInfo {
    #[serde(rename(serialize = "RequestedCPUs"))]
    pub requested: usize,
    #[serde(rename(serialize = "CPUIDs"))]
    pub cpu_ids: Vec<usize>,
    #[serde(rename(serialize = "CpusetCpus"))]
    pub cpuset_cpus: String,
    #[serde(rename(serialize = "CpusetMems"))]
    pub cpuset_mems: String,
}

impl AllocationInfo {
    pub fn new(requested: usize, allocation: &Allocation) -> Self {
        AllocationInfo {
            requested,
            cpu_ids: allocation.cpus.iter().copied().collect(),
            cpuset_cpus: allocation.cpus_string(),
            cpuset_mems: allocation.mems_string(),
        }
    }
}

/// Description of one planned workload, as printed by `cpualloc plan`.
#[derive(Serialize)]
pub struct PlanInfo {
    #[serde(rename(serialize = "WorkloadName"))]
    pub name: String,
    #[serde(rename(serialize = "RequestedCPUs"))]
    pub requested: usize,
    #[serde(rename(serialize = "CpusetCpus"))]
    pub cpuset_cpus: String,
    #[serde(rename(serialize = "CpusetMems"))]
    pub cpuset_mems: String,
}

impl PlanInfo {
    pub fn new(request: &PinRequest, allocation: &Allocation) -> Self {
        PlanInfo {
            name: request.name.clone(),
            requested: request.cpu_count,
            cpuset_cpus: allocation.cpus_string(),
            cpuset_mems: allocation.mems_string(),
        }
    }
}

/// Description of the host CPU hierarchy, as printed by
/// `cpualloc describe-topology`.
#[derive(Serialize)]
pub struct TopologyInfo {
    #[serde(rename(serialize = "NumberOfCPUs"))]
    pub num_cpus: usize,
    #[serde(rename(serialize = "NumberOfCores"))]
    pub num_cores: usize,
    #[serde(rename(serialize = "NumberOfSockets"))]
    pub num_sockets: usize,
    #[serde(rename(serialize = "CPUsPerSocket"))]
    pub cpus_per_socket: usize,
    #[serde(rename(serialize = "CPUsPerCore"))]
    pub cpus_per_core: usize,
}

impl TopologyInfo {
    pub fn new(topo: &CpuTopology) -> Self {
        TopologyInfo {
            num_cpus: topo.num_cpus,
            num_cores: topo.num_cores,
            num_sockets: topo.num_sockets,
            cpus_per_socket: topo.cpus_per_socket(),
            cpus_per_core: topo.cpus_per_core(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cpuset::{CpuSet, MemSet};

    #[test]
    fn test_allocation_info_rendering() {
        let allocation = Allocation {
            cpus: [0, 1, 4].iter().copied().collect::<CpuSet>(),
            mems: [0, 1].iter().copied().collect::<MemSet>(),
        };
        let info = AllocationInfo::new(3, &allocation);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["RequestedCPUs"], 3);
        assert_eq!(json["CPUIDs"], serde_json::json!([0, 1, 4]));
        assert_eq!(json["CpusetCpus"], "0-1,4");
        assert_eq!(json["CpusetMems"], "0-1");
    }
}
