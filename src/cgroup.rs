// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Cpuset control-file updates.
//!
//! Writes an allocation's canonical CPU and memory-node strings into a cgroup
//! directory. Retry and backoff on write failure belong to the calling
//! resource manager, not here.

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::allocator::Allocation;

/// File controlling which CPUs the group's tasks may run on.
const CPUSET_CPUS_FILE: &str = "cpuset.cpus";

/// File controlling which memory nodes the group's tasks may allocate from.
const CPUSET_MEMS_FILE: &str = "cpuset.mems";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cgroup directory `{0}` does not exist")]
    MissingCgroupDir(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write `cpuset.cpus` and `cpuset.mems` for the given cgroup directory.
///
/// An allocation with an empty memory-node set writes an empty list; the
/// caller decided to tolerate degraded NUMA information by then.
pub fn apply_cpuset(cgroup_dir: &Path, allocation: &Allocation) -> Result<(), Error> {
    if !cgroup_dir.is_dir() {
        return Err(Error::MissingCgroupDir(cgroup_dir.to_path_buf()));
    }

    let cpus = allocation.cpus_string();
    let mems = allocation.mems_string();
    debug!(
        "updating cpuset files under {:?}: cpus=[{}] mems=[{}]",
        cgroup_dir, cpus, mems
    );

    fs::write(cgroup_dir.join(CPUSET_CPUS_FILE), cpus + "\n")?;
    fs::write(cgroup_dir.join(CPUSET_MEMS_FILE), mems + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cpuset::{CpuSet, MemSet};
    use tempfile::tempdir;

    #[test]
    fn test_apply_cpuset_writes_canonical_strings() {
        let dir = tempdir().unwrap();
        let allocation = Allocation {
            cpus: [0, 1, 2, 3, 6].iter().copied().collect::<CpuSet>(),
            mems: [0].iter().copied().collect::<MemSet>(),
        };

        apply_cpuset(dir.path(), &allocation).unwrap();

        let cpus = fs::read_to_string(dir.path().join(CPUSET_CPUS_FILE)).unwrap();
        let mems = fs::read_to_string(dir.path().join(CPUSET_MEMS_FILE)).unwrap();
        assert_eq!(cpus, "0-3,6\n");
        assert_eq!(mems, "0\n");
    }

    /// Tests that a degraded allocation without memory nodes still writes
    /// both control files.
    #[test]
    fn test_apply_cpuset_empty_mems() {
        let dir = tempdir().unwrap();
        let allocation = Allocation {
            cpus: [4].iter().copied().collect::<CpuSet>(),
            mems: MemSet::new(),
        };

        apply_cpuset(dir.path(), &allocation).unwrap();

        let mems = fs::read_to_string(dir.path().join(CPUSET_MEMS_FILE)).unwrap();
        assert_eq!(mems, "\n");
    }

    #[test]
    fn test_apply_cpuset_missing_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");

        let result = apply_cpuset(&missing, &Allocation::default());
        assert!(matches!(result, Err(Error::MissingCgroupDir(_))));
    }
}
