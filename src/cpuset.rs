// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! CPU-list string handling.
//!
//! The kernel's cpuset interface renders ID sets as range-compressed comma
//! strings (`"1,3-5,7"`). Both `cpuset.cpus` and `cpuset.mems` use this
//! syntax, so the same parse/format pair serves CPU IDs and memory-node IDs.

use std::collections::BTreeSet;

/// Set of hardware-thread (logical CPU) IDs.
pub type CpuSet = BTreeSet<usize>;

/// Set of NUMA memory-node IDs. Distinct from [`CpuSet`] so CPU IDs and
/// memory-node IDs never share one container.
pub type MemSet = BTreeSet<usize>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("invalid range `{0}`, start exceeds end")]
    InvalidRange(String),
}

/// Parse a range-compressed ID list (`"1,3-5,7"`) into a set.
pub fn parse_cpu_list(list: &str) -> Result<CpuSet, Error> {
    let mut set = CpuSet::new();

    for entry in list.trim().split_terminator(',') {
        match entry.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.parse()?;
                let end: usize = end.parse()?;
                if start > end {
                    return Err(Error::InvalidRange(entry.to_string()));
                }
                set.extend(start..=end);
            }
            None => {
                set.insert(entry.parse()?);
            }
        }
    }

    Ok(set)
}

/// Format a set of IDs as the canonical range-compressed list. Consecutive
/// runs collapse into `start-end` ranges; the empty set renders as `""`.
pub fn format_cpu_list(set: &BTreeSet<usize>) -> String {
    let mut iter = set.iter().copied();
    let mut start = match iter.next() {
        Some(id) => id,
        None => return String::new(),
    };
    let mut end = start;

    let mut ranges: Vec<String> = Vec::new();
    for id in iter {
        if id == end + 1 {
            end = id;
        } else {
            ranges.push(format_range(start, end));
            start = id;
            end = id;
        }
    }
    ranges.push(format_range(start, end));

    ranges.join(",")
}

fn format_range(start: usize, end: usize) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}
