// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Top-level error type and the stable error-code table.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Any error surfaced by the library, one variant per module.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Allocation(#[from] crate::allocator::Error),
    #[error(transparent)]
    Discovery(#[from] crate::topology::discovery::Error),
    #[error(transparent)]
    CpuList(#[from] crate::cpuset::Error),
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error(transparent)]
    Cgroup(#[from] crate::cgroup::Error),
    #[error(transparent)]
    Logger(#[from] crate::logger::Error),
}

/// Error families with stable, documented identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ErrorKind {
    InsufficientCapacity,
    AllocationExhausted,
    Discovery,
    CpuList,
    Config,
    Cgroup,
    Logger,
}

lazy_static! {
    static ref ERROR_CODES: HashMap<ErrorKind, &'static str> = vec![
        (ErrorKind::InsufficientCapacity, "E01"),
        (ErrorKind::AllocationExhausted, "E02"),
        (ErrorKind::Discovery, "E03"),
        (ErrorKind::CpuList, "E04"),
        (ErrorKind::Config, "E05"),
        (ErrorKind::Cgroup, "E06"),
        (ErrorKind::Logger, "E07"),
    ]
    .into_iter()
    .collect();
}

impl Error {
    /// Stable identifier reported alongside the message, usable in runbooks
    /// and support tickets independently of the message wording.
    pub fn code(&self) -> &'static str {
        let kind = match self {
            Error::Allocation(crate::allocator::Error::InsufficientCapacity { .. }) => {
                ErrorKind::InsufficientCapacity
            }
            Error::Allocation(crate::allocator::Error::Exhausted) => ErrorKind::AllocationExhausted,
            Error::Discovery(_) => ErrorKind::Discovery,
            Error::CpuList(_) => ErrorKind::CpuList,
            Error::Config(_) => ErrorKind::Config,
            Error::Cgroup(_) => ErrorKind::Cgroup,
            Error::Logger(_) => ErrorKind::Logger,
        };
        ERROR_CODES.get(&kind).copied().unwrap_or("E00")
    }
}
