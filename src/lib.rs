// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Topology-aware CPU allocation for workload pinning.
//!
//! The crate picks hardware threads for a workload out of a pool of
//! still-available CPUs, preferring whole sockets, then whole cores, then
//! single threads, and derives the NUMA memory nodes that travel with the
//! chosen CPUs. The selection is rendered as the canonical range-compressed
//! strings a resource manager writes into a cgroup's `cpuset.cpus` and
//! `cpuset.mems` files.
//!
//! The allocation itself is a pure, synchronous computation; callers must
//! serialize allocate-and-commit cycles so two concurrent requests never
//! receive the same CPU.

pub mod allocator;
pub mod cgroup;
pub mod config;
pub mod cpuset;
pub mod error;
pub mod json_output;
pub mod logger;
pub mod topology;

pub use allocator::{allocate, Allocation, AllocationPolicy};
pub use error::Error;
