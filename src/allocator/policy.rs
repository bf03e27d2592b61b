// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

/// Placement policy for one allocation call.
///
/// An immutable value handed to [`allocate`]; the allocator never consults
/// caller-side state beyond it.
///
/// [`allocate`]: crate::allocator::allocate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationPolicy {
    /// Confine the workload to a single fully-free socket whenever the
    /// request fits inside one.
    pub separate_sockets: bool,
    /// Derive the memory nodes co-resident with the chosen CPUs instead of
    /// defaulting to memory node 0.
    pub numa_aware: bool,
}
