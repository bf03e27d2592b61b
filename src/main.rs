// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(missing_docs)]
#![deny(warnings)]

//! Entry point for the `cpualloc` command-line tool.

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::info;
use std::path::Path;

use cpualloc::allocator::{self, AllocationPolicy};
use cpualloc::cpuset::{self, CpuSet};
use cpualloc::json_output::{AllocationInfo, PlanInfo, TopologyInfo};
use cpualloc::topology::discovery;
use cpualloc::topology::numa::NumaTopology;
use cpualloc::topology::CpuTopology;
use cpualloc::{cgroup, config, logger};

/// *cpualloc* application entry point.
fn main() -> Result<()> {
    let version_str: String = env!("CARGO_PKG_VERSION").to_string();

    // Command-line specification for cpualloc.
    let app = App::new("cpualloc")
        .about("Topology-aware CPU allocator for workload pinning")
        .version(&*version_str)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("allocate")
                .about("Pick CPUs and memory nodes for one workload")
                .arg(
                    Arg::with_name("cpu-count")
                        .long("cpu-count")
                        .takes_value(true)
                        .required(true)
                        .help("Number of hardware threads to allocate"),
                )
                .arg(
                    Arg::with_name("available")
                        .long("available")
                        .takes_value(true)
                        .help("CPU list to allocate from (defaults to all online CPUs)"),
                )
                .arg(
                    Arg::with_name("separate-sockets")
                        .long("separate-sockets")
                        .help("Confine the workload to one socket when it fits"),
                )
                .arg(
                    Arg::with_name("numa-aware")
                        .long("numa-aware")
                        .help("Derive the memory nodes co-resident with the chosen CPUs"),
                )
                .arg(
                    Arg::with_name("cgroup")
                        .long("cgroup")
                        .takes_value(true)
                        .help("Cgroup directory whose cpuset files receive the result"),
                ),
        )
        .subcommand(
            SubCommand::with_name("describe-topology").about("Print the host CPU topology"),
        )
        .subcommand(
            SubCommand::with_name("plan")
                .about("Allocate for every workload in the request file"),
        );
    let args = app.get_matches();

    logger::init_logger().context("Logger initialization")?;
    info!("Start cpualloc");

    match args.subcommand() {
        ("allocate", Some(args)) => run_allocate(args),
        ("describe-topology", _) => run_describe(),
        ("plan", _) => run_plan(),
        _ => Err(anyhow!("no valid subcommand provided")),
    }
}

/// Read both host topologies from sysfs.
fn discover_host() -> Result<(CpuTopology, NumaTopology)> {
    let topo = discovery::discover_cpu_topology().context("CPU topology discovery")?;
    let numa = discovery::discover_numa_topology().context("NUMA topology discovery")?;
    Ok((topo, numa))
}

/// Handle the `allocate` subcommand.
fn run_allocate(args: &ArgMatches) -> Result<()> {
    let requested: usize = args
        .value_of("cpu-count")
        .ok_or_else(|| anyhow!("`cpu-count` argument not found"))?
        .parse()
        .context("Parse CPU count")?;

    let (topo, numa) = discover_host()?;
    let available: CpuSet = match args.value_of("available") {
        Some(list) => cpuset::parse_cpu_list(list).context("Parse available CPU list")?,
        None => topo.cpu_details.cpus(),
    };
    let policy = AllocationPolicy {
        separate_sockets: args.is_present("separate-sockets"),
        numa_aware: args.is_present("numa-aware"),
    };

    let allocation = allocator::allocate(&topo, &available, requested, policy, &numa)
        .map_err(cpualloc::Error::from)
        .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;
    info!(
        "allocated cpus=[{}] mems=[{}]",
        allocation.cpus_string(),
        allocation.mems_string()
    );

    if let Some(cgroup_dir) = args.value_of("cgroup") {
        cgroup::apply_cpuset(Path::new(cgroup_dir), &allocation)
            .map_err(cpualloc::Error::from)
            .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;
    }

    let output = AllocationInfo::new(requested, &allocation);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Handle the `describe-topology` subcommand.
fn run_describe() -> Result<()> {
    let topo = discovery::discover_cpu_topology()
        .map_err(cpualloc::Error::from)
        .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;

    let output = TopologyInfo::new(&topo);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Handle the `plan` subcommand: place every workload of the request file,
/// retiring each allocation's CPUs from the pool before the next placement.
fn run_plan() -> Result<()> {
    let (topo, numa) = discover_host()?;
    let requests = config::load_requests()
        .map_err(cpualloc::Error::from)
        .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;

    let mut available = topo.cpu_details.cpus();
    let mut plan = Vec::with_capacity(requests.len());
    for request in &requests {
        let allocation =
            allocator::allocate(&topo, &available, request.cpu_count, request.policy(), &numa)
                .map_err(cpualloc::Error::from)
                .map_err(|e| anyhow!("[{}] workload `{}`: {}", e.code(), request.name, e))?;

        info!(
            "workload `{}`: cpus=[{}] mems=[{}]",
            request.name,
            allocation.cpus_string(),
            allocation.mems_string()
        );
        available.retain(|cpu_id| !allocation.cpus.contains(cpu_id));
        plan.push(PlanInfo::new(request, &allocation));
    }

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
