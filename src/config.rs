// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(warnings)]

//! Pin-request configuration file handling.
//!
//! The request file lists the workloads to pin, each with a CPU count and
//! optional placement flags. Both a single request and a list of requests
//! are accepted, keeping older single-workload files valid.

use log::warn;
use serde::Deserialize;
use std::path::PathBuf;

use crate::allocator::AllocationPolicy;

/// Environment variable overriding the configuration root directory.
pub const INSTALL_DIR_ENV_VAR: &str = "CPUALLOC_INSTALL_DIR";

/// Requests beyond this count are still processed but flagged, since the
/// machine is unlikely to hold that many exclusively pinned workloads.
const SUPPORTED_REQUESTS_NUM: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid request file, check the supported format in the release notes")]
    ConfigFileCorruption,
}

/// One workload's pin request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRequest {
    /// Name used for logging and for the per-workload cgroup directory.
    pub name: String,
    /// Number of hardware threads the workload receives.
    pub cpu_count: usize,
    /// Confine the workload to one socket when it fits.
    #[serde(default)]
    pub separate_sockets: bool,
    /// Derive co-resident memory nodes instead of defaulting to node 0.
    #[serde(default)]
    pub numa_aware: bool,
}

impl PinRequest {
    /// Placement policy derived from the request's flags.
    pub fn policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            separate_sockets: self.separate_sockets,
            numa_aware: self.numa_aware,
        }
    }
}

/// Request-file layout: a single request or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PinRequestConfig {
    /// A lone request without the list wrapper.
    Single(PinRequest),
    /// The list form.
    Multiple(Vec<PinRequest>),
}

/// Path of the request file, honoring the install-dir override.
pub fn config_file_path() -> PathBuf {
    let install_dir = std::env::var(INSTALL_DIR_ENV_VAR).unwrap_or_default();
    PathBuf::from(format!("{}/etc/cpualloc/requests.yaml", install_dir))
}

/// Read and normalize the pin-request file.
pub fn load_requests() -> Result<Vec<PinRequest>, Error> {
    let file = std::fs::File::open(config_file_path())?;
    let config: PinRequestConfig =
        serde_yaml::from_reader(file).map_err(|_| Error::ConfigFileCorruption)?;

    Ok(normalize_requests(config))
}

fn normalize_requests(config: PinRequestConfig) -> Vec<PinRequest> {
    let requests = match config {
        PinRequestConfig::Single(request) => vec![request],
        PinRequestConfig::Multiple(requests) => requests,
    };

    if requests.len() > SUPPORTED_REQUESTS_NUM {
        warn!(
            "request file lists {} workloads, only {} are supported",
            requests.len(),
            SUPPORTED_REQUESTS_NUM
        );
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config(yaml_str: &str) -> PinRequestConfig {
        serde_yaml::from_str(yaml_str).unwrap()
    }

    #[test]
    fn test_normalize_single_request() {
        let config = mock_config(
            r#"
            name: analytics
            cpu_count: 4
            numa_aware: true
        "#,
        );

        let requests = normalize_requests(config);
        assert_eq!(
            requests,
            vec![PinRequest {
                name: "analytics".to_string(),
                cpu_count: 4,
                separate_sockets: false,
                numa_aware: true,
            }]
        );
        assert!(requests[0].policy().numa_aware);
        assert!(!requests[0].policy().separate_sockets);
    }

    #[test]
    fn test_normalize_multiple_requests() {
        let config = mock_config(
            r#"
            - name: analytics
              cpu_count: 4
            - name: ingest
              cpu_count: 2
              separate_sockets: true
        "#,
        );

        let requests = normalize_requests(config);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].name, "analytics");
        assert!(requests[1].separate_sockets);
        assert!(!requests[1].numa_aware);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let parsed: Result<PinRequest, _> = serde_yaml::from_str(
            r#"
            name: analytics
            cpu_count: 4
            cpu_shares: 512
        "#,
        );

        assert!(parsed.is_err());
    }
}
