//! Cluster configuration.
//!
//! Built once at startup (from a file or from defaults) and passed by
//! reference into the ring, the coordinators and the transport layer.

use crate::error::{Error, Result};
use crate::placement::types::NodeId;
use crate::segment::checksum::DigestAlgorithm;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Wire segment numbers are a single byte, and 0 is not a segment.
pub const MAX_NODES: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub name: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Storage nodes in ring order. Segment `n` belongs to `nodes[n - 1]`.
    pub nodes: Vec<NodeConfig>,
    /// HTTP front-end address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// How many ring successors a segment may be handed off to.
    #[serde(default = "default_handoff_count")]
    pub handoff_count: usize,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Largest slice of a segment carried by one message.
    #[serde(default = "default_slice_size")]
    pub slice_size: usize,
    #[serde(default)]
    pub digest: DigestAlgorithm,
    /// Interval between health probes of down nodes.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Largest object the gateway accepts, in bytes.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8088))
}

fn default_handoff_count() -> usize {
    2
}

fn default_reply_timeout_ms() -> u64 {
    5_000
}

fn default_slice_size() -> usize {
    1024 * 1024
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_max_object_size() -> u64 {
    1024 * 1024 * 1024
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            listen_addr: default_listen_addr(),
            handoff_count: default_handoff_count(),
            reply_timeout_ms: default_reply_timeout_ms(),
            slice_size: default_slice_size(),
            digest: DigestAlgorithm::default(),
            probe_interval_ms: default_probe_interval_ms(),
            max_object_size: default_max_object_size(),
        }
    }
}

impl ClusterConfig {
    /// A local cluster of `count` nodes named `node-00`, `node-01`, ... on
    /// consecutive ports starting at `base_port`.
    pub fn local(count: usize, base_port: u16) -> Self {
        let nodes = (0..count)
            .map(|i| NodeConfig {
                name: format!("node-{:02}", i),
                addr: SocketAddr::from(([127, 0, 0, 1], base_port + i as u16)),
            })
            .collect();

        Self {
            nodes,
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Self = match ext {
            "toml" => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("TOML parse error: {}", e)))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("JSON parse error: {}", e)))?,
            _ => {
                return Err(Error::Config(format!(
                    "Unknown config file extension: {}",
                    ext
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Config("at least one storage node is required".into()));
        }
        if self.nodes.len() > MAX_NODES {
            return Err(Error::Config(format!(
                "{} storage nodes configured, at most {} supported",
                self.nodes.len(),
                MAX_NODES
            )));
        }
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(Error::Config(format!("duplicate node name {}", node.name)));
            }
        }
        if self.handoff_count == 0 && self.nodes.len() > 1 {
            return Err(Error::Config(
                "handoff_count must be at least 1 when there is more than one node".into(),
            ));
        }
        if self.slice_size == 0 {
            return Err(Error::Config("slice_size must be greater than zero".into()));
        }
        if self.max_object_size == 0 {
            return Err(Error::Config("max_object_size must be greater than zero".into()));
        }
        if self.reply_timeout_ms == 0 {
            return Err(Error::Config("reply_timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| NodeId::new(&node.name)).collect()
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}
