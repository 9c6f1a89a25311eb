//! The seam between the orchestration engine and the emulated services.
//!
//! Every local service (data store, event bus, HTTP gateway) is brought up
//! through a [`SubsystemStarter`] and torn down through the
//! [`SubsystemHandle`] it returns. The engine never sees anything else.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::manifest::ProjectManifest;
use crate::error::Result;

/// The independently started local services, in start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    DataStore,
    EventBus,
    HttpGateway,
}

impl Subsystem {
    /// Start order; teardown walks it backwards.
    pub const ALL: [Subsystem; 3] = [Self::DataStore, Self::EventBus, Self::HttpGateway];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataStore => "data store",
            Self::EventBus => "event bus",
            Self::HttpGateway => "http gateway",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only configuration handed to every starter.
///
/// Built once after environment preparation; no subsystem may change it.
#[derive(Debug, Clone)]
pub struct SubsystemConfig {
    /// Gateway listening port
    pub port: u16,
    /// Event bus listening port
    pub events_port: u16,
    pub project_dir: PathBuf,
    pub manifest: Arc<ProjectManifest>,
    /// Environment snapshot taken after preparation
    pub env: BTreeMap<String, String>,
}

impl SubsystemConfig {
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

/// A running subsystem.
#[async_trait]
pub trait SubsystemHandle: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    /// Whether the subsystem is still running.
    fn is_live(&self) -> bool;

    /// Port the subsystem actually bound, if it listens on one.
    fn local_port(&self) -> Option<u16> {
        None
    }

    /// Shut the subsystem down.
    async fn close(&mut self) -> Result<()>;
}

/// Brings one subsystem up.
#[async_trait]
pub trait SubsystemStarter: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    async fn start(&self, config: &SubsystemConfig) -> Result<Box<dyn SubsystemHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_order() {
        assert_eq!(
            Subsystem::ALL,
            [
                Subsystem::DataStore,
                Subsystem::EventBus,
                Subsystem::HttpGateway
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Subsystem::EventBus.to_string(), "event bus");
    }

    #[test]
    fn test_env_var_lookup() {
        let config = SubsystemConfig {
            port: 3333,
            events_port: 3334,
            project_dir: PathBuf::from("."),
            manifest: Arc::new(ProjectManifest::default_project()),
            env: BTreeMap::from([("NODE_ENV".to_string(), "testing".to_string())]),
        };

        assert_eq!(config.env_var("NODE_ENV"), Some("testing"));
        assert_eq!(config.env_var("PORT"), None);
    }
}
