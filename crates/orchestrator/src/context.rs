use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use sandbox_core::{ProjectManifest, SubsystemConfig};
use tracing::warn;

use crate::config::ResolvedPort;
use crate::session::SandboxSession;

/// Mutable state threaded through one startup run.
pub struct OrchestrationContext {
    port: ResolvedPort,
    pub events_port: u16,
    pub project_dir: PathBuf,
    pub manifest: Arc<ProjectManifest>,
    /// `None` while running on the implicit default project
    pub manifest_path: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
    pub warnings: Vec<String>,
    /// Environment as it stood once preparation finished
    pub env: BTreeMap<String, String>,
    pub session: Option<SandboxSession>,
    pub started_at: Instant,
}

impl OrchestrationContext {
    pub fn new(port: ResolvedPort, project_dir: PathBuf, verbose: bool, quiet: bool) -> Self {
        Self {
            port,
            events_port: 0,
            project_dir,
            manifest: Arc::new(ProjectManifest::default_project()),
            manifest_path: None,
            verbose,
            quiet,
            warnings: Vec::new(),
            env: BTreeMap::new(),
            session: None,
            started_at: Instant::now(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.port()
    }

    pub fn resolved_port(&self) -> ResolvedPort {
        self.port
    }

    pub fn uses_default_project(&self) -> bool {
        self.manifest_path.is_none()
    }

    /// Record an advisory warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn subsystem_config(&self) -> SubsystemConfig {
        SubsystemConfig {
            port: self.port(),
            events_port: self.events_port,
            project_dir: self.project_dir.clone(),
            manifest: self.manifest.clone(),
            env: self.env.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_uses_default_project() {
        let ctx = OrchestrationContext::new(
            ResolvedPort::from_default(3333),
            PathBuf::from("."),
            false,
            false,
        );

        assert!(ctx.uses_default_project());
        assert!(ctx.manifest.is_empty());
        assert!(ctx.session.is_none());
    }

    #[test]
    fn test_warn_collects_messages() {
        let mut ctx = OrchestrationContext::new(
            ResolvedPort::from_default(3333),
            PathBuf::from("."),
            false,
            false,
        );

        ctx.warn("first");
        ctx.warn(String::from("second"));

        assert_eq!(ctx.warnings, vec!["first", "second"]);
    }

    #[test]
    fn test_subsystem_config_carries_ports() {
        let mut ctx = OrchestrationContext::new(
            ResolvedPort::from_default(4000),
            PathBuf::from("/tmp/app"),
            false,
            false,
        );
        ctx.events_port = 4001;
        ctx.env.insert("NODE_ENV".to_string(), "testing".to_string());

        let config = ctx.subsystem_config();

        assert_eq!(config.port, 4000);
        assert_eq!(config.events_port, 4001);
        assert_eq!(config.env_var("NODE_ENV"), Some("testing"));
    }
}
