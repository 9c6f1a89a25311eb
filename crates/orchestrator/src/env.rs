//! Process-wide variables the emulated services read.
//!
//! Everything here fills gaps: a variable that is already set is never
//! overwritten, with the single exception of `PORT`, which the environment
//! step writes once from the resolved port.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sandbox_core::{Result, SandboxError};
use tracing::debug;

use crate::context::OrchestrationContext;

pub const PORT_ENV: &str = "PORT";
pub const SESSION_TABLE_ENV: &str = "SESSION_TABLE_NAME";
pub const NODE_ENV: &str = "NODE_ENV";
pub const EVENTS_PORT_ENV: &str = "ARC_EVENTS_PORT";
pub const CREDS_ENV: &str = "ARC_AWS_CREDS";

const DOTENV_FILE: &str = ".env";
const AWS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
const AWS_SECRET_ENV: &str = "AWS_SECRET_ACCESS_KEY";
const AWS_PROFILE_ENV: &str = "AWS_PROFILE";
const DUMMY_CREDENTIAL: &str = "xxx";

/// Variable storage the orchestrator reads and writes.
pub trait Environment: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn snapshot(&self) -> BTreeMap<String, String>;

    fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` only when it is absent. Returns whether it was written.
    fn set_if_missing(&self, key: &str, value: &str) -> bool {
        if self.is_set(key) {
            return false;
        }
        self.set(key, value);
        true
    }
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        utf8_vars(std::env::vars_os())
    }
}

/// Keeps the entries whose key and value are both valid UTF-8.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!(key = ?key, "Skipping non-UTF-8 environment variable");
                None
            }
        })
        .collect()
}

/// In-memory environment, isolated from the process.
#[derive(Debug, Default)]
pub struct MapEnvironment {
    vars: Mutex<BTreeMap<String, String>>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    fn vars(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.vars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: Mutex::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Environment for MapEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.vars().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.vars().insert(key.to_string(), value.to_string());
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars().clone()
    }
}

/// Supplies project-specific variables.
#[async_trait]
pub trait EnvPopulator: Send + Sync {
    async fn populate(&self, project_dir: &Path, env: &dyn Environment) -> Result<()>;
}

/// Reads `KEY=VALUE` lines from the project's `.env` and settles the
/// credentials marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotenvPopulator;

impl DotenvPopulator {
    fn parse(contents: &str) -> Vec<(String, String)> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let line = line.strip_prefix("export ").unwrap_or(line);
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), unquote(value.trim()).to_string()))
            })
            .collect()
    }

    fn settle_credentials(env: &dyn Environment) {
        let has_credentials = env.is_set(AWS_KEY_ENV) || env.is_set(AWS_PROFILE_ENV);
        if has_credentials {
            env.set_if_missing(CREDS_ENV, "valid");
        } else {
            env.set_if_missing(AWS_KEY_ENV, DUMMY_CREDENTIAL);
            env.set_if_missing(AWS_SECRET_ENV, DUMMY_CREDENTIAL);
            env.set_if_missing(CREDS_ENV, "dummy");
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[async_trait]
impl EnvPopulator for DotenvPopulator {
    async fn populate(&self, project_dir: &Path, env: &dyn Environment) -> Result<()> {
        let path = project_dir.join(DOTENV_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let mut applied = 0;
                for (key, value) in Self::parse(&contents) {
                    if env.set_if_missing(&key, &value) {
                        applied += 1;
                    }
                }
                debug!(path = %path.display(), applied, "Loaded project env file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SandboxError::EnvironmentFailed(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        }

        Self::settle_credentials(env);
        Ok(())
    }
}

/// Values the preparer falls back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDefaults {
    pub session_table: String,
    pub node_env: String,
    /// Added to the gateway port when `ARC_EVENTS_PORT` is absent
    pub events_port_offset: u16,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            session_table: "jwe".to_string(),
            node_env: "testing".to_string(),
            events_port_offset: 1,
        }
    }
}

impl EnvDefaults {
    /// Event-bus port derived from the gateway port. An ephemeral gateway
    /// port gets an ephemeral bus port.
    pub fn events_port_for(&self, port: u16) -> u16 {
        if port == 0 {
            return 0;
        }
        port.checked_add(self.events_port_offset).unwrap_or(0)
    }
}

/// Makes sure every variable the subsystems need exists.
pub struct EnvironmentPreparer {
    env: Arc<dyn Environment>,
    populator: Arc<dyn EnvPopulator>,
    defaults: EnvDefaults,
}

impl EnvironmentPreparer {
    pub fn new(
        env: Arc<dyn Environment>,
        populator: Arc<dyn EnvPopulator>,
        defaults: EnvDefaults,
    ) -> Self {
        Self {
            env,
            populator,
            defaults,
        }
    }

    pub async fn prepare(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let env = self.env.as_ref();

        env.set_if_missing(SESSION_TABLE_ENV, &self.defaults.session_table);
        env.set_if_missing(NODE_ENV, &self.defaults.node_env);

        let events_port = match env.get(EVENTS_PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                SandboxError::EnvironmentFailed(format!("{EVENTS_PORT_ENV} is not a port: {raw}"))
            })?,
            None => {
                let port = self.defaults.events_port_for(ctx.port());
                env.set(EVENTS_PORT_ENV, &port.to_string());
                port
            }
        };

        self.populator.populate(&ctx.project_dir, env).await?;

        ctx.events_port = events_port;
        ctx.env = env.snapshot();
        debug!(
            port = ctx.port(),
            events_port,
            vars = ctx.env.len(),
            "Environment prepared"
        );
        Ok(())
    }
}
