//! Startup and shutdown orchestration for the local sandbox.
//!
//! [`Sandbox::start`] resolves the port, validates preconditions, prepares the
//! environment, hydrates functions and brings the data store, event bus and
//! HTTP gateway up in that order. The result is a [`SandboxSession`] whose
//! `close` tears everything down in reverse.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod env;
pub mod hydrate;
pub mod lifecycle;
pub mod preflight;
mod sandbox;
pub mod scaffold;
pub mod scripts;
pub mod sequencer;
pub mod session;
pub mod steps;

pub use config::{ConfigResolver, PortSource, ResolvedPort, DEFAULT_PORT};
pub use context::OrchestrationContext;
pub use env::{
    DotenvPopulator, EnvDefaults, EnvPopulator, Environment, EnvironmentPreparer,
    MapEnvironment, ProcessEnvironment,
};
pub use hydrate::{Hydrator, SharedCodeHydrator};
pub use lifecycle::ServiceLifecycleCoordinator;
pub use preflight::{PortProbe, PreflightValidator, TcpPortProbe};
pub use sandbox::{Sandbox, SandboxBuilder, StartMode, StartParams};
pub use scaffold::{Scaffolder, StubScaffolder};
pub use scripts::{ScriptRunner, ShellScriptRunner};
pub use sequencer::{SequencerState, Step, StepSequencer};
pub use session::{CloseOutcome, SandboxSession};
