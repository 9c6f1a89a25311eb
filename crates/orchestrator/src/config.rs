//! Listening-port resolution from the option list, the environment, the
//! caller and the built-in default.

use crate::env::{Environment, PORT_ENV};

pub const DEFAULT_PORT: u16 = 3333;

/// Checked in this order. A later flag that is present overwrites an
/// earlier one.
pub const PORT_FLAGS: [&str; 3] = ["-p", "--port", "port"];
pub const VERBOSE_FLAGS: [&str; 3] = ["-v", "--verbose", "verbose"];

/// Where the effective port came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Option,
    Environment,
    Fallback,
    Default,
}

impl PortSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortSource::Option => "option",
            PortSource::Environment => "environment",
            PortSource::Fallback => "fallback",
            PortSource::Default => "default",
        }
    }
}

/// A port derived once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPort {
    port: u16,
    source: PortSource,
}

impl ResolvedPort {
    pub fn from_default(port: u16) -> Self {
        Self {
            port,
            source: PortSource::Default,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn source(&self) -> PortSource {
        self.source
    }
}

pub struct ConfigResolver;

impl ConfigResolver {
    /// Resolve the effective port. Pure: nothing is written anywhere.
    pub fn resolve(
        options: &[String],
        env: &dyn Environment,
        fallback: Option<u16>,
        default: u16,
    ) -> ResolvedPort {
        let (raw, source) = if let Some(raw) = Self::port_option(options) {
            (raw.to_string(), PortSource::Option)
        } else if let Some(raw) = env.get(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            (raw, PortSource::Environment)
        } else if let Some(port) = fallback {
            return ResolvedPort {
                port,
                source: PortSource::Fallback,
            };
        } else {
            return ResolvedPort::from_default(default);
        };

        match raw.trim().parse::<u16>() {
            Ok(port) => ResolvedPort { port, source },
            Err(_) => ResolvedPort::from_default(default),
        }
    }

    /// The token after the last matching flag in [`PORT_FLAGS`] order.
    fn port_option(options: &[String]) -> Option<&str> {
        let mut chosen = None;
        for flag in PORT_FLAGS {
            if let Some(index) = options.iter().position(|o| o == flag) {
                if let Some(value) = options.get(index + 1) {
                    chosen = Some(value.as_str());
                }
            }
        }
        chosen
    }

    pub fn is_verbose(options: &[String]) -> bool {
        options.iter().any(|o| VERBOSE_FLAGS.contains(&o.as_str()))
    }
}
