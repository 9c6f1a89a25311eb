//! Advisory checks. These only ever produce warnings.

use std::collections::BTreeMap;
use std::path::Path;

use crate::env::CREDS_ENV;

/// Warn when a sandbox installed outside the project runs a project that
/// pins another sandbox version.
pub fn global_install_warning(
    executable: &Path,
    project_dir: &Path,
    pinned: Option<&str>,
    running: &str,
) -> Option<String> {
    let pinned = pinned?.trim().trim_start_matches('v');
    if executable.starts_with(project_dir) || pinned == running {
        return None;
    }
    Some(format!(
        "Possibly running a global install of the sandbox ({running}) while the project pins {pinned}; \
         install the pinned version in the project to match"
    ))
}

pub fn credentials_warning(verbose: bool, env: &BTreeMap<String, String>) -> Option<String> {
    (verbose && env.get(CREDS_ENV).map(String::as_str) == Some("dummy")).then(|| {
        "Missing or invalid AWS credentials or credentials file, using dummy credentials \
         (this is probably ok)"
            .to_string()
    })
}
