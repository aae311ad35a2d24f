use std::{
    env, io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};

pub const APPLICATION_NAME: &str = "ticklet";

/// Directory holding the per-day activity logs.
pub fn activity_dir(app_dir: &Path) -> PathBuf {
    app_dir.join("activity")
}

/// Directory holding the application's own tracing output.
pub fn tracing_dir(app_dir: &Path) -> PathBuf {
    app_dir.join("logs")
}

pub fn default_config_path(app_dir: &Path) -> PathBuf {
    app_dir.join("config.toml")
}

/// Resolves `$XDG_STATE_HOME/ticklet`, falling back to `$HOME/.local/state/ticklet`
/// (`%APPDATA%\ticklet` on Windows), and makes sure it exists.
pub fn create_application_default_path() -> Result<PathBuf> {
    let mut path = {
        #[cfg(windows)]
        {
            env::var("APPDATA")
                .map(PathBuf::from)
                .map_err(|_| anyhow!("APPDATA should be present on Windows"))?
        }
        #[cfg(not(windows))]
        {
            env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| env::var("HOME").map(|home| Path::new(&home).join(".local/state")))
                .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?
        }
    };
    path.push(APPLICATION_NAME);

    ensure_dir(path)
}

pub fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
