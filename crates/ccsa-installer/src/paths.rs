//! Resolved filesystem locations for a global install, with environment
//! variable overrides.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub bin_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub mcp_path: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            bin_dir: std::env::var_os("LOCAL_ARTIFACT_BIN_DIR").map(PathBuf::from),
            settings_path: std::env::var_os("LOCAL_ARTIFACT_SETTINGS_PATH").map(PathBuf::from),
            mcp_path: std::env::var_os("LOCAL_ARTIFACT_MCP_PATH").map(PathBuf::from),
            store_dir: std::env::var_os("LOCAL_ARTIFACT_STORE_DIR").map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub bin_dir: PathBuf,
    pub state_dir: PathBuf,
    pub agents_dir: PathBuf,
    pub store_dir: PathBuf,
    pub settings_path: PathBuf,
    pub mcp_path: PathBuf,
}

impl Paths {
    pub fn resolve(home: PathBuf, env: &EnvOverrides) -> Self {
        let state_dir = home.join(".local/share/ccsubagents");
        let agents_dir = state_dir.join("agents");
        let bin_dir = env
            .bin_dir
            .clone()
            .unwrap_or_else(|| home.join(".local/bin"));
        let store_dir = env
            .store_dir
            .clone()
            .unwrap_or_else(|| state_dir.join("store"));
        let settings_path = env
            .settings_path
            .clone()
            .unwrap_or_else(|| home.join(".config/Code - Insiders/User/settings.json"));
        let mcp_path = env
            .mcp_path
            .clone()
            .unwrap_or_else(|| home.join(".config/Code - Insiders/User/mcp.json"));
        Self {
            home,
            bin_dir,
            state_dir,
            agents_dir,
            store_dir,
            settings_path,
            mcp_path,
        }
    }

    pub fn tracked_path(&self) -> PathBuf {
        self.state_dir.join("tracked.json")
    }

    pub fn default_config_target(&self) -> ConfigTarget {
        ConfigTarget {
            settings_path: self.settings_path.clone(),
            mcp_path: self.mcp_path.clone(),
        }
    }
}

/// One settings.json/mcp.json pair the installer edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTarget {
    pub settings_path: PathBuf,
    pub mcp_path: PathBuf,
}

/// Render an absolute path under `home` with a leading `~`, matching the
/// tilde-paths `settings.json`/`mcp.json` store.
pub fn tildeify(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tildeify_under_home() {
        let home = Path::new("/home/dev");
        assert_eq!(
            tildeify(Path::new("/home/dev/.local/bin/x"), home),
            "~/.local/bin/x"
        );
    }

    #[test]
    fn tildeify_outside_home_is_unchanged() {
        let home = Path::new("/home/dev");
        assert_eq!(tildeify(Path::new("/opt/x"), home), "/opt/x");
    }
}
