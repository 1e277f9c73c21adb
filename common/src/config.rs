use crate::errors::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LAUNCHPAD_ENDPOINT: &str = "https://api.launchpad.net/devel";
pub const DEFAULT_EXCUSES_URL: &str =
    "https://ubuntu-archive-team.ubuntu.com/proposed-migration/update_excuses.yaml.xz";
pub const DEFAULT_OUTPUT_URL: &str =
    "https://ubuntu-archive-team.ubuntu.com/proposed-migration/update_output.txt";
pub const DEFAULT_DEBCI_ENDPOINT: &str = "https://ci.debian.net";
pub const DEFAULT_HINTS_BRANCH: &str = "lp:~ubuntu-release/britney/hints-ubuntu";
pub const DEFAULT_HINTS_VCS: &str = "bzr";
pub const DEFAULT_DEBIAN_SERIES: &str = "sid";

/// Cached excuse reports older than this are fetched again
pub const DEFAULT_MAX_AGE_SECS: u64 = 4 * 60 * 60;

pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();

    if let Some(c) = load_from("/etc/pmexplain.conf")? {
        config.update(c);
    }

    if let Ok(path) = config_path() {
        if let Some(c) = load_from(path)? {
            config.update(c);
        }
    }

    if let Some(path) = path {
        let c = load_from(path)?.ok_or_else(|| anyhow!("Failed to read config file"))?;
        config.update(c);
    }

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    let config_dir = dirs_next::config_dir().context("Failed to find config dir")?;
    Ok(config_dir.join("pmexplain.conf"))
}

fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<ConfigFile>> {
    if let Ok(buf) = fs::read_to_string(path.as_ref()) {
        debug!("Loading config file {:?}", path.as_ref());
        let config = toml::from_str(&buf).context("Failed to load config")?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub launchpad: LaunchpadConfig,
    #[serde(default)]
    pub excuses: ExcusesConfig,
    #[serde(default)]
    pub ubuntu: UbuntuConfig,
    #[serde(default)]
    pub debci: DebciConfig,
    #[serde(default)]
    pub hints: HintsConfig,
}

impl ConfigFile {
    pub fn update(&mut self, c: ConfigFile) {
        self.launchpad.update(c.launchpad);
        self.excuses.update(c.excuses);
        self.ubuntu.update(c.ubuntu);
        self.debci.update(c.debci);
        self.hints.update(c.hints);
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LaunchpadConfig {
    pub endpoint: Option<String>,
}

impl LaunchpadConfig {
    pub fn update(&mut self, c: LaunchpadConfig) {
        if c.endpoint.is_some() {
            self.endpoint = c.endpoint;
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_LAUNCHPAD_ENDPOINT)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExcusesConfig {
    pub url: Option<String>,
    pub output_url: Option<String>,
    pub max_age_secs: Option<u64>,
    pub cache_dir: Option<PathBuf>,
}

impl ExcusesConfig {
    pub fn update(&mut self, c: ExcusesConfig) {
        if c.url.is_some() {
            self.url = c.url;
        }
        if c.output_url.is_some() {
            self.output_url = c.output_url;
        }
        if c.max_age_secs.is_some() {
            self.max_age_secs = c.max_age_secs;
        }
        if c.cache_dir.is_some() {
            self.cache_dir = c.cache_dir;
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_EXCUSES_URL)
    }

    pub fn output_url(&self) -> &str {
        self.output_url.as_deref().unwrap_or(DEFAULT_OUTPUT_URL)
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs.unwrap_or(DEFAULT_MAX_AGE_SECS)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            Ok(dir.clone())
        } else {
            let dir = dirs_next::cache_dir().context("Failed to find cache dir")?;
            Ok(dir.join("pmexplain"))
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UbuntuConfig {
    pub series: Option<String>,
    pub debian_series: Option<String>,
}

impl UbuntuConfig {
    pub fn update(&mut self, c: UbuntuConfig) {
        if c.series.is_some() {
            self.series = c.series;
        }
        if c.debian_series.is_some() {
            self.debian_series = c.debian_series;
        }
    }

    pub fn debian_series(&self) -> &str {
        self.debian_series
            .as_deref()
            .unwrap_or(DEFAULT_DEBIAN_SERIES)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DebciConfig {
    pub endpoint: Option<String>,
}

impl DebciConfig {
    pub fn update(&mut self, c: DebciConfig) {
        if c.endpoint.is_some() {
            self.endpoint = c.endpoint;
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_DEBCI_ENDPOINT)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct HintsConfig {
    pub branch: Option<String>,
    pub vcs: Option<String>,
    pub path: Option<PathBuf>,
}

impl HintsConfig {
    pub fn update(&mut self, c: HintsConfig) {
        if c.branch.is_some() {
            self.branch = c.branch;
        }
        if c.vcs.is_some() {
            self.vcs = c.vcs;
        }
        if c.path.is_some() {
            self.path = c.path;
        }
    }

    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_HINTS_BRANCH)
    }

    pub fn vcs(&self) -> &str {
        self.vcs.as_deref().unwrap_or(DEFAULT_HINTS_VCS)
    }
}
