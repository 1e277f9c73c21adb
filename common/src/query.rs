//! Interfaces to the services the classifier consults.
//!
//! Every method returns `Err` when the backing service couldn't be reached,
//! `Ok(None)` or an empty list means the service answered but had nothing.

use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distro {
    Ubuntu,
    Debian,
}

impl Distro {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distro::Ubuntu => "ubuntu",
            Distro::Debian => "debian",
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pocket {
    Release,
    Proposed,
}

impl Pocket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pocket::Release => "Release",
            Pocket::Proposed => "Proposed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Main,
    Restricted,
    Universe,
    Multiverse,
}

impl Component {
    /// Whether a package in `self` may depend on a package in `dep`
    pub fn may_depend_on(&self, dep: Component) -> bool {
        match self {
            Component::Main => dep == Component::Main,
            Component::Restricted => matches!(dep, Component::Main | Component::Restricted),
            Component::Universe => dep != Component::Multiverse,
            Component::Multiverse => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Main => "main",
            Component::Restricted => "restricted",
            Component::Universe => "universe",
            Component::Multiverse => "multiverse",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Component> {
        match s {
            "main" => Ok(Component::Main),
            "restricted" => Ok(Component::Restricted),
            "universe" => Ok(Component::Universe),
            "multiverse" => Ok(Component::Multiverse),
            _ => bail!("Unknown component: {:?}", s),
        }
    }
}

/// A published package as found in an archive pocket
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub source: String,
    pub version: String,
    pub component: Option<Component>,
}

pub trait DistroQuery {
    fn lookup(
        &self,
        name: &str,
        distro: Distro,
        series: &str,
        pocket: Pocket,
    ) -> Result<Option<PackageInfo>>;
}

pub const STATUS_FIX_COMMITTED: &str = "Fix Committed";
pub const STATUS_FIX_RELEASED: &str = "Fix Released";
pub const STATUS_WONT_FIX: &str = "Won't Fix";
pub const STATUS_INVALID: &str = "Invalid";

#[derive(Debug, Clone, PartialEq)]
pub struct BugTask {
    pub status: String,
    pub importance: String,
    pub assignee: Option<String>,
    pub target: String,
    pub web_link: String,
}

impl BugTask {
    pub fn is_fixed(&self) -> bool {
        self.status == STATUS_FIX_COMMITTED || self.status == STATUS_FIX_RELEASED
    }

    pub fn is_rejected(&self) -> bool {
        self.status == STATUS_WONT_FIX || self.status == STATUS_INVALID
    }

    pub fn assignee(&self) -> &str {
        self.assignee.as_deref().unwrap_or("nobody")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bug {
    pub id: u64,
    pub title: String,
    pub web_link: String,
    pub tasks: Vec<BugTask>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSearch {
    /// Source package the tasks are filed against
    pub target: String,
    pub subscriber: String,
    pub statuses: Vec<String>,
}

pub trait BugTracker {
    fn bug(&self, id: u64) -> Result<Bug>;

    fn search_tasks(&self, search: &TaskSearch) -> Result<Vec<BugTask>>;
}

pub const BUILD_STATE_SUCCESS: &str = "Successfully built";

#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub architecture: String,
    pub state: String,
    pub log_url: Option<String>,
}

impl Build {
    pub fn is_success(&self) -> bool {
        self.state == BUILD_STATE_SUCCESS
    }
}

/// A binary that is waiting in the NEW queue
#[derive(Debug, Clone, PartialEq)]
pub struct NewBinary {
    pub name: String,
    pub version: String,
    pub architecture: String,
}

pub trait BuildStatus {
    fn builds_for(&self, source: &str, version: &str) -> Result<Vec<Build>>;

    fn new_binaries(&self, source: &str) -> Result<Vec<NewBinary>>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CiResult {
    pub status: String,
    pub version: Option<String>,
}

impl CiResult {
    pub fn is_pass(&self) -> bool {
        self.status == "pass"
    }
}

pub trait CiStatus {
    fn status_for(&self, package: &str, architecture: &str) -> Result<Option<CiResult>>;
}

/// A checkout of the migration tool's manual hints
pub trait HintsRepository {
    fn update(&self) -> Result<()>;

    /// Every version named by an `unblock <source>/<version>` hint
    fn find_unblocks(&self, source: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_rules() {
        assert!(Component::Main.may_depend_on(Component::Main));
        assert!(!Component::Main.may_depend_on(Component::Universe));
        assert!(!Component::Main.may_depend_on(Component::Restricted));
        assert!(Component::Restricted.may_depend_on(Component::Main));
        assert!(!Component::Restricted.may_depend_on(Component::Universe));
        assert!(Component::Universe.may_depend_on(Component::Restricted));
        assert!(!Component::Universe.may_depend_on(Component::Multiverse));
        assert!(Component::Multiverse.may_depend_on(Component::Multiverse));
    }

    #[test]
    fn test_component_from_str() {
        assert_eq!("universe".parse::<Component>().unwrap(), Component::Universe);
        assert!("contrib".parse::<Component>().is_err());
    }

    #[test]
    fn test_bug_task_status() {
        let mut task = BugTask {
            status: "Fix Released".to_string(),
            importance: "High".to_string(),
            assignee: None,
            target: "foo (Ubuntu)".to_string(),
            web_link: "https://bugs.launchpad.net/bugs/1".to_string(),
        };
        assert!(task.is_fixed());
        assert!(!task.is_rejected());
        assert_eq!(task.assignee(), "nobody");

        task.status = "Won't Fix".to_string();
        assert!(!task.is_fixed());
        assert!(task.is_rejected());
    }
}
