use crate::errors::*;
use crate::query::HintsRepository;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Files in the hints branch that aren't searched for unblocks
const SKIPPED_FILES: &[&str] = &["freeze"];

/// Versions of every `unblock <source>/<version>` hint in `content`
pub fn unblocks_in(content: &str, source: &str) -> Vec<String> {
    let mut versions = Vec::new();
    let Ok(re) = Regex::new(r"^\s*unblock\s+(.+)$") else {
        return versions;
    };
    for line in content.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        for item in caps[1].split_whitespace() {
            if item.starts_with('#') {
                break;
            }
            if let Some((name, version)) = item.split_once('/') {
                if name == source && !versions.iter().any(|v| v == version) {
                    versions.push(version.to_string());
                }
            }
        }
    }
    versions
}

/// Local working copy of the hints branch
pub struct Checkout {
    vcs: String,
    branch: String,
    path: PathBuf,
}

impl Checkout {
    pub fn new<P: Into<PathBuf>>(vcs: &str, branch: &str, path: P) -> Checkout {
        Checkout {
            vcs: vcs.to_string(),
            branch: branch.to_string(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, cmd: &mut Command) -> Result<()> {
        debug!("Running {:?}", cmd);
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| anyhow!("Failed to execute {:?}", self.vcs))?;
        if !status.success() {
            bail!("{:?} exited with {}", self.vcs, status);
        }
        Ok(())
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!("{}/*", glob::Pattern::escape(&self.path.to_string_lossy()));
        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let skipped = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| SKIPPED_FILES.contains(&n))
                .unwrap_or(true);
            if !skipped && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl HintsRepository for Checkout {
    fn update(&self) -> Result<()> {
        if self.path.exists() {
            info!("Updating hints in {:?}...", self.path);
            self.run(Command::new(&self.vcs).arg("pull").current_dir(&self.path))
        } else {
            info!("Fetching hints from {:?}...", self.branch);
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| anyhow!("Failed to create directory {:?}", parent))?;
            }
            let verb = if self.vcs == "git" { "clone" } else { "branch" };
            self.run(
                Command::new(&self.vcs)
                    .arg(verb)
                    .arg(&self.branch)
                    .arg(&self.path),
            )
        }
    }

    fn find_unblocks(&self, source: &str) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        for path in self.files()? {
            let content = fs::read_to_string(&path)
                .with_context(|| anyhow!("Failed to read hints file {:?}", path))?;
            for version in unblocks_in(&content, source) {
                debug!("Found unblock {}/{} in {:?}", source, version, path);
                if !versions.contains(&version) {
                    versions.push(version);
                }
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HINTS: &str = "# release team hints
unblock bar/2.0-1
  unblock foo/1.1-1 baz/3
# unblock foo/0.9
";

    #[test]
    fn test_unblocks_in() {
        assert_eq!(unblocks_in(HINTS, "foo"), vec!["1.1-1"]);
        assert_eq!(unblocks_in(HINTS, "baz"), vec!["3"]);
        assert!(unblocks_in(HINTS, "fo").is_empty());
        assert!(unblocks_in(HINTS, "qux").is_empty());
    }

    #[test]
    fn test_unblocks_ignore_trailing_comment() {
        let hints = "unblock foo/1.0 # bar/2.0\n";
        assert!(unblocks_in(hints, "bar").is_empty());
    }

    #[test]
    fn test_repeated_unblocks() {
        let hints = "unblock foo/1.0-1\nunblock foo/1.1-1\nunblock foo/1.0-1\n";
        assert_eq!(unblocks_in(hints, "foo"), vec!["1.0-1", "1.1-1"]);
    }

    #[test]
    fn test_checkout_skips_freeze_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("freeze"), "unblock foo/0.1\n").unwrap();
        fs::write(dir.path().join("ubuntu-release"), "unblock foo/1.0\n").unwrap();
        let checkout = Checkout::new("bzr", "lp:hints", dir.path());
        assert_eq!(checkout.find_unblocks("foo").unwrap(), vec!["1.0"]);
        assert!(checkout.find_unblocks("bar").unwrap().is_empty());
    }

    #[test]
    fn test_checkout_collects_all_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stale"), "unblock foo/1.0-1\n").unwrap();
        fs::write(dir.path().join("ubuntu-release"), "unblock foo/1.0-1\nunblock foo/1.1-1\n").unwrap();
        let checkout = Checkout::new("bzr", "lp:hints", dir.path());
        let mut versions = checkout.find_unblocks("foo").unwrap();
        versions.sort();
        assert_eq!(versions, vec!["1.0-1", "1.1-1"]);
    }

    #[test]
    fn test_checkout_only_freeze_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("freeze"), "unblock foo/0.1\n").unwrap();
        let checkout = Checkout::new("bzr", "lp:hints", dir.path());
        assert!(checkout.find_unblocks("foo").unwrap().is_empty());
    }

    #[test]
    fn test_update_with_missing_vcs() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = Checkout::new(
            "pmexplain-vcs-that-does-not-exist",
            "lp:hints",
            dir.path().join("hints"),
        );
        assert!(checkout.update().is_err());
    }
}
