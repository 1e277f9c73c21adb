//! Walks the blocking reasons of an excuse and explains them.
//!
//! Every sub-diagnosis runs in a fixed order (missing builds, unsatisfiable
//! dependencies, blocks, autopkgtests, interdependencies) and packages that
//! block the current one are explained right after the line that names them.

use crate::deps;
use crate::diagnostics::{DiagnosticEvent, EventSink};
use crate::errors::*;
use crate::excuses::{Dependencies, ExcuseRecord, ExcuseStore};
use crate::query::*;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

pub const MIR_TEAM: &str = "ubuntu-mir";

const ALL_TASK_STATUSES: &[&str] = &[
    "New",
    "Incomplete",
    "Opinion",
    "Invalid",
    "Won't Fix",
    "Expired",
    "Confirmed",
    "Triaged",
    "In Progress",
    "Deferred",
    "Fix Committed",
    "Fix Released",
];

/// Debian CI is only consulted for this architecture
const DEBIAN_CI_ARCH: &str = "amd64";

pub struct Services<'a> {
    pub distro: &'a dyn DistroQuery,
    pub bugs: &'a dyn BugTracker,
    pub builds: &'a dyn BuildStatus,
    pub ci: &'a dyn CiStatus,
    pub hints: Option<&'a dyn HintsRepository>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub series: String,
    pub debian_series: String,
    pub output_url: String,
}

/// State of one top-level explain call
pub struct Session<'r> {
    report: &'r ExcuseStore,
    visited: Vec<String>,
    seen: HashSet<String>,
    hints: Option<std::result::Result<(), String>>,
}

impl<'r> Session<'r> {
    pub fn new(report: &'r ExcuseStore) -> Session<'r> {
        Session {
            report,
            visited: Vec::new(),
            seen: HashSet::new(),
            hints: None,
        }
    }

    /// Returns false if the package was explained already
    fn visit(&mut self, name: &str) -> bool {
        if self.seen.insert(name.to_string()) {
            self.visited.push(name.to_string());
            true
        } else {
            false
        }
    }

    /// Packages in the order they were explained
    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    /// The hints working copy is only updated once per session
    fn update_hints(&mut self, repo: &dyn HintsRepository) -> Result<()> {
        let state = self
            .hints
            .get_or_insert_with(|| repo.update().map_err(|err| format!("{:#}", err)));
        match state {
            Ok(()) => Ok(()),
            Err(err) => bail!("{}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub version: String,
    pub age: f64,
    pub is_candidate: bool,
}

/// Excuses for interactive selection, oldest first
pub fn candidates(store: &ExcuseStore) -> Vec<Candidate> {
    store
        .all()
        .map(|r| Candidate {
            name: r.source_name.clone(),
            version: r.version().to_string(),
            age: r.current_age(),
            is_candidate: r.is_candidate,
        })
        .collect()
}

pub fn is_removal_request(title: &str, source: &str) -> bool {
    let pattern = format!(r"(?i)\bremove\s+{}(?:[^a-z0-9+.\-]|$)", regex::escape(source));
    Regex::new(&pattern)
        .map(|re| re.is_match(title))
        .unwrap_or(false)
}

/// Where a depended-on package could be found
#[derive(Debug, Default)]
struct Resolution {
    release: Option<PackageInfo>,
    proposed: Option<PackageInfo>,
    debian: Option<PackageInfo>,
    unavailable: bool,
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

pub struct Classifier<'a> {
    services: Services<'a>,
    settings: Settings,
}

impl<'a> Classifier<'a> {
    pub fn new(services: Services<'a>, settings: Settings) -> Classifier<'a> {
        Classifier { services, settings }
    }

    pub fn explain(
        &self,
        store: &ExcuseStore,
        name: &str,
        sink: &mut dyn EventSink,
    ) -> std::result::Result<(), ReportError> {
        let record = store
            .find(name)
            .ok_or_else(|| ReportError::UnknownSource(name.to_string()))?;
        let mut session = Session::new(store);
        self.process(record, &mut session, 0, sink);
        debug!("Explained {} packages", session.visited().len());
        Ok(())
    }

    pub fn process(
        &self,
        record: &ExcuseRecord,
        session: &mut Session<'_>,
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        if !session.visit(&record.source_name) {
            debug!("Already explained {:?}, skipping", record.source_name);
            return;
        }

        let status = if record.is_candidate {
            "is a candidate for migration"
        } else {
            "is not a candidate for migration"
        };
        sink.emit(DiagnosticEvent::info(
            depth,
            format!("{} {}", record.source_name, status),
        ));

        let reasons = if record.reasons.is_empty() {
            "no reasons given".to_string()
        } else {
            record.reasons.join(", ")
        };
        sink.emit(DiagnosticEvent::critical(
            depth,
            format!(
                "{} {} -> {}: {}",
                record.source_name,
                record.old_version.as_deref().unwrap_or("-"),
                record.version(),
                reasons
            ),
        ));

        let mut work_needed = false;
        if record.missing_builds.is_some() || record.has_reason("no-binaries") {
            self.missing_builds(record, depth + 1, sink);
            work_needed = true;
        }
        if record.has_reason("depends") {
            self.unsatisfiable_dependencies(record, session, depth, sink);
            work_needed = true;
        }
        if record.has_reason("block") {
            self.blocks(record, session, depth + 1, sink);
            work_needed = true;
        }
        if record.has_reason("autopkgtest") {
            self.autopkgtests(record, depth + 1, sink);
            work_needed = true;
        }
        if let Some(deps) = &record.dependencies {
            self.interdependencies(deps, session, depth, sink);
            work_needed = true;
        }

        if !work_needed {
            sink.emit(DiagnosticEvent::pass(
                depth + 1,
                format!(
                    "No action needed, see {} for what the migration tool is doing",
                    self.settings.output_url
                ),
            ));
        }
    }

    fn missing_builds(&self, record: &ExcuseRecord, depth: usize, sink: &mut dyn EventSink) {
        sink.emit(DiagnosticEvent::warning(depth, "Missing builds"));

        let builds = match self
            .services
            .builds
            .builds_for(&record.source_name, record.version())
        {
            Ok(builds) => Some(builds),
            Err(err) => {
                warn!("Failed to fetch builds of {:?}: {:#}", record.source_name, err);
                sink.emit(DiagnosticEvent::fail(depth + 1, "Build status unavailable"));
                None
            }
        };

        if let Some(builds) = builds {
            let mut all_built = true;
            for build in builds.iter().filter(|b| !b.is_success()) {
                all_built = false;
                let log = build.log_url.as_deref().unwrap_or("no build log available");
                sink.emit(DiagnosticEvent::fail(
                    depth + 1,
                    format!("{}: {} ({})", build.architecture, build.state, log),
                ));
            }

            if all_built && !builds.is_empty() {
                self.dropped_architectures(record, &builds, depth + 1, sink);
            }
        }

        match self.services.builds.new_binaries(&record.source_name) {
            Ok(binaries) => {
                for bin in binaries {
                    sink.emit(DiagnosticEvent::fail(
                        depth + 1,
                        format!(
                            "{}/{}/{} is waiting in the NEW queue",
                            bin.architecture, bin.name, bin.version
                        ),
                    ));
                }
            }
            Err(err) => {
                warn!("Failed to fetch NEW queue of {:?}: {:#}", record.source_name, err);
                sink.emit(DiagnosticEvent::info(depth + 1, "NEW queue status unavailable"));
            }
        }
    }

    /// Architectures britney still expects binaries on but the upload no
    /// longer builds for, the old binaries need to be removed by hand
    fn dropped_architectures(
        &self,
        record: &ExcuseRecord,
        builds: &[Build],
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        let Some(missing) = &record.missing_builds else {
            return;
        };
        let dropped = missing
            .on_architectures
            .iter()
            .filter(|arch| !builds.iter().any(|b| &b.architecture == *arch))
            .collect::<Vec<_>>();
        if dropped.is_empty() {
            return;
        }

        let mut cmd = format!("remove-package -s {}-proposed", self.settings.series);
        if let Some(old_version) = &record.old_version {
            cmd.push_str(&format!(" -e {}", old_version));
        }
        for arch in &dropped {
            cmd.push_str(&format!(" -a {}", arch));
        }

        let old_binaries = match record.old_version.as_ref().and_then(|v| record.old_binaries.get(v)) {
            Some(binaries) => binaries.clone(),
            None => record.old_binaries.values().flatten().cloned().collect(),
        };
        if !old_binaries.is_empty() {
            cmd.push_str(" -b ");
            cmd.push_str(&old_binaries.join(" "));
        }

        sink.emit(DiagnosticEvent::info(
            depth,
            format!(
                "No longer built on {}, ask an archive admin to run: {}",
                dropped
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                cmd
            ),
        ));
    }

    fn lookup(&self, name: &str, distro: Distro, series: &str, pocket: Pocket) -> Option<Option<PackageInfo>> {
        match self.services.distro.lookup(name, distro, series, pocket) {
            Ok(found) => Some(found),
            Err(err) => {
                warn!("Failed to look up {:?} in {}/{}: {:#}", name, distro, series, err);
                None
            }
        }
    }

    /// Ubuntu release pocket, Ubuntu proposed, then Debian
    fn resolve(&self, name: &str) -> Resolution {
        let series = &self.settings.series;
        let mut res = Resolution::default();

        let lookups = [
            (Distro::Ubuntu, series.as_str(), Pocket::Release),
            (Distro::Ubuntu, series.as_str(), Pocket::Proposed),
            (Distro::Debian, self.settings.debian_series.as_str(), Pocket::Release),
        ];
        for (distro, series, pocket) in lookups {
            if distro == Distro::Debian && (res.release.is_some() || res.proposed.is_some()) {
                break;
            }
            let Some(found) = self.lookup(name, distro, series, pocket) else {
                res.unavailable = true;
                continue;
            };
            match (distro, pocket) {
                (Distro::Ubuntu, Pocket::Release) => res.release = found,
                (Distro::Ubuntu, Pocket::Proposed) => res.proposed = found,
                (Distro::Debian, _) => res.debian = found,
            }
        }
        res
    }

    fn unsatisfiable_dependencies(
        &self,
        record: &ExcuseRecord,
        session: &mut Session<'_>,
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        let d = depth + 1;
        sink.emit(DiagnosticEvent::warning(d, "Unsatisfiable dependencies"));

        let Some(deps) = &record.dependencies else {
            return;
        };

        let parent_component = record
            .component
            .as_deref()
            .and_then(|c| c.parse::<Component>().ok())
            .unwrap_or(Component::Main);
        let series = &self.settings.series;
        let report = session.report;
        let mut possible_mir = Vec::new();

        for (signature, archs) in deps::group_by_signature(&deps.unsatisfiable_dependencies) {
            let archs = archs.join(", ");
            let name = match deps::depended_on(&signature) {
                Ok(name) => name,
                Err(err) => {
                    warn!("{:#}", err);
                    sink.emit(DiagnosticEvent::fail(
                        d + 1,
                        format!("{} is unsatisfiable on {}", signature, archs),
                    ));
                    continue;
                }
            };

            let res = self.resolve(name);
            let placeholder = if res.unavailable { " (lookup unavailable)" } else { "" };
            let affected = match (&res.release, &res.proposed, &res.debian) {
                (Some(info), _, _) => {
                    let component = info
                        .component
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    sink.emit(DiagnosticEvent::fail(
                        d + 1,
                        format!(
                            "{} is unsatisfiable on {}: {} is in {} as {} {} ({})",
                            signature, archs, name, series, info.source, info.version, component
                        ),
                    ));
                    Some(info)
                }
                (None, Some(info), _) => {
                    sink.emit(DiagnosticEvent::fail(
                        d + 1,
                        format!(
                            "{} is unsatisfiable on {}: {} only exists in {}-proposed as {} {}",
                            signature, archs, name, series, info.source, info.version
                        ),
                    ));
                    sink.emit(DiagnosticEvent::info(
                        d + 2,
                        format!(
                            "Check whether {} was dropped upstream or is stuck in -proposed itself",
                            name
                        ),
                    ));
                    Some(info)
                }
                (None, None, Some(info)) => {
                    sink.emit(DiagnosticEvent::fail(
                        d + 1,
                        format!(
                            "{} is unsatisfiable on {}: {} only exists in Debian as {} {}",
                            signature, archs, name, info.source, info.version
                        ),
                    ));
                    sink.emit(DiagnosticEvent::info(
                        d + 2,
                        format!("Check whether {} is on the sync blacklist", info.source),
                    ));
                    None
                }
                (None, None, None) => {
                    sink.emit(DiagnosticEvent::fail(
                        d + 1,
                        format!(
                            "{} is unsatisfiable on {}: {} was not found in Ubuntu or Debian{}, it may have been removed",
                            signature, archs, name, placeholder
                        ),
                    ));
                    None
                }
            };

            let Some(info) = affected else {
                continue;
            };

            if let Some(component) = info.component {
                if !parent_component.may_depend_on(component) {
                    sink.emit(DiagnosticEvent::info(
                        d + 2,
                        format!(
                            "{} is in {}, {} packages can't depend on it without a MIR",
                            info.source, component, parent_component
                        ),
                    ));
                    push_unique(&mut possible_mir, &info.source);
                }
            }

            if let Some(dep) = report.find(&info.source) {
                self.process(dep, session, depth + 2, sink);
            }
        }

        for source in &possible_mir {
            self.mir_status(source, d + 1, sink);
        }
    }

    fn mir_status(&self, source: &str, depth: usize, sink: &mut dyn EventSink) {
        let search = TaskSearch {
            target: source.to_string(),
            subscriber: MIR_TEAM.to_string(),
            statuses: ALL_TASK_STATUSES.iter().map(|s| s.to_string()).collect(),
        };

        let tasks = match self.services.bugs.search_tasks(&search) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!("Failed to search MIR bugs of {:?}: {:#}", source, err);
                sink.emit(DiagnosticEvent::info(
                    depth,
                    format!("MIR status of {} unavailable", source),
                ));
                return;
            }
        };

        if tasks.is_empty() {
            sink.emit(DiagnosticEvent::info(
                depth,
                format!(
                    "{} has no MIR bug, file one at https://bugs.launchpad.net/ubuntu/+source/{}/+filebug",
                    source, source
                ),
            ));
            return;
        }

        for task in tasks {
            let line = format!(
                "MIR for {}: {}, assigned to {} ({})",
                source,
                task.status,
                task.assignee(),
                task.web_link
            );
            if task.is_rejected() {
                sink.emit(DiagnosticEvent::fail(
                    depth,
                    format!("{}, the MIR was rejected and the dependency has to be dropped", line),
                ));
            } else if task.is_fixed() {
                sink.emit(DiagnosticEvent::pass(depth, line));
            } else {
                sink.emit(DiagnosticEvent::info(depth, line));
            }
        }
    }

    fn blocks(
        &self,
        record: &ExcuseRecord,
        session: &mut Session<'_>,
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        sink.emit(DiagnosticEvent::warning(depth, "Blocked"));

        for id in record.block_bugs() {
            let bug = match self.services.bugs.bug(id) {
                Ok(bug) => bug,
                Err(err) => {
                    warn!("Failed to fetch bug #{}: {:#}", id, err);
                    sink.emit(DiagnosticEvent::info(
                        depth + 1,
                        format!("LP: #{} (details unavailable)", id),
                    ));
                    continue;
                }
            };

            sink.emit(DiagnosticEvent::info(
                depth + 1,
                format!("LP: #{} {} ({})", bug.id, bug.title, bug.web_link),
            ));
            for task in &bug.tasks {
                if task.is_rejected() {
                    continue;
                }
                let line = format!("{}: {}", task.target, task.status);
                if task.is_fixed() {
                    sink.emit(DiagnosticEvent::pass(depth + 2, line));
                } else {
                    sink.emit(DiagnosticEvent::fail(
                        depth + 2,
                        format!("{} ({}, assigned to {})", line, task.importance, task.assignee()),
                    ));
                }
            }

            if is_removal_request(&bug.title, &record.source_name) {
                sink.emit(DiagnosticEvent::info(
                    depth + 2,
                    "This is a removal request, contact the release team to get it processed",
                ));
            }
        }

        if !record.hints.is_empty() {
            self.hints(record, session, depth + 1, sink);
        }
    }

    fn hints(
        &self,
        record: &ExcuseRecord,
        session: &mut Session<'_>,
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        let Some(repo) = self.services.hints else {
            debug!("Hints repository disabled, not checking hints");
            return;
        };

        if let Err(err) = session.update_hints(repo) {
            sink.emit(DiagnosticEvent::error(
                depth,
                format!("Hints repository unavailable: {:#}", err),
            ));
            return;
        }

        let unblocks = match repo.find_unblocks(&record.source_name) {
            Ok(unblocks) => unblocks,
            Err(err) => {
                sink.emit(DiagnosticEvent::error(
                    depth,
                    format!("Failed to search hints: {:#}", err),
                ));
                return;
            }
        };

        let source = &record.source_name;
        let version = record.version();
        if record.hints.first().map(|h| h.is_freeze()).unwrap_or(false) {
            sink.emit(DiagnosticEvent::error(
                depth,
                format!("{} is blocked by the freeze, it needs an unblock from the release team", source),
            ));
        } else if unblocks.iter().any(|v| v == version) {
            sink.emit(DiagnosticEvent::pass(
                depth,
                format!("Found unblock {}/{}", source, version),
            ));
        } else if !unblocks.is_empty() {
            let found = unblocks
                .iter()
                .map(|v| format!("{}/{}", source, v))
                .collect::<Vec<_>>()
                .join(", ");
            sink.emit(DiagnosticEvent::error(
                depth,
                format!("Found unblock {}, but {} needs its own unblock", found, version),
            ));
        } else {
            sink.emit(DiagnosticEvent::error(
                depth,
                format!("Missing unblock {}/{}", source, version),
            ));
        }
    }

    fn autopkgtests(&self, record: &ExcuseRecord, depth: usize, sink: &mut dyn EventSink) {
        sink.emit(DiagnosticEvent::warning(depth, "Autopkgtest regressions"));

        for trigger in record.autopkgtests() {
            let running = trigger.results.iter().filter(|r| r.is_running()).count();
            if running > 0 {
                sink.emit(DiagnosticEvent::info(
                    depth + 1,
                    format!("{}: {} tests still running, check again later", trigger.key, running),
                ));
                continue;
            }

            for result in trigger.results.iter().filter(|r| r.is_regression()) {
                sink.emit(DiagnosticEvent::fail(
                    depth + 1,
                    format!(
                        "{} {}: {}",
                        trigger.package(),
                        result.architecture,
                        result.detail().unwrap_or("no details")
                    ),
                ));
                if result.architecture == DEBIAN_CI_ARCH {
                    self.debian_ci(trigger.package(), &result.architecture, depth + 2, sink);
                }
            }
        }
    }

    fn debian_ci(&self, package: &str, arch: &str, depth: usize, sink: &mut dyn EventSink) {
        let passes = match self.services.ci.status_for(package, arch) {
            Ok(Some(result)) if result.is_pass() => {
                sink.emit(DiagnosticEvent::pass(
                    depth,
                    format!("{} passes on {} in Debian unstable", package, arch),
                ));
                true
            }
            Ok(Some(result)) => {
                sink.emit(DiagnosticEvent::fail(
                    depth,
                    format!("{} is {} on {} in Debian unstable", package, result.status, arch),
                ));
                false
            }
            Ok(None) => {
                sink.emit(DiagnosticEvent::fail(
                    depth,
                    format!("{} has no test results on {} in Debian unstable", package, arch),
                ));
                false
            }
            Err(err) => {
                warn!("Failed to fetch Debian CI status of {:?}: {:#}", package, err);
                sink.emit(DiagnosticEvent::fail(
                    depth,
                    format!("Debian CI status of {} unavailable", package),
                ));
                false
            }
        };

        if passes {
            sink.emit(DiagnosticEvent::info(
                depth,
                format!("File a bug against {} in Debian, the regression needs fixing upstream", package),
            ));
        } else {
            sink.emit(DiagnosticEvent::info(
                depth,
                format!(
                    "The Ubuntu delta is likely at fault, file a bug to remove {} from -proposed",
                    package
                ),
            ));
        }
    }

    fn interdependencies(
        &self,
        deps: &Dependencies,
        session: &mut Session<'_>,
        depth: usize,
        sink: &mut dyn EventSink,
    ) {
        if !deps.migrate_after.is_empty() {
            sink.emit(DiagnosticEvent::fail(
                depth + 1,
                format!("Has to migrate after {}", deps.migrate_after.join(", ")),
            ));
            sink.emit(DiagnosticEvent::info(
                depth + 2,
                format!(
                    "Look for the easy autohinter in {} to see if they can migrate together",
                    self.settings.output_url
                ),
            ));
        }

        if !deps.blocked_by.is_empty() {
            sink.emit(DiagnosticEvent::fail(
                depth + 1,
                format!("Blocked by {}", deps.blocked_by.join(", ")),
            ));
            let report = session.report;
            for name in &deps.blocked_by {
                if let Some(blocker) = report.find(name) {
                    self.process(blocker, session, depth + 2, sink);
                } else {
                    sink.emit(DiagnosticEvent::info(
                        depth + 2,
                        format!("{} has no excuse of its own", name),
                    ));
                }
            }
        }
    }
}
