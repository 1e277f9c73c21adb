use crate::errors::*;
use crate::http;
use crate::query::{
    self, BugTracker, BuildStatus, Distro, DistroQuery, NewBinary, PackageInfo, Pocket, TaskSearch,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use url::Url;

/// Architecture used to look up binary publications in a series
const LOOKUP_ARCH: &str = "amd64";

#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub entries: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionEntry {
    pub name: String,
    pub current_series_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePublication {
    pub source_package_name: String,
    pub source_package_version: String,
    pub component_name: Option<String>,
    pub self_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinaryPublication {
    pub binary_package_name: String,
    pub binary_package_version: String,
    pub source_package_name: String,
    pub component_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildEntry {
    pub arch_tag: String,
    pub buildstate: String,
    pub build_log_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageUploadEntry {
    pub display_name: String,
    pub display_version: String,
    pub display_arches: String,
    #[serde(default)]
    pub contains_build: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BugEntry {
    pub id: u64,
    pub title: String,
    pub web_link: String,
    pub bug_tasks_collection_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BugTaskEntry {
    pub status: String,
    pub importance: String,
    pub assignee_link: Option<String>,
    pub bug_target_display_name: String,
    pub web_link: String,
}

fn component_of(name: Option<&str>) -> Option<query::Component> {
    let name = name?;
    match name.parse() {
        Ok(component) => Some(component),
        Err(err) => {
            debug!("Ignoring component: {:#}", err);
            None
        }
    }
}

impl From<SourcePublication> for PackageInfo {
    fn from(p: SourcePublication) -> PackageInfo {
        PackageInfo {
            component: component_of(p.component_name.as_deref()),
            source: p.source_package_name,
            version: p.source_package_version,
        }
    }
}

impl From<BinaryPublication> for PackageInfo {
    fn from(p: BinaryPublication) -> PackageInfo {
        PackageInfo {
            component: component_of(p.component_name.as_deref()),
            source: p.source_package_name,
            version: p.binary_package_version,
        }
    }
}

impl From<BuildEntry> for query::Build {
    fn from(b: BuildEntry) -> query::Build {
        query::Build {
            architecture: b.arch_tag,
            state: b.buildstate,
            log_url: b.build_log_url,
        }
    }
}

/// `https://api.launchpad.net/devel/~foo` -> `foo`
fn person_name(link: &str) -> &str {
    link.rsplit('/')
        .next()
        .map(|name| name.trim_start_matches('~'))
        .unwrap_or(link)
}

impl From<BugTaskEntry> for query::BugTask {
    fn from(t: BugTaskEntry) -> query::BugTask {
        query::BugTask {
            assignee: t.assignee_link.as_deref().map(|l| person_name(l).to_string()),
            status: t.status,
            importance: t.importance,
            target: t.bug_target_display_name,
            web_link: t.web_link,
        }
    }
}

/// Ways to find a package by name, tried in this order
#[derive(Debug, Clone, Copy, PartialEq)]
enum LookupStrategy {
    BinaryPublication,
    SourcePublication,
}

const LOOKUP_STRATEGIES: &[LookupStrategy] = &[
    LookupStrategy::BinaryPublication,
    LookupStrategy::SourcePublication,
];

type LookupKey = (String, Distro, String, Pocket);

/// Tries each strategy until one finds the package. A failing strategy is
/// skipped, the lookup only fails if none of them could be asked.
fn first_found<F>(strategies: &[LookupStrategy], mut lookup: F) -> Result<Option<PackageInfo>>
where
    F: FnMut(LookupStrategy) -> Result<Option<PackageInfo>>,
{
    let mut last_err = None;
    let mut answered = false;
    for strategy in strategies {
        match lookup(*strategy) {
            Ok(Some(found)) => {
                debug!("Found {:?} using {:?}", found.source, strategy);
                return Ok(Some(found));
            }
            Ok(None) => answered = true,
            Err(err) => {
                warn!("Lookup using {:?} failed: {:#}", strategy, err);
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) if !answered => Err(err),
        _ => Ok(None),
    }
}

pub struct Client {
    endpoint: Url,
    client: http::Client,
    series: RefCell<Option<String>>,
    lookups: RefCell<HashMap<LookupKey, Option<PackageInfo>>>,
    bugs: RefCell<HashMap<u64, query::Bug>>,
    builds: RefCell<HashMap<(String, String), Vec<query::Build>>>,
}

impl Client {
    pub fn new(endpoint: &str, series: Option<String>) -> Result<Client> {
        let mut endpoint = endpoint
            .parse::<Url>()
            .with_context(|| anyhow!("Failed to parse endpoint as url: {:?}", endpoint))?;

        // If the url ends with a slash, remove it
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("Given endpoint url cannot be base"))?
            .pop_if_empty();

        debug!("Setting launchpad endpoint to {:?}", endpoint.as_str());
        Ok(Client {
            endpoint,
            client: http::client()?,
            series: RefCell::new(series),
            lookups: RefCell::default(),
            bugs: RefCell::default(),
            builds: RefCell::default(),
        })
    }

    fn url_join(&self, route: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            // this unwrap is safe because we've called path_segments_mut in the constructor before
            let mut path = url.path_segments_mut().expect("Url cannot be base");
            for segment in route.split('/') {
                path.push(segment);
            }
        }
        url
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<T> {
        debug!("Sending request to launchpad: {} {:?}", url, query);
        let res = self
            .client
            .get(url)
            .query(query)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(res)
    }

    fn get_link<T: DeserializeOwned>(&self, link: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = link
            .parse::<Url>()
            .with_context(|| anyhow!("Launchpad returned invalid link: {:?}", link))?;
        self.get_json(url, query)
    }

    /// The series name, resolved to the current development series on first use
    pub fn series(&self) -> Result<String> {
        if let Some(series) = self.series.borrow().as_ref() {
            return Ok(series.clone());
        }
        let series = self.current_series(Distro::Ubuntu)?;
        info!("Using current development series: {:?}", series);
        *self.series.borrow_mut() = Some(series.clone());
        Ok(series)
    }

    pub fn current_series(&self, distro: Distro) -> Result<String> {
        let entry: DistributionEntry = self
            .get_json(self.url_join(distro.as_str()), &[])
            .context("Failed to fetch distribution")?;
        let series = person_name(&entry.current_series_link);
        if series.is_empty() {
            bail!("Distribution {:?} has no current series", entry.name);
        }
        Ok(series.to_string())
    }

    fn archive_url(&self, distro: Distro) -> Url {
        self.url_join(&format!("{}/+archive/primary", distro))
    }

    fn published_sources(
        &self,
        name: &str,
        version: Option<&str>,
        distro: Distro,
        series: &str,
        pocket: Option<Pocket>,
    ) -> Result<Vec<SourcePublication>> {
        let series_link = self.url_join(&format!("{}/{}", distro, series));
        let mut query = vec![
            ("ws.op", "getPublishedSources"),
            ("source_name", name),
            ("exact_match", "true"),
            ("distro_series", series_link.as_str()),
        ];
        if let Some(version) = version {
            query.push(("version", version));
        }
        if let Some(pocket) = pocket {
            query.push(("pocket", pocket.as_str()));
            query.push(("status", "Published"));
        }
        let sources: Collection<SourcePublication> =
            self.get_json(self.archive_url(distro), &query)?;
        Ok(sources.entries)
    }

    fn published_binaries(
        &self,
        name: &str,
        distro: Distro,
        series: &str,
        pocket: Pocket,
    ) -> Result<Vec<BinaryPublication>> {
        let das_link = self.url_join(&format!("{}/{}/{}", distro, series, LOOKUP_ARCH));
        let binaries: Collection<BinaryPublication> = self.get_json(
            self.archive_url(distro),
            &[
                ("ws.op", "getPublishedBinaries"),
                ("binary_name", name),
                ("exact_match", "true"),
                ("distro_arch_series", das_link.as_str()),
                ("pocket", pocket.as_str()),
                ("status", "Published"),
            ],
        )?;
        Ok(binaries.entries)
    }

    fn lookup_with(
        &self,
        strategy: LookupStrategy,
        name: &str,
        distro: Distro,
        series: &str,
        pocket: Pocket,
    ) -> Result<Option<PackageInfo>> {
        let found = match strategy {
            LookupStrategy::BinaryPublication => self
                .published_binaries(name, distro, series, pocket)?
                .into_iter()
                .next()
                .map(PackageInfo::from),
            LookupStrategy::SourcePublication => self
                .published_sources(name, None, distro, series, Some(pocket))?
                .into_iter()
                .next()
                .map(PackageInfo::from),
        };
        Ok(found)
    }
}

impl DistroQuery for Client {
    fn lookup(
        &self,
        name: &str,
        distro: Distro,
        series: &str,
        pocket: Pocket,
    ) -> Result<Option<PackageInfo>> {
        let key = (name.to_string(), distro, series.to_string(), pocket);
        if let Some(cached) = self.lookups.borrow().get(&key) {
            return Ok(cached.clone());
        }

        let found = first_found(LOOKUP_STRATEGIES, |strategy| {
            self.lookup_with(strategy, name, distro, series, pocket)
        })
        .with_context(|| {
            anyhow!("Failed to look up {:?} in {}/{} {:?}", name, distro, series, pocket)
        })?;

        self.lookups.borrow_mut().insert(key, found.clone());
        Ok(found)
    }
}

impl BugTracker for Client {
    fn bug(&self, id: u64) -> Result<query::Bug> {
        if let Some(bug) = self.bugs.borrow().get(&id) {
            return Ok(bug.clone());
        }

        let entry: BugEntry = self
            .get_json(self.url_join(&format!("bugs/{}", id)), &[])
            .with_context(|| anyhow!("Failed to fetch bug #{}", id))?;
        let tasks: Collection<BugTaskEntry> = self
            .get_link(&entry.bug_tasks_collection_link, &[])
            .with_context(|| anyhow!("Failed to fetch tasks of bug #{}", id))?;

        let bug = query::Bug {
            id: entry.id,
            title: entry.title,
            web_link: entry.web_link,
            tasks: tasks.entries.into_iter().map(query::BugTask::from).collect(),
        };
        self.bugs.borrow_mut().insert(id, bug.clone());
        Ok(bug)
    }

    fn search_tasks(&self, search: &TaskSearch) -> Result<Vec<query::BugTask>> {
        let subscriber = self.url_join(&format!("~{}", search.subscriber));
        let mut query = vec![
            ("ws.op", "searchTasks"),
            ("bug_subscriber", subscriber.as_str()),
        ];
        for status in &search.statuses {
            query.push(("status", status.as_str()));
        }

        let url = self.url_join(&format!("{}/+source/{}", Distro::Ubuntu, search.target));
        let tasks: Collection<BugTaskEntry> = self
            .get_json(url, &query)
            .with_context(|| anyhow!("Failed to search bug tasks of {:?}", search.target))?;
        Ok(tasks.entries.into_iter().map(query::BugTask::from).collect())
    }
}

impl BuildStatus for Client {
    fn builds_for(&self, source: &str, version: &str) -> Result<Vec<query::Build>> {
        let key = (source.to_string(), version.to_string());
        if let Some(builds) = self.builds.borrow().get(&key) {
            return Ok(builds.clone());
        }

        let series = self.series()?;
        let publication = self
            .published_sources(source, Some(version), Distro::Ubuntu, &series, None)?
            .into_iter()
            .next()
            .with_context(|| anyhow!("No publication of {} {} in {}", source, version, series))?;

        let builds: Collection<BuildEntry> = self
            .get_link(&publication.self_link, &[("ws.op", "getBuilds")])
            .with_context(|| anyhow!("Failed to fetch builds of {} {}", source, version))?;
        let builds = builds
            .entries
            .into_iter()
            .map(query::Build::from)
            .collect::<Vec<_>>();

        self.builds.borrow_mut().insert(key, builds.clone());
        Ok(builds)
    }

    fn new_binaries(&self, source: &str) -> Result<Vec<NewBinary>> {
        let series = self.series()?;
        let uploads: Collection<PackageUploadEntry> = self
            .get_json(
                self.url_join(&format!("{}/{}", Distro::Ubuntu, series)),
                &[
                    ("ws.op", "getPackageUploads"),
                    ("status", "New"),
                    ("name", source),
                    ("exact_match", "true"),
                ],
            )
            .with_context(|| anyhow!("Failed to fetch NEW queue for {:?}", source))?;

        let binaries = uploads
            .entries
            .into_iter()
            .filter(|u| u.contains_build)
            .map(|u| NewBinary {
                name: u.display_name,
                version: u.display_version,
                architecture: u.display_arches,
            })
            .collect();
        Ok(binaries)
    }
}
