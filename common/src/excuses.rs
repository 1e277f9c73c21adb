use crate::errors::*;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(rename = "generated-date")]
    generated_date: Option<Value>,
    sources: Option<Value>,
}

/// One britney excuse, keyed by source package name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcuseRecord {
    pub source_name: String,
    pub item_name: String,
    pub new_version: Option<String>,
    pub old_version: Option<String>,
    pub is_candidate: bool,
    pub component: Option<String>,
    pub reasons: Vec<String>,
    pub missing_builds: Option<MissingBuilds>,
    pub old_binaries: BTreeMap<String, Vec<String>>,
    pub dependencies: Option<Dependencies>,
    pub policy_info: Option<PolicyInfo>,
    pub hints: Vec<Hint>,
}

fn name_of(entry: &Mapping, key: &str) -> Option<String> {
    match entry.get(key) {
        Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
        _ => None,
    }
}

/// Decodes one optional field, a field with an unexpected shape is treated
/// as absent
fn field<T: DeserializeOwned>(entry: &Mapping, source: &str, key: &str) -> Option<T> {
    let value = entry.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_yaml::from_value(value.clone()) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Ignoring malformed {:?} in excuse for {:?}: {}", key, source, err);
            None
        }
    }
}

impl ExcuseRecord {
    fn from_yaml(i: usize, entry: &Value) -> std::result::Result<ExcuseRecord, ReportError> {
        let entry = entry.as_mapping().ok_or(ReportError::MissingName(i))?;
        let item_name = name_of(entry, "item-name");
        let source_name = name_of(entry, "source")
            .or_else(|| item_name.clone())
            .ok_or(ReportError::MissingName(i))?;
        let src = source_name.as_str();

        Ok(ExcuseRecord {
            item_name: item_name.unwrap_or_default(),
            new_version: entry.get("new-version").and_then(scalar_to_string),
            old_version: entry.get("old-version").and_then(scalar_to_string),
            is_candidate: field(entry, src, "is-candidate").unwrap_or_default(),
            component: field(entry, src, "component"),
            reasons: field(entry, src, "reason").unwrap_or_default(),
            missing_builds: field(entry, src, "missing-builds"),
            old_binaries: field(entry, src, "old-binaries").unwrap_or_default(),
            dependencies: field(entry, src, "dependencies"),
            policy_info: field(entry, src, "policy_info"),
            hints: field(entry, src, "hints").unwrap_or_default(),
            source_name,
        })
    }
}

/// Either britney's `{on-architectures: [..]}` or a plain list of architectures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingBuilds {
    pub on_architectures: Vec<String>,
    pub on_unimportant_architectures: Vec<String>,
}

impl<'de> Deserialize<'de> for MissingBuilds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Detailed {
            #[serde(rename = "on-architectures", default)]
            on_architectures: Vec<String>,
            #[serde(rename = "on-unimportant-architectures", default)]
            on_unimportant_architectures: Vec<String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Architectures(Vec<String>),
            Detailed(Detailed),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::Detailed(d) => MissingBuilds {
                on_architectures: d.on_architectures,
                on_unimportant_architectures: d.on_unimportant_architectures,
            },
            Shape::Architectures(archs) => MissingBuilds {
                on_architectures: archs,
                on_unimportant_architectures: Vec::new(),
            },
        })
    }
}

/// Keeps the architectures in the order the report lists them
fn ordered_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<(String, Vec<String>)>, D::Error> {
    let mapping = Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(k, v)| {
            let key = k
                .as_str()
                .ok_or_else(|| serde::de::Error::custom("architecture is not a string"))?
                .to_string();
            let list = serde_yaml::from_value(v).map_err(serde::de::Error::custom)?;
            Ok((key, list))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Dependencies {
    #[serde(rename = "unsatisfiable-dependencies", default, deserialize_with = "ordered_map")]
    pub unsatisfiable_dependencies: Vec<(String, Vec<String>)>,
    #[serde(rename = "blocked-by", default)]
    pub blocked_by: Vec<String>,
    #[serde(rename = "migrate-after", default)]
    pub migrate_after: Vec<String>,
}

/// Policy results are kept as raw yaml, britney mixes verdict strings into
/// the same mappings as the actual per-package data
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyInfo {
    #[serde(default)]
    pub autopkgtest: Mapping,
    pub age: Option<Age>,
    #[serde(rename = "block-bugs", default)]
    pub block_bugs: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Age {
    #[serde(rename = "current-age")]
    pub current_age: Option<f64>,
    #[serde(rename = "age-requirement")]
    pub age_requirement: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Hint {
    #[serde(rename = "hint-type")]
    pub hint_type: Option<String>,
    #[serde(rename = "hint-from")]
    pub hint_from: Option<String>,
}

impl Hint {
    pub fn is_freeze(&self) -> bool {
        self.hint_type.as_deref() == Some("freeze") || self.hint_from.as_deref() == Some("freeze")
    }
}

/// Result of one autopkgtest run as reported by britney
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub architecture: String,
    pub status: String,
    pub details: Vec<String>,
}

impl TestResult {
    pub fn is_running(&self) -> bool {
        self.status.starts_with("RUNNING")
    }

    pub fn is_regression(&self) -> bool {
        self.status == "REGRESSION"
    }

    pub fn detail(&self) -> Option<&str> {
        self.details
            .iter()
            .map(String::as_str)
            .find(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestTrigger {
    pub key: String,
    pub results: Vec<TestResult>,
}

impl TestTrigger {
    /// The package part of a `package/version` key
    pub fn package(&self) -> &str {
        self.key.split('/').next().unwrap_or(&self.key)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ExcuseRecord {
    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }

    pub fn current_age(&self) -> f64 {
        self.policy_info
            .as_ref()
            .and_then(|p| p.age.as_ref())
            .and_then(|a| a.current_age)
            .unwrap_or(0.0)
    }

    pub fn version(&self) -> &str {
        self.new_version.as_deref().unwrap_or("-")
    }

    /// Bug numbers listed by the block-bugs policy, in report order
    pub fn block_bugs(&self) -> Vec<u64> {
        let Some(policy) = &self.policy_info else {
            return Vec::new();
        };
        policy
            .block_bugs
            .keys()
            .filter_map(|k| match k {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .collect()
    }

    /// Autopkgtest results grouped by trigger, entries that aren't results
    /// (like the policy verdict) are skipped
    pub fn autopkgtests(&self) -> Vec<TestTrigger> {
        let Some(policy) = &self.policy_info else {
            return Vec::new();
        };

        let mut triggers = Vec::new();
        for (key, value) in &policy.autopkgtest {
            let (Some(key), Value::Mapping(archs)) = (key.as_str(), value) else {
                continue;
            };

            let mut results = Vec::new();
            for (arch, result) in archs {
                let (Some(arch), Value::Sequence(fields)) = (arch.as_str(), result) else {
                    continue;
                };
                let mut fields = fields.iter().map(|f| scalar_to_string(f).unwrap_or_default());
                let status = fields.next().unwrap_or_default();
                results.push(TestResult {
                    architecture: arch.to_string(),
                    status,
                    details: fields.collect(),
                });
            }

            triggers.push(TestTrigger {
                key: key.to_string(),
                results,
            });
        }
        triggers
    }
}

#[derive(Debug, Default)]
pub struct ExcuseStore {
    generated_date: Option<String>,
    records: Vec<ExcuseRecord>,
    index: HashMap<String, usize>,
}

impl ExcuseStore {
    pub fn load(raw: &str) -> std::result::Result<ExcuseStore, ReportError> {
        let report = serde_yaml::from_str::<RawReport>(raw)?;
        let Some(Value::Sequence(sources)) = report.sources else {
            return Err(ReportError::MissingSources);
        };

        let mut records = Vec::with_capacity(sources.len());
        let mut index = HashMap::with_capacity(sources.len());
        for (i, entry) in sources.iter().enumerate() {
            let record = ExcuseRecord::from_yaml(i, entry)?;
            if index.contains_key(&record.source_name) {
                warn!(
                    "Ignoring additional excuse for {:?} ({:?})",
                    record.source_name, record.item_name
                );
                continue;
            }
            index.insert(record.source_name.clone(), records.len());
            records.push(record);
        }

        debug!("Indexed {} excuses", records.len());
        Ok(ExcuseStore {
            generated_date: report.generated_date.as_ref().and_then(scalar_to_string),
            records,
            index,
        })
    }

    pub fn generated_date(&self) -> Option<&str> {
        self.generated_date.as_deref()
    }

    pub fn find(&self, name: &str) -> Option<&ExcuseRecord> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// All excuses, oldest first
    pub fn all(&self) -> impl Iterator<Item = &ExcuseRecord> + '_ {
        let mut order = (0..self.records.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.records[a], &self.records[b]);
            b.current_age()
                .total_cmp(&a.current_age())
                .then_with(|| a.source_name.cmp(&b.source_name))
        });
        order.into_iter().map(move |i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"
generated-date: 2024-03-01 12:00:00.000000
sources:
- component: main
  excuses:
  - Migration status for foo (1.0-1 to 1.1-1): BLOCKED
  is-candidate: false
  item-name: foo
  new-version: 1.1-1
  old-version: 1.0-1
  missing-builds:
    on-architectures:
    - armhf
    on-unimportant-architectures: []
  old-binaries:
    1.0-1:
    - libfoo0
  dependencies:
    blocked-by:
    - bar
    unsatisfiable-dependencies:
      amd64:
      - libbar1 (>= 2)
  policy_info:
    age:
      age-requirement: 0
      current-age: 3.5
      verdict: PASS
    autopkgtest:
      foo/1.1-1:
        amd64:
        - REGRESSION
        - https://autopkgtest.ubuntu.com/log
        - https://autopkgtest.ubuntu.com/packages/f/foo
        - null
        - null
        arm64:
        - PASS
        - https://autopkgtest.ubuntu.com/log2
      verdict: REJECTED_PERMANENTLY
    block-bugs:
      '123456': 1700000000
      verdict: REJECTED_NEEDS_APPROVAL
  reason:
  - autopkgtest
  - block
  - depends
  hints:
  - hint-from: freeze
    hint-type: block-udeb
  source: foo
- is-candidate: true
  item-name: bar
  new-version: 2.0-1
  old-version: 1.0-1
  policy_info:
    age:
      current-age: 10
  reason: []
  source: bar
- is-candidate: true
  item-name: baz
  new-version: 0.1-1
  reason: []
"#;

    #[test]
    fn test_load_report() {
        let store = ExcuseStore::load(REPORT).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.generated_date(), Some("2024-03-01 12:00:00.000000"));

        let foo = store.find("foo").unwrap();
        assert!(!foo.is_candidate);
        assert_eq!(foo.component.as_deref(), Some("main"));
        assert_eq!(foo.reasons, vec!["autopkgtest", "block", "depends"]);
        assert_eq!(
            foo.missing_builds.as_ref().unwrap().on_architectures,
            vec!["armhf"]
        );
        assert_eq!(foo.old_binaries["1.0-1"], vec!["libfoo0"]);
        let deps = foo.dependencies.as_ref().unwrap();
        assert_eq!(deps.blocked_by, vec!["bar"]);
        assert_eq!(
            deps.unsatisfiable_dependencies,
            vec![("amd64".to_string(), vec!["libbar1 (>= 2)".to_string()])]
        );
        assert_eq!(foo.current_age(), 3.5);
        assert!(foo.hints[0].is_freeze());
    }

    #[test]
    fn test_item_name_fallback() {
        let store = ExcuseStore::load(REPORT).unwrap();
        let baz = store.find("baz").unwrap();
        assert_eq!(baz.source_name, "baz");
        assert!(baz.policy_info.is_none());
        assert_eq!(baz.current_age(), 0.0);
    }

    #[test]
    fn test_find_is_idempotent() {
        let store = ExcuseStore::load(REPORT).unwrap();
        let first = store.find("foo").unwrap().clone();
        let second = store.find("foo").unwrap();
        assert_eq!(&first, second);
        assert!(store.find("missing").is_none());
    }

    #[test]
    fn test_all_sorted_by_age() {
        let store = ExcuseStore::load(REPORT).unwrap();
        let names = store.all().map(|r| r.source_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["bar", "foo", "baz"]);
        // restartable
        assert_eq!(store.all().count(), 3);
    }

    #[test]
    fn test_block_bugs_skip_verdict() {
        let store = ExcuseStore::load(REPORT).unwrap();
        assert_eq!(store.find("foo").unwrap().block_bugs(), vec![123456]);
        assert!(store.find("bar").unwrap().block_bugs().is_empty());
    }

    #[test]
    fn test_autopkgtests_skip_verdict() {
        let store = ExcuseStore::load(REPORT).unwrap();
        let triggers = store.find("foo").unwrap().autopkgtests();
        assert_eq!(triggers.len(), 1);
        let trigger = &triggers[0];
        assert_eq!(trigger.package(), "foo");
        assert_eq!(trigger.results.len(), 2);
        assert!(trigger.results[0].is_regression());
        assert_eq!(
            trigger.results[0].detail(),
            Some("https://autopkgtest.ubuntu.com/log")
        );
        assert_eq!(trigger.results[1].status, "PASS");
    }

    #[test]
    fn test_missing_sources() {
        let err = ExcuseStore::load("generated-date: today\n").unwrap_err();
        assert!(matches!(err, ReportError::MissingSources));
    }

    #[test]
    fn test_missing_name() {
        let err = ExcuseStore::load("sources:\n- reason: []\n").unwrap_err();
        assert!(matches!(err, ReportError::MissingName(0)));
    }

    #[test]
    fn test_duplicate_source_keeps_first() {
        let store = ExcuseStore::load(
            "sources:\n- source: foo\n  item-name: foo\n- source: foo\n  item-name: foo/i386\n",
        )
        .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("foo").unwrap().item_name, "foo");
    }

    #[test]
    fn test_malformed_fields_are_skipped() {
        let store = ExcuseStore::load(
            "
sources:
- source: foo
  reason: []
- source: bar
  new-version: 2.0-1
  reason: [no-binaries, depends, autopkgtest]
  missing-builds: [armhf]
  dependencies: [libbar1]
  policy_info: not a mapping
- source: baz
  is-candidate: maybe
  hints: freeze
  policy_info:
    age: old
",
        )
        .unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.find("foo").is_some());

        let bar = store.find("bar").unwrap();
        assert_eq!(bar.version(), "2.0-1");
        assert_eq!(bar.reasons, vec!["no-binaries", "depends", "autopkgtest"]);
        assert_eq!(bar.missing_builds.as_ref().unwrap().on_architectures, vec!["armhf"]);
        assert!(bar.dependencies.is_none());
        assert!(bar.policy_info.is_none());
        assert!(bar.autopkgtests().is_empty());

        let baz = store.find("baz").unwrap();
        assert!(!baz.is_candidate);
        assert!(baz.hints.is_empty());
        assert!(baz.policy_info.is_none());
        assert_eq!(baz.current_age(), 0.0);
    }

    #[test]
    fn test_unsatisfiable_keeps_report_order() {
        let store = ExcuseStore::load(
            "
sources:
- source: foo
  dependencies:
    unsatisfiable-dependencies:
      s390x: [libbar1]
      amd64: [libbar1]
",
        )
        .unwrap();
        let deps = store.find("foo").unwrap().dependencies.as_ref().unwrap();
        let archs = deps
            .unsatisfiable_dependencies
            .iter()
            .map(|(arch, _)| arch.as_str())
            .collect::<Vec<_>>();
        assert_eq!(archs, vec!["s390x", "amd64"]);
    }

    #[test]
    fn test_sources_not_a_list() {
        let err = ExcuseStore::load("sources: 3\n").unwrap_err();
        assert!(matches!(err, ReportError::MissingSources));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ExcuseStore::load("sources: [").unwrap_err();
        assert!(matches!(err, ReportError::Yaml(_)));
    }
}
