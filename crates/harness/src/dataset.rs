//! Data providers
//!
//! A [`DataSet`] is the ordered list of scenarios a data-driven case runs
//! once each. Providers are pure: they build the list from literals or
//! parse it from YAML, and never touch the browser or the datastore.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::assert::Outcome;
use crate::error::{HarnessError, HarnessResult};

/// The banner a scenario must produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "UPPERCASE")]
pub enum Expectation {
    Good {
        title: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<String>,
    },
    Bad {
        title: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<String>,
    },
}

impl Expectation {
    pub fn good(title: impl Into<String>) -> Self {
        Expectation::Good {
            title: title.into(),
            details: Vec::new(),
        }
    }

    pub fn bad<I, S>(title: impl Into<String>, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::Bad {
            title: title.into(),
            details: details.into_iter().map(Into::into).collect(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Expectation::Good { .. } => Outcome::Good,
            Expectation::Bad { .. } => Outcome::Bad,
        }
    }

    pub fn is_good(&self) -> bool {
        self.outcome() == Outcome::Good
    }

    pub fn title(&self) -> &str {
        match self {
            Expectation::Good { title, .. } | Expectation::Bad { title, .. } => title,
        }
    }

    pub fn details(&self) -> &[String] {
        match self {
            Expectation::Good { details, .. } | Expectation::Bad { details, .. } => details,
        }
    }
}

/// One input tuple with its expected outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario<I> {
    pub name: String,
    pub input: I,
    pub expect: Expectation,
}

impl<I> Scenario<I> {
    pub fn new(name: impl Into<String>, input: I, expect: Expectation) -> Self {
        Self {
            name: name.into(),
            input,
            expect,
        }
    }
}

/// Ordered scenarios of one data-driven case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSet<I> {
    scenarios: Vec<Scenario<I>>,
}

impl<I> Default for DataSet<I> {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
        }
    }
}

impl<I> DataSet<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenario(mut self, name: impl Into<String>, input: I, expect: Expectation) -> Self {
        self.scenarios.push(Scenario::new(name, input, expect));
        self
    }

    pub fn push(&mut self, scenario: Scenario<I>) {
        self.scenarios.push(scenario);
    }

    pub fn get(&self, index: usize) -> Option<&Scenario<I>> {
        self.scenarios.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario<I>> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Keep only the scenarios whose outcome matches.
    pub fn only(self, outcome: Outcome) -> Self {
        Self {
            scenarios: self
                .scenarios
                .into_iter()
                .filter(|s| s.expect.outcome() == outcome)
                .collect(),
        }
    }
}

impl<I> FromIterator<Scenario<I>> for DataSet<I> {
    fn from_iter<T: IntoIterator<Item = Scenario<I>>>(iter: T) -> Self {
        Self {
            scenarios: iter.into_iter().collect(),
        }
    }
}

impl<I: DeserializeOwned> DataSet<I> {
    /// Parse a data set from YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let set: Self = serde_yaml::from_str(yaml)?;
        set.check_names()?;
        Ok(set)
    }

    /// Parse a data set from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            HarnessError::Yaml(err) => {
                HarnessError::DataSet(format!("{}: {}", path.display(), err))
            }
            other => other,
        })
    }

    /// Load and concatenate every YAML data set under a directory, in path
    /// order.
    pub fn load_dir(dir: &Path) -> HarnessResult<Self> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            set.scenarios.extend(Self::from_file(&path)?.scenarios);
        }
        set.check_names()?;
        Ok(set)
    }
}

impl<I> DataSet<I> {
    fn check_names(&self) -> HarnessResult<()> {
        let mut seen = std::collections::HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(HarnessError::DataSet(format!(
                    "duplicate scenario name {:?}",
                    scenario.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldMap;

    const HOUSEKEEPING: &str = r#"
- name: custom audit period
  input:
    id:hk_audit_mode: { checkbox: true }
    Data storage period: { text: 400d }
  expect:
    outcome: GOOD
    title: Configuration updated
- name: empty audit period
  input:
    id:hk_audit_mode: { checkbox: true }
    Data storage period: { text: "" }
  expect:
    outcome: BAD
    title: Cannot update configuration
    details:
      - 'Incorrect value for field "hk_audit": a time unit is expected.'
"#;

    #[test]
    fn test_parse_yaml_dataset() {
        let set: DataSet<FieldMap> = DataSet::from_yaml(HOUSEKEEPING).unwrap();
        assert_eq!(set.len(), 2);

        let bad = set.get(1).unwrap();
        assert_eq!(bad.expect.outcome(), Outcome::Bad);
        assert_eq!(bad.expect.title(), "Cannot update configuration");
        assert_eq!(bad.input.len(), 2);
        assert_eq!(set.clone().only(Outcome::Good).len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
- { name: a, input: 1, expect: { outcome: GOOD, title: ok } }
- { name: a, input: 2, expect: { outcome: GOOD, title: ok } }
"#;
        assert!(matches!(
            DataSet::<u32>::from_yaml(yaml),
            Err(HarnessError::DataSet(_))
        ));
    }

    #[test]
    fn test_load_dir_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "- { name: second, input: 2, expect: { outcome: BAD, title: no } }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "- { name: first, input: 1, expect: { outcome: GOOD, title: yes } }\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set: DataSet<u32> = DataSet::load_dir(dir.path()).unwrap();
        let names: Vec<&str> = set.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_builder() {
        let set = DataSet::new()
            .scenario("ok", 1, Expectation::good("Host group added"))
            .scenario(
                "dup",
                2,
                Expectation::bad("Cannot add host group", ["already exists"]),
            );
        assert_eq!(set.len(), 2);
        assert!(!set.get(1).unwrap().expect.is_good());
        assert_eq!(
            set.get(1).unwrap().expect.details().to_vec(),
            vec!["already exists".to_string()]
        );
    }
}
