//! Test groups
//!
//! A group bundles cases with the fixture that provisions them, the tables
//! backed up around them and the `depends` edges between them.

use crate::case::{Case, CaseRunner, DataDriven, ScenarioCase, Single};
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::{Fixture, NoFixture};
use crate::graph::DependencyGraph;

pub struct Group {
    name: String,
    backup: Vec<String>,
    fixture: Box<dyn Fixture>,
    cases: Vec<Box<dyn CaseRunner>>,
    graph: DependencyGraph,
    skip: Option<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backup: Vec::new(),
            fixture: Box::new(NoFixture),
            cases: Vec::new(),
            graph: DependencyGraph::new(),
            skip: None,
        }
    }

    /// Tables copied before the fixture runs and restored after teardown
    pub fn backup(mut self, tables: &[&str]) -> Self {
        self.backup.extend(tables.iter().map(|t| t.to_string()));
        self
    }

    pub fn fixture(mut self, fixture: impl Fixture + 'static) -> Self {
        self.fixture = Box::new(fixture);
        self
    }

    pub fn case(self, case: impl Case + 'static) -> Self {
        self.add(Box::new(Single(case)))
    }

    pub fn scenarios(self, case: impl ScenarioCase + 'static) -> Self {
        self.add(Box::new(DataDriven(case)))
    }

    fn add(mut self, runner: Box<dyn CaseRunner>) -> Self {
        self.graph.add_node(runner.name());
        self.cases.push(runner);
        self
    }

    /// `dependent` is skipped unless every run of `prerequisite` passed.
    pub fn depends(mut self, dependent: &str, prerequisite: &str) -> Self {
        self.graph.add_edge(dependent, prerequisite);
        self
    }

    /// Skip the whole group, recording why.
    pub fn skip_if(mut self, condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            self.skip = Some(reason.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backup_tables(&self) -> &[String] {
        &self.backup
    }

    pub fn fixture_ref(&self) -> &dyn Fixture {
        self.fixture.as_ref()
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn cases(&self) -> &[Box<dyn CaseRunner>] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&dyn CaseRunner> {
        self.cases
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Case names in execution order. Fails on duplicate names, unknown
    /// dependencies or cycles.
    pub fn plan(&self) -> HarnessResult<Vec<String>> {
        if self.graph.nodes().len() != self.cases.len() {
            return Err(HarnessError::Graph(format!(
                "group {} declares a case name twice",
                self.name
            )));
        }
        self.graph.execution_order()
    }
}
