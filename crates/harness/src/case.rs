//! Test cases
//!
//! A [`Case`] runs once; a [`ScenarioCase`] runs once per scenario of its
//! data set. Both are adapted to the object-safe [`CaseRunner`] the suite
//! runner drives.

use async_trait::async_trait;
use std::sync::Arc;
use uiprobe_common::Database;

use crate::config::HarnessConfig;
use crate::dataset::{DataSet, Scenario};
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::FixtureState;
use crate::session::Session;

/// Everything a case body can reach during one group
pub struct CaseContext {
    pub session: Session,
    pub db: Database,
    pub fixture: Arc<FixtureState>,
    pub config: Arc<HarnessConfig>,
}

impl CaseContext {
    /// Sign in with the configured default credentials.
    pub async fn login_default(&mut self) -> HarnessResult<()> {
        let credentials = self.config.credentials.clone();
        match self.session.login(&credentials).await? {
            outcome if outcome.is_authenticated() => Ok(()),
            outcome => Err(HarnessError::assertion(
                format!("sign-in as {}", credentials.username),
                "authenticated",
                format!("{:?}", outcome),
            )),
        }
    }
}

#[async_trait]
pub trait Case: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()>;
}

#[async_trait]
pub trait ScenarioCase: Send + Sync {
    type Input: Send + Sync;

    fn name(&self) -> &str;

    /// Pure provider; called afresh for every enumeration and every run.
    /// A provider that fails shows up as one failed run of the case.
    fn data(&self) -> HarnessResult<DataSet<Self::Input>>;

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<Self::Input>) -> HarnessResult<()>;
}

/// Uniform view over single and data-driven cases
#[async_trait]
pub trait CaseRunner: Send + Sync {
    fn name(&self) -> &str;

    /// One label per run, in order.
    fn runs(&self) -> Vec<String>;

    async fn run(&self, ctx: &mut CaseContext, index: usize) -> HarnessResult<()>;
}

pub struct Single<C>(pub C);

#[async_trait]
impl<C: Case> CaseRunner for Single<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn runs(&self) -> Vec<String> {
        vec![self.0.name().to_string()]
    }

    async fn run(&self, ctx: &mut CaseContext, _index: usize) -> HarnessResult<()> {
        self.0.run(ctx).await
    }
}

pub struct DataDriven<C>(pub C);

impl<C: ScenarioCase> DataDriven<C> {
    fn data(&self) -> HarnessResult<DataSet<C::Input>> {
        self.0.data().map_err(|e| match e {
            HarnessError::DataSet(_) => e,
            other => HarnessError::DataSet(format!("{} provider: {}", self.0.name(), other)),
        })
    }
}

#[async_trait]
impl<C: ScenarioCase> CaseRunner for DataDriven<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn runs(&self) -> Vec<String> {
        match self.data() {
            Ok(data) => data
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{} #{} {}", self.0.name(), i, s.name))
                .collect(),
            Err(_) => vec![format!("{} #0 data", self.0.name())],
        }
    }

    async fn run(&self, ctx: &mut CaseContext, index: usize) -> HarnessResult<()> {
        let data = self.data()?;
        let scenario = data.get(index).ok_or_else(|| {
            HarnessError::DataSet(format!(
                "{} has no scenario #{} ({} provided)",
                self.0.name(),
                index,
                data.len()
            ))
        })?;
        self.0.run(ctx, scenario).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    struct Provider(&'static str);

    #[async_trait]
    impl ScenarioCase for Provider {
        type Input = String;

        fn name(&self) -> &str {
            "provider"
        }

        fn data(&self) -> HarnessResult<DataSet<String>> {
            DataSet::from_yaml(self.0)
        }

        async fn run(&self, _ctx: &mut CaseContext, _scenario: &Scenario<String>) -> HarnessResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_run_labels() {
        let case = DataDriven(Provider(
            r#"
- { name: first, input: a, expect: { outcome: GOOD, title: ok } }
- { name: second, input: b, expect: { outcome: BAD, title: failed } }
"#,
        ));
        assert_eq!(case.runs(), vec!["provider #0 first", "provider #1 second"]);
    }

    #[test]
    fn test_broken_provider_yields_one_fixture_run() {
        let case = DataDriven(Provider("- name: [unclosed"));
        assert_eq!(case.runs(), vec!["provider #0 data"]);
        let err = case.data().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Fixture);
        assert!(err.to_string().contains("provider provider:"));
    }

    #[test]
    fn test_empty_provider_has_no_runs() {
        let case = DataDriven(Provider("[]"));
        assert!(case.runs().is_empty());
    }
}
