use pretty_assertions::assert_eq;
use realmlink_testrunner::{
    LocalSandbox, RunSummary, SandboxHarness, SuiteConfig, SuiteSpec, TestSpec, TestStatus,
    run_all,
};
use realmlink_types::{RealmContext, RealmRole};

fn suite(path: &str, names: &[&str]) -> SuiteSpec {
    SuiteSpec {
        path: path.to_string(),
        tests: names
            .iter()
            .map(|n| TestSpec {
                filename: n.to_string(),
                has_component: false,
            })
            .collect(),
    }
}

fn summary_with(failures: &[&str]) -> RunSummary {
    RunSummary {
        reports: Vec::new(),
        failures: failures.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn messages_by_failure_count() {
    assert_eq!(summary_with(&[]).message(), "All tests passed.");
    assert_eq!(summary_with(&["a"]).message(), "One test failed!");
    assert_eq!(summary_with(&["a", "b", "c"]).message(), "3 tests failed!");
}

#[test]
fn report_lists_failures() {
    assert_eq!(summary_with(&[]).report(), "");
    assert_eq!(
        summary_with(&["test/a/x.js", "test/b/y.js"]).report(),
        "Failing (2):\n  test/a/x.js\n  test/b/y.js"
    );
}

#[tokio::test]
async fn run_all_collects_failures_in_order() {
    let suites = vec![
        suite("test/a", &["ok.js", "bad.js"]),
        suite("test/b", &["ok.js"]),
        suite("test/c", &["bad.js", "missing.js"]),
    ];
    let host = RealmContext::new(RealmRole::Top, "https://host.test");
    let summary = run_all(&suites, &SuiteConfig::default(), |_spec| {
        LocalSandbox::new(host.clone(), || {
            SandboxHarness::new()
                .check("ok.js", || true)
                .check("bad.js", || false)
        })
    })
    .await
    .unwrap();

    assert_eq!(
        summary.failures,
        vec!["test/a/bad.js", "test/c/bad.js", "test/c/missing.js"]
    );
    assert_eq!(summary.message(), "3 tests failed!");
    assert!(!summary.success());
    let statuses: Vec<TestStatus> = summary.reports.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![TestStatus::Failed, TestStatus::Success, TestStatus::Failed]
    );
}

#[tokio::test]
async fn run_all_without_suites_passes() {
    let host = RealmContext::new(RealmRole::Top, "https://host.test");
    let summary = run_all(&[], &SuiteConfig::default(), |_spec| {
        LocalSandbox::new(host.clone(), SandboxHarness::new)
    })
    .await
    .unwrap();
    assert!(summary.success());
    assert_eq!(summary.message(), "All tests passed.");
}
