//! Test suite discovery on disk.
//!
//! Every directory under the root holding `*.js` files is one suite; each
//! script is one test. A sibling `.yz` file with the same stem marks a test
//! that ships a component.

use crate::error::OrchestratorResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One test file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    pub filename: String,
    pub has_component: bool,
}

/// A directory of tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// `/`-separated path starting with the root directory's name.
    pub path: String,
    pub tests: Vec<TestSpec>,
}

impl SuiteSpec {
    /// Test names in run order.
    pub fn names(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.filename.clone()).collect()
    }
}

/// Walks `root` and returns its suites sorted by path, tests sorted by name.
pub fn discover_suites(root: &Path) -> OrchestratorResult<Vec<SuiteSpec>> {
    let mut files: Vec<PathBuf> = Vec::new();
    collect_files(root, &mut files)?;

    let components: BTreeSet<&Path> = files
        .iter()
        .filter(|p| has_extension(p, "yz"))
        .map(PathBuf::as_path)
        .collect();

    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut suites: BTreeMap<String, Vec<TestSpec>> = BTreeMap::new();
    for file in files.iter().filter(|p| has_extension(p, "js")) {
        let Some(filename) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let parent = file.parent().unwrap_or(root);
        let has_component = components.contains(file.with_extension("yz").as_path());
        suites
            .entry(suite_path(&base, root, parent))
            .or_default()
            .push(TestSpec {
                filename,
                has_component,
            });
    }

    let suites: Vec<SuiteSpec> = suites
        .into_iter()
        .map(|(path, mut tests)| {
            tests.sort();
            SuiteSpec { path, tests }
        })
        .collect();
    debug!(root = %root.display(), suites = suites.len(), "discovered test suites");
    Ok(suites)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> OrchestratorResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn suite_path(base: &str, root: &Path, dir: &Path) -> String {
    let mut parts = vec![base.to_string()];
    if let Ok(rel) = dir.strip_prefix(root) {
        parts.extend(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        );
    }
    parts.retain(|p| !p.is_empty());
    parts.join("/")
}
