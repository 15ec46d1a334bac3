// Run plan
//
// Ordered list of named patterns, loaded from YAML:
//
//   patterns:
//     - name: burst
//       type: burst
//       concurrency: 10
//       count: 10
//     - name: sweep
//       type: concurrency_sweep
//       levels: [1, 2, 4, 8]

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::pattern::{Dispatch, LoadPattern, NamedPattern};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub patterns: Vec<NamedPattern>,
}

impl RunPlan {
    pub fn new(patterns: Vec<NamedPattern>) -> Self {
        Self { patterns }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let plan: RunPlan = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Sequential baseline, one burst, a steady stream and a sweep
    pub fn default_plan() -> Self {
        Self::new(vec![
            NamedPattern::new(
                "sequential",
                LoadPattern::bounded_burst(1, 5, Dispatch::Sliding),
            ),
            NamedPattern::new("burst", LoadPattern::burst(10)),
            NamedPattern::new(
                "sustained",
                LoadPattern::sustained(20, Duration::from_millis(500)),
            ),
            NamedPattern::new("sweep", LoadPattern::sweep(vec![1, 2, 4, 8, 16])),
        ])
    }

    /// Pattern names must be unique and every pattern must be runnable
    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(BenchError::config("plan has no patterns"));
        }

        let mut seen = HashSet::new();
        for named in &self.patterns {
            if named.name.trim().is_empty() {
                return Err(BenchError::config("pattern name must not be empty"));
            }
            if !seen.insert(named.name.as_str()) {
                return Err(BenchError::config(format!(
                    "duplicate pattern name: {}",
                    named.name
                )));
            }
            if let Err(e) = named.pattern.validate() {
                let reason = match e {
                    BenchError::Config(msg) => msg,
                    other => other.to_string(),
                };
                return Err(BenchError::config(format!(
                    "pattern {}: {}",
                    named.name, reason
                )));
            }
        }
        Ok(())
    }

    pub fn declared_requests(&self) -> usize {
        self.patterns
            .iter()
            .map(|p| p.pattern.declared_requests())
            .sum()
    }
}
