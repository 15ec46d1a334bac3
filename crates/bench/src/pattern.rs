// Load pattern definitions
//
// A pattern is a pure schedule: how many requests, when they are dispatched
// and how many may be in flight. The driver interprets it; nothing here
// touches the network.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// How a burst keeps its concurrency cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Refill a slot as soon as any request completes
    #[default]
    Sliding,
    /// Dispatch `concurrency` requests, wait for all of them, repeat
    Batches,
}

/// A declarative load pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadPattern {
    /// `count` requests with at most `concurrency` in flight
    Burst {
        concurrency: usize,
        count: usize,
        #[serde(default)]
        dispatch: Dispatch,
    },
    /// One request every `interval`, regardless of completions
    Sustained {
        count: usize,
        #[serde(rename = "interval_ms", with = "duration_ms")]
        interval: Duration,
    },
    /// A burst per level, run to completion one level after another.
    /// Each level issues `level * rounds` requests.
    ConcurrencySweep {
        levels: Vec<usize>,
        #[serde(default = "default_rounds")]
        rounds: usize,
    },
}

fn default_rounds() -> usize {
    1
}

impl LoadPattern {
    /// All `count` requests dispatched at once
    pub fn burst(count: usize) -> Self {
        LoadPattern::Burst {
            concurrency: count,
            count,
            dispatch: Dispatch::Sliding,
        }
    }

    pub fn bounded_burst(concurrency: usize, count: usize, dispatch: Dispatch) -> Self {
        LoadPattern::Burst {
            concurrency,
            count,
            dispatch,
        }
    }

    pub fn sustained(count: usize, interval: Duration) -> Self {
        LoadPattern::Sustained { count, interval }
    }

    pub fn sweep(levels: Vec<usize>) -> Self {
        LoadPattern::ConcurrencySweep { levels, rounds: 1 }
    }

    /// Short kind label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            LoadPattern::Burst { .. } => "burst",
            LoadPattern::Sustained { .. } => "sustained",
            LoadPattern::ConcurrencySweep { .. } => "sweep",
        }
    }

    /// Total number of requests the pattern declares
    pub fn declared_requests(&self) -> usize {
        match self {
            LoadPattern::Burst { count, .. } => *count,
            LoadPattern::Sustained { count, .. } => *count,
            LoadPattern::ConcurrencySweep { levels, rounds } => {
                levels.iter().map(|level| level * rounds).sum()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LoadPattern::Burst {
                concurrency, count, ..
            } => {
                if *concurrency == 0 {
                    return Err(BenchError::config("burst concurrency must be at least 1"));
                }
                if *count == 0 {
                    return Err(BenchError::config("burst count must be at least 1"));
                }
            }
            LoadPattern::Sustained { count, .. } => {
                if *count == 0 {
                    return Err(BenchError::config("sustained count must be at least 1"));
                }
                if u32::try_from(*count).is_err() {
                    return Err(BenchError::config(format!(
                        "sustained count must be at most {}",
                        u32::MAX
                    )));
                }
            }
            LoadPattern::ConcurrencySweep { levels, rounds } => {
                if levels.is_empty() {
                    return Err(BenchError::config("sweep needs at least one level"));
                }
                if levels.contains(&0) {
                    return Err(BenchError::config("sweep levels must be at least 1"));
                }
                if *rounds == 0 {
                    return Err(BenchError::config("sweep rounds must be at least 1"));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadPattern::Burst {
                concurrency,
                count,
                dispatch,
            } => write!(
                f,
                "burst(concurrency={}, count={}, {:?})",
                concurrency, count, dispatch
            ),
            LoadPattern::Sustained { count, interval } => write!(
                f,
                "sustained(count={}, interval={}ms)",
                count,
                interval.as_millis()
            ),
            LoadPattern::ConcurrencySweep { levels, rounds } => {
                write!(f, "sweep(levels={:?}, rounds={})", levels, rounds)
            }
        }
    }
}

/// A pattern with the name it is reported under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPattern {
    pub name: String,
    #[serde(flatten)]
    pub pattern: LoadPattern,
}

impl NamedPattern {
    pub fn new(name: impl Into<String>, pattern: LoadPattern) -> Self {
        Self {
            name: name.into(),
            pattern,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
