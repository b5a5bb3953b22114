use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// How a sub-process fans one batch out into unit-of-work invocations.
///
/// - `Uniform`: one `process` call per record, then a batch-level veto check
///   (default).
/// - `Partitioned`: split at the midpoint, each half runs under its own
///   unit-of-work variant.
/// - `Paired`: every record gets a `process` call plus a `simulate` call
///   running alongside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutPolicy {
    #[default]
    Uniform,
    Partitioned,
    Paired,
}

impl FromStr for FanOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(FanOutPolicy::Uniform),
            "partitioned" => Ok(FanOutPolicy::Partitioned),
            "paired" => Ok(FanOutPolicy::Paired),
            other => Err(format!(
                "invalid fan-out policy: {other} \
                 (expected \"uniform\", \"partitioned\" or \"paired\")"
            )),
        }
    }
}

/// What happens to in-flight sub-processes when a lifetime continues as new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Detach them: they keep running but the next lifetime never hears of
    /// them.
    #[default]
    Abandon,
    /// Hand their identities (and completion futures) to the next lifetime,
    /// which reports them as `RUNNING` until they resolve.
    CarryForward,
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "abandon" => Ok(ReconcilePolicy::Abandon),
            "carry_forward" => Ok(ReconcilePolicy::CarryForward),
            other => Err(format!(
                "invalid reconcile policy: {other} (expected \"abandon\" or \"carry_forward\")"
            )),
        }
    }
}

/// Boxed `Send` future, the shape every pluggable collaborator returns.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
