use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ContainerName, ImageReference};

/// Body of a `POST /launch-reader` call.
///
/// The id is routing metadata only: it correlates a trigger call with a
/// "reader" session and is never used to deduplicate launches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    #[serde(default)]
    pub id: u64,
}

impl LaunchRequest {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

/// One step of the reader lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStep {
    Pull,
    Create,
    Start,
    Stop,
    Delete,
    Evict,
}

impl LaunchStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStep::Pull => "pull",
            LaunchStep::Create => "create",
            LaunchStep::Start => "start",
            LaunchStep::Stop => "stop",
            LaunchStep::Delete => "delete",
            LaunchStep::Evict => "evict",
        }
    }
}

impl fmt::Display for LaunchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the cached image when a launch gave its lease back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvictionOutcome {
    /// This launch held the last lease and the image was removed from the cache.
    Evicted,
    /// Other launches still hold leases; the last one out evicts.
    Deferred { leases: u32 },
    /// Eviction was not requested; the image stays cached.
    Retained,
}

/// Summary of one completed pull-through-evict cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReport {
    pub request_id: u64,
    pub image: ImageReference,
    pub container: ContainerName,
    /// Steps that ran to completion, in order.
    pub steps: Vec<LaunchStep>,
    pub eviction: EvictionOutcome,
}
