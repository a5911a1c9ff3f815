//! Matches tool invocations with their results regardless of arrival order.

use std::collections::{HashMap, HashSet};

use super::BlockAccumulator;
use crate::types::{Anomaly, ToolInvocation};

/// A result that arrived before its invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResult {
    pub id: String,
    pub output: serde_json::Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// New invocation; carries a buffered result to apply, if one was waiting.
    Fresh { pending: Option<PendingResult> },
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Applied,
    /// Held until the matching invocation shows up.
    Buffered,
    Duplicate,
}

/// Per-session dedup sets and the pending-result buffer.
#[derive(Debug, Default)]
pub struct PairingResolver {
    invocations_seen: HashSet<String>,
    results_seen: HashSet<String>,
    pending: HashMap<String, PendingResult>,
}

impl PairingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invocation id and hand back any result buffered for it.
    pub fn on_invocation_start(&mut self, tool_id: &str) -> StartOutcome {
        if !self.invocations_seen.insert(tool_id.to_string()) {
            return StartOutcome::Duplicate;
        }
        StartOutcome::Fresh {
            pending: self.pending.remove(tool_id),
        }
    }

    /// Apply a result to its invocation block, or buffer it.
    pub fn on_result(
        &mut self,
        result: PendingResult,
        blocks: &mut BlockAccumulator,
    ) -> ResultOutcome {
        if !self.results_seen.insert(result.id.clone()) {
            return ResultOutcome::Duplicate;
        }
        match blocks.invocation_mut(&result.id) {
            Some(invocation) => {
                invocation.resolve(result.output, result.is_error);
                ResultOutcome::Applied
            }
            None => {
                self.pending.insert(result.id.clone(), result);
                ResultOutcome::Buffered
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Orphans at completion: invocations with no result, and buffered
    /// results with no invocation. Drains the pending buffer.
    pub fn audit(&mut self, invocations: &[&ToolInvocation]) -> Vec<Anomaly> {
        let mut anomalies: Vec<Anomaly> = invocations
            .iter()
            .filter(|invocation| !invocation.is_resolved())
            .map(|invocation| Anomaly::OrphanedInvocation {
                tool_id: invocation.id.clone(),
            })
            .collect();

        let mut orphaned: Vec<String> = self.pending.drain().map(|(id, _)| id).collect();
        orphaned.sort();
        anomalies.extend(
            orphaned
                .into_iter()
                .map(|tool_id| Anomaly::OrphanedResult { tool_id }),
        );
        anomalies
    }

    pub fn clear(&mut self) {
        self.invocations_seen.clear();
        self.results_seen.clear();
        self.pending.clear();
    }
}
