//! Routine-to-queue binding table.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::PipelineError;

/// Physical queue for one routine type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBinding {
    /// Routine whose invocations travel on this queue.
    pub routine_type: String,
    /// Queue address.
    pub queue_url: String,
    /// Local emulator endpoint, when not using the default backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_override: Option<String>,
    /// Where poison messages go after too many receives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_url: Option<String>,
}

/// Immutable binding table, built once at startup and shared by clone.
#[derive(Debug, Clone, Default)]
pub struct QueueBindings {
    by_routine: Arc<HashMap<String, QueueBinding>>,
}

impl QueueBindings {
    /// Builds the table from explicit bindings.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for empty names or a routine bound
    /// twice.
    pub fn new(bindings: Vec<QueueBinding>) -> Result<Self, PipelineError> {
        let mut by_routine = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            if binding.routine_type.trim().is_empty() || binding.queue_url.trim().is_empty() {
                return Err(PipelineError::Config(
                    "queue binding with empty routine or queue".to_string(),
                ));
            }
            if binding.dead_letter_url.as_deref() == Some(binding.queue_url.as_str()) {
                return Err(PipelineError::Config(format!(
                    "queue {} cannot be its own dead-letter queue",
                    binding.queue_url
                )));
            }
            let routine_type = binding.routine_type.clone();
            if by_routine.insert(routine_type.clone(), binding).is_some() {
                return Err(PipelineError::Config(format!(
                    "routine {routine_type} bound twice"
                )));
            }
        }
        Ok(Self {
            by_routine: Arc::new(by_routine),
        })
    }

    /// Parses `routine=queue` pairs separated by commas, applying the same
    /// endpoint override and dead-letter queue to every binding.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed pairs and everything
    /// [`QueueBindings::new`] rejects.
    pub fn parse(
        pairs: &str,
        endpoint_override: Option<&str>,
        dead_letter_url: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let bindings = pairs
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (routine_type, queue_url) = pair.split_once('=').ok_or_else(|| {
                    PipelineError::Config(format!("queue binding `{pair}` is not routine=queue"))
                })?;
                Ok(QueueBinding {
                    routine_type: routine_type.trim().to_string(),
                    queue_url: queue_url.trim().to_string(),
                    endpoint_override: endpoint_override.map(str::to_string),
                    dead_letter_url: dead_letter_url.map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Self::new(bindings)
    }

    /// Binding of `routine_type`.
    #[must_use]
    pub fn for_routine(&self, routine_type: &str) -> Option<&QueueBinding> {
        self.by_routine.get(routine_type)
    }

    /// First binding that uses `queue_url`.
    #[must_use]
    pub fn binding_for_queue(&self, queue_url: &str) -> Option<&QueueBinding> {
        let mut matches: Vec<&QueueBinding> = self
            .by_routine
            .values()
            .filter(|b| b.queue_url == queue_url)
            .collect();
        matches.sort_by(|a, b| a.routine_type.cmp(&b.routine_type));
        matches.into_iter().next()
    }

    /// Distinct queue URLs, sorted.
    #[must_use]
    pub fn queue_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .by_routine
            .values()
            .map(|b| b.queue_url.clone())
            .collect();
        urls.sort();
        urls.dedup();
        urls
    }

    /// All bindings, sorted by routine type.
    #[must_use]
    pub fn all(&self) -> Vec<&QueueBinding> {
        let mut all: Vec<&QueueBinding> = self.by_routine.values().collect();
        all.sort_by(|a, b| a.routine_type.cmp(&b.routine_type));
        all
    }

    /// Number of bound routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_routine.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_routine.is_empty()
    }
}
