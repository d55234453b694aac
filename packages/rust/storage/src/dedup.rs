use std::collections::HashSet;

use tracing::debug;

use answerbank_shared::{Question, QuestionId};

use crate::dataset::Dataset;

/// Identifiers already persisted, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    known: HashSet<QuestionId>,
}

impl DedupStore {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            known: dataset.known_ids(),
        }
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, id: &QuestionId) -> bool {
        self.known.contains(id)
    }

    /// Keep only candidates whose identifier has never been persisted,
    /// preserving their order.
    pub fn filter_new(&self, candidates: Vec<Question>) -> Vec<Question> {
        let before = candidates.len();
        let fresh: Vec<Question> = candidates
            .into_iter()
            .filter(|q| !self.known.contains(&q.id))
            .collect();

        debug!(
            candidates = before,
            known = before - fresh.len(),
            new = fresh.len(),
            "filtered candidates"
        );
        fresh
    }
}
