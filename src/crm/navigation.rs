//! Next/previous navigation over the last rendered lead list.
//!
//! The list handler snapshots the ordered ids it produced into the session.
//! Detail-page navigation walks that snapshot instead of re-running the
//! filters, so neighbours stay stable until the list is rendered again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleLeads {
    /// Lead ids in list order.
    pub ids: Vec<i64>,
    /// Raw query string of the list request that produced `ids`.
    pub query: String,
}

impl VisibleLeads {
    pub fn new(ids: Vec<i64>, query: impl Into<String>) -> Self {
        Self {
            ids,
            query: query.into(),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// The id after `current`, wrapping to the first. `None` when `current`
    /// is not part of the snapshot.
    pub fn next(&self, current: i64) -> Option<i64> {
        let index = self.position(current)?;
        let next = if index + 1 < self.ids.len() { index + 1 } else { 0 };
        self.ids.get(next).copied()
    }

    /// The id before `current`, wrapping to the last.
    pub fn previous(&self, current: i64) -> Option<i64> {
        let index = self.position(current)?;
        let prev = if index > 0 { index - 1 } else { self.ids.len() - 1 };
        self.ids.get(prev).copied()
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.ids.iter().position(|&x| x == id)
    }
}
