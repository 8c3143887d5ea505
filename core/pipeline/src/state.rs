//! Lifecycle tracking for requested documents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use drivemerge_common::{Error, Result};

/// Where a requested document is in the search → download lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemState {
    /// Enqueued, nothing done yet.
    Pending,
    /// Search request in flight.
    Searching,
    /// A matching file was located.
    Found,
    /// The search returned no match.
    NotFound,
    /// Download request in flight.
    Downloading,
    /// Content retrieved.
    Downloaded,
    /// A stage failed.
    Error,
}

impl ItemState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::NotFound | Self::Downloaded | Self::Error)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Pending, Searching)
                | (Searching, Found)
                | (Searching, NotFound)
                | (Searching, Error)
                | (Found, Downloading)
                | (Downloading, Downloaded)
                | (Downloading, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Found => "found",
            Self::NotFound => "not-found",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested document and everything learned about it so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStatus {
    /// Position-derived identifier, starting at 1.
    pub id: u32,
    /// Name the user asked for.
    pub name: String,
    state: ItemState,
    /// Human-readable detail, set on `not-found` and `error`.
    pub message: Option<String>,
    /// Matched remote file.
    pub file_id: Option<String>,
    /// Retrieved content, held until merged.
    #[serde(skip)]
    data: Option<Vec<u8>>,
}

impl ItemStatus {
    /// Create a pending item.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: ItemState::Pending,
            message: None,
            file_id: None,
            data: None,
        }
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Size of the retrieved content, if any is held.
    pub fn data_len(&self) -> Option<usize> {
        self.data.as_ref().map(Vec::len)
    }

    fn transition(&mut self, next: ItemState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidInput(format!(
                "Item {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        tracing::debug!("Item {} '{}': {} -> {}", self.id, self.name, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Mark as searching.
    pub fn begin_search(&mut self) -> Result<()> {
        self.transition(ItemState::Searching)
    }

    /// Record the matched file.
    pub fn mark_found(&mut self, file_id: impl Into<String>) -> Result<()> {
        self.transition(ItemState::Found)?;
        self.file_id = Some(file_id.into());
        Ok(())
    }

    /// Record that nothing matched.
    pub fn mark_not_found(&mut self) -> Result<()> {
        self.transition(ItemState::NotFound)?;
        self.message = Some("No matching file".to_string());
        Ok(())
    }

    /// Mark as downloading.
    pub fn begin_download(&mut self) -> Result<()> {
        self.transition(ItemState::Downloading)
    }

    /// Store the retrieved content.
    pub fn mark_downloaded(&mut self, data: Vec<u8>) -> Result<()> {
        self.transition(ItemState::Downloaded)?;
        self.data = Some(data);
        Ok(())
    }

    /// Mark as failed.
    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ItemState::Error)?;
        self.message = Some(message.into());
        Ok(())
    }

    /// Retrieved content, while the item is downloaded and still holds it.
    pub fn data(&self) -> Option<&[u8]> {
        match self.state {
            ItemState::Downloaded => self.data.as_deref(),
            _ => None,
        }
    }

    /// Move the retrieved content out of the item.
    ///
    /// Returns `None` unless the item is downloaded and still holds its data.
    pub fn take_data(&mut self) -> Option<Vec<u8>> {
        if self.state == ItemState::Downloaded {
            self.data.take()
        } else {
            None
        }
    }
}

/// Count items per state.
pub fn count_by_state(items: &[ItemStatus]) -> HashMap<ItemState, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.state()).or_insert(0) += 1;
    }
    counts
}
