//! Page cursor for the signing rounds.

use super::SigningStage;
use crate::error::{DeviceError, Result};

/// One slice of items sent in a single acknowledgement.
#[derive(Debug, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// Index of the first item in the full list.
    pub start: usize,
    /// No items remain for this stage after this page.
    pub last: bool,
}

/// Walks a list in pages of at most `page_size` items.
#[derive(Debug, Clone)]
pub struct Pager {
    page_size: usize,
    cursor: usize,
}

impl Pager {
    /// `page_size` of 0 is treated as 1.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Take the next page of `items`. A full page with items left keeps the
    /// cursor moving; the final page resets it for the next stage.
    pub fn next_page<'a, T>(&mut self, stage: SigningStage, items: &'a [T]) -> Result<Page<'a, T>> {
        if self.cursor > items.len() {
            return Err(DeviceError::InvalidIndex {
                index: self.cursor,
                len: items.len(),
            });
        }
        if self.cursor == items.len() {
            return Err(DeviceError::EmptyPage { stage });
        }
        let start = self.cursor;
        let end = (start + self.page_size).min(items.len());
        let last = end == items.len();

        self.cursor = if last { 0 } else { end };
        Ok(Page {
            items: &items[start..end],
            start,
            last,
        })
    }
}
