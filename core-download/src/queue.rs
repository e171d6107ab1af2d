//! Priority queue of pending downloads
//!
//! Strict priority, FIFO within a priority. A new request is inserted in
//! front of the first queued request with a lower priority, found by a
//! linear scan from the head.

use crate::request::DownloadRequest;
use core_content::ContentId;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct DownloadQueue {
    items: VecDeque<DownloadRequest>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `request` and returns its position (0 = next to run).
    pub fn push(&mut self, request: DownloadRequest) -> usize {
        let position = self
            .items
            .iter()
            .position(|queued| queued.priority < request.priority)
            .unwrap_or(self.items.len());
        self.items.insert(position, request);
        position
    }

    pub fn pop(&mut self) -> Option<DownloadRequest> {
        self.items.pop_front()
    }

    /// Removes every request for `id`, returning them in queue order.
    pub fn remove_all(&mut self, id: &ContentId) -> Vec<DownloadRequest> {
        let mut removed = Vec::new();
        self.items.retain(|queued| {
            if &queued.content_id == id {
                removed.push(queued.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn position_of(&self, id: &ContentId) -> Option<usize> {
        self.items.iter().position(|queued| &queued.content_id == id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.position_of(id).is_some()
    }

    /// Current position of every queued id.
    pub fn positions(&self) -> impl Iterator<Item = (&ContentId, usize)> {
        self.items
            .iter()
            .enumerate()
            .map(|(position, queued)| (&queued.content_id, position))
    }

    pub fn drain(&mut self) -> Vec<DownloadRequest> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
