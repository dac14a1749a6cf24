//! Look-ahead page decoding

use std::collections::HashSet;

use flume::Sender;
use log::debug;

use super::request::PrefetchCommand;

/// Default number of pages decoded ahead of the one on screen
pub const DEFAULT_PREFETCH_DEPTH: usize = 2;

/// Queues decode-only work for the pages following the current one.
///
/// Each page is queued at most once over the session. Whether the decode
/// succeeded or failed, it is never queued again: a later render of that
/// page decodes it on demand.
pub struct Prefetcher {
    commands: Sender<PrefetchCommand>,
    depth: usize,
    page_count: usize,
    queued: HashSet<usize>,
    outstanding: usize,
}

impl Prefetcher {
    pub fn new(commands: Sender<PrefetchCommand>, depth: usize, page_count: usize) -> Self {
        Self {
            commands,
            depth,
            page_count,
            queued: HashSet::new(),
            outstanding: 0,
        }
    }

    /// Queue pages `page + 1 ..= page + depth` that exist and were never queued.
    /// Returns the pages queued by this call.
    pub fn prefetch(&mut self, page: usize) -> Vec<usize> {
        let mut queued = Vec::new();
        let last = page
            .saturating_add(self.depth)
            .min(self.page_count.saturating_sub(1));
        for next in page + 1..=last {
            if self.queued.contains(&next) {
                continue;
            }
            if self.commands.send(PrefetchCommand::Decode(next)).is_err() {
                debug!("prefetch lane closed");
                break;
            }
            self.queued.insert(next);
            self.outstanding += 1;
            queued.push(next);
        }

        if !queued.is_empty() {
            debug!("prefetch after page {page}: {queued:?}");
        }
        queued
    }

    /// Record that the prefetch lane finished with a page
    pub fn complete(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Decodes queued but not yet reported back
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(PrefetchCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use flume::Receiver;

    use super::*;

    fn prefetcher(depth: usize, pages: usize) -> (Prefetcher, Receiver<PrefetchCommand>) {
        let (tx, rx) = flume::unbounded();
        (Prefetcher::new(tx, depth, pages), rx)
    }

    fn decoded(rx: &Receiver<PrefetchCommand>) -> Vec<usize> {
        rx.try_iter()
            .filter_map(|cmd| match cmd {
                PrefetchCommand::Decode(page) => Some(page),
                PrefetchCommand::Shutdown => None,
            })
            .collect()
    }

    #[test]
    fn queues_following_pages_up_to_depth() {
        let (mut prefetcher, rx) = prefetcher(2, 10);
        assert_eq!(prefetcher.prefetch(3), vec![4, 5]);
        assert_eq!(decoded(&rx), vec![4, 5]);
        assert_eq!(prefetcher.outstanding(), 2);
    }

    #[test]
    fn stops_at_last_page() {
        let (mut prefetcher, rx) = prefetcher(2, 3);
        assert_eq!(prefetcher.prefetch(1), vec![2]);
        assert!(prefetcher.prefetch(2).is_empty());
        assert_eq!(decoded(&rx), vec![2]);
    }

    #[test]
    fn never_queues_a_page_twice() {
        let (mut prefetcher, rx) = prefetcher(2, 10);
        prefetcher.prefetch(0);
        prefetcher.complete();
        prefetcher.complete();
        assert_eq!(prefetcher.prefetch(1), vec![3]);
        assert!(prefetcher.prefetch(0).is_empty());
        assert_eq!(decoded(&rx), vec![1, 2, 3]);
    }

    #[test]
    fn zero_depth_disables_prefetch() {
        let (mut prefetcher, rx) = prefetcher(0, 10);
        assert!(prefetcher.prefetch(0).is_empty());
        assert!(decoded(&rx).is_empty());
    }
}
