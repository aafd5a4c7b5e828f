use crate::dash::template::TemplateIndex;
use dash_mpd::MPD;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Which qualities of which segments have been observed cache-fast, plus
/// each client's progress cursor. One instance per stream key, shared by
/// every handler touching that stream.
///
/// Segment number 0 is reserved: it never counts as cached and never moves
/// a client's cursor. Quality sets only ever grow during a process
/// lifetime.
#[derive(Debug, Default)]
pub struct SegmentInventory {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cached: HashMap<u64, BTreeSet<u32>>,
    latest: HashMap<String, u64>,
    last_quality: HashMap<String, u32>,
}

impl SegmentInventory {
    // a panic taken while the lock is held must not wedge the stream
    fn locked(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `quality` of `segment` has been observed cached.
    pub fn already_cached(&self, segment: u64, quality: u32) -> bool {
        if segment == 0 {
            return false;
        }
        let inner = self.locked();
        inner
            .cached
            .get(&segment)
            .is_some_and(|qualities| qualities.contains(&quality))
    }

    /// Record that `quality` of `segment` was delivered, and advance the
    /// client's cursor to it.
    pub fn add_record(&self, segment: u64, quality: u32, client_id: &str) {
        let mut inner = self.locked();
        inner.cached.entry(segment).or_default().insert(quality);
        if segment != 0 {
            inner.latest.insert(client_id.to_string(), segment);
            inner.last_quality.insert(client_id.to_string(), quality);
        }
        debug!(segment, quality, client = client_id, "recorded cached quality");
    }

    /// The cached set for the segment the client is expected to fetch next,
    /// together with that segment's number.
    ///
    /// Anticipates `latest + 1`: the manifest rewriter steers the *next*
    /// request, not the one that just completed. The set is created empty
    /// when the client is ahead of every recorded delivery.
    pub fn latest(&self, client_id: &str) -> (BTreeSet<u32>, u64) {
        let mut inner = self.locked();
        let next = inner.latest.get(client_id).copied().unwrap_or(0) + 1;
        let qualities = inner.cached.entry(next).or_default().clone();
        (qualities, next)
    }

    /// Highest cached quality of a segment, 0 when nothing is recorded.
    pub fn greatest_quality(&self, segment: u64) -> u32 {
        let inner = self.locked();
        inner
            .cached
            .get(&segment)
            .and_then(|qualities| qualities.iter().next_back().copied())
            .unwrap_or(0)
    }

    /// Quality of the client's last successfully recorded segment.
    pub fn last_quality(&self, client_id: &str) -> u32 {
        let inner = self.locked();
        inner.last_quality.get(client_id).copied().unwrap_or(0)
    }
}

/// Everything known about one stream: its URL templates and its inventory.
#[derive(Debug)]
pub struct StreamState {
    pub templates: TemplateIndex,
    pub inventory: SegmentInventory,
}

impl StreamState {
    pub fn from_mpd(mpd: &MPD) -> Self {
        Self {
            templates: TemplateIndex::from_mpd(mpd),
            inventory: SegmentInventory::default(),
        }
    }
}

/// All streams seen by this process, keyed by the directory portion of the
/// request path. Entries are created on a stream's first manifest and live
/// until shutdown.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<DashMap<String, Arc<StreamState>>>,
}

impl StreamRegistry {
    pub fn get(&self, stream_key: &str) -> Option<Arc<StreamState>> {
        self.streams.get(stream_key).map(|state| Arc::clone(&state))
    }

    pub fn get_or_create(&self, stream_key: &str, mpd: &MPD) -> Arc<StreamState> {
        Arc::clone(
            &self
                .streams
                .entry(stream_key.to_string())
                .or_insert_with(|| Arc::new(StreamState::from_mpd(mpd))),
        )
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_sets_only_grow() {
        let inventory = SegmentInventory::default();

        inventory.add_record(5, 500, "A");
        assert!(inventory.already_cached(5, 500));

        inventory.add_record(5, 1500, "A");
        assert!(inventory.already_cached(5, 500));
        assert!(inventory.already_cached(5, 1500));
        assert!(!inventory.already_cached(5, 3000));
        assert!(!inventory.already_cached(6, 500));
    }

    #[test]
    fn test_segment_zero_is_reserved() {
        let inventory = SegmentInventory::default();

        inventory.add_record(0, 500, "A");
        assert!(!inventory.already_cached(0, 500));

        // the cursor did not move: the next expected segment is still 1
        let (qualities, next) = inventory.latest("A");
        assert_eq!(next, 1);
        assert!(qualities.is_empty());
        assert_eq!(inventory.last_quality("A"), 0);
    }

    #[test]
    fn test_latest_anticipates_next_segment() {
        let inventory = SegmentInventory::default();

        inventory.add_record(5, 500, "A");
        inventory.add_record(5, 1500, "A");
        inventory.add_record(6, 500, "A");

        let (qualities, next) = inventory.latest("A");
        assert_eq!(next, 7);
        assert!(qualities.is_empty());
        assert_eq!(inventory.last_quality("A"), 500);

        // another client filling segment 7 becomes visible to A
        inventory.add_record(7, 1500, "B");
        let (qualities, next) = inventory.latest("A");
        assert_eq!(next, 7);
        assert_eq!(qualities.into_iter().collect::<Vec<_>>(), vec![1500]);
    }

    #[test]
    fn test_cursor_is_per_client() {
        let inventory = SegmentInventory::default();

        inventory.add_record(3, 500, "A");
        inventory.add_record(9, 1500, "B");

        assert_eq!(inventory.latest("A").1, 4);
        assert_eq!(inventory.latest("B").1, 10);
        assert_eq!(inventory.latest("C").1, 1);
    }

    #[test]
    fn test_greatest_quality() {
        let inventory = SegmentInventory::default();
        assert_eq!(inventory.greatest_quality(4), 0);

        inventory.add_record(4, 500, "A");
        inventory.add_record(4, 3000, "A");
        inventory.add_record(4, 1500, "A");
        assert_eq!(inventory.greatest_quality(4), 3000);
    }

    #[test]
    fn test_registry_creates_once() {
        let registry = StreamRegistry::default();
        let mpd = dash_mpd::MPD::default();

        let first = registry.get_or_create("/v", &mpd);
        first.inventory.add_record(2, 500, "A");

        let second = registry.get_or_create("/v", &mpd);
        assert!(second.inventory.already_cached(2, 500));
        assert_eq!(registry.stream_count(), 1);
        assert!(registry.get("/other").is_none());
    }
}
