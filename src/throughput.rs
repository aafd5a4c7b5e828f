use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Nominal bootstrap throughput, 10 MiB/s expressed in bits per second.
pub const BOOTSTRAP_BPS: f64 = 83_886_080.0;

/// EWMA smoothing factor δ: `new = δ·old + (1−δ)·sample`.
const DELTA_RATE: f64 = 0.5;

/// Conditional throughput estimates for one client.
///
/// `cached` and `uncached` track what this client sees when a segment is
/// served from a nearby cache versus from cold origin. Every completed
/// transfer is classified against the nearer estimate and folded into it;
/// `cur_bw` blends the two by the observed cache-hit rate.
#[derive(Debug, Clone)]
pub struct ClientThroughput {
    pub cached: f64,
    pub uncached: f64,
    pub cur_bw: f64,
    /// Whether the last transfer looked cache-fast. Read by the manifest
    /// rewriter when resolving dynamic policies.
    pub request_high_quality: bool,
    /// Position of the last sample between the midpoint and `cached`.
    /// Tracked for the *-SMOOTH policies, which consume it when a
    /// deployment defines their rewrite rule.
    pub cache_smooth_ratio: f64,
    /// Position of the last sample between `uncached` and the midpoint.
    pub uncache_smooth_ratio: f64,
    history: Vec<bool>,
}

impl Default for ClientThroughput {
    fn default() -> Self {
        Self {
            cached: 1.5 * BOOTSTRAP_BPS,
            uncached: BOOTSTRAP_BPS,
            cur_bw: 1.2 * BOOTSTRAP_BPS,
            request_high_quality: false,
            cache_smooth_ratio: 0.0,
            uncache_smooth_ratio: 0.0,
            history: Vec::new(),
        }
    }
}

impl ClientThroughput {
    /// Fold one transfer sample (bits per second) into the estimates.
    ///
    /// The sample updates whichever conditional estimate it is closer to;
    /// equidistant samples count as uncached. Returns the classification.
    pub fn observe(&mut self, sample_bps: f64) -> bool {
        let is_cached = (sample_bps - self.cached).abs() < (sample_bps - self.uncached).abs();

        let midpoint = (self.cached + self.uncached) / 2.0;
        self.cache_smooth_ratio = (sample_bps - midpoint) / (self.cached - midpoint);
        self.uncache_smooth_ratio = (sample_bps - self.uncached) / (midpoint - self.uncached);

        if is_cached {
            self.cached = DELTA_RATE * self.cached + (1.0 - DELTA_RATE) * sample_bps;
        } else {
            self.uncached = DELTA_RATE * self.uncached + (1.0 - DELTA_RATE) * sample_bps;
        }
        self.history.push(is_cached);

        self.cur_bw = (self.cached - self.uncached) * self.hit_rate() + self.uncached;
        self.request_high_quality = is_cached;

        is_cached
    }

    /// Fraction of this client's transfers that classified cached.
    pub fn hit_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().filter(|cached| **cached).count() as f64 / self.history.len() as f64
    }

    #[cfg(test)]
    pub fn with_estimates(cached: f64, uncached: f64, cur_bw: f64) -> Self {
        Self {
            cached,
            uncached,
            cur_bw,
            ..Self::default()
        }
    }
}

/// Per-client throughput records, keyed by the `clientID` request header.
/// The empty string is a valid identifier.
#[derive(Clone, Default)]
pub struct ThroughputTracker {
    clients: Arc<DashMap<String, ClientThroughput>>,
}

impl ThroughputTracker {
    /// Make sure a client has a record with the bootstrap estimates.
    pub fn ensure(&self, client_id: &str) {
        self.clients.entry(client_id.to_string()).or_default();
    }

    /// Snapshot of a client's record; bootstrap values if never seen.
    pub fn snapshot(&self, client_id: &str) -> ClientThroughput {
        self.clients
            .get(client_id)
            .map(|record| record.clone())
            .unwrap_or_default()
    }

    /// Record a completed transfer of `bytes` over `elapsed`.
    ///
    /// Returns the cached/uncached classification, or `None` when the
    /// elapsed time is too small to yield a usable sample.
    pub fn record(&self, client_id: &str, bytes: u64, elapsed: Duration) -> Option<bool> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        let sample_bps = bytes as f64 * 8.0 / secs;

        let mut record = self.clients.entry(client_id.to_string()).or_default();
        let is_cached = record.observe(sample_bps);
        debug!(
            client = client_id,
            sample_bps,
            cached = record.cached,
            uncached = record.uncached,
            cur_bw = record.cur_bw,
            "throughput sample"
        );
        Some(is_cached)
    }

    /// Number of clients with a record.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_estimates() {
        let record = ClientThroughput::default();
        assert_eq!(record.uncached, 83_886_080.0);
        assert_eq!(record.cached, 125_829_120.0);
        assert_eq!(record.cur_bw, 1.2 * 83_886_080.0);
        assert_eq!(record.hit_rate(), 0.0);
    }

    #[test]
    fn test_classification_tie_breaks_uncached() {
        // midway between the estimates is strictly-not-closer to cached
        let mut record = ClientThroughput::with_estimates(2000.0, 1000.0, 1200.0);
        assert!(!record.observe(1400.0));

        let mut record = ClientThroughput::with_estimates(2000.0, 1000.0, 1200.0);
        assert!(record.observe(1600.0));

        let mut record = ClientThroughput::with_estimates(2000.0, 1000.0, 1200.0);
        assert!(!record.observe(1500.0));
    }

    #[test]
    fn test_ewma_converges_geometrically() {
        let mut record = ClientThroughput::default();
        let target = 200_000_000.0;
        let initial_gap = record.cached - target;

        for round in 1..=8 {
            assert!(record.observe(target), "sample should classify cached");
            let expected_gap = initial_gap * 0.5_f64.powi(round);
            assert!(
                (record.cached - target - expected_gap).abs() < 1.0,
                "round {}: cached={}, expected gap {}",
                round,
                record.cached,
                expected_gap
            );
        }
    }

    #[test]
    fn test_cached_update_from_fast_transfer() {
        let tracker = ThroughputTracker::default();
        // 4 MB in 100 ms is 320 Mbit/s, well above the bootstrap cached estimate
        let is_cached = tracker
            .record("X", 4_000_000, Duration::from_millis(100))
            .expect("usable sample");
        assert!(is_cached);

        let record = tracker.snapshot("X");
        assert_eq!(record.cached, 222_914_560.0);
        assert_eq!(record.uncached, 83_886_080.0);
        assert!(record.request_high_quality);
        // one all-cached sample pins cur_bw to the cached estimate
        assert_eq!(record.cur_bw, record.cached);
    }

    #[test]
    fn test_cur_bw_blends_by_hit_rate() {
        let mut record = ClientThroughput::with_estimates(2_000_000.0, 1_000_000.0, 1_200_000.0);
        record.observe(2_000_000.0);
        record.observe(1_000_000.0);

        assert_eq!(record.hit_rate(), 0.5);
        let expected = (record.cached - record.uncached) * 0.5 + record.uncached;
        assert_eq!(record.cur_bw, expected);
    }

    #[test]
    fn test_smooth_ratios_follow_sample_position() {
        let mut record = ClientThroughput::with_estimates(2000.0, 1000.0, 1200.0);
        record.observe(2000.0);
        // sample at the cached estimate: full cache ratio, double uncache ratio
        assert_eq!(record.cache_smooth_ratio, 1.0);
        assert_eq!(record.uncache_smooth_ratio, 2.0);
    }

    #[test]
    fn test_zero_elapsed_sample_discarded() {
        let tracker = ThroughputTracker::default();
        assert!(tracker.record("X", 1_000, Duration::ZERO).is_none());
        let record = tracker.snapshot("X");
        assert_eq!(record.cached, 125_829_120.0);
    }

    #[test]
    fn test_snapshot_of_unknown_client_is_bootstrap() {
        let tracker = ThroughputTracker::default();
        let record = tracker.snapshot("never-seen");
        assert_eq!(record.uncached, BOOTSTRAP_BPS);
        assert_eq!(tracker.client_count(), 0);

        tracker.ensure("seen");
        assert_eq!(tracker.client_count(), 1);
    }
}
