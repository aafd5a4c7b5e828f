use crate::config::Config;
use crate::stream::StreamRegistry;
use crate::throughput::ThroughputTracker;
use arc_swap::ArcSwap;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bandwidth rewrite policy in effect until `/settings` changes it.
const DEFAULT_POLICY: &str = "UNCHANGE";

/// Runtime knobs mutable through the control plane.
///
/// The policy is stored as its configured name; resolution happens per
/// rewrite, so an unknown name degrades to a logged no-op instead of
/// rejecting the POST that set it.
pub struct Controls {
    policy: ArcSwap<String>,
    setup_mode: AtomicBool,
    prefetch_off: AtomicBool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            policy: ArcSwap::from_pointee(DEFAULT_POLICY.to_string()),
            setup_mode: AtomicBool::new(false),
            prefetch_off: AtomicBool::new(false),
        }
    }
}

impl Controls {
    pub fn policy(&self) -> Arc<String> {
        self.policy.load_full()
    }

    pub fn set_policy(&self, name: String) {
        self.policy.store(Arc::new(name));
    }

    /// Whether an operator is seeding content; relaxes the transfer deadline.
    pub fn setup_mode(&self) -> bool {
        self.setup_mode.load(Ordering::Relaxed)
    }

    pub fn set_setup_mode(&self, on: bool) {
        self.setup_mode.store(on, Ordering::Relaxed);
    }

    pub fn prefetch_off(&self) -> bool {
        self.prefetch_off.load(Ordering::Relaxed)
    }

    pub fn set_prefetch_off(&self, off: bool) {
        self.prefetch_off.store(off, Ordering::Relaxed);
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for upstream connection pooling
    pub http_client: Client,
    /// Per-stream template indexes and segment inventories
    pub streams: StreamRegistry,
    /// Per-client throughput estimates
    pub throughput: ThroughputTracker,
    /// Runtime knobs from the control plane
    pub controls: Arc<Controls>,
    /// Server start time for uptime tracking
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Self {
        // No client-wide timeout: each proxied transfer carries its own
        // deadline, which SetupMode stretches by an order of magnitude.
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config: Arc::new(config),
            http_client,
            streams: StreamRegistry::default(),
            throughput: ThroughputTracker::default(),
            controls: Arc::new(Controls::default()),
            started_at: Instant::now(),
        }
    }
}
