use tracing::warn;

/// Cached-set size at which DYNAMIC-LOWLEVEL stops deflating bandwidths.
pub const LOW_LEVEL_CACHED_THRESHOLD: usize = 8;

/// Bandwidth rewrite policy, selectable at runtime via `POST /settings`.
///
/// The `Dynamic*` variants are meta-policies: [`Policy::resolve`] collapses
/// each of them to a concrete rule per rewrite, using the requesting
/// client's last transfer classification and the size of the upcoming
/// segment's cached set. The `*Smooth` rules are accepted by the selector
/// but currently apply no change; the smoothing ratios they would consume
/// are tracked on the client throughput record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    CacheBased,
    UncacheBased,
    Uniform,
    UniformSweet,
    Unchange,
    Baseline,
    CacheBasedSmooth,
    UncacheBasedSmooth,
    Dynamic,
    DynamicSmooth,
    DynamicLowLevel,
    DynamicBackendSpeed,
}

impl Policy {
    /// Parse a policy name as accepted by the control plane.
    pub fn from_name(name: &str) -> Option<Policy> {
        match name {
            "CACHEBASED" => Some(Policy::CacheBased),
            "UNCACHEBASED" => Some(Policy::UncacheBased),
            "UNIFORM" => Some(Policy::Uniform),
            "UNIFORM-SWEET" => Some(Policy::UniformSweet),
            "UNCHANGE" => Some(Policy::Unchange),
            "BASELINE" => Some(Policy::Baseline),
            "CACHEBASED-SMOOTH" => Some(Policy::CacheBasedSmooth),
            "UNCACHEBASED-SMOOTH" => Some(Policy::UncacheBasedSmooth),
            "DYNAMIC" => Some(Policy::Dynamic),
            "DYNAMIC-SMOOTH" => Some(Policy::DynamicSmooth),
            "DYNAMIC-LOWLEVEL" => Some(Policy::DynamicLowLevel),
            "DYNAMIC-BACKENDSPEED" => Some(Policy::DynamicBackendSpeed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::CacheBased => "CACHEBASED",
            Policy::UncacheBased => "UNCACHEBASED",
            Policy::Uniform => "UNIFORM",
            Policy::UniformSweet => "UNIFORM-SWEET",
            Policy::Unchange => "UNCHANGE",
            Policy::Baseline => "BASELINE",
            Policy::CacheBasedSmooth => "CACHEBASED-SMOOTH",
            Policy::UncacheBasedSmooth => "UNCACHEBASED-SMOOTH",
            Policy::Dynamic => "DYNAMIC",
            Policy::DynamicSmooth => "DYNAMIC-SMOOTH",
            Policy::DynamicLowLevel => "DYNAMIC-LOWLEVEL",
            Policy::DynamicBackendSpeed => "DYNAMIC-BACKENDSPEED",
        }
    }

    /// Collapse meta-policies to the concrete rule for one rewrite.
    ///
    /// `request_high_quality` is the requesting client's last transfer
    /// classification; `cached_count` is the size of the cached set for the
    /// segment the client is expected to fetch next.
    pub fn resolve(self, request_high_quality: bool, cached_count: usize) -> Policy {
        match self {
            Policy::Dynamic => {
                if request_high_quality {
                    Policy::CacheBased
                } else {
                    Policy::UncacheBased
                }
            }
            Policy::DynamicSmooth => {
                if request_high_quality {
                    Policy::CacheBasedSmooth
                } else {
                    Policy::UncacheBasedSmooth
                }
            }
            Policy::DynamicLowLevel => {
                if cached_count >= LOW_LEVEL_CACHED_THRESHOLD {
                    Policy::Unchange
                } else {
                    Policy::UncacheBased
                }
            }
            Policy::DynamicBackendSpeed => {
                if request_high_quality {
                    Policy::Unchange
                } else {
                    Policy::UncacheBasedSmooth
                }
            }
            concrete => concrete,
        }
    }

    /// Resolve a configured policy name. Unknown names leave the manifest
    /// unchanged so a bad `/settings` POST never wedges the proxy.
    pub fn resolve_name(name: &str, request_high_quality: bool, cached_count: usize) -> Policy {
        match Policy::from_name(name) {
            Some(policy) => policy.resolve(request_high_quality, cached_count),
            None => {
                warn!("Unknown policy {:?}, leaving manifest unchanged", name);
                Policy::Unchange
            }
        }
    }
}
