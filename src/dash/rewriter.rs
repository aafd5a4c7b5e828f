use crate::error::{HelmsmanError, Result};
use crate::metrics;
use crate::policy::Policy;
use crate::stream::StreamRegistry;
use crate::throughput::ClientThroughput;
use dash_mpd::{MPD, SegmentTemplate};
use std::time::Duration;
use tracing::debug;

/// How often steered clients are told to re-poll the manifest.
const MANIFEST_UPDATE_PERIOD: Duration = Duration::from_secs(5);

/// Parse a DASH MPD from XML text
pub fn parse_mpd(xml: &str) -> Result<MPD> {
    dash_mpd::parse(xml).map_err(|e| HelmsmanError::MpdParse(e.to_string()))
}

/// Serialize an MPD back to XML text
pub fn serialize_mpd(mpd: &MPD) -> Result<String> {
    quick_xml::se::to_string(mpd).map_err(|e| HelmsmanError::MpdSerialize(e.to_string()))
}

fn template_secs(template: &SegmentTemplate) -> f64 {
    let timescale = template.timescale.unwrap_or(1).max(1);
    template.duration.unwrap_or(0.0) / timescale as f64
}

/// Rewrite one manifest for one client.
///
/// Registers the stream on its first manifest, pins the manifest into
/// always-refresh mode, and steers each representation's advertised
/// bandwidth according to the resolved policy and the cached set of the
/// segment this client is expected to fetch next.
///
/// On any decode or encode failure the caller keeps the origin body.
pub fn rewrite_manifest(
    xml: &str,
    streams: &StreamRegistry,
    stream_key: &str,
    client_id: &str,
    client: &ClientThroughput,
    policy_name: &str,
) -> Result<String> {
    let mut mpd = parse_mpd(xml)?;
    let stream = streams.get_or_create(stream_key, &mpd);

    // Steered clients must keep re-reading the manifest, and all timing is
    // re-anchored so rewritten bandwidths take effect immediately.
    mpd.mpdtype = Some("dynamic".to_string());
    mpd.minimumUpdatePeriod = Some(MANIFEST_UPDATE_PERIOD);
    mpd.availabilityStartTime = Some(chrono::DateTime::UNIX_EPOCH.into());

    let (cached_set, next_segment) = stream.inventory.latest(client_id);
    let policy = Policy::resolve_name(policy_name, client.request_high_quality, cached_set.len());
    debug!(
        segment = next_segment,
        policy = policy.name(),
        cached = ?cached_set,
        "rewriting manifest"
    );
    metrics::record_rewrite(policy.name());

    for period in &mut mpd.periods {
        for adaptation in &mut period.adaptations {
            let adaptation_secs = adaptation.SegmentTemplate.as_ref().map(template_secs);
            if let Some(template) = adaptation.SegmentTemplate.as_mut() {
                template.presentationTimeOffset = Some(0);
            }

            for rep in &mut adaptation.representations {
                let rep_secs = rep.SegmentTemplate.as_ref().map(template_secs);
                if let Some(template) = rep.SegmentTemplate.as_mut() {
                    template.presentationTimeOffset = Some(0);
                }

                let Some(quality) = rep.id.as_deref().and_then(|id| id.parse::<u32>().ok())
                else {
                    continue;
                };
                let Some(bandwidth) = rep.bandwidth else {
                    continue;
                };
                let Some(segment_secs) = rep_secs.or(adaptation_secs) else {
                    continue;
                };

                let steered = steered_bandwidth(
                    policy,
                    bandwidth,
                    segment_secs,
                    cached_set.contains(&quality),
                    client,
                );
                if steered != bandwidth {
                    debug!(quality, from = bandwidth, to = steered, "steering advertised bandwidth");
                    rep.bandwidth = Some(steered);
                }
            }
        }
    }

    if let Some(first) = mpd.periods.first_mut() {
        first.start = Some(Duration::ZERO);
    }

    serialize_mpd(&mpd)
}

/// Apply one policy's rewrite rule to a representation's advertised
/// bandwidth, returning the steered value.
///
/// A full segment is `segment_secs · bandwidth` bits, so the ratio between
/// its nominal download time and its expected download time against a
/// conditional throughput estimate decides the rewrite. CACHEBASED only
/// ever inflates cached qualities, UNCACHEBASED only ever deflates them;
/// UNIFORM shifts every representation by the client's reward or penalty
/// margin.
pub fn steered_bandwidth(
    policy: Policy,
    bandwidth: u64,
    segment_secs: f64,
    is_cached: bool,
    client: &ClientThroughput,
) -> u64 {
    if segment_secs <= 0.0 {
        return bandwidth;
    }
    let size = segment_secs * bandwidth as f64;

    match policy {
        Policy::CacheBased if is_cached => {
            let rate = (size / client.uncached) / segment_secs;
            if rate < 1.0 {
                debug!(rate, "skip deflating rewrite");
                bandwidth
            } else {
                (bandwidth as f64 * rate) as u64
            }
        }
        Policy::UncacheBased if is_cached => {
            let rate = (size / client.cached) / segment_secs;
            if rate > 1.0 {
                debug!(rate, "skip inflating rewrite");
                bandwidth
            } else {
                (bandwidth as f64 * rate) as u64
            }
        }
        Policy::Uniform => {
            if is_cached {
                let reward = client.cached - client.cur_bw;
                let steered = bandwidth as f64 - reward;
                if steered <= 0.0 { 1 } else { steered as u64 }
            } else {
                let penalty = client.cur_bw - client.uncached;
                (bandwidth as f64 + penalty) as u64
            }
        }
        Policy::UniformSweet if is_cached => {
            let reward = client.cached - client.cur_bw;
            let steered = bandwidth as f64 - reward;
            if steered <= 0.0 { 1 } else { steered as u64 }
        }
        // UNCHANGE and BASELINE pass the manifest through; the *-SMOOTH
        // rules have no rewrite defined yet.
        _ => bandwidth,
    }
}
