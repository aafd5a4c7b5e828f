use dash_mpd::MPD;
use std::collections::HashMap;
use tracing::debug;

const NUMBER_MARKER: &str = "$Number$";

/// One representation's segment-URL shape, split around `$Number$`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepTemplate {
    /// Integer quality label parsed from the representation id
    pub quality: u32,
    /// Media template text after the `$Number$` marker
    pub suffix: String,
    /// Nominal bandwidth advertised by the manifest, bits per second
    pub bandwidth: f64,
    /// Segment duration in seconds (template duration over timescale)
    pub segment_secs: f64,
}

/// Maps segment-URL prefixes to representation descriptors for one stream.
///
/// Built from the stream's first MPD and read-only afterwards. Request
/// basenames are matched against the prefixes to recover which segment of
/// which quality an URL addresses.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    by_prefix: HashMap<String, RepTemplate>,
}

impl TemplateIndex {
    /// Extract the URL template of every representation in every adaptation
    /// set of every period. Representations with a non-numeric id or
    /// without a `$Number$` media template are skipped.
    pub fn from_mpd(mpd: &MPD) -> Self {
        let mut by_prefix = HashMap::new();

        for period in &mpd.periods {
            for adaptation in &period.adaptations {
                for rep in &adaptation.representations {
                    let Some(id) = rep.id.as_deref() else {
                        continue;
                    };
                    let Ok(quality) = id.parse::<u32>() else {
                        debug!(id, "skipping representation with non-numeric id");
                        continue;
                    };
                    // representation-level template wins over the adaptation set's
                    let template = rep
                        .SegmentTemplate
                        .as_ref()
                        .or(adaptation.SegmentTemplate.as_ref());
                    let Some(template) = template else {
                        continue;
                    };
                    let Some(media) = template.media.as_deref() else {
                        continue;
                    };
                    let Some(marker) = media.rfind(NUMBER_MARKER) else {
                        continue;
                    };

                    let duration = template.duration.unwrap_or(0.0);
                    let timescale = template.timescale.unwrap_or(1).max(1);

                    by_prefix.insert(
                        media[..marker].to_string(),
                        RepTemplate {
                            quality,
                            suffix: media[marker + NUMBER_MARKER.len()..].to_string(),
                            bandwidth: rep.bandwidth.unwrap_or(0) as f64,
                            segment_secs: duration / timescale as f64,
                        },
                    );
                }
            }
        }

        Self { by_prefix }
    }

    /// Parse a request basename into `(segment number, quality)`.
    ///
    /// The longest matching prefix wins when templates nest. `None` means
    /// the path addresses no known representation and is plain proxy
    /// traffic.
    pub fn parse_segment(&self, basename: &str) -> Option<(u64, u32)> {
        let (prefix, rep) = self
            .by_prefix
            .iter()
            .filter(|(prefix, _)| basename.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;

        let rest = &basename[prefix.len()..];
        let digits = rest.strip_suffix(&rep.suffix)?;
        let segment = digits.parse::<u64>().ok()?;
        Some((segment, rep.quality))
    }

    /// Rebuild the segment URL basename for `(segment, quality)`.
    pub fn form_url(&self, segment: u64, quality: u32) -> Option<String> {
        self.by_prefix
            .iter()
            .find(|(_, rep)| rep.quality == quality)
            .map(|(prefix, rep)| format!("{prefix}{segment}{}", rep.suffix))
    }

    /// Descriptor for a quality, when the stream advertises it.
    pub fn descriptor(&self, quality: u32) -> Option<&RepTemplate> {
        self.by_prefix.values().find(|rep| rep.quality == quality)
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dash::rewriter::parse_mpd;

    fn sample_index() -> TemplateIndex {
        let xml = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet contentType="video">
      <Representation id="500" bandwidth="500000">
        <SegmentTemplate media="seg-500-$Number$.m4s" initialization="init-500.mp4"
                         duration="2" timescale="1"/>
      </Representation>
      <Representation id="1500" bandwidth="1500000">
        <SegmentTemplate media="seg-1500-$Number$.m4s" initialization="init-1500.mp4"
                         duration="2" timescale="1"/>
      </Representation>
      <Representation id="audio-en" bandwidth="128000">
        <SegmentTemplate media="audio-$Number$.m4s" duration="2" timescale="1"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;
        TemplateIndex::from_mpd(&parse_mpd(xml).expect("valid MPD"))
    }

    #[test]
    fn test_index_covers_numeric_representations() {
        let index = sample_index();
        assert!(!index.is_empty());

        let rep = index.descriptor(500).expect("quality 500 indexed");
        assert_eq!(rep.suffix, ".m4s");
        assert_eq!(rep.bandwidth, 500_000.0);
        assert_eq!(rep.segment_secs, 2.0);

        // the non-numeric representation id is skipped
        assert!(index.parse_segment("audio-7.m4s").is_none());
    }

    #[test]
    fn test_parse_segment_round_trip() {
        let index = sample_index();

        for segment in [1, 7, 42, 100_000] {
            for quality in [500, 1500] {
                let url = index.form_url(segment, quality).expect("known quality");
                assert_eq!(index.parse_segment(&url), Some((segment, quality)));
            }
        }
    }

    #[test]
    fn test_parse_segment_rejects_foreign_paths() {
        let index = sample_index();
        assert_eq!(index.parse_segment("Manifest.mpd"), None);
        assert_eq!(index.parse_segment("seg-500-.m4s"), None);
        assert_eq!(index.parse_segment("seg-500-12.mp4"), None);
        assert_eq!(index.parse_segment("init-500.mp4"), None);
    }

    #[test]
    fn test_longest_prefix_wins_when_templates_nest() {
        let xml = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet>
      <Representation id="1" bandwidth="1000000">
        <SegmentTemplate media="chunk-$Number$.m4s" duration="2" timescale="1"/>
      </Representation>
      <Representation id="2" bandwidth="2000000">
        <SegmentTemplate media="chunk-hi-$Number$.m4s" duration="2" timescale="1"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;
        let index = TemplateIndex::from_mpd(&parse_mpd(xml).expect("valid MPD"));

        assert_eq!(index.parse_segment("chunk-hi-9.m4s"), Some((9, 2)));
    }

    #[test]
    fn test_adaptation_level_template_fallback() {
        let xml = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet>
      <SegmentTemplate media="v-$Number$.m4s" duration="4" timescale="2"/>
      <Representation id="3" bandwidth="900000"/>
    </AdaptationSet>
  </Period>
</MPD>"#;
        let index = TemplateIndex::from_mpd(&parse_mpd(xml).expect("valid MPD"));

        assert_eq!(index.parse_segment("v-11.m4s"), Some((11, 3)));
        assert_eq!(index.descriptor(3).map(|r| r.segment_secs), Some(2.0));
    }
}
