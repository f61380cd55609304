//! Cross-fade timing and the xfade chain over concatenated segments.

use anyhow::{Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;

use super::super::graph::{Filter, FilterGraph};

/// Transition names accepted by xfade that the tool exposes.
pub const TRANSITIONS: [&str; 5] = ["fade", "smoothleft", "circleopen", "zoomin", "fadeblack"];

const MAX_TRANSITION_SECS: f64 = 1.0;
const DEFAULT_TRANSITION_SHARE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionChoice {
    /// Straight concat, no cross-fades.
    None,
    Named(String),
    /// Each consecutive pair draws from [`TRANSITIONS`].
    Random,
}

impl TransitionChoice {
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim().to_ascii_lowercase();
        match key.as_str() {
            "" | "none" => Ok(Self::None),
            "random" => Ok(Self::Random),
            name if TRANSITIONS.contains(&name) => Ok(Self::Named(name.to_string())),
            other => bail!(
                "unknown transition '{other}'; expected none, random or one of {}",
                TRANSITIONS.join(", ")
            ),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Transition names for the `count - 1` joins between `count` segments.
    pub fn names_for<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<String> {
        let joins = count.saturating_sub(1);
        match self {
            Self::None => Vec::new(),
            Self::Named(name) => vec![name.clone(); joins],
            Self::Random => (0..joins)
                .map(|_| {
                    TRANSITIONS
                        .choose(rng)
                        .copied()
                        .unwrap_or("fade")
                        .to_string()
                })
                .collect(),
        }
    }
}

/// Overlap between two segments of `segment_duration` seconds.
///
/// The default is 30% of the segment, never more than one second. An
/// explicit value is kept when it is positive, at most one second, and
/// shorter than the segment; otherwise the default applies.
pub fn transition_duration(segment_duration: f64, explicit: Option<f64>) -> f64 {
    let default = MAX_TRANSITION_SECS.min(segment_duration * DEFAULT_TRANSITION_SHARE);
    match explicit.filter(|t| t.is_finite() && *t > 0.0) {
        Some(t) => {
            let t = t.min(MAX_TRANSITION_SECS);
            if t < segment_duration { t } else { default }
        }
        None => default,
    }
}

/// Offset of the `index`-th transition (1-based) in the chained output.
pub fn xfade_offset(index: usize, segment_duration: f64, transition: f64) -> f64 {
    let i = index as f64;
    i * segment_duration - i * transition
}

/// Output length of `count` segments joined by `count - 1` overlaps.
pub fn chained_duration(count: usize, segment_duration: f64, transition: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    count as f64 * segment_duration - (count - 1) as f64 * transition
}

/// Split the concatenated `source`, trim each segment back out, and chain
/// xfades between neighbours. One segment is passed through with `copy`.
pub fn build_xfade_chain(
    graph: &mut FilterGraph,
    source: &str,
    count: usize,
    segment_duration: f64,
    transition: f64,
    names: &[String],
) -> Result<String> {
    if count == 0 {
        bail!("no segments to join");
    }
    if count == 1 {
        let out = graph.label("vout");
        graph.push(&[source], vec![Filter::Copy], &[&out])?;
        return Ok(out);
    }
    if names.len() + 1 < count {
        bail!(
            "{} transitions given for {count} segments",
            names.len()
        );
    }

    let splits: Vec<String> = (0..count).map(|_| graph.label("s")).collect();
    let split_refs: Vec<&str> = splits.iter().map(String::as_str).collect();
    graph.push(&[source], vec![Filter::Split(count)], &split_refs)?;

    let mut trimmed = Vec::with_capacity(count);
    for (i, split) in splits.iter().enumerate() {
        let start = i as f64 * segment_duration;
        let label = graph.label("seg");
        graph.push(
            &[split],
            vec![Filter::Trim {
                start,
                end: start + segment_duration,
            }],
            &[&label],
        )?;
        trimmed.push(label);
    }

    let mut previous = trimmed[0].clone();
    for (i, next) in trimmed.iter().enumerate().skip(1) {
        let out = graph.label("x");
        graph.push(
            &[&previous, next],
            vec![Filter::Xfade {
                transition: names[i - 1].clone(),
                duration: transition,
                offset: xfade_offset(i, segment_duration, transition),
            }],
            &[&out],
        )?;
        previous = out;
    }
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::render::ffmpeg::graph::InputSpec;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_duration_is_capped() {
        assert!((transition_duration(3.0, None) - 0.9).abs() < 1e-9);
        assert_eq!(transition_duration(5.0, None), 1.0);
        assert_eq!(transition_duration(3.0, Some(1.0)), 1.0);
        assert_eq!(transition_duration(3.0, Some(2.5)), 1.0);
        assert!((transition_duration(0.5, Some(0.8)) - 0.15).abs() < 1e-9);
        assert_eq!(transition_duration(3.0, Some(-1.0)), transition_duration(3.0, None));
    }

    #[test]
    fn offsets_increase_and_stay_below_segment_boundaries() {
        let (d, t) = (3.0, 1.0);
        let mut last = 0.0;
        for i in 1..10 {
            let off = xfade_offset(i, d, t);
            assert!(off > last);
            assert!(off < i as f64 * d);
            last = off;
        }
        assert_eq!(xfade_offset(1, d, t), 2.0);
        assert_eq!(chained_duration(3, d, t), 7.0);
    }

    #[test]
    fn chain_has_one_xfade_per_join() {
        let mut graph = FilterGraph::new();
        graph.add_input(InputSpec::media("list.txt"));
        let names = vec!["fade".to_string(); 2];
        let out = build_xfade_chain(&mut graph, "0:v", 3, 3.0, 1.0, &names).unwrap();
        let serialized = graph.serialize().unwrap();
        assert_eq!(serialized.matches("xfade=").count(), 2);
        assert!(serialized.contains("offset=2["));
        assert!(serialized.contains("offset=4["));
        assert!(serialized.starts_with("[0:v]split=3"));
        assert!(serialized.contains("trim=start=3:end=6,setpts=PTS-STARTPTS"));
        assert!(serialized.ends_with(&format!("[{out}]")));
    }

    #[test]
    fn single_segment_is_copied() {
        let mut graph = FilterGraph::new();
        graph.add_input(InputSpec::media("list.txt"));
        build_xfade_chain(&mut graph, "0:v", 1, 3.0, 1.0, &[]).unwrap();
        let serialized = graph.serialize().unwrap();
        assert!(serialized.starts_with("[0:v]copy["));
        assert!(!serialized.contains("xfade"));
    }

    #[test]
    fn parse_and_random_names() {
        assert_eq!(TransitionChoice::parse("None").unwrap(), TransitionChoice::None);
        assert_eq!(
            TransitionChoice::parse("circleopen").unwrap(),
            TransitionChoice::Named("circleopen".into())
        );
        assert!(TransitionChoice::parse("spin").is_err());

        let mut rng = StdRng::seed_from_u64(7);
        let names = TransitionChoice::Random.names_for(5, &mut rng);
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(|n| TRANSITIONS.contains(&n.as_str())));
    }
}
