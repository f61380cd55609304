use std::path::PathBuf;

use anyhow::Result;

use super::super::graph::{Filter, FilterGraph, InputKind, InputSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRole {
    Narration,
    Background,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub role: AudioRole,
    pub volume: f64,
    /// Loop the source and cut it at this many seconds.
    pub loop_for: Option<f64>,
}

impl AudioTrack {
    pub fn narration(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: AudioRole::Narration,
            volume: 1.0,
            loop_for: None,
        }
    }

    /// Background bed, looped for at least one second.
    pub fn background(path: impl Into<PathBuf>, volume: f64, duration: f64) -> Self {
        Self {
            path: path.into(),
            role: AudioRole::Background,
            volume,
            loop_for: Some(duration.max(1.0)),
        }
    }

    fn input(&self) -> InputSpec {
        match self.loop_for {
            Some(duration) => InputSpec::new(
                self.path.clone(),
                InputKind::Looped {
                    duration: Some(duration),
                },
            ),
            None => InputSpec::media(self.path.clone()),
        }
    }
}

/// Sidechain settings used when overlay audio plays under narration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckingParams {
    pub threshold: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
    pub dropout_transition: u32,
}

impl Default for DuckingParams {
    fn default() -> Self {
        Self {
            threshold: 0.03,
            ratio: 8.0,
            attack: 5.0,
            release: 300.0,
            dropout_transition: 250,
        }
    }
}

/// Add inputs for `tracks` and mix them; returns the audio label to map.
///
/// One track maps its raw stream. Track 0 is the lead at its own volume,
/// the rest are scaled by theirs, and all of them go into one `amix` that
/// follows the lead's length.
pub fn mix_audio_tracks(graph: &mut FilterGraph, tracks: &[AudioTrack]) -> Result<Option<String>> {
    let indices: Vec<usize> = tracks.iter().map(|t| graph.add_input(t.input())).collect();

    match (tracks, indices.as_slice()) {
        ([], _) => Ok(None),
        ([_], [index]) => Ok(Some(format!("{index}:a"))),
        _ => {
            let mut leveled = Vec::with_capacity(tracks.len());
            for (track, index) in tracks.iter().zip(&indices) {
                let label = graph.label("a");
                graph.push(
                    &[&format!("{index}:a")],
                    vec![Filter::Volume(track.volume)],
                    &[&label],
                )?;
                leveled.push(label);
            }

            let mixed = graph.label("aout");
            let inputs: Vec<&str> = leveled.iter().map(String::as_str).collect();
            graph.push(
                &inputs,
                vec![Filter::Amix {
                    inputs: leveled.len(),
                    dropout_transition: 2,
                    normalize: true,
                }],
                &[&mixed],
            )?;
            Ok(Some(mixed))
        }
    }
}

/// Delay overlay audio to `start_secs` and duck it under `narration`.
///
/// The narration is split so it can both feed the mix and drive the
/// compressor's sidechain.
pub(super) fn duck_under_narration(
    graph: &mut FilterGraph,
    narration: &str,
    overlay_input: usize,
    start_secs: f64,
    params: &DuckingParams,
) -> Result<String> {
    let keep = graph.label("narr");
    let sidechain = graph.label("sc");
    graph.push(&[narration], vec![Filter::Asplit(2)], &[&keep, &sidechain])?;

    let delayed = graph.label("ova");
    let delay_ms = (start_secs.max(0.0) * 1000.0).round() as u64;
    graph.push(
        &[&format!("{overlay_input}:a")],
        vec![Filter::Adelay(delay_ms)],
        &[&delayed],
    )?;

    let ducked = graph.label("duck");
    graph.push(
        &[&delayed, &sidechain],
        vec![Filter::SidechainCompress {
            threshold: params.threshold,
            ratio: params.ratio,
            attack: params.attack,
            release: params.release,
        }],
        &[&ducked],
    )?;

    let mixed = graph.label("amix");
    graph.push(
        &[&keep, &ducked],
        vec![Filter::Amix {
            inputs: 2,
            dropout_transition: params.dropout_transition,
            normalize: false,
        }],
        &[&mixed],
    )?;
    Ok(mixed)
}
