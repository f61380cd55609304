use crate::ui::prelude::{Level, emit};

/// One recognized word with its timing in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedWord {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f64,
}

impl TimedWord {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            confidence,
        }
    }
}

/// A display-ready caption span.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub confidence: f64,
}

impl CaptionSegment {
    pub fn start_seconds(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    pub fn end_seconds(&self) -> f64 {
        self.end_ms as f64 / 1000.0
    }
}

/// Bounds applied while grouping words.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    pub max_duration_secs: f64,
    pub max_chars: usize,
    pub max_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 4.0,
            max_chars: 60,
            max_words: 4,
        }
    }
}

const TERMINAL_PUNCTUATION: [char; 4] = ['.', '!', '?', ','];

#[derive(Default)]
struct OpenSegment {
    words: Vec<String>,
    start_ms: u64,
    end_ms: u64,
    confidence_sum: f64,
}

impl OpenSegment {
    fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn char_len_with(&self, word: &str) -> usize {
        let joined: usize = self.words.iter().map(|w| w.chars().count()).sum();
        joined + self.words.len() + word.chars().count()
    }

    fn ends_sentence(&self) -> bool {
        self.words
            .last()
            .is_some_and(|w| w.ends_with(TERMINAL_PUNCTUATION))
    }

    fn push(&mut self, word: &TimedWord) {
        if self.words.is_empty() {
            self.start_ms = word.start_ms;
        }
        self.words.push(word.text.clone());
        self.end_ms = word.end_ms;
        self.confidence_sum += word.confidence;
    }

    fn close(&mut self) -> Option<CaptionSegment> {
        if self.words.is_empty() {
            return None;
        }
        let segment = CaptionSegment {
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            text: self.words.join(" "),
            confidence: self.confidence_sum / self.words.len() as f64,
        };
        *self = OpenSegment::default();
        Some(segment)
    }
}

/// Group time-ordered words into caption spans.
///
/// A span is closed before adding the next word when that word would push the
/// span over the word, duration or character bound, or when the span already
/// ends with terminal punctuation. A single word that alone exceeds a bound
/// still forms its own span; words are never split.
pub fn segment_words(words: &[TimedWord], config: &SegmenterConfig) -> Vec<CaptionSegment> {
    let mut segments = Vec::new();
    let mut open = OpenSegment::default();
    let max_duration_ms = (config.max_duration_secs * 1000.0).max(0.0);

    for word in words {
        let text = word.text.trim();
        if text.is_empty() {
            continue;
        }

        if !open.is_empty() {
            let too_many_words = open.words.len() + 1 > config.max_words;
            let too_long = word.end_ms.saturating_sub(open.start_ms) as f64 > max_duration_ms;
            let too_wide = open.char_len_with(text) > config.max_chars;
            if too_many_words || too_long || too_wide || open.ends_sentence() {
                segments.extend(open.close());
            }
        }

        open.push(&TimedWord {
            text: text.to_string(),
            ..word.clone()
        });
    }
    segments.extend(open.close());

    emit(
        Level::Debug,
        "video.captions.segmented",
        &format!(
            "Grouped {} words into {} caption segments",
            words.len(),
            segments.len()
        ),
        None,
    );

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(spec: &[(&str, u64, u64)]) -> Vec<TimedWord> {
        spec.iter()
            .map(|(t, s, e)| TimedWord::new(*t, *s, *e, 0.9))
            .collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment_words(&[], &SegmenterConfig::default()).is_empty());
    }

    #[test]
    fn splits_on_word_count() {
        let input = words(&[
            ("one", 0, 100),
            ("two", 100, 200),
            ("three", 200, 300),
            ("four", 300, 400),
            ("five", 400, 500),
        ]);
        let out = segment_words(&input, &SegmenterConfig::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "one two three four");
        assert_eq!(out[0].start_ms, 0);
        assert_eq!(out[0].end_ms, 400);
        assert_eq!(out[1].text, "five");
        assert_eq!(out[1].start_ms, 400);
    }

    #[test]
    fn previous_punctuation_closes_segment() {
        let input = words(&[("Hello,", 0, 300), ("world", 300, 600), ("again", 600, 900)]);
        let out = segment_words(&input, &SegmenterConfig::default());
        let texts: Vec<_> = out.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello,", "world again"]);
    }

    #[test]
    fn respects_character_bound_without_splitting_words() {
        let config = SegmenterConfig {
            max_chars: 10,
            max_words: 10,
            max_duration_secs: 30.0,
        };
        let input = words(&[
            ("short", 0, 100),
            ("words", 100, 200),
            ("incomprehensibilities", 200, 300),
            ("ok", 300, 400),
        ]);
        let out = segment_words(&input, &config);
        for seg in &out {
            let single_word = !seg.text.contains(' ');
            assert!(seg.text.chars().count() <= config.max_chars || single_word);
        }
        assert!(out.iter().any(|s| s.text == "incomprehensibilities"));
    }

    #[test]
    fn respects_duration_bound() {
        let config = SegmenterConfig {
            max_duration_secs: 1.0,
            max_chars: 100,
            max_words: 100,
        };
        let input: Vec<_> = (0..10)
            .map(|i| TimedWord::new(format!("w{i}"), i * 400, i * 400 + 350, 1.0))
            .collect();
        let out = segment_words(&input, &config);
        assert!(out.len() > 1);
        for seg in &out {
            assert!(seg.end_ms - seg.start_ms <= 1000, "{seg:?}");
        }
    }

    #[test]
    fn confidence_is_mean_of_included_words() {
        let input = vec![
            TimedWord::new("a", 0, 100, 1.0),
            TimedWord::new("b", 100, 200, 0.5),
        ];
        let out = segment_words(&input, &SegmenterConfig::default());
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.75).abs() < 1e-9);
    }
}
