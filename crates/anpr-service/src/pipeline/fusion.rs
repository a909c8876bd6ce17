//! Turning raw recognizer readings into one plate string.
//!
//! Readings are cleaned, the two strongest are also tried concatenated (the
//! recognizer often splits a plate into two fragments), and candidates that
//! match a known plate grammar win over those that do not.
use crate::engine::{TextReading, TextRecognizer};
use crate::error::AnprError;
use image::GrayImage;
use once_cell::sync::Lazy;
use regex::Regex;

// Both patterns are literals; failing to compile them is a programming error
#[allow(clippy::expect_used)]
static LEGACY_PLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9]{4}$").expect("legacy plate pattern is valid"));

#[allow(clippy::expect_used)]
static MERCOSUL_PLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{3}[0-9][A-Z0-9][0-9]{2}$").expect("mercosul plate pattern is valid")
});

/// Recognised plate layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateGrammar {
    /// Three letters, four digits (`ABC1234`)
    Legacy,
    /// Three letters, digit, letter or digit, two digits (`ABC1D23`)
    Mercosul,
}

impl PlateGrammar {
    /// Grammar matched by `text`, checking Legacy first
    pub fn classify(text: &str) -> Option<Self> {
        if LEGACY_PLATE.is_match(text) {
            Some(Self::Legacy)
        } else if MERCOSUL_PLATE.is_match(text) {
            Some(Self::Mercosul)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Mercosul => "mercosul",
        }
    }
}

/// Uppercase and drop everything outside `[A-Z0-9]`.
pub fn clean_plate_text(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// One (text, score) hypothesis in the candidate pool
#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub score: f32,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Clean raw readings, dropping any that end up empty.
pub fn clean_readings(readings: &[TextReading]) -> Vec<TextCandidate> {
    readings
        .iter()
        .filter_map(|reading| {
            let text = clean_plate_text(&reading.text);
            if text.is_empty() {
                return None;
            }
            let score = if reading.score.is_finite() {
                reading.score.clamp(0.0, 1.0)
            } else {
                0.0
            };
            Some(TextCandidate::new(text, score))
        })
        .collect()
}

/// Build the full candidate pool: cleaned readings sorted by score
/// (descending, stable), followed by the merge of the top two.
pub fn candidate_pool(readings: &[TextReading]) -> Vec<TextCandidate> {
    let mut pool = clean_readings(readings);
    pool.sort_by(|a, b| b.score.total_cmp(&a.score));

    if let [first, second, ..] = pool.as_slice() {
        let merged = TextCandidate::new(
            format!("{}{}", first.text, second.text),
            first.score.min(second.score),
        );
        pool.push(merged);
    }

    pool
}

/// Index of the first highest-scoring candidate among `indices`
fn first_best<I>(pool: &[TextCandidate], indices: I) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
{
    let mut best: Option<usize> = None;
    for idx in indices {
        if best.map_or(true, |b| pool[idx].score > pool[b].score) {
            best = Some(idx);
        }
    }
    best
}

/// Outcome of candidate fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedText {
    pub text: String,
    pub confidence: f32,

    /// Grammar the selected text matched; `None` for fallback picks and
    /// empty results
    pub grammar: Option<PlateGrammar>,

    /// Size of the candidate pool, merges included
    pub candidates: usize,
}

impl FusedText {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            grammar: None,
            candidates: 0,
        }
    }

    /// Metrics label: grammar name, "none" for fallbacks, "empty" for no text
    pub fn grammar_label(&self) -> &'static str {
        match self.grammar {
            Some(grammar) => grammar.label(),
            None if self.text.is_empty() => "empty",
            None => "none",
        }
    }
}

/// Pick the answer from a candidate pool.
///
/// The best grammar-valid candidate wins; otherwise the best candidate of
/// the whole pool is returned as-is. Ties go to the earlier candidate.
pub fn select_candidate(pool: &[TextCandidate]) -> FusedText {
    let grammars: Vec<Option<PlateGrammar>> =
        pool.iter().map(|c| PlateGrammar::classify(&c.text)).collect();

    let valid = (0..pool.len()).filter(|&i| grammars[i].is_some());
    let chosen = first_best(pool, valid).or_else(|| first_best(pool, 0..pool.len()));

    match chosen {
        Some(idx) => FusedText {
            text: pool[idx].text.clone(),
            confidence: pool[idx].score,
            grammar: grammars[idx],
            candidates: pool.len(),
        },
        None => FusedText::empty(),
    }
}

/// Clean, merge, validate and select in one step.
pub fn fuse_readings(readings: &[TextReading]) -> FusedText {
    let pool = candidate_pool(readings);
    let fused = select_candidate(&pool);

    tracing::debug!(
        raw = readings.len(),
        pool = pool.len(),
        text = %fused.text,
        confidence = fused.confidence,
        grammar = fused.grammar_label(),
        "fused text candidates"
    );

    fused
}

/// Run the recognizer and fuse its output.
///
/// A failing recognizer yields no candidates instead of an error: unreadable
/// plates are expected and must not fail the request.
pub fn read_plate_text(recognizer: &dyn TextRecognizer, image: &GrayImage) -> FusedText {
    match recognizer.recognize(image) {
        Ok(readings) => fuse_readings(&readings),
        Err(e) => {
            let err = AnprError::recognition_failure(format!("{:#}", e));
            tracing::warn!(
                recognizer = recognizer.name(),
                error = %err,
                "text recognition failed, treating as no candidates"
            );
            telemetry::metrics::ANPR_RECOGNITION_FAILURES.inc();
            FusedText::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{FailingRecognizer, FixedRecognizer};

    fn readings(pairs: &[(&str, f32)]) -> Vec<TextReading> {
        pairs
            .iter()
            .map(|(text, score)| TextReading::new(*text, *score))
            .collect()
    }

    #[test]
    fn test_clean_plate_text() {
        assert_eq!(clean_plate_text("abc-1234"), "ABC1234");
        assert_eq!(clean_plate_text(" BR · abc 1d23 "), "BRABC1D23");
        assert_eq!(clean_plate_text("--..  "), "");
        assert_eq!(clean_plate_text("ção9"), "O9");
    }

    #[test]
    fn test_clean_is_idempotent() {
        for text in ["ABC1234", "ABC1D23", "4", "Z", "0000000"] {
            assert_eq!(clean_plate_text(text), text);
            assert_eq!(clean_plate_text(&clean_plate_text(text)), clean_plate_text(text));
        }
    }

    #[test]
    fn test_grammars() {
        assert_eq!(PlateGrammar::classify("ABC1234"), Some(PlateGrammar::Legacy));
        assert_eq!(PlateGrammar::classify("ABC1D23"), Some(PlateGrammar::Mercosul));
        assert_eq!(PlateGrammar::classify("ABC1123"), Some(PlateGrammar::Legacy));
        assert_eq!(PlateGrammar::classify("AB1234"), None);
        assert_eq!(PlateGrammar::classify("ABC12345"), None);
        assert_eq!(PlateGrammar::classify("XABC1234"), None);
        assert_eq!(PlateGrammar::classify("abc1234"), None);
        assert_eq!(
            PlateGrammar::classify(&clean_plate_text("abc1234")),
            Some(PlateGrammar::Legacy)
        );
    }

    #[test]
    fn test_mercosul_matches_digit_in_fifth_position() {
        // Mercosul pattern accepts a digit in the fifth slot as well
        assert!(MERCOSUL_PLATE.is_match("ABC1123"));
        assert!(MERCOSUL_PLATE.is_match("ABC1D23"));
        assert!(!MERCOSUL_PLATE.is_match("ABCD123"));
    }

    #[test]
    fn test_empty_readings() {
        assert_eq!(fuse_readings(&[]), FusedText::empty());
        assert_eq!(fuse_readings(&readings(&[("--", 0.9), ("", 0.5)])), FusedText::empty());
    }

    #[test]
    fn test_merge_and_fallback() {
        let raw = readings(&[("abc123", 0.9), ("4", 0.95)]);

        let cleaned = clean_readings(&raw);
        assert_eq!(
            cleaned,
            vec![TextCandidate::new("ABC123", 0.9), TextCandidate::new("4", 0.95)]
        );

        let pool = candidate_pool(&raw);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[2], TextCandidate::new("4ABC123", 0.9));

        let fused = fuse_readings(&raw);
        assert_eq!(fused.text, "4");
        assert_eq!(fused.confidence, 0.95);
        assert_eq!(fused.grammar, None);
        assert_eq!(fused.grammar_label(), "none");
    }

    #[test]
    fn test_highest_valid_wins() {
        let fused = fuse_readings(&readings(&[("ABC1234", 0.8), ("XYZ0000", 0.99)]));
        assert_eq!(fused.text, "XYZ0000");
        assert_eq!(fused.confidence, 0.99);
        assert_eq!(fused.grammar, Some(PlateGrammar::Legacy));
    }

    #[test]
    fn test_valid_beats_higher_scoring_invalid() {
        let fused = fuse_readings(&readings(&[("BRASIL", 0.99), ("abc1d23", 0.6)]));
        assert_eq!(fused.text, "ABC1D23");
        assert_eq!(fused.confidence, 0.6);
        assert_eq!(fused.grammar_label(), "mercosul");
    }

    #[test]
    fn test_merge_recovers_split_plate() {
        let fused = fuse_readings(&readings(&[("ABC", 0.97), ("1D23", 0.91)]));
        assert_eq!(fused.text, "ABC1D23");
        assert_eq!(fused.confidence, 0.91);
        assert_eq!(fused.candidates, 3);
    }

    #[test]
    fn test_ties_keep_sorted_order() {
        let fused = fuse_readings(&readings(&[("AAA1111", 0.9), ("BBB2222", 0.9)]));
        assert_eq!(fused.text, "AAA1111");
    }

    #[test]
    fn test_single_reading_has_no_merge() {
        let pool = candidate_pool(&readings(&[("abc1234", 0.7)]));
        assert_eq!(pool, vec![TextCandidate::new("ABC1234", 0.7)]);
    }

    #[test]
    fn test_non_finite_scores_sanitized() {
        let cleaned = clean_readings(&readings(&[("ABC1234", f32::NAN), ("XYZ", 1.5)]));
        assert_eq!(cleaned[0].score, 0.0);
        assert_eq!(cleaned[1].score, 1.0);
    }

    #[test]
    fn test_read_plate_text_with_recognizer() {
        let recognizer = FixedRecognizer::from_pairs(&[("abc-1234", 0.88)]);
        let image = GrayImage::new(200, 60);
        let fused = read_plate_text(&recognizer, &image);
        assert_eq!(fused.text, "ABC1234");
        assert_eq!(recognizer.seen_dimensions(), vec![(200, 60)]);
    }

    #[test]
    fn test_recognizer_failure_degrades_to_empty() {
        let image = GrayImage::new(200, 60);
        let fused = read_plate_text(&FailingRecognizer, &image);
        assert_eq!(fused, FusedText::empty());
        assert_eq!(fused.grammar_label(), "empty");
    }
}
