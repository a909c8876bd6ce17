//! Selection of the single plate region from raw detector output.
use crate::engine::Detection;

/// Default divisor for the area bonus in [`region_score`]
pub const DEFAULT_AREA_NORMALIZER: f64 = 200_000.0;

/// Composite score: detector confidence with a mild bonus for larger boxes.
///
/// `confidence * (1 + area / area_normalizer)`
pub fn region_score(detection: &Detection, area_normalizer: f64) -> f64 {
    f64::from(detection.confidence) * (1.0 + detection.area() / area_normalizer)
}

/// Pick the detection with the highest composite score.
///
/// Ties keep the earliest detection. Returns `None` for an empty list, which
/// means no plate was found.
pub fn select_region(detections: &[Detection], area_normalizer: f64) -> Option<Detection> {
    let mut best: Option<Detection> = None;
    let mut best_score = -1.0f64;

    for detection in detections {
        let score = region_score(detection, area_normalizer);
        if score > best_score {
            best_score = score;
            best = Some(*detection);
        }
    }

    if let Some(region) = &best {
        tracing::debug!(
            candidates = detections.len(),
            score = best_score,
            confidence = region.confidence,
            bbox = ?region.bbox(),
            "selected plate region"
        );
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_selects_nothing() {
        assert_eq!(select_region(&[], DEFAULT_AREA_NORMALIZER), None);
    }

    #[test]
    fn test_single_detection_returned_unchanged() {
        let only = Detection::new(5, 6, 70, 30, 0.42);
        assert_eq!(select_region(&[only], DEFAULT_AREA_NORMALIZER), Some(only));
    }

    #[test]
    fn test_ties_keep_first() {
        let first = Detection::new(0, 0, 100, 40, 0.8);
        let second = Detection::new(200, 200, 300, 240, 0.8);
        assert_eq!(
            select_region(&[first, second], DEFAULT_AREA_NORMALIZER),
            Some(first)
        );
    }

    #[test]
    fn test_larger_area_never_scores_lower() {
        let sizes = [(0, 0), (10, 5), (100, 40), (400, 200), (1000, 1000)];
        for confidence in [0.1f32, 0.5, 0.99] {
            for window in sizes.windows(2) {
                let (w1, h1) = window[0];
                let (w2, h2) = window[1];
                let small = Detection::new(0, 0, w1, h1, confidence);
                let large = Detection::new(0, 0, w2, h2, confidence);
                assert!(
                    region_score(&large, DEFAULT_AREA_NORMALIZER)
                        >= region_score(&small, DEFAULT_AREA_NORMALIZER)
                );
            }
        }
    }

    #[test]
    fn test_area_bonus_is_mild() {
        // A huge low-confidence box does not beat a confident plate-sized one
        let confident = Detection::new(100, 100, 200, 140, 0.9);
        let huge = Detection::new(0, 0, 400, 200, 0.5);
        assert_eq!(
            select_region(&[huge, confident], DEFAULT_AREA_NORMALIZER),
            Some(confident)
        );

        // ...but a substantial area advantage can tip a close call
        let small = Detection::new(0, 0, 50, 20, 0.80);
        let big = Detection::new(0, 0, 500, 200, 0.75);
        assert_eq!(
            select_region(&[small, big], DEFAULT_AREA_NORMALIZER),
            Some(big)
        );
    }

    #[test]
    fn test_inverted_box_gets_no_bonus() {
        let inverted = Detection::new(300, 300, 0, 0, 0.6);
        assert_eq!(region_score(&inverted, DEFAULT_AREA_NORMALIZER), f64::from(0.6f32));
    }

    #[test]
    fn test_normalizer_is_configurable() {
        let small = Detection::new(0, 0, 50, 20, 0.80);
        let big = Detection::new(0, 0, 500, 200, 0.75);
        // With a very large normalizer the bonus vanishes and confidence decides
        assert_eq!(select_region(&[small, big], 1.0e12), Some(small));
    }
}
