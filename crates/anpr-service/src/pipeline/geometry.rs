//! Conversion of pixel boxes into resolution-independent coordinates.

/// Convert `[x1, y1, x2, y2]` pixels into fractions of the image size.
///
/// Callers must pass the dimensions of a successfully decoded image, which
/// are never zero. Results are clamped into `[0, 1]`.
pub fn normalize_bbox(bbox: [i32; 4], width: u32, height: u32) -> [f64; 4] {
    debug_assert!(width > 0 && height > 0, "image dimensions must be non-zero");

    let w = f64::from(width);
    let h = f64::from(height);
    let [x1, y1, x2, y2] = bbox;

    [
        (f64::from(x1) / w).clamp(0.0, 1.0),
        (f64::from(y1) / h).clamp(0.0, 1.0),
        (f64::from(x2) / w).clamp(0.0, 1.0),
        (f64::from(y2) / h).clamp(0.0, 1.0),
    ]
}
