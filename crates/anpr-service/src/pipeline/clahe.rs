//! Contrast-limited adaptive histogram equalization (CLAHE) for plate crops.
//!
//! The image is split into a grid of tiles, each tile gets its own clipped
//! equalization LUT, and every pixel is mapped through a bilinear blend of
//! the LUTs of the four nearest tile centres.
use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::stats::histogram;

const BINS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip limit, relative to a uniform distribution (0 disables clipping)
    pub clip_limit: f32,

    /// Number of tile columns
    pub tiles_x: u32,

    /// Number of tile rows
    pub tiles_y: u32,
}

fn default_clip_limit() -> f32 {
    2.0
}

fn default_tiles() -> u32 {
    8
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: default_clip_limit(),
            tiles_x: default_tiles(),
            tiles_y: default_tiles(),
        }
    }
}

/// Tile layout along one axis. Trailing tiles may be narrower.
#[derive(Debug, Clone, Copy)]
struct Axis {
    tile: u32,
    count: u32,
    len: u32,
}

impl Axis {
    fn new(len: u32, tiles: u32) -> Self {
        let tile = len.div_ceil(tiles.clamp(1, len.max(1))).max(1);
        Self {
            tile,
            count: len.div_ceil(tile),
            len,
        }
    }

    fn span(&self, index: u32) -> (u32, u32) {
        let start = index * self.tile;
        (start, self.tile.min(self.len - start))
    }

    /// Neighbouring tile indices and the weight of the second one, per pixel
    fn weights(&self) -> Vec<(usize, usize, f32)> {
        let last = self.count as i64 - 1;
        (0..self.len)
            .map(|p| {
                let pos = (p as f32 + 0.5) / self.tile as f32 - 0.5;
                let lower = pos.floor();
                let weight = pos - lower;
                let first = (lower as i64).clamp(0, last) as usize;
                let second = (lower as i64 + 1).clamp(0, last) as usize;
                (first, second, weight)
            })
            .collect()
    }
}

/// Clipped, equalized mapping for one tile histogram
fn tile_lut(counts: &[u32; BINS], clip_limit: f32) -> [u8; BINS] {
    let mut hist = *counts;
    let area: u32 = hist.iter().sum();
    let mut lut = [0u8; BINS];
    if area == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        // Spread the clipped mass evenly, then hand out the remainder
        let batch = excess / BINS as u32;
        let residual = (excess % BINS as u32) as usize;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (BINS / residual).max(1);
            for bin in hist.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (value, bin) in lut.iter_mut().zip(hist.iter()) {
        cumulative += bin;
        *value = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Apply CLAHE to a grayscale image, returning a new image of the same size.
pub fn apply_clahe(image: &GrayImage, params: &ClaheParams) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let cols = Axis::new(width, params.tiles_x);
    let rows = Axis::new(height, params.tiles_y);

    let mut luts = Vec::with_capacity((cols.count * rows.count) as usize);
    for ty in 0..rows.count {
        let (y, h) = rows.span(ty);
        for tx in 0..cols.count {
            let (x, w) = cols.span(tx);
            let tile = imageops::crop_imm(image, x, y, w, h).to_image();
            luts.push(tile_lut(&histogram(&tile).channels[0], params.clip_limit));
        }
    }

    let col_weights = cols.weights();
    let row_weights = rows.weights();
    let stride = cols.count as usize;

    ImageBuffer::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as usize;
        let (c1, c2, wx) = col_weights[x as usize];
        let (r1, r2, wy) = row_weights[y as usize];

        let sample = |r: usize, c: usize| f32::from(luts[r * stride + c][value]);
        let top = sample(r1, c1) * (1.0 - wx) + sample(r1, c2) * wx;
        let bottom = sample(r2, c1) * (1.0 - wx) + sample(r2, c2) * wx;
        let blended = top * (1.0 - wy) + bottom * wy;

        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}
