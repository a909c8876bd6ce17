//! Crop the selected region and prepare it for text recognition.
use super::clahe::{apply_clahe, ClaheParams};
use crate::engine::Detection;
use crate::error::AnprError;
use image::{imageops, DynamicImage, GrayImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceParams {
    /// Pixels added on every side of the region before cropping
    pub padding: u32,

    /// Crops narrower than this are upscaled
    pub upscale_min_width: u32,

    /// Scale factor applied to narrow crops
    pub upscale_factor: f32,

    pub clahe: ClaheParams,
}

fn default_padding() -> u32 {
    12
}

fn default_upscale_min_width() -> u32 {
    300
}

fn default_upscale_factor() -> f32 {
    2.0
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            upscale_min_width: default_upscale_min_width(),
            upscale_factor: default_upscale_factor(),
            clahe: ClaheParams::default(),
        }
    }
}

/// Pixel rectangle `(x, y, width, height)` inside the source image
pub type CropRect = (u32, u32, u32, u32);

/// Clamp `region` to a `width` x `height` image.
///
/// Fails with `InvalidRegion` when the clamped box has no area, so a region
/// lying outside the image is never rescued by padding.
pub fn clamp_region(region: &Detection, width: u32, height: u32) -> Result<Detection, AnprError> {
    let max_x = i32::try_from(width).unwrap_or(i32::MAX);
    let max_y = i32::try_from(height).unwrap_or(i32::MAX);
    let x1 = region.x1.clamp(0, max_x);
    let y1 = region.y1.clamp(0, max_y);
    let x2 = region.x2.clamp(0, max_x);
    let y2 = region.y2.clamp(0, max_y);

    if x2 <= x1 || y2 <= y1 {
        return Err(AnprError::invalid_region(format!(
            "region {:?} is empty inside a {}x{} image",
            region.bbox(),
            width,
            height
        )));
    }

    Ok(Detection::new(x1, y1, x2, y2, region.confidence))
}

/// Clamp `region` to a `width` x `height` image, then expand it by `padding`
/// without leaving the image.
pub fn padded_crop_rect(
    region: &Detection,
    padding: u32,
    width: u32,
    height: u32,
) -> Result<CropRect, AnprError> {
    let region = clamp_region(region, width, height)?;
    let pad = i64::from(padding);
    let x1 = (i64::from(region.x1) - pad).max(0);
    let y1 = (i64::from(region.y1) - pad).max(0);
    let x2 = (i64::from(region.x2) + pad).min(i64::from(width));
    let y2 = (i64::from(region.y2) + pad).min(i64::from(height));

    // The clamped region is non-empty and inside the image, so these fit in u32
    Ok((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

/// Copy the padded region out of the source image.
pub fn crop_region(
    image: &DynamicImage,
    region: &Detection,
    padding: u32,
) -> Result<DynamicImage, AnprError> {
    let (x, y, w, h) = padded_crop_rect(region, padding, image.width(), image.height())?;
    Ok(image.crop_imm(x, y, w, h))
}

/// Upscale crops narrower than `min_width` using cubic interpolation.
pub fn upscale_if_narrow(image: GrayImage, min_width: u32, factor: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width >= min_width || factor <= 1.0 {
        return image;
    }

    let new_width = ((width as f32 * factor) as u32).max(1);
    let new_height = ((height as f32 * factor) as u32).max(1);
    imageops::resize(&image, new_width, new_height, imageops::FilterType::CatmullRom)
}

/// Full crop/enhance stage: crop, grayscale, upscale, local contrast.
pub fn prepare_for_ocr(
    image: &DynamicImage,
    region: &Detection,
    params: &EnhanceParams,
) -> Result<GrayImage, AnprError> {
    let crop = crop_region(image, region, params.padding)?;
    let gray = upscale_if_narrow(crop.to_luma8(), params.upscale_min_width, params.upscale_factor);
    Ok(apply_clahe(&gray, &params.clahe))
}
