use image::{DynamicImage, ImageReader, ImageResult, Limits};
use std::io::Cursor;

/// Largest accepted width or height of an upload.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;
/// Ceiling on decoder allocations for a single upload.
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// Decodes an encoded upload, guessing its format from the content and
/// refusing rasters larger than [`MAX_IMAGE_DIMENSION`] on either side.
pub fn decode_image(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    reader.decode()
}
