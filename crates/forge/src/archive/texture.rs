//! Texture build job: decodes a source image, chooses a format, generates
//! mips, and compresses the result (§4.6 "Job kinds", §4.6.1).
//!
//! Real block compression (BC7/BC5/BC4/BC1/BC3) and image decoding live
//! outside this tool's scope — the core only describes the interface those
//! encoders satisfy. This job performs the real, specified parts (format
//! selection, sRGB-aware mip generation) and GDeflates the chosen format's
//! uncompressed pixel bytes in place of a real block encode.

use std::sync::Mutex;

use image::{DynamicImage, GenericImageView};

use crate::error::{Error, Result};
use crate::jobs::{simple, JobScheduler};

use super::format::{BuiltFile, BuiltSubFile, Compression, FourCC};
use super::result::{AtomicBuildResult, BuildJob, BuildProgress, BuildResult, JobCompletion};

/// A texture format the builder can select, paired with its uncompressed
/// fallback (§4.6.1 parentheticals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Single-channel, block-compressed.
    Bc4un,
    /// Single channel, uncompressed.
    R8un,
    /// Two-channel, block-compressed.
    Bc5un,
    /// Two-channel, uncompressed.
    R8G8un,
    /// Four-channel sRGB, BC7 block-compressed.
    Bc7srgb,
    /// Four-channel sRGB, BC3 block-compressed.
    Bc3srgb,
    /// Four-channel sRGB, BC1 block-compressed (no alpha).
    Bc1srgb,
    /// Four-channel sRGB, uncompressed.
    R8G8B8A8srgb,
}

impl TextureFormat {
    #[must_use]
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Bc7srgb | Self::Bc3srgb | Self::Bc1srgb | Self::R8G8B8A8srgb)
    }

    /// Bytes per texel in the uncompressed fallback this tool actually
    /// stores (it never emits real BC-compressed bytes).
    const fn bytes_per_texel(self) -> usize {
        match self {
            Self::Bc4un | Self::R8un => 1,
            Self::Bc5un | Self::R8G8un => 2,
            Self::Bc7srgb | Self::Bc3srgb | Self::Bc1srgb | Self::R8G8B8A8srgb => 4,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Bc4un => "BC4U",
            Self::R8un => "R8U_",
            Self::Bc5un => "BC5U",
            Self::R8G8un => "RG8U",
            Self::Bc7srgb => "BC7S",
            Self::Bc3srgb => "BC3S",
            Self::Bc1srgb => "BC1S",
            Self::R8G8B8A8srgb => "RGBA",
        }
    }

    /// Parses a `-t-format` name, matching the format names this tool emits.
    /// Returns `None` for `"unknown"`/unrecognized names, which callers treat
    /// as "run the format-selection heuristic instead."
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bc4_un" => Some(Self::Bc4un),
            "r8_un" => Some(Self::R8un),
            "bc5_un" => Some(Self::Bc5un),
            "r8g8_un" => Some(Self::R8G8un),
            "bc7_srgb" => Some(Self::Bc7srgb),
            "bc3_srgb" => Some(Self::Bc3srgb),
            "bc1_srgb" => Some(Self::Bc1srgb),
            "r8g8b8a8_srgb" => Some(Self::R8G8B8A8srgb),
            _ => None,
        }
    }
}

/// Picks a format from decoded pixels, per §4.6.1: a texture with only a
/// non-zero R channel and fully opaque alpha goes to `Bc4un`/`R8un`; R+G
/// only to `Bc5un`/`R8G8un`; with alpha to BC7 (if allowed) or BC3; else
/// BC1/RGBA8.
///
/// `allow_bc7` selects the BC7-vs-BC3 branch; `block_compress` selects
/// between the block-compressed and uncompressed member of each pair (this
/// tool always picks the uncompressed member, since it has no real block
/// encoder, but the distinction is kept so callers can see which format a
/// real encoder would target).
#[must_use]
pub fn select_format(image: &DynamicImage, allow_bc7: bool, block_compress: bool) -> TextureFormat {
    let mut uses_g = false;
    let mut uses_b = false;
    let mut uses_alpha = false;

    for (_, _, pixel) in image.pixels() {
        if pixel[1] != 0 {
            uses_g = true;
        }
        if pixel[2] != 0 {
            uses_b = true;
        }
        if pixel[3] != 255 {
            uses_alpha = true;
        }
    }

    if !uses_g && !uses_b && !uses_alpha {
        return if block_compress { TextureFormat::Bc4un } else { TextureFormat::R8un };
    }
    if !uses_b && !uses_alpha {
        return if block_compress { TextureFormat::Bc5un } else { TextureFormat::R8G8un };
    }
    if uses_alpha {
        return if !block_compress { TextureFormat::R8G8B8A8srgb } else if allow_bc7 { TextureFormat::Bc7srgb } else { TextureFormat::Bc3srgb };
    }
    if block_compress {
        TextureFormat::Bc1srgb
    } else {
        TextureFormat::R8G8B8A8srgb
    }
}

/// Packs `image` into `format`'s channel layout, dropping channels the
/// format doesn't carry.
fn pack_texel_bytes(image: &DynamicImage, format: TextureFormat) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity((width * height) as usize * format.bytes_per_texel());
    for y in 0..height {
        for x in 0..width {
            let pixel = image.get_pixel(x, y);
            match format {
                TextureFormat::Bc4un | TextureFormat::R8un => out.push(pixel[0]),
                TextureFormat::Bc5un | TextureFormat::R8G8un => out.extend_from_slice(&[pixel[0], pixel[1]]),
                _ => out.extend_from_slice(&pixel.0),
            }
        }
    }
    out
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = f32::from(c) / 255.0;
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let encoded = if c <= 0.0004045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
    (encoded * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Halves `image`'s resolution by box-filtering 2x2 texel blocks, decoding
/// and re-encoding in linear light first if `srgb` (§4.6.1).
#[must_use]
pub fn generate_mip(image: &DynamicImage, srgb: bool) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (mip_w, mip_h) = ((width / 2).max(1), (height / 2).max(1));
    let mut out = image::RgbaImage::new(mip_w, mip_h);

    for y in 0..mip_h {
        for x in 0..mip_w {
            let mut sum = [0.0f32; 4];
            let mut count = 0.0f32;
            for dy in 0..2 {
                for dx in 0..2 {
                    let sx = (x * 2 + dx).min(width - 1);
                    let sy = (y * 2 + dy).min(height - 1);
                    let p = image.get_pixel(sx, sy);
                    for c in 0..3 {
                        sum[c] += if srgb { srgb_to_linear(p[c]) } else { f32::from(p[c]) / 255.0 };
                    }
                    sum[3] += f32::from(p[3]) / 255.0;
                    count += 1.0;
                }
            }
            let avg = sum.map(|s| s / count);
            let encode = |c: f32| if srgb { linear_to_srgb(c) } else { (c * 255.0).round().clamp(0.0, 255.0) as u8 };
            out.put_pixel(x, y, image::Rgba([encode(avg[0]), encode(avg[1]), encode(avg[2]), (avg[3] * 255.0).round().clamp(0.0, 255.0) as u8]));
        }
    }
    DynamicImage::ImageRgba8(out)
}

/// Builds a `"TXTR"` archive file: one GDeflate-compressed sub-file per mip
/// level, named by level index, plus a small inline header describing the
/// chosen format and mip count.
pub struct TextureBuildJob {
    name: String,
    image_bytes: Vec<u8>,
    allow_bc7: bool,
    allow_compression: bool,
    generate_mips: bool,
    format_override: Option<TextureFormat>,
    completion: JobCompletion,
    output: Mutex<Option<BuiltFile>>,
    result: AtomicBuildResult,
}

impl TextureBuildJob {
    /// Constructs the job and immediately dispatches its processing work.
    /// `image_bytes` is an encoded (e.g. PNG) source image. `format_override`
    /// bypasses the format-selection heuristic entirely when set.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: &JobScheduler,
        name: String,
        image_bytes: Vec<u8>,
        allow_bc7: bool,
        allow_compression: bool,
        generate_mips: bool,
        format_override: Option<TextureFormat>,
    ) -> std::sync::Arc<Self> {
        let job = std::sync::Arc::new(Self {
            name,
            image_bytes,
            allow_bc7,
            allow_compression,
            generate_mips,
            format_override,
            completion: JobCompletion::new(),
            output: Mutex::new(None),
            result: AtomicBuildResult::new(),
        });

        let dispatched = std::sync::Arc::clone(&job);
        scheduler.dispatch(
            simple(move || {
                if let Err(err) = dispatched.process() {
                    dispatched.result.fail_if_success(err.into());
                }
                dispatched.completion.mark_done();
            }),
            (),
        );
        job
    }

    fn process(&self) -> Result<()> {
        let image = image::load_from_memory(&self.image_bytes).map_err(|e| Error::InvalidInput(format!("texture decode failed: {e}")))?;
        let format = self.format_override.unwrap_or_else(|| select_format(&image, self.allow_bc7, self.allow_compression));

        let mut levels = vec![image.clone()];
        if self.generate_mips {
            let mut current = image;
            while current.width() > 1 || current.height() > 1 {
                current = generate_mip(&current, format.is_srgb());
                levels.push(current.clone());
            }
        }

        let mut sub_files = Vec::with_capacity(levels.len());
        for (level, mip) in levels.iter().enumerate() {
            let raw = pack_texel_bytes(mip, format);
            let compressed = crate::io::deflate::gdeflate_encode(&raw)?;
            sub_files.push(BuiltSubFile {
                identifier: FourCC::new([b'M', b'I', b'P', level.min(9) as u8 + b'0']),
                compression: Compression::GDeflate,
                raw_size: raw.len() as u64,
                compressed_data: compressed,
            });
        }

        let mut inline_data = Vec::with_capacity(9);
        inline_data.extend_from_slice(format.tag().as_bytes());
        inline_data.push(sub_files.len() as u8);

        *self.output.lock().expect("texture build job output poisoned") =
            Some(BuiltFile { type_tag: FourCC::from_str("TXTR"), name: self.name.clone(), inline_data, sub_files });
        Ok(())
    }
}

impl BuildJob for TextureBuildJob {
    fn progress(&self) -> (BuildResult, BuildProgress) {
        let status = self.result.load();
        let done = self.completion.is_done();
        let status = if status == BuildResult::Success && !done { BuildResult::InProgress } else { status };
        (status, BuildProgress { completed: u32::from(done), total: 1 })
    }

    fn file_info(&self) -> (BuildResult, Option<BuiltFile>) {
        self.completion.wait();
        let status = self.result.load();
        if status.is_failure() {
            return (status, None);
        }
        (BuildResult::Success, self.output.lock().expect("texture build job output poisoned").clone())
    }

    fn abort(&self) {
        self.result.fail_if_success(BuildResult::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(pixels: &[[u8; 4]], width: u32, height: u32) -> Vec<u8> {
        let mut img = image::RgbaImage::new(width, height);
        for (i, px) in pixels.iter().enumerate() {
            img.put_pixel(i as u32 % width, i as u32 / width, image::Rgba(*px));
        }
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img).write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn red_only_opaque_selects_bc4() {
        let bytes = png_bytes(&[[10, 0, 0, 255], [20, 0, 0, 255]], 2, 1);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!(select_format(&image, true, true), TextureFormat::Bc4un);
    }

    #[test]
    fn red_green_only_selects_bc5() {
        let bytes = png_bytes(&[[10, 20, 0, 255], [5, 7, 0, 255]], 2, 1);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!(select_format(&image, true, true), TextureFormat::Bc5un);
    }

    #[test]
    fn alpha_used_with_bc7_allowed_selects_bc7() {
        let bytes = png_bytes(&[[10, 20, 30, 128]], 1, 1);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!(select_format(&image, true, true), TextureFormat::Bc7srgb);
    }

    #[test]
    fn alpha_used_without_bc7_selects_bc3() {
        let bytes = png_bytes(&[[10, 20, 30, 128]], 1, 1);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!(select_format(&image, false, true), TextureFormat::Bc3srgb);
    }

    #[test]
    fn opaque_rgb_selects_bc1() {
        let bytes = png_bytes(&[[10, 20, 30, 255]], 1, 1);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!(select_format(&image, true, true), TextureFormat::Bc1srgb);
    }

    #[test]
    fn mip_generation_halves_dimensions_until_one_by_one() {
        let bytes = png_bytes(&[[10, 20, 30, 255]; 16], 4, 4);
        let scheduler = JobScheduler::new(1);
        let job = TextureBuildJob::new(&scheduler, "tex".into(), bytes, true, true, true, None);

        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        let file = file.unwrap();
        assert_eq!(file.sub_files.len(), 3); // 4x4 -> 2x2 -> 1x1
    }

    #[test]
    fn no_mips_produces_a_single_sub_file() {
        let bytes = png_bytes(&[[1, 2, 3, 255]], 1, 1);
        let scheduler = JobScheduler::new(1);
        let job = TextureBuildJob::new(&scheduler, "tex".into(), bytes, true, true, false, None);

        let (_, file) = job.file_info();
        assert_eq!(file.unwrap().sub_files.len(), 1);
    }

    #[test]
    fn explicit_format_override_bypasses_the_heuristic() {
        let bytes = png_bytes(&[[1, 2, 3, 255]], 1, 1);
        let scheduler = JobScheduler::new(1);
        let job = TextureBuildJob::new(&scheduler, "tex".into(), bytes, true, true, false, Some(TextureFormat::R8un));

        let (_, file) = job.file_info();
        let file = file.unwrap();
        assert_eq!(&file.inline_data[..4], b"R8U_");
    }
}
