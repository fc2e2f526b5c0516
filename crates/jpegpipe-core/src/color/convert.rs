//! Per-unit converters between pixel rasters and MCU sample blocks.

use super::layout::McuLayout;
use super::tables::{chroma_blue, chroma_red, clamp_u8, color_tables, luma};
use super::ColorError;
use crate::config::BLOCK_SIZE;
use crate::raster::PixelFormat;
use crate::types::FrameInfo;

/// Outcome of one conversion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Converted {
    /// Whole units converted.
    pub units: usize,
    /// Sample bytes produced (encode) or consumed (decode).
    pub bytes: usize,
}

/// Converts whole MCUs starting at an absolute unit index.
///
/// `len` bounds the input the converter may consume: source pixel bytes
/// when encoding, sample bytes when decoding. Partial units are never
/// converted, and the converter stops at the last unit of the image.
pub trait UnitConverter {
    /// Convert units starting at `unit_index` from `src` into `dst`.
    fn convert(&self, src: &[u8], dst: &mut [u8], unit_index: usize, len: usize) -> Converted;

    /// Units covering the whole image.
    fn unit_total(&self) -> usize;
}

/// Sample bytes of one chroma (or ink) block in an MCU.
const PLANE: usize = BLOCK_SIZE;

/// Pixel raster to MCU samples, used when encoding.
#[derive(Debug, Clone, Copy)]
pub struct PixelsToSamples {
    layout: McuLayout,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl PixelsToSamples {
    pub fn new(layout: McuLayout, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            layout,
            format,
            width,
            height,
        }
    }

    /// RGB of the pixel at (x, y), clamped to the image edge.
    #[inline]
    fn pixel(&self, src: &[u8], x: u32, y: u32) -> [u8; 3] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        self.format.read_rgb(src, y * self.width as usize + x)
    }

    fn convert_unit(&self, src: &[u8], out: &mut [u8], unit: usize) {
        let layout = self.layout;
        let across = layout.units_across(self.width);
        let x0 = (unit % across) as u32 * layout.width();
        let y0 = (unit / across) as u32 * layout.height();

        if layout == McuLayout::Cmyk {
            for j in 0..8u32 {
                for i in 0..8u32 {
                    let [r, g, b] = self.pixel(src, x0 + i, y0 + j);
                    let k = (j * 8 + i) as usize;
                    out[k] = 255 - r;
                    out[PLANE + k] = 255 - g;
                    out[2 * PLANE + k] = 255 - b;
                    out[3 * PLANE + k] = 0;
                }
            }
            return;
        }

        let blocks_across = layout.width() / 8;
        for block in 0..layout.luma_blocks() {
            let bx = x0 + (block as u32 % blocks_across) * 8;
            let by = y0 + (block as u32 / blocks_across) * 8;
            let base = block * BLOCK_SIZE;
            for j in 0..8u32 {
                for i in 0..8u32 {
                    let rgb = self.pixel(src, bx + i, by + j);
                    out[base + (j * 8 + i) as usize] = clamp_u8(luma(rgb));
                }
            }
        }

        if !layout.has_chroma() {
            return;
        }

        // Each chroma sample averages the fx x fy pixels it covers
        let fx = layout.width() / 8;
        let fy = layout.height() / 8;
        let count = (fx * fy) as i32;
        let cb_base = layout.luma_blocks() * BLOCK_SIZE;
        let cr_base = cb_base + PLANE;
        for j in 0..8u32 {
            for i in 0..8u32 {
                let (mut cb, mut cr) = (0i32, 0i32);
                for dy in 0..fy {
                    for dx in 0..fx {
                        let rgb = self.pixel(src, x0 + i * fx + dx, y0 + j * fy + dy);
                        cb += chroma_blue(rgb);
                        cr += chroma_red(rgb);
                    }
                }
                let k = (j * 8 + i) as usize;
                out[cb_base + k] = clamp_u8((cb + count / 2) / count);
                out[cr_base + k] = clamp_u8((cr + count / 2) / count);
            }
        }
    }
}

impl UnitConverter for PixelsToSamples {
    fn convert(&self, src: &[u8], dst: &mut [u8], unit_index: usize, len: usize) -> Converted {
        let unit_bytes = self.layout.pixels() * self.format.bytes_per_pixel();
        let sample_size = self.layout.sample_size();
        if unit_bytes == 0 {
            return Converted::default();
        }

        let units = (len / unit_bytes)
            .min(self.unit_total().saturating_sub(unit_index))
            .min(dst.len() / sample_size);

        for (n, out) in dst.chunks_exact_mut(sample_size).take(units).enumerate() {
            self.convert_unit(src, out, unit_index + n);
        }

        Converted {
            units,
            bytes: units * sample_size,
        }
    }

    fn unit_total(&self) -> usize {
        self.layout.unit_count(self.width, self.height)
    }
}

/// MCU samples to pixel raster, used when decoding.
#[derive(Debug, Clone, Copy)]
pub struct SamplesToPixels {
    layout: McuLayout,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl SamplesToPixels {
    pub fn new(layout: McuLayout, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            layout,
            format,
            width,
            height,
        }
    }

    fn convert_unit(&self, samples: &[u8], dst: &mut [u8], unit: usize) {
        let layout = self.layout;
        let tables = color_tables();
        let across = layout.units_across(self.width);
        let x0 = (unit % across) as u32 * layout.width();
        let y0 = (unit / across) as u32 * layout.height();
        let blocks_across = (layout.width() / 8) as usize;
        let fx = layout.width() / 8;
        let fy = layout.height() / 8;
        let cb_base = layout.luma_blocks() * BLOCK_SIZE;
        let cr_base = cb_base + PLANE;

        for py in 0..layout.height() {
            let y = y0 + py;
            if y >= self.height {
                break;
            }
            for px in 0..layout.width() {
                let x = x0 + px;
                // Edge MCUs carry padding beyond the image
                if x >= self.width {
                    break;
                }
                let index = y as usize * self.width as usize + x as usize;

                let (bx, by) = ((px / 8) as usize, (py / 8) as usize);
                let within = ((py % 8) * 8 + px % 8) as usize;
                let luma_sample = samples[(by * blocks_across + bx) * BLOCK_SIZE + within];

                let rgb = match layout {
                    McuLayout::Grayscale => [luma_sample; 3],
                    McuLayout::Cmyk => {
                        let k = samples[3 * PLANE + within] as u32;
                        let ink = |c: u8| ((255 - c as u32) * (255 - k) / 255) as u8;
                        [
                            ink(samples[within]),
                            ink(samples[PLANE + within]),
                            ink(samples[2 * PLANE + within]),
                        ]
                    }
                    McuLayout::YCbCr420 | McuLayout::YCbCr422 | McuLayout::YCbCr444 => {
                        let chroma = ((py / fy) * 8 + px / fx) as usize;
                        tables.ycbcr_to_rgb(
                            luma_sample,
                            samples[cb_base + chroma],
                            samples[cr_base + chroma],
                        )
                    }
                };

                if self.format == PixelFormat::Grayscale {
                    let v = match layout {
                        McuLayout::Grayscale => luma_sample,
                        _ => clamp_u8(luma(rgb)),
                    };
                    dst[index] = v;
                } else {
                    self.format.write_rgb(dst, index, rgb);
                }
            }
        }
    }
}

impl UnitConverter for SamplesToPixels {
    fn convert(&self, src: &[u8], dst: &mut [u8], unit_index: usize, len: usize) -> Converted {
        let sample_size = self.layout.sample_size();
        let units = (len.min(src.len()) / sample_size)
            .min(self.unit_total().saturating_sub(unit_index));

        for (n, samples) in src.chunks_exact(sample_size).take(units).enumerate() {
            self.convert_unit(samples, dst, unit_index + n);
        }

        Converted {
            units,
            bytes: units * sample_size,
        }
    }

    fn unit_total(&self) -> usize {
        self.layout.unit_count(self.width, self.height)
    }
}

/// A converter chosen for one operation.
pub struct Selection {
    /// Layout of the engine's sample blocks.
    pub layout: McuLayout,
    /// Units covering the whole image.
    pub unit_total: usize,
    /// Bytes handed to the converter per conversion step.
    pub stride: usize,
    /// The per-unit conversion routine.
    pub converter: Box<dyn UnitConverter>,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("layout", &self.layout)
            .field("unit_total", &self.unit_total)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

/// Select the sample-to-pixel converter for a stream described by `info`.
///
/// Grayscale streams decode to [`PixelFormat::Grayscale`], everything else to
/// [`PixelFormat::Rgb565`].
pub fn select_decode(info: &FrameInfo) -> Result<Selection, ColorError> {
    if info.width == 0 || info.height == 0 {
        return Err(ColorError::EmptyImage);
    }
    let layout = McuLayout::from_frame(info);
    let format = PixelFormat::for_color_space(info.color_space);
    let converter = SamplesToPixels::new(layout, format, info.width, info.height);
    Ok(Selection {
        layout,
        unit_total: converter.unit_total(),
        stride: layout.sample_size(),
        converter: Box::new(converter),
    })
}

/// Select the pixel-to-sample converter for encoding `format` pixels as `info`.
pub fn select_encode(info: &FrameInfo, format: PixelFormat) -> Result<Selection, ColorError> {
    if !format.is_byte_aligned() {
        return Err(ColorError::UnsupportedFormat(format));
    }
    if info.width == 0 || info.height == 0 {
        return Err(ColorError::EmptyImage);
    }
    let layout = McuLayout::from_frame(info);
    let converter = PixelsToSamples::new(layout, format, info.width, info.height);
    Ok(Selection {
        layout,
        unit_total: converter.unit_total(),
        stride: layout.source_stride_for(format),
        converter: Box::new(converter),
    })
}
