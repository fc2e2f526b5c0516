//! Fixed-point YCbCr conversion tables, built once per process.

use std::sync::OnceLock;

const SCALE_BITS: u32 = 16;
const ONE_HALF: i32 = 1 << (SCALE_BITS - 1);

// ITU-R BT.601 full-range coefficients scaled by 2^16
const Y_R: i32 = 19595;
const Y_G: i32 = 38470;
const Y_B: i32 = 7471;
const CB_R: i32 = -11059;
const CB_G: i32 = -21709;
const CB_B: i32 = 32768;
const CR_R: i32 = 32768;
const CR_G: i32 = -27439;
const CR_B: i32 = -5329;

const R_CR: i32 = 91881;
const G_CB: i32 = -22554;
const G_CR: i32 = -46802;
const B_CB: i32 = 116130;

/// Per-chroma-value contributions used by the YCbCr to RGB direction.
pub(crate) struct ColorTables {
    cr_to_r: [i32; 256],
    cb_to_b: [i32; 256],
    cr_to_g: [i32; 256],
    cb_to_g: [i32; 256],
}

impl ColorTables {
    fn build() -> Self {
        let mut tables = Self {
            cr_to_r: [0; 256],
            cb_to_b: [0; 256],
            cr_to_g: [0; 256],
            cb_to_g: [0; 256],
        };
        for i in 0..256 {
            let c = i as i32 - 128;
            tables.cr_to_r[i] = (R_CR * c + ONE_HALF) >> SCALE_BITS;
            tables.cb_to_b[i] = (B_CB * c + ONE_HALF) >> SCALE_BITS;
            tables.cr_to_g[i] = G_CR * c;
            tables.cb_to_g[i] = G_CB * c;
        }
        tables
    }

    /// Convert one YCbCr sample triple to RGB.
    #[inline]
    pub(crate) fn ycbcr_to_rgb(&self, y: u8, cb: u8, cr: u8) -> [u8; 3] {
        let y = y as i32;
        let (cb, cr) = (cb as usize, cr as usize);
        let r = y + self.cr_to_r[cr];
        let g = y + ((self.cb_to_g[cb] + self.cr_to_g[cr] + ONE_HALF) >> SCALE_BITS);
        let b = y + self.cb_to_b[cb];
        [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
    }
}

static TABLES: OnceLock<ColorTables> = OnceLock::new();

/// Shared conversion tables, built on first use.
pub(crate) fn color_tables() -> &'static ColorTables {
    TABLES.get_or_init(ColorTables::build)
}

/// Build the conversion tables ahead of the first conversion.
///
/// Calling this more than once is harmless; the tables are built once per process.
pub fn init_tables() {
    color_tables();
}

/// Luminance of an RGB triple.
#[inline]
pub(crate) fn luma(rgb: [u8; 3]) -> i32 {
    let [r, g, b] = rgb.map(i32::from);
    (Y_R * r + Y_G * g + Y_B * b + ONE_HALF) >> SCALE_BITS
}

/// Blue-difference chroma of an RGB triple, offset to 0..=255.
#[inline]
pub(crate) fn chroma_blue(rgb: [u8; 3]) -> i32 {
    let [r, g, b] = rgb.map(i32::from);
    ((CB_R * r + CB_G * g + CB_B * b + ONE_HALF) >> SCALE_BITS) + 128
}

/// Red-difference chroma of an RGB triple, offset to 0..=255.
#[inline]
pub(crate) fn chroma_red(rgb: [u8; 3]) -> i32 {
    let [r, g, b] = rgb.map(i32::from);
    ((CR_R * r + CR_G * g + CR_B * b + ONE_HALF) >> SCALE_BITS) + 128
}

#[inline]
pub(crate) fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
