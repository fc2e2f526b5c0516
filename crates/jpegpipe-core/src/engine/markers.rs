//! Incremental JPEG marker walker.
//!
//! Input arrives in arbitrary chunks, so the walker keeps just enough state
//! to resume mid-segment. It extracts the frame header and reports exactly
//! where the end-of-image marker ends, which is how the engine knows how much
//! of its last input chunk it actually consumed.

use super::EngineError;
use crate::types::{ChromaSubsampling, ColorSpace, FrameInfo};

const M_SOI: u8 = 0xD8;
const M_EOI: u8 = 0xD9;
const M_SOS: u8 = 0xDA;
const M_TEM: u8 = 0x01;
const M_RST0: u8 = 0xD0;
const M_RST7: u8 = 0xD7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting the two start-of-image bytes.
    Start { seen: u8 },
    /// Expecting `0xFF` then a marker code.
    Marker { seen_ff: bool },
    /// Reading the two-byte segment length.
    Length { marker: u8, high: Option<u8> },
    /// Inside a segment payload.
    Segment { marker: u8, remaining: usize },
    /// Inside entropy-coded scan data.
    Entropy { seen_ff: bool },
    /// End of image reached.
    Done,
}

/// Walks marker segments across chunk boundaries.
#[derive(Debug)]
pub(crate) struct MarkerTracker {
    state: State,
    frame: Option<FrameInfo>,
    payload: Vec<u8>,
}

impl Default for MarkerTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Start { seen: 0 },
            frame: None,
            payload: Vec::new(),
        }
    }

    /// Frame parameters, once the frame header has been read.
    pub(crate) fn frame(&self) -> Option<&FrameInfo> {
        self.frame.as_ref()
    }

    /// Walk `data`, returning the number of bytes up to and including the
    /// end-of-image marker if it lies within this chunk.
    pub(crate) fn feed(&mut self, data: &[u8]) -> Result<Option<usize>, EngineError> {
        for (i, &byte) in data.iter().enumerate() {
            self.state = self.step(byte)?;
            if self.state == State::Done {
                return Ok(Some(i + 1));
            }
        }
        Ok(None)
    }

    fn step(&mut self, byte: u8) -> Result<State, EngineError> {
        let next = match self.state {
            State::Start { seen: 0 } if byte == 0xFF => State::Start { seen: 1 },
            State::Start { seen: 1 } if byte == M_SOI => State::Marker { seen_ff: false },
            State::Start { .. } => {
                return Err(corrupt("missing start-of-image marker"));
            }

            State::Marker { seen_ff: false } => {
                if byte != 0xFF {
                    return Err(corrupt("expected marker"));
                }
                State::Marker { seen_ff: true }
            }
            State::Marker { seen_ff: true } => self.marker(byte)?,

            State::Length { marker, high: None } => State::Length {
                marker,
                high: Some(byte),
            },
            State::Length {
                marker,
                high: Some(high),
            } => {
                let len = u16::from_be_bytes([high, byte]) as usize;
                if len < 2 {
                    return Err(corrupt("segment length below 2"));
                }
                self.payload.clear();
                let remaining = len - 2;
                if remaining == 0 {
                    self.end_segment(marker)?
                } else {
                    State::Segment { marker, remaining }
                }
            }

            State::Segment { marker, remaining } => {
                if is_frame_header(marker) {
                    self.payload.push(byte);
                }
                if remaining == 1 {
                    self.end_segment(marker)?
                } else {
                    State::Segment {
                        marker,
                        remaining: remaining - 1,
                    }
                }
            }

            State::Entropy { seen_ff: false } => State::Entropy {
                seen_ff: byte == 0xFF,
            },
            State::Entropy { seen_ff: true } => match byte {
                // Stuffed zero or restart marker: still scan data
                0x00 | M_RST0..=M_RST7 => State::Entropy { seen_ff: false },
                0xFF => State::Entropy { seen_ff: true },
                _ => self.marker(byte)?,
            },

            State::Done => State::Done,
        };
        Ok(next)
    }

    /// Handle a marker code that follows `0xFF` outside a segment.
    fn marker(&mut self, code: u8) -> Result<State, EngineError> {
        let state = match code {
            // Fill byte before the real marker
            0xFF => State::Marker { seen_ff: true },
            M_EOI => State::Done,
            M_SOI | M_TEM | M_RST0..=M_RST7 => State::Marker { seen_ff: false },
            0x00 => return Err(corrupt("stuffed byte outside scan data")),
            code if is_unsupported_frame(code) => {
                return Err(EngineError::Unsupported(
                    "lossless, hierarchical or arithmetic-coded frame",
                ))
            }
            code => State::Length {
                marker: code,
                high: None,
            },
        };
        Ok(state)
    }

    fn end_segment(&mut self, marker: u8) -> Result<State, EngineError> {
        if is_frame_header(marker) {
            if self.frame.is_some() {
                return Err(corrupt("multiple frame headers"));
            }
            self.frame = Some(parse_frame_header(&self.payload)?);
        }
        if marker == M_SOS {
            if self.frame.is_none() {
                return Err(corrupt("scan before frame header"));
            }
            return Ok(State::Entropy { seen_ff: false });
        }
        Ok(State::Marker { seen_ff: false })
    }
}

/// Baseline, extended sequential and progressive Huffman frames.
fn is_frame_header(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xC2)
}

fn is_unsupported_frame(marker: u8) -> bool {
    matches!(marker, 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

fn corrupt(msg: &str) -> EngineError {
    EngineError::CorruptStream(msg.to_string())
}

/// Parse an SOF payload: precision, height, width, then per-component
/// id, sampling factors and quantization table.
fn parse_frame_header(p: &[u8]) -> Result<FrameInfo, EngineError> {
    if p.len() < 6 {
        return Err(corrupt("frame header too short"));
    }
    if p[0] != 8 {
        return Err(EngineError::Unsupported("sample precision other than 8 bits"));
    }
    let height = u16::from_be_bytes([p[1], p[2]]) as u32;
    let width = u16::from_be_bytes([p[3], p[4]]) as u32;
    let components = p[5] as usize;
    if width == 0 || height == 0 {
        return Err(corrupt("zero image dimension"));
    }
    if p.len() < 6 + components * 3 {
        return Err(corrupt("frame header truncated"));
    }
    let factors = |c: usize| {
        let hv = p[6 + c * 3 + 1];
        (hv >> 4, hv & 0x0F)
    };

    let (color_space, subsampling) = match components {
        1 => (ColorSpace::Grayscale, ChromaSubsampling::S444),
        3 => {
            let (h, v) = factors(0);
            if factors(1) != (1, 1) || factors(2) != (1, 1) {
                return Err(EngineError::Unsupported("chroma sampling factors"));
            }
            let sub = ChromaSubsampling::from_luma_factors(h, v)
                .ok_or(EngineError::Unsupported("luma sampling factors"))?;
            (ColorSpace::YCbCr, sub)
        }
        4 => (ColorSpace::Cmyk, ChromaSubsampling::S444),
        _ => return Err(EngineError::Unsupported("component count")),
    };

    Ok(FrameInfo::new(width, height, color_space, subsampling, 0))
}
