//! Sprites in `.spr` files.
//!
//! Sprites are camera facing billboards with one or more 8-bit paletted frames.
use std::io::{Read, Seek, SeekFrom};

use binrw::{BinRead, BinResult, BinWrite, Endian, binrw};

use crate::{check_range, parse_vec};

pub const SPRITE_VERSION: i32 = 2;

#[binrw]
#[derive(Debug, PartialEq, Clone)]
pub struct Spr {
    pub header: SpriteHeader,

    #[br(temp)]
    #[bw(calc = palette.len() as u16)]
    palette_count: u16,

    #[br(count = palette_count)]
    pub palette: Vec<[u8; 3]>,

    #[br(count = header.frame_count as usize)]
    pub frames: Vec<SpriteFrame>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone)]
pub struct SpriteHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub orientation: Orientation,
    pub texture_format: TextureFormat,
    pub bounding_radius: f32,
    pub width: i32,
    pub height: i32,
    #[br(assert(frame_count >= 0, "negative frame count {}", frame_count))]
    pub frame_count: i32,
    pub beam_length: f32,
    pub sync_type: SyncType,
}

/// How the sprite is oriented relative to the viewer.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[brw(repr(i32))]
pub enum Orientation {
    ParallelUpright = 0,
    FacingUpright = 1,
    Parallel = 2,
    Oriented = 3,
    ParallelOriented = 4,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[brw(repr(i32))]
pub enum TextureFormat {
    Normal = 0,
    Additive = 1,
    IndexAlpha = 2,
    AlphaTest = 3,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[brw(repr(i32))]
pub enum SyncType {
    Sync = 0,
    Random = 1,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone)]
pub enum SpriteFrame {
    #[brw(magic(0i32))]
    Single(SpriteImage),

    #[brw(magic(1i32))]
    Group(SpriteGroup),
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone)]
pub struct SpriteImage {
    pub origin: [i32; 2],
    pub width: i32,
    pub height: i32,
    /// Palette indices in row-major order.
    #[br(parse_with = parse_pixels, args(width, height))]
    pub pixels: Vec<u8>,
}

/// Frames displayed in sequence with a duration in seconds for each frame.
#[binrw]
#[derive(Debug, PartialEq, Clone)]
pub struct SpriteGroup {
    #[br(temp, assert(count >= 0, "negative group frame count {}", count))]
    #[bw(calc = images.len() as i32)]
    count: i32,

    #[br(count = count as usize)]
    pub intervals: Vec<f32>,

    #[br(count = count as usize)]
    pub images: Vec<SpriteImage>,
}

impl SpriteGroup {
    pub fn new(intervals: Vec<f32>, images: Vec<SpriteImage>) -> Self {
        Self { intervals, images }
    }
}

fn parse_pixels<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    (width, height): (i32, i32),
) -> BinResult<Vec<u8>> {
    let pos = reader.stream_position()?;
    if width < 0 || height < 0 {
        return Err(binrw::Error::AssertFail {
            pos,
            message: format!("invalid sprite image size {width}x{height}"),
        });
    }
    let pixel_count = i64::from(width) * i64::from(height);
    let (offset, count) = check_range(reader, pos as i64, pixel_count, 1)?;
    let pixels = parse_vec(reader, endian, offset, count)?;
    reader.seek(SeekFrom::Start(offset + count as u64))?;
    Ok(pixels)
}
