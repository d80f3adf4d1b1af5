//! Sprite frame selection.
//!
//! Single frames advance at a fixed rate.
//! Group frames cycle through their images using a duration in seconds for each image.
use std::path::Path;

use log::trace;
use studio_lib::spr::{Orientation, Spr, SyncType, TextureFormat};

use crate::error::LoadSpriteError;

pub const DEFAULT_FRAMES_PER_SECOND: f32 = 10.0;

/// A fully validated sprite.
#[derive(Debug, PartialEq, Clone)]
pub struct Sprite {
    pub orientation: Orientation,
    pub texture_format: TextureFormat,
    pub bounding_radius: f32,
    /// The maximum width of any image.
    pub width: i32,
    /// The maximum height of any image.
    pub height: i32,
    pub beam_length: f32,
    pub sync_type: SyncType,
    pub palette: Vec<[u8; 3]>,
    pub frames: Vec<SpriteFrame>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SpriteFrame {
    Single(SpriteImage),
    Group(SpriteGroup),
}

#[derive(Debug, PartialEq, Clone)]
pub struct SpriteGroup {
    pub images: Vec<SpriteImage>,
    /// The display duration in seconds for each of the [images](#structfield.images).
    pub intervals: Vec<f32>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SpriteImage {
    pub origin: [i32; 2],
    pub width: u32,
    pub height: u32,
    /// Indices into [palette](struct.Sprite.html#structfield.palette) in row-major order.
    pub pixels: Vec<u8>,
}

pub fn load_sprite<P: AsRef<Path>>(path: P) -> Result<Sprite, LoadSpriteError> {
    let spr = Spr::from_file(path)?;
    Sprite::from_spr(spr)
}

impl Sprite {
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, LoadSpriteError> {
        let spr = Spr::from_bytes(bytes)?;
        Self::from_spr(spr)
    }

    pub fn from_spr(spr: Spr) -> Result<Self, LoadSpriteError> {
        if spr.frames.is_empty() {
            return Err(LoadSpriteError::NoFrames);
        }

        let frames = spr
            .frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| match frame {
                studio_lib::spr::SpriteFrame::Single(image) => {
                    Ok(SpriteFrame::Single(image.into()))
                }
                studio_lib::spr::SpriteFrame::Group(group) => {
                    sprite_group(i, group).map(SpriteFrame::Group)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!("{} sprite frames", frames.len());

        Ok(Self {
            orientation: spr.header.orientation,
            texture_format: spr.header.texture_format,
            bounding_radius: spr.header.bounding_radius,
            width: spr.header.width,
            height: spr.header.height,
            beam_length: spr.header.beam_length,
            sync_type: spr.header.sync_type,
            palette: spr.palette,
            frames,
        })
    }

    /// The index in [frames](#structfield.frames) displayed after `elapsed` seconds.
    pub fn frame_index(&self, elapsed: f32, frames_per_second: f32) -> usize {
        let frame = (elapsed * frames_per_second).floor();
        if !frame.is_finite() || self.frames.is_empty() {
            return 0;
        }
        (frame as i64).rem_euclid(self.frames.len() as i64) as usize
    }

    /// The image displayed after `elapsed` seconds including images from group frames.
    pub fn select_frame(&self, elapsed: f32, frames_per_second: f32) -> Option<&SpriteImage> {
        match self.frames.get(self.frame_index(elapsed, frames_per_second))? {
            SpriteFrame::Single(image) => Some(image),
            SpriteFrame::Group(group) => group.images.get(group.image_index(elapsed)),
        }
    }
}

impl SpriteGroup {
    /// The total duration in seconds to display all images.
    pub fn duration(&self) -> f32 {
        self.intervals.iter().sum()
    }

    /// The index in [images](#structfield.images) displayed after `elapsed` seconds.
    pub fn image_index(&self, elapsed: f32) -> usize {
        let duration = self.duration();
        if !(duration > 0.0) || !elapsed.is_finite() {
            return 0;
        }

        let time = elapsed.rem_euclid(duration);
        let mut end = 0.0;
        for (i, interval) in self.intervals.iter().enumerate() {
            end += interval;
            if end > time {
                return i;
            }
        }
        0
    }
}

impl From<studio_lib::spr::SpriteImage> for SpriteImage {
    fn from(value: studio_lib::spr::SpriteImage) -> Self {
        Self {
            origin: value.origin,
            // Negative sizes are rejected when reading.
            width: value.width.max(0) as u32,
            height: value.height.max(0) as u32,
            pixels: value.pixels,
        }
    }
}

fn sprite_group(
    frame: usize,
    group: studio_lib::spr::SpriteGroup,
) -> Result<SpriteGroup, LoadSpriteError> {
    if group.images.is_empty() {
        return Err(LoadSpriteError::EmptyGroup { frame });
    }

    if let Some((image, interval)) = group
        .intervals
        .iter()
        .enumerate()
        .find(|(_, i)| !(i.is_finite() && **i > 0.0))
    {
        return Err(LoadSpriteError::InvalidInterval {
            frame,
            image,
            interval: *interval,
        });
    }

    Ok(SpriteGroup {
        images: group.images.into_iter().map(Into::into).collect(),
        intervals: group.intervals,
    })
}
