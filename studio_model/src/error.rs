use studio_lib::error::ReadFileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadModelError {
    #[error("error reading model data")]
    Failure(#[source] ModelDataError),

    #[error("model version {version} differs from supported version {}", studio_lib::mdl::STUDIO_VERSION)]
    VersionDiffers { version: i32 },

    #[error("error loading required file {file:?}")]
    PostLoadFailure {
        file: String,
        #[source]
        source: Box<LoadModelError>,
    },
}

impl From<ReadFileError> for LoadModelError {
    fn from(value: ReadFileError) -> Self {
        match value {
            ReadFileError::VersionDiffers { version, .. } => Self::VersionDiffers { version },
            e => Self::Failure(ModelDataError::Read(e)),
        }
    }
}

impl From<ModelDataError> for LoadModelError {
    fn from(value: ModelDataError) -> Self {
        Self::Failure(value)
    }
}

/// Malformed or inconsistent model data.
#[derive(Debug, Error)]
pub enum ModelDataError {
    #[error("error reading file")]
    Read(#[from] ReadFileError),

    #[error("error reading animation data for sequence {sequence}")]
    Animation {
        sequence: usize,
        #[source]
        source: binrw::Error,
    },

    #[error("{kind} index {index} out of range for length {len}")]
    IndexOutOfRange {
        kind: &'static str,
        index: i64,
        len: usize,
    },

    #[error("bone {bone} has parent {parent} that does not appear before it")]
    InvalidBoneParent { bone: usize, parent: i32 },

    #[error("sequence {sequence} has {count} blends instead of 1, 2, or 4")]
    InvalidBlendCount { sequence: usize, count: i32 },

    #[error("body part {body_part} has {model_count} models with base {base}")]
    InvalidBodyPart {
        body_part: usize,
        model_count: i32,
        base: i32,
    },

    #[error("triangle command vertex references {kind} {index} out of range for length {len}")]
    InvalidTriangleVertex {
        kind: &'static str,
        index: i16,
        len: usize,
    },

    #[error("expected a separate texture file but found none")]
    MissingTextureFile,

    #[error("expected a file for sequence group {group} but found none")]
    MissingSequenceGroupFile { group: usize },
}

#[derive(Debug, Error)]
pub enum LoadSpriteError {
    #[error("error reading sprite data")]
    Failure(#[source] ReadFileError),

    #[error("sprite version {version} differs from supported version {}", studio_lib::spr::SPRITE_VERSION)]
    VersionDiffers { version: i32 },

    #[error("sprite has no frames")]
    NoFrames,

    #[error("sprite group frame {frame} has no images")]
    EmptyGroup { frame: usize },

    #[error("sprite group frame {frame} has invalid interval {interval} for image {image}")]
    InvalidInterval {
        frame: usize,
        image: usize,
        interval: f32,
    },
}

impl From<ReadFileError> for LoadSpriteError {
    fn from(value: ReadFileError) -> Self {
        match value {
            ReadFileError::VersionDiffers { version, .. } => Self::VersionDiffers { version },
            e => Self::Failure(e),
        }
    }
}

/// An out of range selection for a model instance.
/// The previous state is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("sequence {index} out of range for length {len}")]
    Sequence { index: usize, len: usize },

    #[error("controller channel {channel} out of range")]
    Controller { channel: usize },

    #[error("blender {index} out of range")]
    Blender { index: usize },

    #[error("body part {index} out of range for length {len}")]
    BodyPart { index: usize, len: usize },

    #[error("model {index} out of range for length {len} in body part {body_part}")]
    BodyPartModel {
        body_part: usize,
        index: usize,
        len: usize,
    },

    #[error("skin {index} out of range for length {len}")]
    Skin { index: usize, len: usize },
}
