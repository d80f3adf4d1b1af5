use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadFileError {
    #[error("error reading data: {0}")]
    Io(#[from] std::io::Error),

    #[error("error reading data: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("unexpected file identifier {id:?}, expected {expected:?}")]
    FileId { id: [u8; 4], expected: [u8; 4] },

    #[error("file version {version} differs from supported version {expected}")]
    VersionDiffers { version: i32, expected: i32 },
}
