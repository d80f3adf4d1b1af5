//! A library for reading studio model and sprite file formats.
//!
//! Models use version 10 of the studio format with `"IDST"` for models and textures
//! and `"IDSQ"` for external sequence group files.
//! Sprites use version 2 of the `"IDSP"` format.
//!
//! # Getting Started
//! Each format has its own module based on the name of the type representing the root of the file.
//! Only these top level types support reading from files.
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mdl = studio_lib::mdl::Mdl::from_file("scientist.mdl")?;
//! println!("{mdl:#?}");
//!
//! let spr = studio_lib::spr::Spr::from_file("glow01.spr")?;
//! println!("{spr:#?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! Each file format consists of a set of Rust types representing the fixed size records in the binary file.
//! binrw derive macros generate the reading and writing code from the type and its attribute annotations.
//! Writing is only used to construct test data and is not a supported way to author files.
//!
//! Studio files store tables as a count and an absolute offset from the start of the file.
//! Every table is checked against the length of the data before reading.
//! This rejects truncated files and prevents bogus counts from allocating huge buffers.
//! studio_lib cannot validate higher level constraints like bone parent indices being in range.
//! These checks are performed by higher level libraries like studio_model.
use std::{
    fmt::Debug,
    io::{Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
};

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, Endian, VecArgs, binrw};
use log::trace;

pub mod error;
pub mod mdl;
pub mod spr;

use error::ReadFileError;

/// A null padded string stored in a fixed size array.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct FixedStr<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedStr<N> {
    /// Create a string from `value` truncated to leave room for a null terminator.
    pub fn new(value: &str) -> Self {
        let mut bytes = [0u8; N];
        for (b, v) in bytes
            .iter_mut()
            .zip(value.bytes().take(N.saturating_sub(1)))
        {
            *b = v;
        }
        Self(bytes)
    }

    /// The bytes up to the first null with invalid UTF-8 replaced.
    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(N);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> Debug for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const N: usize> BinRead for FixedStr<N> {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        <[u8; N]>::read_options(reader, endian, args).map(Self)
    }
}

impl<const N: usize> BinWrite for FixedStr<N> {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.0.write_options(writer, endian, args)
    }
}

/// The number of items and absolute offset in bytes for a table of fixed size records.
#[binrw]
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct CountOffset {
    pub count: i32,
    pub offset: i32,
}

impl CountOffset {
    pub fn new(count: i32, offset: i32) -> Self {
        Self { count, offset }
    }
}

/// Types with a constant size in bytes when stored in a file.
pub trait FixedSize {
    const SIZE: u64;
}

macro_rules! fixed_size_impl {
    ($($ty:ty => $size:expr),*) => {
        $(
            impl FixedSize for $ty {
                const SIZE: u64 = $size;
            }
        )*
    };
}

pub(crate) use fixed_size_impl;

fixed_size_impl!(u8 => 1, i16 => 2, u16 => 2, i32 => 4, f32 => 4, [f32; 3] => 12);

fn stream_len<R: Seek>(reader: &mut R) -> BinResult<u64> {
    let saved_pos = reader.stream_position()?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(saved_pos))?;
    Ok(len)
}

/// Check that `count` items of `size` bytes starting at `offset` fit within the data.
fn check_range<R: Seek>(
    reader: &mut R,
    offset: i64,
    count: i64,
    size: u64,
) -> BinResult<(u64, usize)> {
    let pos = reader.stream_position()?;
    let len = stream_len(reader)?;

    let range = u64::try_from(offset).ok().zip(u64::try_from(count).ok());
    let end = range.and_then(|(o, c)| c.checked_mul(size).and_then(|s| s.checked_add(o)));
    match (range, end) {
        (Some((o, c)), Some(end)) if end <= len => Ok((o, c as usize)),
        _ => Err(binrw::Error::AssertFail {
            pos,
            message: format!(
                "{count} items of size {size} at offset {offset} exceed data length {len}"
            ),
        }),
    }
}

fn parse_vec<T, R>(reader: &mut R, endian: Endian, offset: u64, count: usize) -> BinResult<Vec<T>>
where
    for<'a> T: BinRead<Args<'a> = ()> + 'static,
    R: Read + Seek,
{
    let saved_pos = reader.stream_position()?;

    reader.seek(SeekFrom::Start(offset))?;
    trace!(
        "{:?}: {:?}",
        std::any::type_name::<Vec<T>>(),
        reader.stream_position()?
    );

    let values = Vec::<T>::read_options(reader, endian, VecArgs { count, inner: () })?;

    reader.seek(SeekFrom::Start(saved_pos))?;

    Ok(values)
}

/// Read `count` records at the absolute `offset` after checking the table bounds.
fn parse_table<T, R>(reader: &mut R, endian: Endian, count: i32, offset: i32) -> BinResult<Vec<T>>
where
    for<'a> T: BinRead<Args<'a> = ()> + FixedSize + 'static,
    R: Read + Seek,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    let (offset, count) = check_range(reader, offset.into(), count.into(), T::SIZE)?;
    parse_vec(reader, endian, offset, count)
}

fn parse_count_offset<T, R>(reader: &mut R, endian: Endian, table: CountOffset) -> BinResult<Vec<T>>
where
    for<'a> T: BinRead<Args<'a> = ()> + FixedSize + 'static,
    R: Read + Seek,
{
    parse_table(reader, endian, table.count, table.offset)
}

/// Check the file identifier and version at the current position without advancing the reader.
fn check_file_id<R: Read + Seek>(
    reader: &mut R,
    expected_id: &[u8; 4],
    expected_version: i32,
) -> Result<(), ReadFileError> {
    let start = reader.stream_position()?;
    let id: [u8; 4] = reader.read_le()?;
    if &id != expected_id {
        return Err(ReadFileError::FileId {
            id,
            expected: *expected_id,
        });
    }

    let version: i32 = reader.read_le()?;
    reader.seek(SeekFrom::Start(start))?;
    if version != expected_version {
        return Err(ReadFileError::VersionDiffers {
            version,
            expected: expected_version,
        });
    }
    Ok(())
}

macro_rules! file_read_impl {
    ($($type_name:path => ($id:expr, $version:expr)),*) => {
        $(
            impl $type_name {
                /// Read from `reader` after checking the file identifier and version.
                /// Offsets are relative to the start of the reader.
                pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadFileError> {
                    check_file_id(reader, $id, $version)?;
                    reader.read_le().map_err(Into::into)
                }

                /// Read from `path` using a fully buffered reader for performance.
                pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReadFileError> {
                    let mut reader = Cursor::new(std::fs::read(path)?);
                    Self::read(&mut reader)
                }

                /// Read from `bytes` using a fully buffered reader for performance.
                pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, ReadFileError> {
                    Self::read(&mut Cursor::new(bytes))
                }
            }
        )*
    };
}

file_read_impl!(
    mdl::Mdl => (b"IDST", mdl::STUDIO_VERSION),
    mdl::SequenceGroupFile => (b"IDSQ", mdl::STUDIO_VERSION),
    spr::Spr => (b"IDSP", spr::SPRITE_VERSION)
);
