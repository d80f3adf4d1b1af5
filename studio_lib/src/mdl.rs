//! Studio models in `.mdl` files.
//!
//! # File Paths
//! A model may reference additional files stored next to the main file.
//!
//! | File | Identifier | Contents |
//! | --- | --- | --- |
//! | `name.mdl` | `"IDST"` | bones, sequences, body parts, and optionally textures |
//! | `nameT.mdl` | `"IDST"` | textures and skin families when the main file has no textures |
//! | `name01.mdl` | `"IDSQ"` | animation data for sequence group 1 |
//!
//! All offsets are absolute from the start of the file containing them.
use std::{
    collections::BTreeMap,
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};

use bilge::prelude::*;
use binrw::{BinRead, BinResult, BinWrite, Endian};
use log::trace;

use crate::{
    CountOffset, FixedSize, FixedStr, check_range, fixed_size_impl, parse_count_offset,
    parse_table, parse_vec,
};

pub const STUDIO_VERSION: i32 = 10;

/// The number of animated channels for each bone.
/// Channels 0 to 2 are position and 3 to 5 are Euler angles in radians.
pub const CHANNEL_COUNT: usize = 6;

/// The root of a studio model or texture file.
#[derive(Debug, PartialEq, Clone)]
pub struct Mdl {
    pub header: StudioHeader,
    pub bones: Vec<Bone>,
    pub bone_controllers: Vec<BoneController>,
    pub hitboxes: Vec<Hitbox>,
    pub sequences: Vec<Sequence>,
    pub sequence_groups: Vec<SequenceGroup>,
    pub textures: Vec<Texture>,
    /// Texture indices for `[family][skin reference]`.
    pub skin_families: Vec<Vec<i16>>,
    pub body_parts: Vec<BodyPart>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct StudioHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub name: FixedStr<64>,
    pub length: i32,

    pub eye_position: [f32; 3],
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub bbmin: [f32; 3],
    pub bbmax: [f32; 3],

    pub flags: i32,

    pub bones: CountOffset,
    pub bone_controllers: CountOffset,
    pub hitboxes: CountOffset,
    pub sequences: CountOffset,
    pub sequence_groups: CountOffset,

    pub textures: CountOffset,
    pub texture_data_offset: i32,

    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_offset: i32,

    pub body_parts: CountOffset,
    pub attachments: CountOffset,

    // Unused by the runtime.
    pub sounds: CountOffset,
    pub sound_groups: CountOffset,

    pub transitions: CountOffset,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct Bone {
    pub name: FixedStr<32>,
    /// The index of the parent bone or `-1` for root bones.
    pub parent: i32,
    pub flags: i32,
    /// The bone controller index for each channel or `-1` if not controlled.
    pub bone_controllers: [i32; CHANNEL_COUNT],
    /// The rest value for each channel.
    pub values: [f32; CHANNEL_COUNT],
    /// The scale applied to compressed animation values for each channel.
    pub scales: [f32; CHANNEL_COUNT],
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct BoneController {
    pub bone: i32,
    pub controller_type: MotionFlags,
    pub start: f32,
    pub end: f32,
    pub rest: i32,
    /// The input channel from `0` to `3` or `4` for the mouth.
    pub index: i32,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct Hitbox {
    pub bone: i32,
    pub group: i32,
    pub bbmin: [f32; 3],
    pub bbmax: [f32; 3],
}

#[derive(Debug, PartialEq, Clone)]
pub struct Sequence {
    pub desc: SequenceDesc,
    pub events: Vec<Event>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct SequenceDesc {
    pub label: FixedStr<32>,
    pub fps: f32,
    pub flags: SequenceFlags,

    pub activity: i32,
    pub activity_weight: i32,

    pub events: CountOffset,

    pub frame_count: i32,

    pub pivots: CountOffset,

    pub motion_type: MotionFlags,
    pub motion_bone: i32,
    pub linear_movement: [f32; 3],
    pub auto_move_position_offset: i32,
    pub auto_move_angle_offset: i32,

    pub bbmin: [f32; 3],
    pub bbmax: [f32; 3],

    pub blend_count: i32,
    /// Offset of the [AnimChannelOffsets] for each blend and bone
    /// in the file for [sequence_group](#structfield.sequence_group).
    pub animation_offset: i32,

    pub blend_types: [MotionFlags; 2],
    pub blend_start: [f32; 2],
    pub blend_end: [f32; 2],
    pub blend_parent: i32,

    pub sequence_group: i32,

    pub entry_node: i32,
    pub exit_node: i32,
    pub node_flags: i32,

    pub next_sequence: i32,
}

#[bitsize(32)]
#[derive(DebugBits, DefaultBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = u32::into)]
#[bw(map = |&x| u32::from(x))]
pub struct SequenceFlags {
    pub looping: bool,
    pub unk: u31,
}

/// Axis flags for bone controllers, blend parameters, and sequence motion.
#[bitsize(32)]
#[derive(DebugBits, DefaultBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = u32::into)]
#[bw(map = |&x| u32::from(x))]
pub struct MotionFlags {
    pub x: bool,
    pub y: bool,
    pub z: bool,
    pub xr: bool,
    pub yr: bool,
    pub zr: bool,
    pub lx: bool,
    pub ly: bool,
    pub lz: bool,
    pub ax: bool,
    pub ay: bool,
    pub az: bool,
    pub axr: bool,
    pub ayr: bool,
    pub azr: bool,
    /// Controller values wrap around a full revolution.
    pub rloop: bool,
    pub unk: u16,
}

impl MotionFlags {
    /// `true` if any of the rotation axes are set.
    pub fn is_rotation(&self) -> bool {
        self.xr() || self.yr() || self.zr()
    }

    /// `true` if any of the translation axes are set.
    pub fn is_translation(&self) -> bool {
        self.x() || self.y() || self.z()
    }
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct Event {
    pub frame: i32,
    pub event: i32,
    pub event_type: i32,
    pub options: FixedStr<64>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct SequenceGroup {
    pub label: FixedStr<32>,
    pub name: FixedStr<64>,
    pub unused1: i32,
    pub unused2: i32,
}

/// The header for a sequence group file.
/// Sequence animation offsets are relative to the start of this file.
#[derive(Debug, PartialEq, Clone)]
pub struct SequenceGroupFile {
    pub header: SequenceGroupHeader,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct SequenceGroupHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub name: FixedStr<64>,
    pub length: i32,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct TextureHeader {
    pub name: FixedStr<64>,
    pub flags: TextureFlags,
    pub width: i32,
    pub height: i32,
    /// Offset of `width * height` palette indices followed by a 256 color palette.
    pub data_offset: i32,
}

#[bitsize(32)]
#[derive(DebugBits, DefaultBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = u32::into)]
#[bw(map = |&x| u32::from(x))]
pub struct TextureFlags {
    /// Use constant lighting for all normals.
    pub flat_shade: bool,
    /// Generate texture coordinates from the view direction.
    pub chrome: bool,
    pub fullbright: bool,
    pub no_mips: bool,
    pub alpha: bool,
    pub additive: bool,
    /// Palette index 255 is transparent.
    pub masked: bool,
    pub unk: u25,
}

/// An 8-bit paletted texture.
#[derive(Debug, PartialEq, Clone)]
pub struct Texture {
    pub header: TextureHeader,
    /// Palette indices in row-major order.
    pub pixels: Vec<u8>,
    pub palette: Vec<[u8; 3]>,
}

pub const PALETTE_SIZE: usize = 256;

#[derive(Debug, PartialEq, Clone)]
pub struct BodyPart {
    pub header: BodyPartHeader,
    pub models: Vec<Model>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct BodyPartHeader {
    pub name: FixedStr<64>,
    pub model_count: i32,
    /// The multiplier for this body part's digit in the combined body value.
    pub base: i32,
    pub model_offset: i32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Model {
    pub header: ModelHeader,
    pub meshes: Vec<Mesh>,
    /// The bone index for each vertex.
    pub vertex_bones: Vec<u8>,
    pub vertices: Vec<[f32; 3]>,
    /// The bone index for each normal.
    pub normal_bones: Vec<u8>,
    pub normals: Vec<[f32; 3]>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct ModelHeader {
    pub name: FixedStr<64>,
    pub model_type: i32,
    pub bounding_radius: f32,
    pub meshes: CountOffset,
    pub vertex_count: i32,
    pub vertex_info_offset: i32,
    pub vertex_offset: i32,
    pub normal_count: i32,
    pub normal_info_offset: i32,
    pub normal_offset: i32,
    // Unused by the runtime.
    pub groups: CountOffset,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Mesh {
    pub header: MeshHeader,
    pub commands: Vec<TriangleCommand>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct MeshHeader {
    pub triangle_count: i32,
    /// Offset of the triangle commands terminated by a zero length command.
    pub triangle_offset: i32,
    pub skin_reference: i32,
    pub normal_count: i32,
    pub normal_offset: i32,
}

/// A triangle strip or fan.
#[derive(Debug, PartialEq, Clone)]
pub enum TriangleCommand {
    Strip(Vec<TriangleVertex>),
    Fan(Vec<TriangleVertex>),
}

impl TriangleCommand {
    pub fn vertices(&self) -> &[TriangleVertex] {
        match self {
            TriangleCommand::Strip(v) => v,
            TriangleCommand::Fan(v) => v,
        }
    }
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Default)]
pub struct TriangleVertex {
    pub vertex_index: i16,
    pub normal_index: i16,
    /// Texture coordinates in pixels.
    pub s: i16,
    pub t: i16,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Clone, Default)]
pub struct Attachment {
    pub name: FixedStr<32>,
    pub attachment_type: i32,
    pub bone: i32,
    pub origin: [f32; 3],
    pub vectors: [[f32; 3]; 3],
}

/// The offset of each channel's run-length encoded values relative to the start of this record
/// or `0` if the channel is not animated.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Default)]
pub struct AnimChannelOffsets(pub [u16; CHANNEL_COUNT]);

/// An entry in a run-length encoded stream.
/// Headers store `valid` and `total` bytes while values store an `i16`.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Default)]
pub struct AnimValue(pub [u8; 2]);

impl AnimValue {
    pub fn header(valid: u8, total: u8) -> Self {
        Self([valid, total])
    }

    pub fn value(value: i16) -> Self {
        Self(value.to_le_bytes())
    }

    /// The number of literal values following this header.
    pub fn valid(&self) -> u8 {
        self.0[0]
    }

    /// The number of frames covered by this run.
    pub fn total(&self) -> u8 {
        self.0[1]
    }

    pub fn as_i16(&self) -> i16 {
        i16::from_le_bytes(self.0)
    }
}

/// A run covering `total` frames.
/// The last of the `values` is held for frames after the literal values.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AnimRun {
    pub total: u8,
    pub values: Vec<i16>,
}

/// Decoded runs for each channel of a single bone.
///
/// Channels pointing to the same data share the same runs.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct BoneAnimation {
    pub channels: [Option<Arc<[AnimRun]>>; CHANNEL_COUNT],
}

/// Run chains already decoded from a single buffer.
///
/// Every run takes at least 4 bytes, so decoding more than `len / 4` runs
/// means chains overlap and reading fails instead.
#[derive(Debug, Clone)]
pub struct AnimationCache {
    chains: BTreeMap<(u64, usize), Arc<[AnimRun]>>,
    remaining_runs: usize,
}

impl AnimationCache {
    /// A cache for a buffer with `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            chains: BTreeMap::new(),
            remaining_runs: len / (AnimValue::SIZE as usize * 2),
        }
    }
}

fixed_size_impl!(
    StudioHeader => 244,
    Bone => 112,
    BoneController => 24,
    Hitbox => 32,
    SequenceDesc => 176,
    Event => 76,
    SequenceGroup => 104,
    SequenceGroupHeader => 76,
    TextureHeader => 80,
    BodyPartHeader => 76,
    ModelHeader => 112,
    MeshHeader => 20,
    TriangleVertex => 8,
    Attachment => 88,
    AnimChannelOffsets => 12,
    AnimValue => 2
);

impl BinRead for Mdl {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let header = StudioHeader::read_options(reader, endian, ())?;

        let bones = parse_count_offset(reader, endian, header.bones)?;
        let bone_controllers = parse_count_offset(reader, endian, header.bone_controllers)?;
        let hitboxes = parse_count_offset(reader, endian, header.hitboxes)?;

        let sequences = parse_count_offset::<SequenceDesc, _>(reader, endian, header.sequences)?
            .into_iter()
            .map(|desc| {
                let events = parse_count_offset(reader, endian, desc.events)?;
                Ok(Sequence { desc, events })
            })
            .collect::<BinResult<Vec<_>>>()?;

        let sequence_groups = parse_count_offset(reader, endian, header.sequence_groups)?;

        let textures = parse_count_offset::<TextureHeader, _>(reader, endian, header.textures)?
            .into_iter()
            .map(|header| parse_texture(reader, endian, header))
            .collect::<BinResult<Vec<_>>>()?;

        let skin_families = parse_skin_families(reader, endian, &header)?;

        let body_parts = parse_count_offset::<BodyPartHeader, _>(reader, endian, header.body_parts)?
            .into_iter()
            .map(|header| parse_body_part(reader, endian, header))
            .collect::<BinResult<Vec<_>>>()?;

        let attachments = parse_count_offset(reader, endian, header.attachments)?;

        Ok(Self {
            header,
            bones,
            bone_controllers,
            hitboxes,
            sequences,
            sequence_groups,
            textures,
            skin_families,
            body_parts,
            attachments,
        })
    }
}

impl BinRead for SequenceGroupFile {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let header = SequenceGroupHeader::read_options(reader, endian, ())?;
        Ok(Self { header })
    }
}

fn parse_texture<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    header: TextureHeader,
) -> BinResult<Texture> {
    if header.width < 0 || header.height < 0 {
        return Err(binrw::Error::AssertFail {
            pos: reader.stream_position()?,
            message: format!("invalid texture size {}x{}", header.width, header.height),
        });
    }
    let pixel_count = i64::from(header.width) * i64::from(header.height);
    let (offset, pixel_count) = check_range(reader, header.data_offset.into(), pixel_count, 1)?;
    let palette_offset = offset + pixel_count as u64;
    check_range(reader, palette_offset as i64, PALETTE_SIZE as i64, 3)?;

    let pixels = parse_vec(reader, endian, offset, pixel_count)?;
    let palette = parse_vec(reader, endian, palette_offset, PALETTE_SIZE)?;

    Ok(Texture {
        header,
        pixels,
        palette,
    })
}

fn parse_skin_families<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    header: &StudioHeader,
) -> BinResult<Vec<Vec<i16>>> {
    if header.skin_family_count < 0 || header.skin_reference_count < 0 {
        return Err(binrw::Error::AssertFail {
            pos: reader.stream_position()?,
            message: format!(
                "invalid skin table with {} families and {} references",
                header.skin_family_count, header.skin_reference_count
            ),
        });
    }

    let count = i64::from(header.skin_family_count) * i64::from(header.skin_reference_count);
    if count == 0 {
        return Ok(Vec::new());
    }
    let (offset, count) = check_range(reader, header.skin_offset.into(), count, i16::SIZE)?;
    let values: Vec<i16> = parse_vec(reader, endian, offset, count)?;

    let reference_count = header.skin_reference_count as usize;
    Ok(values
        .chunks_exact(reference_count)
        .map(|c| c.to_vec())
        .collect())
}

fn parse_body_part<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    header: BodyPartHeader,
) -> BinResult<BodyPart> {
    let models =
        parse_table::<ModelHeader, _>(reader, endian, header.model_count, header.model_offset)?
            .into_iter()
            .map(|header| parse_model(reader, endian, header))
            .collect::<BinResult<Vec<_>>>()?;

    Ok(BodyPart { header, models })
}

fn parse_model<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    header: ModelHeader,
) -> BinResult<Model> {
    let meshes = parse_count_offset::<MeshHeader, _>(reader, endian, header.meshes)?
        .into_iter()
        .map(|header| {
            let commands = parse_triangle_commands(reader, endian, header.triangle_offset)?;
            Ok(Mesh { header, commands })
        })
        .collect::<BinResult<Vec<_>>>()?;

    let vertex_bones = parse_table(reader, endian, header.vertex_count, header.vertex_info_offset)?;
    let vertices = parse_table(reader, endian, header.vertex_count, header.vertex_offset)?;
    let normal_bones = parse_table(reader, endian, header.normal_count, header.normal_info_offset)?;
    let normals = parse_table(reader, endian, header.normal_count, header.normal_offset)?;

    Ok(Model {
        header,
        meshes,
        vertex_bones,
        vertices,
        normal_bones,
        normals,
    })
}

fn parse_triangle_commands<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    offset: i32,
) -> BinResult<Vec<TriangleCommand>> {
    let saved_pos = reader.stream_position()?;

    let (mut offset, _) = check_range(reader, offset.into(), 1, i16::SIZE)?;
    trace!("{}: {:?}", std::any::type_name::<TriangleCommand>(), offset);

    // Positive counts are strips and negative counts are fans.
    let mut commands = Vec::new();
    loop {
        reader.seek(SeekFrom::Start(offset))?;
        let count = i16::read_options(reader, endian, ())?;
        if count == 0 {
            break;
        }
        offset += i16::SIZE;

        let vertex_count = count.unsigned_abs();
        let (_, vertex_count) = check_range(
            reader,
            offset as i64,
            vertex_count.into(),
            TriangleVertex::SIZE,
        )?;
        let vertices = parse_vec(reader, endian, offset, vertex_count)?;
        offset += vertex_count as u64 * TriangleVertex::SIZE;

        if count > 0 {
            commands.push(TriangleCommand::Strip(vertices));
        } else {
            commands.push(TriangleCommand::Fan(vertices));
        }
    }

    reader.seek(SeekFrom::Start(saved_pos))?;
    Ok(commands)
}

/// Read the animation for each blend and bone of `sequence`.
///
/// The `reader` should contain the main model file for sequence group 0
/// and the corresponding sequence group file otherwise.
/// Use the same `cache` for all sequences read from the same buffer.
pub fn read_animations<R: Read + Seek>(
    reader: &mut R,
    sequence: &SequenceDesc,
    bone_count: usize,
    cache: &mut AnimationCache,
) -> BinResult<Vec<Vec<BoneAnimation>>> {
    let endian = Endian::Little;

    let record_count = i64::from(sequence.blend_count) * bone_count as i64;
    let (offset, _) = check_range(
        reader,
        sequence.animation_offset.into(),
        record_count,
        AnimChannelOffsets::SIZE,
    )?;

    let blend_count = sequence.blend_count.max(0) as usize;
    let frame_count = sequence.frame_count.max(1) as usize;

    let mut blends = Vec::with_capacity(blend_count);
    for blend in 0..blend_count {
        let mut bones = Vec::with_capacity(bone_count);
        for bone in 0..bone_count {
            let record_index = (blend * bone_count + bone) as u64;
            let record_offset = offset + record_index * AnimChannelOffsets::SIZE;
            let offsets: Vec<AnimChannelOffsets> = parse_vec(reader, endian, record_offset, 1)?;

            let mut animation = BoneAnimation::default();
            for (channel, channel_offset) in animation
                .channels
                .iter_mut()
                .zip(offsets.first().map(|o| o.0).unwrap_or_default())
            {
                if channel_offset != 0 {
                    let chain_offset = record_offset + u64::from(channel_offset);
                    let runs = read_chain(reader, endian, chain_offset, frame_count, cache)?;
                    *channel = Some(runs);
                }
            }
            bones.push(animation);
        }
        blends.push(bones);
    }

    Ok(blends)
}

fn read_chain<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    offset: u64,
    frame_count: usize,
    cache: &mut AnimationCache,
) -> BinResult<Arc<[AnimRun]>> {
    if let Some(runs) = cache.chains.get(&(offset, frame_count)) {
        return Ok(runs.clone());
    }

    let saved_pos = reader.stream_position()?;
    reader.seek(SeekFrom::Start(offset))?;
    let runs: Arc<[AnimRun]> =
        read_anim_runs(reader, endian, frame_count, &mut cache.remaining_runs)?.into();
    reader.seek(SeekFrom::Start(saved_pos))?;

    cache.chains.insert((offset, frame_count), runs.clone());
    Ok(runs)
}

/// Read runs until they cover at least `frame_count` frames.
fn read_anim_runs<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    frame_count: usize,
    remaining_runs: &mut usize,
) -> BinResult<Vec<AnimRun>> {
    let mut runs = Vec::new();
    let mut covered = 0;
    loop {
        let pos = reader.stream_position()?;
        if *remaining_runs == 0 {
            return Err(binrw::Error::AssertFail {
                pos,
                message: "animation runs exceed the size of the buffer".to_string(),
            });
        }
        *remaining_runs -= 1;

        let header = AnimValue::read_options(reader, endian, ())?;
        let valid = header.valid();
        let total = header.total();
        if total == 0 || valid == 0 || valid > total {
            return Err(binrw::Error::AssertFail {
                pos,
                message: format!("invalid animation run with {valid} values for {total} frames"),
            });
        }

        let values = Vec::<i16>::read_options(
            reader,
            endian,
            binrw::VecArgs {
                count: valid.into(),
                inner: (),
            },
        )?;
        runs.push(AnimRun { total, values });

        covered += usize::from(total);
        if covered >= frame_count {
            break;
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use binrw::BinWriterExt;
    use hexlit::hex;
    use pretty_assertions::assert_eq;

    fn written_size<T>(value: &T) -> u64
    where
        for<'a> T: BinWrite<Args<'a> = ()>,
    {
        let mut writer = Cursor::new(Vec::new());
        writer.write_le(value).unwrap();
        writer.into_inner().len() as u64
    }

    #[test]
    fn record_sizes() {
        assert_eq!(StudioHeader::SIZE, written_size(&StudioHeader::default()));
        assert_eq!(Bone::SIZE, written_size(&Bone::default()));
        assert_eq!(
            BoneController::SIZE,
            written_size(&BoneController::default())
        );
        assert_eq!(Hitbox::SIZE, written_size(&Hitbox::default()));
        assert_eq!(SequenceDesc::SIZE, written_size(&SequenceDesc::default()));
        assert_eq!(Event::SIZE, written_size(&Event::default()));
        assert_eq!(SequenceGroup::SIZE, written_size(&SequenceGroup::default()));
        assert_eq!(
            SequenceGroupHeader::SIZE,
            written_size(&SequenceGroupHeader::default())
        );
        assert_eq!(TextureHeader::SIZE, written_size(&TextureHeader::default()));
        assert_eq!(
            BodyPartHeader::SIZE,
            written_size(&BodyPartHeader::default())
        );
        assert_eq!(ModelHeader::SIZE, written_size(&ModelHeader::default()));
        assert_eq!(MeshHeader::SIZE, written_size(&MeshHeader::default()));
        assert_eq!(Attachment::SIZE, written_size(&Attachment::default()));
    }

    #[test]
    fn motion_flag_bits() {
        let flags = MotionFlags::from(0x8020u32);
        assert!(flags.zr());
        assert!(flags.rloop());
        assert!(flags.is_rotation());
        assert!(!flags.is_translation());

        let flags = MotionFlags::from(0x2u32);
        assert!(flags.y());
        assert!(flags.is_translation());
    }

    #[test]
    fn texture_flag_bits() {
        let flags = TextureFlags::from(0x42u32);
        assert!(flags.chrome());
        assert!(flags.masked());
        assert!(!flags.flat_shade());
    }

    #[test]
    fn read_anim_runs_multiple() {
        // run of 3 frames with 2 values, run of 2 frames with 1 value
        let mut reader = Cursor::new(hex!(0203 0a00 1400 0102 1e00));
        let runs = read_anim_runs(&mut reader, Endian::Little, 5, &mut 2).unwrap();
        assert_eq!(
            vec![
                AnimRun {
                    total: 3,
                    values: vec![10, 20]
                },
                AnimRun {
                    total: 2,
                    values: vec![30]
                }
            ],
            runs
        );
    }

    #[test]
    fn read_anim_runs_stops_when_covered() {
        // The trailing header belongs to a different channel.
        let mut reader = Cursor::new(hex!(0104 ffff 0101 0100));
        let runs = read_anim_runs(&mut reader, Endian::Little, 4, &mut 2).unwrap();
        assert_eq!(
            vec![AnimRun {
                total: 4,
                values: vec![-1]
            }],
            runs
        );
    }

    #[test]
    fn read_anim_runs_zero_total() {
        let mut reader = Cursor::new(hex!(0100 0a00));
        assert!(read_anim_runs(&mut reader, Endian::Little, 1, &mut 2).is_err());
    }

    #[test]
    fn read_anim_runs_too_many_values() {
        let mut reader = Cursor::new(hex!(0302 0a00 0a00 0a00));
        assert!(read_anim_runs(&mut reader, Endian::Little, 2, &mut 2).is_err());
    }

    #[test]
    fn read_anim_runs_truncated() {
        let mut reader = Cursor::new(hex!(0203 0a00));
        assert!(read_anim_runs(&mut reader, Endian::Little, 3, &mut 2).is_err());
    }

    #[test]
    fn read_triangle_commands() {
        // strip with 1 vertex, fan with 1 vertex, end
        let mut reader = Cursor::new(hex!(
            0100 0100 0200 0300 0400
            ffff 0500 0600 0700 0800
            0000
        ));
        let commands = parse_triangle_commands(&mut reader, Endian::Little, 0).unwrap();
        assert_eq!(
            vec![
                TriangleCommand::Strip(vec![TriangleVertex {
                    vertex_index: 1,
                    normal_index: 2,
                    s: 3,
                    t: 4
                }]),
                TriangleCommand::Fan(vec![TriangleVertex {
                    vertex_index: 5,
                    normal_index: 6,
                    s: 7,
                    t: 8
                }])
            ],
            commands
        );
        assert_eq!(0, reader.position());
    }

    #[test]
    fn read_triangle_commands_missing_end() {
        let mut reader = Cursor::new(hex!(0100 0100 0200 0300 0400));
        assert!(parse_triangle_commands(&mut reader, Endian::Little, 0).is_err());
    }

    #[test]
    fn read_animations_channel_offsets() {
        let sequence = SequenceDesc {
            frame_count: 2,
            blend_count: 1,
            animation_offset: 4,
            ..Default::default()
        };

        let mut writer = Cursor::new(Vec::new());
        writer.write_le(&0i32).unwrap();
        // Only the z rotation channel is animated.
        writer
            .write_le(&AnimChannelOffsets([0, 0, 0, 0, 0, 12]))
            .unwrap();
        writer.write_le(&AnimValue::header(2, 2)).unwrap();
        writer.write_le(&AnimValue::value(5)).unwrap();
        writer.write_le(&AnimValue::value(-5)).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let mut cache = AnimationCache::new(22);
        let blends = read_animations(&mut reader, &sequence, 1, &mut cache).unwrap();
        assert_eq!(1, blends.len());
        assert_eq!(
            BoneAnimation {
                channels: [
                    None,
                    None,
                    None,
                    None,
                    None,
                    Some(
                        vec![AnimRun {
                            total: 2,
                            values: vec![5, -5]
                        }]
                        .into()
                    )
                ]
            },
            blends[0][0]
        );
    }

    #[test]
    fn read_animations_shared_chain() {
        let sequence = SequenceDesc {
            frame_count: 2,
            blend_count: 1,
            animation_offset: 0,
            ..Default::default()
        };

        // Every channel of both bones points to the run after the records.
        let mut writer = Cursor::new(Vec::new());
        writer.write_le(&AnimChannelOffsets([24; 6])).unwrap();
        writer.write_le(&AnimChannelOffsets([12; 6])).unwrap();
        writer.write_le(&AnimValue::header(2, 2)).unwrap();
        writer.write_le(&AnimValue::value(1)).unwrap();
        writer.write_le(&AnimValue::value(2)).unwrap();

        let bytes = writer.into_inner();
        let mut cache = AnimationCache::new(bytes.len());
        let blends = read_animations(&mut Cursor::new(bytes), &sequence, 2, &mut cache)
            .unwrap();

        let first = blends[0][0].channels[0].as_ref().unwrap();
        assert_eq!(vec![1, 2], first[0].values);
        for animation in &blends[0] {
            for channel in &animation.channels {
                assert!(Arc::ptr_eq(first, channel.as_ref().unwrap()));
            }
        }
    }

    #[test]
    fn read_animations_overlapping_chains() {
        let bone_count = 50;
        let sequence = SequenceDesc {
            frame_count: 50,
            blend_count: 1,
            animation_offset: 0,
            ..Default::default()
        };

        // Each bone starts one run later in the same chain of 100 runs.
        let mut writer = Cursor::new(Vec::new());
        let chain_start = bone_count as u64 * AnimChannelOffsets::SIZE;
        for bone in 0..bone_count as u64 {
            let record_offset = bone * AnimChannelOffsets::SIZE;
            let run_offset = chain_start + bone * 4;
            let mut offsets = AnimChannelOffsets::default();
            offsets.0[0] = (run_offset - record_offset) as u16;
            writer.write_le(&offsets).unwrap();
        }
        for i in 0..100 {
            writer.write_le(&AnimValue::header(1, 1)).unwrap();
            writer.write_le(&AnimValue::value(i)).unwrap();
        }

        let bytes = writer.into_inner();
        let mut cache = AnimationCache::new(bytes.len());
        let result = read_animations(&mut Cursor::new(bytes), &sequence, bone_count, &mut cache);
        assert!(matches!(result, Err(binrw::Error::AssertFail { .. })));
    }

    #[test]
    fn read_animations_out_of_bounds() {
        let sequence = SequenceDesc {
            frame_count: 2,
            blend_count: 4,
            animation_offset: 0,
            ..Default::default()
        };
        let mut reader = Cursor::new(vec![0u8; 12]);
        assert!(read_animations(&mut reader, &sequence, 1, &mut AnimationCache::new(12)).is_err());
    }
}
