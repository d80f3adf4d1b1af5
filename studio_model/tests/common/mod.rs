//! Helpers for writing model files with the binrw record types.
#![allow(dead_code)]

use std::io::{Cursor, Seek, SeekFrom, Write};

use binrw::{BinWrite, BinWriterExt};
use studio_lib::{
    CountOffset, FixedStr,
    mdl::{
        AnimChannelOffsets, AnimValue, BodyPartHeader, Bone, MeshHeader, ModelHeader, SequenceDesc,
        SequenceGroup, SequenceGroupHeader, StudioHeader, TextureHeader, TriangleVertex,
    },
};

/// Raw frame values for each channel of each bone for each blend.
pub type Blends = Vec<Vec<[Option<Vec<i16>>; 6]>>;

#[derive(Debug, Clone)]
pub struct TestSequence {
    pub desc: SequenceDesc,
    /// Animation written to the main file for sequence group 0.
    pub blends: Blends,
}

#[derive(Debug, Clone)]
pub struct TestModel {
    pub id: [u8; 4],
    pub version: i32,
    pub bones: Vec<Bone>,
    pub sequences: Vec<TestSequence>,
    pub sequence_group_count: usize,
    pub texture: bool,
    /// A triangle fan with vertices `(0, 0, 0)`, `(1, 0, 0)`, and `(0, 1, 0)`.
    pub fan: Option<Vec<TriangleVertex>>,
}

impl Default for TestModel {
    fn default() -> Self {
        Self {
            id: *b"IDST",
            version: 10,
            bones: Vec::new(),
            sequences: Vec::new(),
            sequence_group_count: 0,
            texture: true,
            fan: None,
        }
    }
}

pub fn bone(name: &str, parent: i32, values: [f32; 6], scales: [f32; 6]) -> Bone {
    Bone {
        name: FixedStr::new(name),
        parent,
        flags: 0,
        bone_controllers: [-1; 6],
        values,
        scales,
    }
}

pub fn sequence(frame_count: i32, blends: Blends) -> TestSequence {
    TestSequence {
        desc: SequenceDesc {
            label: FixedStr::new("idle"),
            fps: 10.0,
            frame_count,
            blend_count: blends.len() as i32,
            ..Default::default()
        },
        blends,
    }
}

/// Unanimated channels for `bone_count` bones.
pub fn rest_blend(bone_count: usize) -> Vec<[Option<Vec<i16>>; 6]> {
    vec![Default::default(); bone_count]
}

pub fn fan_vertex(index: i16) -> TriangleVertex {
    TriangleVertex {
        vertex_index: index,
        normal_index: 0,
        s: 0,
        t: 0,
    }
}

fn end(writer: &mut Cursor<Vec<u8>>) -> u64 {
    writer.seek(SeekFrom::End(0)).unwrap()
}

fn append<T>(writer: &mut Cursor<Vec<u8>>, values: &[T]) -> i32
where
    for<'a> T: BinWrite<Args<'a> = ()>,
{
    let offset = end(writer);
    for value in values {
        writer.write_le(value).unwrap();
    }
    offset as i32
}

/// Write the channel offset records for each blend and bone followed by a single run per channel.
pub fn write_animation(writer: &mut Cursor<Vec<u8>>, blends: &Blends) -> i32 {
    let start = end(writer);
    let record_count: usize = blends.iter().map(Vec::len).sum();
    let data_start = start + record_count as u64 * 12;

    let mut records = vec![AnimChannelOffsets::default(); record_count];
    let mut runs = Cursor::new(Vec::new());
    for (i, channels) in blends.iter().flatten().enumerate() {
        let record_offset = start + i as u64 * 12;
        for (c, values) in channels.iter().enumerate() {
            if let Some(values) = values {
                let run_offset = data_start + runs.position();
                records[i].0[c] = (run_offset - record_offset) as u16;

                let count = values.len() as u8;
                runs.write_le(&AnimValue::header(count, count)).unwrap();
                for value in values {
                    runs.write_le(&AnimValue::value(*value)).unwrap();
                }
            }
        }
    }

    for record in &records {
        writer.write_le(record).unwrap();
    }
    writer.write_all(&runs.into_inner()).unwrap();
    start as i32
}

pub fn write_mdl(model: &TestModel) -> Vec<u8> {
    let mut writer = Cursor::new(vec![0u8; 244]);

    let bones_offset = append(&mut writer, &model.bones);

    let mut descs = Vec::new();
    for sequence in &model.sequences {
        let mut desc = sequence.desc.clone();
        if desc.sequence_group == 0 {
            desc.animation_offset = write_animation(&mut writer, &sequence.blends);
        }
        descs.push(desc);
    }
    let sequences_offset = append(&mut writer, &descs);

    let groups: Vec<_> = (0..model.sequence_group_count)
        .map(|i| SequenceGroup {
            label: FixedStr::new("default"),
            name: FixedStr::new(&format!("test{i:02}.mdl")),
            ..Default::default()
        })
        .collect();
    let groups_offset = append(&mut writer, &groups);

    let (textures, skins) = if model.texture {
        let offset = end(&mut writer) as i32;
        append(
            &mut writer,
            &[TextureHeader {
                name: FixedStr::new("skin.bmp"),
                width: 1,
                height: 1,
                data_offset: offset + 80,
                ..Default::default()
            }],
        );
        append(&mut writer, &[0u8]);
        append(&mut writer, &[[0u8; 3]; 256]);
        let skin_offset = append(&mut writer, &[0i16]);
        (CountOffset::new(1, offset), (1, 1, skin_offset))
    } else {
        (CountOffset::default(), (0, 0, 0))
    };

    let body_parts = match &model.fan {
        Some(fan) => {
            let vertex_info_offset = append(&mut writer, &[0u8; 3]);
            let vertex_offset = append(
                &mut writer,
                &[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            );
            let normal_info_offset = append(&mut writer, &[0u8]);
            let normal_offset = append(&mut writer, &[[0.0f32, 0.0, 1.0]]);

            let triangle_offset = append(&mut writer, &[-(fan.len() as i16)]);
            append(&mut writer, fan);
            append(&mut writer, &[0i16]);

            let mesh_offset = append(
                &mut writer,
                &[MeshHeader {
                    triangle_count: 1,
                    triangle_offset,
                    skin_reference: 0,
                    normal_count: 1,
                    normal_offset: 0,
                }],
            );
            let model_offset = append(
                &mut writer,
                &[ModelHeader {
                    name: FixedStr::new("body"),
                    meshes: CountOffset::new(1, mesh_offset),
                    vertex_count: 3,
                    vertex_info_offset,
                    vertex_offset,
                    normal_count: 1,
                    normal_info_offset,
                    normal_offset,
                    ..Default::default()
                }],
            );
            let offset = append(
                &mut writer,
                &[BodyPartHeader {
                    name: FixedStr::new("body"),
                    model_count: 1,
                    base: 1,
                    model_offset,
                }],
            );
            CountOffset::new(1, offset)
        }
        None => CountOffset::default(),
    };

    let length = end(&mut writer) as i32;
    let header = StudioHeader {
        id: model.id,
        version: model.version,
        name: FixedStr::new("test.mdl"),
        length,
        bones: CountOffset::new(model.bones.len() as i32, bones_offset),
        sequences: CountOffset::new(descs.len() as i32, sequences_offset),
        sequence_groups: CountOffset::new(groups.len() as i32, groups_offset),
        textures,
        skin_reference_count: skins.0,
        skin_family_count: skins.1,
        skin_offset: skins.2,
        body_parts,
        ..Default::default()
    };
    writer.set_position(0);
    writer.write_le(&header).unwrap();

    writer.into_inner()
}

/// Write a sequence group file and return the data and animation offset.
pub fn write_sequence_group(blends: &Blends) -> (Vec<u8>, i32) {
    let mut writer = Cursor::new(Vec::new());
    writer
        .write_le(&SequenceGroupHeader {
            id: *b"IDSQ",
            version: 10,
            name: FixedStr::new("test01.mdl"),
            length: 0,
        })
        .unwrap();
    let offset = write_animation(&mut writer, blends);
    (writer.into_inner(), offset)
}
