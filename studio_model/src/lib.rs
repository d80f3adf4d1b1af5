//! # studio_model
//! studio_model provides high level data access and animation for studio models and sprites.
//!
//! Models are loaded from the main `.mdl` file and any required texture or sequence group files.
//! All indices are validated at load time,
//! so evaluating poses and skinning never index out of bounds.
//!
//! ```rust no_run
//! use std::sync::Arc;
//! use studio_model::{Animate, ModelEntity, load_model};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = Arc::new(load_model("models/scientist.mdl")?);
//!
//! let mut entity = ModelEntity::new(model);
//! entity.set_sequence(1)?;
//! for event in entity.advance(1.0 / 60.0) {
//!     println!("{event:?}");
//! }
//! let transforms = entity.setup_bones();
//! println!("{transforms:?}");
//! # Ok(())
//! # }
//! ```
use std::{
    collections::BTreeMap,
    io::Cursor,
    path::{Path, PathBuf},
};

use glam::Vec3;
use log::{trace, warn};
use studio_lib::{
    error::ReadFileError,
    mdl::{AnimationCache, Mdl, SequenceGroupFile, TextureFlags, read_animations},
};

use error::{LoadModelError, ModelDataError};
use skeleton::checked_index;

pub mod animation;
pub mod controller;
pub mod entity;
pub mod error;
pub mod skeleton;
pub mod skinning;
pub mod sprite;

pub use animation::{AnimationState, BonePose, PoseContext, Sequence, SequenceEvent};
pub use controller::BoneController;
pub use entity::{Animate, ModelEntity};
pub use skeleton::{Attachment, Bone, Hitbox, Skeleton};
pub use skinning::{LightingParams, SkinnedMesh, SkinningContext, ViewParams};
pub use sprite::{Sprite, load_sprite};

/// A fully validated model with all auxiliary file data resolved.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct StudioModel {
    pub name: String,
    pub eye_position: Vec3,
    /// The movement hull.
    pub min: Vec3,
    pub max: Vec3,
    /// The clipping bounding box.
    pub bbmin: Vec3,
    pub bbmax: Vec3,
    pub flags: i32,
    pub skeleton: Skeleton,
    pub bone_controllers: Vec<BoneController>,
    pub hitboxes: Vec<Hitbox>,
    pub attachments: Vec<Attachment>,
    pub sequences: Vec<Sequence>,
    pub body_parts: Vec<BodyPart>,
    pub textures: Vec<Texture>,
    /// Indices into [textures](#structfield.textures) for `[family][skin reference]`.
    pub skin_families: Vec<Vec<usize>>,
    root_bones: Vec<usize>,
    texture_meshes: Vec<Vec<MeshRef>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BodyPart {
    pub name: String,
    /// The multiplier for this body part's digit in the combined body value.
    pub base: usize,
    /// Alternative models with exactly one model active at a time.
    pub models: Vec<Model>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Model {
    pub name: String,
    pub bounding_radius: f32,
    pub meshes: Vec<Mesh>,
    pub vertices: Vec<Vec3>,
    /// The bone index for each of the [vertices](#structfield.vertices).
    pub vertex_bones: Vec<usize>,
    pub normals: Vec<Vec3>,
    /// The bone index for each of the [normals](#structfield.normals).
    pub normal_bones: Vec<usize>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Mesh {
    /// The column in [skin_families](struct.StudioModel.html#structfield.skin_families).
    pub skin_reference: usize,
    pub commands: Vec<TriangleCommand>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TriangleCommand {
    pub primitive: Primitive,
    pub vertices: Vec<MeshVertex>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Primitive {
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MeshVertex {
    /// The index into [vertices](struct.Model.html#structfield.vertices).
    pub vertex: usize,
    /// The index into [normals](struct.Model.html#structfield.normals).
    pub normal: usize,
    /// Texture coordinates in pixels.
    pub s: i16,
    pub t: i16,
}

/// An 8-bit paletted texture.
#[derive(Debug, PartialEq, Clone)]
pub struct Texture {
    pub name: String,
    pub flags: TextureFlags,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub palette: Vec<[u8; 3]>,
}

/// The location of a mesh in [body_parts](struct.StudioModel.html#structfield.body_parts).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MeshRef {
    pub body_part: usize,
    pub model: usize,
    pub mesh: usize,
}

/// The data for the main model file and any auxiliary files.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ModelFiles {
    /// The main file name without the extension like `"scientist"`.
    pub name: String,
    pub model: Vec<u8>,
    /// The data for `nameT.mdl` if the main model has no textures.
    pub textures: Option<Vec<u8>>,
    /// The data for `name01.mdl`, `name02.mdl`, ... by sequence group index.
    pub sequence_groups: BTreeMap<usize, Vec<u8>>,
}

/// Load a model and its auxiliary files from `path` like `"models/scientist.mdl"`.
#[tracing::instrument(skip_all)]
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<StudioModel, LoadModelError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(ReadFileError::from)?;
    let mdl = Mdl::from_bytes(&bytes)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let textures = if mdl.textures.is_empty() {
        let file = texture_file_name(&name);
        Some(read_auxiliary_file(path.with_file_name(&file), file)?)
    } else {
        None
    };

    let mut sequence_groups = BTreeMap::new();
    for group in required_sequence_groups(&mdl) {
        let file = sequence_group_file_name(&name, group);
        let bytes = read_auxiliary_file(path.with_file_name(&file), file)?;
        sequence_groups.insert(group, bytes);
    }

    StudioModel::from_mdl(&mdl, &bytes, &name, textures.as_deref(), &sequence_groups)
}

impl StudioModel {
    /// Load a model without auxiliary files.
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, LoadModelError> {
        let bytes = bytes.as_ref();
        let mdl = Mdl::from_bytes(bytes)?;
        let name = model_stem(&mdl);
        Self::from_mdl(&mdl, bytes, &name, None, &BTreeMap::new())
    }

    pub fn from_files(files: &ModelFiles) -> Result<Self, LoadModelError> {
        let mdl = Mdl::from_bytes(&files.model)?;
        let name = if files.name.is_empty() {
            model_stem(&mdl)
        } else {
            files.name.clone()
        };
        Self::from_mdl(
            &mdl,
            &files.model,
            &name,
            files.textures.as_deref(),
            &files.sequence_groups,
        )
    }

    /// Validate and convert `mdl` read from `bytes`.
    ///
    /// The `name` is used for naming missing auxiliary files in errors.
    #[tracing::instrument(skip_all)]
    pub fn from_mdl(
        mdl: &Mdl,
        bytes: &[u8],
        name: &str,
        textures: Option<&[u8]>,
        sequence_groups: &BTreeMap<usize, Vec<u8>>,
    ) -> Result<Self, LoadModelError> {
        // Models without textures store textures and skins in a separate file.
        let texture_mdl = if mdl.textures.is_empty() {
            let file = texture_file_name(name);
            let bytes = textures
                .ok_or_else(|| post_load_failure(&file, ModelDataError::MissingTextureFile))?;
            let texture_mdl = Mdl::from_bytes(bytes).map_err(|e| LoadModelError::PostLoadFailure {
                file,
                source: Box::new(e.into()),
            })?;
            Some(texture_mdl)
        } else {
            None
        };
        let texture_source = texture_mdl.as_ref().unwrap_or(mdl);

        let bone_count = mdl.bones.len();
        let bone_controllers = bone_controllers(mdl)?;
        let skeleton = Skeleton::from_bones(&mdl.bones, bone_controllers.len())?;

        let textures = texture_source
            .textures
            .iter()
            .map(|t| Texture {
                name: t.header.name.to_string_lossy(),
                flags: t.header.flags,
                width: t.header.width as u32,
                height: t.header.height as u32,
                pixels: t.pixels.clone(),
                palette: t.palette.clone(),
            })
            .collect::<Vec<_>>();

        let skin_families = texture_source
            .skin_families
            .iter()
            .map(|family| {
                family
                    .iter()
                    .map(|i| checked_index("texture", (*i).into(), textures.len()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let skin_reference_count = skin_families.first().map(Vec::len).unwrap_or_default();

        let body_parts = mdl
            .body_parts
            .iter()
            .enumerate()
            .map(|(i, b)| body_part(i, b, bone_count, skin_reference_count))
            .collect::<Result<Vec<_>, _>>()?;

        let hitboxes = mdl
            .hitboxes
            .iter()
            .map(|h| {
                Ok(Hitbox {
                    bone: checked_index("hitbox bone", h.bone, bone_count)?,
                    group: h.group,
                    bbmin: h.bbmin.into(),
                    bbmax: h.bbmax.into(),
                })
            })
            .collect::<Result<Vec<_>, ModelDataError>>()?;

        let attachments = mdl
            .attachments
            .iter()
            .map(|a| {
                Ok(Attachment {
                    name: a.name.to_string_lossy(),
                    attachment_type: a.attachment_type,
                    bone: checked_index("attachment bone", a.bone, bone_count)?,
                    origin: a.origin.into(),
                    vectors: a.vectors.map(Vec3::from),
                })
            })
            .collect::<Result<Vec<_>, ModelDataError>>()?;

        // Caches for group 0 in the main file and each sequence group file.
        let mut caches = BTreeMap::new();
        let sequences = mdl
            .sequences
            .iter()
            .enumerate()
            .map(|(i, s)| sequence(mdl, bytes, i, s, name, sequence_groups, &mut caches))
            .collect::<Result<Vec<_>, _>>()?;

        let root_bones = skeleton.root_bones().collect();
        let texture_meshes = texture_meshes(&body_parts, &skin_families, textures.len());

        Ok(Self {
            name: mdl.header.name.to_string_lossy(),
            eye_position: mdl.header.eye_position.into(),
            min: mdl.header.min.into(),
            max: mdl.header.max.into(),
            bbmin: mdl.header.bbmin.into(),
            bbmax: mdl.header.bbmax.into(),
            flags: mdl.header.flags,
            skeleton,
            bone_controllers,
            hitboxes,
            attachments,
            sequences,
            body_parts,
            textures,
            skin_families,
            root_bones,
            texture_meshes,
        })
    }

    /// The indices of all bones without a parent.
    pub fn root_bones(&self) -> &[usize] {
        &self.root_bones
    }

    /// The meshes using [textures](#structfield.textures)`[texture]` for skin family 0.
    pub fn meshes_using_texture(&self, texture: usize) -> &[MeshRef] {
        self.texture_meshes
            .get(texture)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The texture index for `skin_reference` in the given skin family.
    pub fn texture_index(&self, skin: usize, skin_reference: usize) -> Option<usize> {
        self.skin_families.get(skin)?.get(skin_reference).copied()
    }

    /// The active model index and model for `body_part` selected by the combined `body` value.
    pub fn active_model(&self, body_part: usize, body: usize) -> Option<(usize, &Model)> {
        let body_part = self.body_parts.get(body_part)?;
        let index = body
            .checked_div(body_part.base)?
            .checked_rem(body_part.models.len())?;
        body_part.models.get(index).map(|m| (index, m))
    }

    /// The combined body value for selecting `models[selection[i]]` for each body part.
    pub fn body_value(&self, selection: &[usize]) -> usize {
        self.body_parts
            .iter()
            .zip(selection)
            .map(|(b, i)| b.base * i.checked_rem(b.models.len()).unwrap_or_default())
            .sum()
    }

    /// The center of the clipping bounding box.
    pub fn bounds_center(&self) -> Vec3 {
        (self.bbmin + self.bbmax) * 0.5
    }
}

/// `"name"` -> `"nameT.mdl"`
pub fn texture_file_name(name: &str) -> String {
    format!("{name}T.mdl")
}

/// `"name"`, `1` -> `"name01.mdl"`
pub fn sequence_group_file_name(name: &str, group: usize) -> String {
    format!("{name}{group:02}.mdl")
}

/// The nonzero sequence groups referenced by any sequence in ascending order.
pub fn required_sequence_groups(mdl: &Mdl) -> Vec<usize> {
    let mut groups: Vec<_> = mdl
        .sequences
        .iter()
        .filter_map(|s| usize::try_from(s.desc.sequence_group).ok())
        .filter(|g| *g != 0)
        .collect();
    groups.sort();
    groups.dedup();
    groups
}

fn read_auxiliary_file(path: PathBuf, file: String) -> Result<Vec<u8>, LoadModelError> {
    trace!("reading {path:?}");
    std::fs::read(path).map_err(|e| LoadModelError::PostLoadFailure {
        file,
        source: Box::new(ReadFileError::from(e).into()),
    })
}

fn post_load_failure(file: &str, error: ModelDataError) -> LoadModelError {
    LoadModelError::PostLoadFailure {
        file: file.to_string(),
        source: Box::new(LoadModelError::Failure(error)),
    }
}

fn model_stem(mdl: &Mdl) -> String {
    // The header name usually includes a path like "models/scientist.mdl".
    let name = mdl.header.name.to_string_lossy();
    Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name)
}

fn bone_controllers(mdl: &Mdl) -> Result<Vec<BoneController>, ModelDataError> {
    let bone_count = mdl.bones.len();
    mdl.bone_controllers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let bone = checked_index("bone controller bone", c.bone, bone_count)?;
            let channel = checked_index(
                "bone controller channel",
                c.index,
                controller::MOUTH_CHANNEL + 1,
            )?;

            let i = i as i32;
            if !mdl.bones[bone].bone_controllers.contains(&i) {
                warn!("Bone controller {i} is not used by bone {bone}");
            }

            Ok(BoneController {
                bone,
                controller_type: c.controller_type,
                start: c.start,
                end: c.end,
                rest: c.rest,
                channel,
            })
        })
        .collect()
}

fn body_part(
    index: usize,
    body_part: &studio_lib::mdl::BodyPart,
    bone_count: usize,
    skin_reference_count: usize,
) -> Result<BodyPart, ModelDataError> {
    let header = &body_part.header;
    if header.model_count <= 0 || header.base <= 0 {
        return Err(ModelDataError::InvalidBodyPart {
            body_part: index,
            model_count: header.model_count,
            base: header.base,
        });
    }

    let models = body_part
        .models
        .iter()
        .map(|m| model(m, bone_count, skin_reference_count))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BodyPart {
        name: header.name.to_string_lossy(),
        base: header.base as usize,
        models,
    })
}

fn model(
    model: &studio_lib::mdl::Model,
    bone_count: usize,
    skin_reference_count: usize,
) -> Result<Model, ModelDataError> {
    let vertex_bones = bone_indices(&model.vertex_bones, bone_count)?;
    let normal_bones = bone_indices(&model.normal_bones, bone_count)?;
    let vertex_count = model.vertices.len();
    let normal_count = model.normals.len();

    let meshes = model
        .meshes
        .iter()
        .map(|mesh| {
            let skin_reference = checked_index(
                "skin reference",
                mesh.header.skin_reference,
                skin_reference_count,
            )?;

            let commands = mesh
                .commands
                .iter()
                .map(|command| {
                    let primitive = match command {
                        studio_lib::mdl::TriangleCommand::Strip(_) => Primitive::TriangleStrip,
                        studio_lib::mdl::TriangleCommand::Fan(_) => Primitive::TriangleFan,
                    };
                    let vertices = command
                        .vertices()
                        .iter()
                        .map(|v| {
                            Ok(MeshVertex {
                                vertex: triangle_index("vertex", v.vertex_index, vertex_count)?,
                                normal: triangle_index("normal", v.normal_index, normal_count)?,
                                s: v.s,
                                t: v.t,
                            })
                        })
                        .collect::<Result<Vec<_>, ModelDataError>>()?;
                    Ok(TriangleCommand {
                        primitive,
                        vertices,
                    })
                })
                .collect::<Result<Vec<_>, ModelDataError>>()?;

            Ok(Mesh {
                skin_reference,
                commands,
            })
        })
        .collect::<Result<Vec<_>, ModelDataError>>()?;

    Ok(Model {
        name: model.header.name.to_string_lossy(),
        bounding_radius: model.header.bounding_radius,
        meshes,
        vertices: model.vertices.iter().copied().map(Vec3::from).collect(),
        vertex_bones,
        normals: model.normals.iter().copied().map(Vec3::from).collect(),
        normal_bones,
    })
}

fn bone_indices(indices: &[u8], bone_count: usize) -> Result<Vec<usize>, ModelDataError> {
    indices
        .iter()
        .map(|i| checked_index("vertex bone", (*i).into(), bone_count))
        .collect()
}

fn triangle_index(kind: &'static str, index: i16, len: usize) -> Result<usize, ModelDataError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(ModelDataError::InvalidTriangleVertex { kind, index, len })
}

fn sequence(
    mdl: &Mdl,
    bytes: &[u8],
    index: usize,
    sequence: &studio_lib::mdl::Sequence,
    name: &str,
    sequence_groups: &BTreeMap<usize, Vec<u8>>,
    caches: &mut BTreeMap<usize, AnimationCache>,
) -> Result<Sequence, LoadModelError> {
    let desc = &sequence.desc;
    let bone_count = mdl.bones.len();

    if !matches!(desc.blend_count, 1 | 2 | 4) {
        return Err(ModelDataError::InvalidBlendCount {
            sequence: index,
            count: desc.blend_count,
        }
        .into());
    }

    // Group 0 is the main file even if the model declares no groups.
    let group = match desc.sequence_group {
        0 => 0,
        g => checked_index("sequence group", g, mdl.sequence_groups.len())?,
    };

    let blends = if group == 0 {
        let cache = caches
            .entry(0)
            .or_insert_with(|| AnimationCache::new(bytes.len()));
        let mut reader = Cursor::new(bytes);
        read_animations(&mut reader, desc, bone_count, cache).map_err(|source| {
            ModelDataError::Animation {
                sequence: index,
                source,
            }
        })?
    } else {
        let file = sequence_group_file_name(name, group);
        let group_bytes = sequence_groups
            .get(&group)
            .ok_or_else(|| {
                post_load_failure(&file, ModelDataError::MissingSequenceGroupFile { group })
            })?;

        SequenceGroupFile::from_bytes(group_bytes).map_err(|e| LoadModelError::PostLoadFailure {
            file: file.clone(),
            source: Box::new(e.into()),
        })?;

        let cache = caches
            .entry(group)
            .or_insert_with(|| AnimationCache::new(group_bytes.len()));
        let mut reader = Cursor::new(group_bytes);
        read_animations(&mut reader, desc, bone_count, cache).map_err(|source| {
            post_load_failure(
                &file,
                ModelDataError::Animation {
                    sequence: index,
                    source,
                },
            )
        })?
    };

    let motion_bone = usize::try_from(desc.motion_bone)
        .ok()
        .filter(|b| *b < bone_count);
    if motion_bone.is_none() && u32::from(desc.motion_type) & 0x7 != 0 {
        warn!(
            "Sequence {index} has motion bone {} out of range for {bone_count} bones",
            desc.motion_bone
        );
    }

    let frame_count = desc.frame_count.max(0) as usize;

    Ok(Sequence {
        name: desc.label.to_string_lossy(),
        frames_per_second: desc.fps,
        looping: desc.flags.looping(),
        activity: desc.activity,
        activity_weight: desc.activity_weight,
        frame_count,
        events: sequence
            .events
            .iter()
            .map(|e| SequenceEvent {
                frame: e.frame,
                event: e.event,
                event_type: e.event_type,
                options: e.options.to_string_lossy(),
            })
            .collect(),
        motion_type: desc.motion_type,
        motion_bone,
        linear_movement: desc.linear_movement.into(),
        bbmin: desc.bbmin.into(),
        bbmax: desc.bbmax.into(),
        blends,
        blend_types: desc.blend_types,
        blend_start: desc.blend_start,
        blend_end: desc.blend_end,
        sequence_group: group,
        entry_node: desc.entry_node,
        exit_node: desc.exit_node,
        node_flags: desc.node_flags,
        next_sequence: desc.next_sequence,
    })
}

fn texture_meshes(
    body_parts: &[BodyPart],
    skin_families: &[Vec<usize>],
    texture_count: usize,
) -> Vec<Vec<MeshRef>> {
    let mut texture_meshes = vec![Vec::new(); texture_count];
    let Some(family) = skin_families.first() else {
        return texture_meshes;
    };

    for (body_part_index, body_part) in body_parts.iter().enumerate() {
        for (model_index, model) in body_part.models.iter().enumerate() {
            for (mesh_index, mesh) in model.meshes.iter().enumerate() {
                if let Some(meshes) = family
                    .get(mesh.skin_reference)
                    .and_then(|t| texture_meshes.get_mut(*t))
                {
                    meshes.push(MeshRef {
                        body_part: body_part_index,
                        model: model_index,
                        mesh: mesh_index,
                    });
                }
            }
        }
    }
    texture_meshes
}
