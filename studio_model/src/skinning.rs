//! Vertex skinning with per vertex lighting and chrome texture coordinates.
//!
//! Each vertex and normal is rigidly bound to a single bone.
//! Lighting is computed from the bone space normal and a light vector rotated into bone space,
//! so the normals never need to be transformed for shading.
use glam::{Affine3A, Vec2, Vec3, vec3};
use studio_lib::mdl::TextureFlags;

use crate::{MeshVertex, Model, Primitive, StudioModel};

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LightingParams {
    pub ambient: f32,
    pub shade: f32,
    /// The direction the light travels in world space.
    pub light_direction: Vec3,
    pub light_color: Vec3,
    /// Values above `1.0` wrap lighting further around the model.
    pub lambert: f32,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            ambient: 32.0,
            shade: 192.0,
            light_direction: vec3(0.0, 0.0, -1.0),
            light_color: Vec3::ONE,
            lambert: 1.5,
        }
    }
}

/// The viewer used for generating chrome texture coordinates.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ViewParams {
    pub origin: Vec3,
    pub right: Vec3,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            right: vec3(50.0, 50.0, 0.0),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DrawVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub uv: Vec2,
}

/// A mesh ready for rendering as a triangle list.
#[derive(Debug, PartialEq, Clone)]
pub struct SkinnedMesh {
    /// The index into [textures](crate::StudioModel::textures) for the selected skin.
    pub texture_index: Option<usize>,
    pub flags: TextureFlags,
    pub vertices: Vec<DrawVertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
struct ChromeVectors {
    up: Vec3,
    right: Vec3,
}

/// Per instance buffers reused between calls to [SkinningContext::skin].
#[derive(Debug, Clone, Default)]
pub struct SkinningContext {
    pub lighting: LightingParams,
    view: ViewParams,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    bone_lights: Vec<Vec3>,
    chrome: Vec<Option<ChromeVectors>>,
    meshes: Vec<SkinnedMesh>,
}

impl SkinningContext {
    pub fn new(lighting: LightingParams) -> Self {
        Self {
            lighting,
            ..Default::default()
        }
    }

    pub fn view(&self) -> ViewParams {
        self.view
    }

    pub fn set_view(&mut self, view: ViewParams) {
        if view != self.view {
            self.view = view;
            self.chrome.clear();
        }
    }

    /// The world space positions and normals from the last call to [Self::transform_vertices].
    pub fn transformed(&self) -> (&[Vec3], &[Vec3]) {
        (&self.positions, &self.normals)
    }

    /// Transform the vertices and normals of `model` by their bone in `transforms`.
    pub fn transform_vertices(&mut self, model: &Model, transforms: &[Affine3A]) {
        self.positions.clear();
        self.positions
            .extend(model.vertices.iter().zip(&model.vertex_bones).map(|(v, b)| {
                bone_transform(transforms, *b).transform_point3(*v)
            }));

        self.normals.clear();
        self.normals
            .extend(model.normals.iter().zip(&model.normal_bones).map(|(n, b)| {
                bone_transform(transforms, *b).transform_vector3(*n)
            }));
    }

    /// Skin and light each mesh of `model` using textures from skin family `skin`.
    ///
    /// The `model` should be one of the models in `studio`.
    /// Skins that are out of range use skin family 0.
    pub fn skin(
        &mut self,
        studio: &StudioModel,
        model: &Model,
        skin: usize,
        transforms: &[Affine3A],
    ) -> &[SkinnedMesh] {
        self.transform_vertices(model, transforms);

        // Light vectors are recomputed every draw since bones move.
        self.bone_lights.clear();
        self.bone_lights.extend(
            transforms
                .iter()
                .map(|t| inverse_rotate(t, self.lighting.light_direction)),
        );
        self.chrome.clear();
        self.chrome.resize(transforms.len(), None);

        self.meshes.clear();
        for mesh in &model.meshes {
            let texture_index = studio
                .texture_index(skin, mesh.skin_reference)
                .or_else(|| studio.texture_index(0, mesh.skin_reference));
            let texture = texture_index.and_then(|i| studio.textures.get(i));
            let flags = texture.map(|t| t.flags).unwrap_or_default();
            let size = texture
                .map(|t| vec2_size(t.width, t.height))
                .unwrap_or(Vec2::ONE);

            let mut vertices = Vec::new();
            let mut indices = Vec::new();
            for command in &mesh.commands {
                let start = vertices.len() as u32;
                for vertex in &command.vertices {
                    vertices.push(self.draw_vertex(model, vertex, flags, size, transforms));
                }
                triangle_indices(command.primitive, start, command.vertices.len(), &mut indices);
            }

            self.meshes.push(SkinnedMesh {
                texture_index,
                flags,
                vertices,
                indices,
            });
        }

        &self.meshes
    }

    fn draw_vertex(
        &mut self,
        model: &Model,
        vertex: &MeshVertex,
        flags: TextureFlags,
        size: Vec2,
        transforms: &[Affine3A],
    ) -> DrawVertex {
        let position = self.positions.get(vertex.vertex).copied().unwrap_or_default();
        let normal = self.normals.get(vertex.normal).copied().unwrap_or_default();

        let local_normal = model.normals.get(vertex.normal).copied().unwrap_or_default();
        let bone = model.normal_bones.get(vertex.normal).copied().unwrap_or_default();

        let light = self
            .bone_lights
            .get(bone)
            .copied()
            .unwrap_or(self.lighting.light_direction);
        let color =
            self.lighting.light_color * vertex_light(local_normal, light, flags, &self.lighting);

        let uv = if flags.chrome() {
            let chrome = self.chrome_vectors(bone, transforms);
            chrome_uv(local_normal, chrome)
        } else {
            Vec2::new(f32::from(vertex.s), f32::from(vertex.t)) / size
        };

        DrawVertex {
            position,
            normal,
            color,
            uv,
        }
    }

    fn chrome_vectors(&mut self, bone: usize, transforms: &[Affine3A]) -> ChromeVectors {
        if let Some(Some(chrome)) = self.chrome.get(bone) {
            return *chrome;
        }

        let transform = bone_transform(transforms, bone);
        let chrome = chrome_vectors(&transform, &self.view);
        if let Some(cached) = self.chrome.get_mut(bone) {
            *cached = Some(chrome);
        }
        chrome
    }
}

/// The light intensity from `0.0` to `1.0` for a bone space `normal`
/// and `light` direction rotated into bone space.
pub fn vertex_light(
    normal: Vec3,
    light: Vec3,
    flags: TextureFlags,
    params: &LightingParams,
) -> f32 {
    let mut illum = params.ambient;
    if flags.flat_shade() {
        illum += params.shade * 0.8;
    } else {
        illum += params.shade;

        let r = params.lambert.max(1.0);
        let cos = normal.dot(light).min(1.0);
        let cos = (cos + r - 1.0) / r;
        if cos > 0.0 {
            illum -= params.shade * cos;
        }
    }
    illum.clamp(0.0, 255.0) / 255.0
}

fn chrome_vectors(transform: &Affine3A, view: &ViewParams) -> ChromeVectors {
    // Approximate the view direction for all vertices of the bone.
    let to_bone = (Vec3::from(transform.translation) - view.origin).normalize_or_zero();
    let up = to_bone.cross(view.right).normalize_or_zero();
    let right = to_bone.cross(up).normalize_or_zero();
    ChromeVectors {
        up: inverse_rotate(transform, up),
        right: inverse_rotate(transform, right),
    }
}

fn chrome_uv(normal: Vec3, chrome: ChromeVectors) -> Vec2 {
    Vec2::new(
        (normal.dot(chrome.right) + 1.0) * 0.5,
        (normal.dot(chrome.up) + 1.0) * 0.5,
    )
}

fn inverse_rotate(transform: &Affine3A, v: Vec3) -> Vec3 {
    transform.matrix3.transpose() * v
}

fn bone_transform(transforms: &[Affine3A], bone: usize) -> Affine3A {
    transforms.get(bone).copied().unwrap_or(Affine3A::IDENTITY)
}

fn vec2_size(width: u32, height: u32) -> Vec2 {
    Vec2::new(width.max(1) as f32, height.max(1) as f32)
}

/// Convert a strip or fan with `count` vertices starting at `start` to a triangle list.
pub fn triangle_indices(primitive: Primitive, start: u32, count: usize, indices: &mut Vec<u32>) {
    for i in 2..count as u32 {
        let [a, b, c] = match primitive {
            // Flip every other triangle to preserve the winding order.
            Primitive::TriangleStrip if i % 2 == 1 => [i - 1, i - 2, i],
            Primitive::TriangleStrip => [i - 2, i - 1, i],
            Primitive::TriangleFan => [0, i - 1, i],
        };
        indices.extend([start + a, start + b, start + c]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::Quat;

    use crate::{BodyPart, Mesh, Texture, TriangleCommand};

    fn flags(value: u32) -> TextureFlags {
        TextureFlags::from(value)
    }

    #[test]
    fn vertex_light_flat_shade() {
        let light = vertex_light(
            Vec3::Z,
            vec3(0.0, 0.0, -1.0),
            flags(0x1),
            &LightingParams::default(),
        );
        assert_relative_eq!((32.0 + 192.0 * 0.8) / 255.0, light, epsilon = 0.0001);
    }

    #[test]
    fn vertex_light_facing_light() {
        let params = LightingParams::default();
        // Normals facing the light source point opposite the light direction.
        assert_relative_eq!(32.0 / 255.0, vertex_light(-Vec3::Z, -Vec3::Z, flags(0), &params));
        assert_relative_eq!(224.0 / 255.0, vertex_light(Vec3::Z, -Vec3::Z, flags(0), &params));
    }

    #[test]
    fn vertex_light_wraps() {
        // A perpendicular normal is still partially lit with lambert above 1.0.
        let params = LightingParams::default();
        let expected = (224.0 - 192.0 * (0.5 / 1.5)) / 255.0;
        assert_relative_eq!(
            expected,
            vertex_light(Vec3::X, -Vec3::Z, flags(0), &params),
            epsilon = 0.0001
        );
    }

    #[test]
    fn vertex_light_clamped() {
        let params = LightingParams {
            ambient: 300.0,
            ..Default::default()
        };
        assert_eq!(1.0, vertex_light(Vec3::Z, -Vec3::Z, flags(0), &params));
    }

    #[test]
    fn triangle_indices_strip() {
        let mut indices = Vec::new();
        triangle_indices(Primitive::TriangleStrip, 10, 5, &mut indices);
        assert_eq!(vec![10, 11, 12, 12, 11, 13, 12, 13, 14], indices);
    }

    #[test]
    fn triangle_indices_fan() {
        let mut indices = Vec::new();
        triangle_indices(Primitive::TriangleFan, 0, 4, &mut indices);
        assert_eq!(vec![0, 1, 2, 0, 2, 3], indices);
    }

    #[test]
    fn triangle_indices_degenerate() {
        let mut indices = Vec::new();
        triangle_indices(Primitive::TriangleFan, 0, 2, &mut indices);
        assert!(indices.is_empty());
    }

    #[test]
    fn chrome_uv_from_view() {
        let view = ViewParams {
            origin: vec3(-10.0, 0.0, 0.0),
            right: Vec3::Y,
        };
        let chrome = chrome_vectors(&Affine3A::IDENTITY, &view);
        assert!(chrome.up.abs_diff_eq(Vec3::Z, 0.0001));
        assert!(chrome.right.abs_diff_eq(-Vec3::Y, 0.0001));

        assert!(chrome_uv(Vec3::Z, chrome).abs_diff_eq(Vec2::new(0.5, 1.0), 0.0001));
        assert!(chrome_uv(-Vec3::Y, chrome).abs_diff_eq(Vec2::new(1.0, 0.5), 0.0001));
    }

    fn triangle_model(texture_flags: u32) -> (StudioModel, Model) {
        let vertex = |i| MeshVertex {
            vertex: i,
            normal: 0,
            s: 8 * i as i16,
            t: 4,
        };
        let model = Model {
            name: "triangle".to_string(),
            bounding_radius: 1.0,
            meshes: vec![Mesh {
                skin_reference: 0,
                commands: vec![TriangleCommand {
                    primitive: Primitive::TriangleFan,
                    vertices: vec![vertex(0), vertex(1), vertex(2)],
                }],
            }],
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_bones: vec![0, 0, 0],
            normals: vec![Vec3::Z],
            normal_bones: vec![0],
        };
        let studio = StudioModel {
            body_parts: vec![BodyPart {
                name: "body".to_string(),
                base: 1,
                models: vec![model.clone()],
            }],
            textures: vec![Texture {
                name: "skin.bmp".to_string(),
                flags: flags(texture_flags),
                width: 16,
                height: 8,
                pixels: vec![0; 128],
                palette: vec![[0; 3]; 256],
            }],
            skin_families: vec![vec![0]],
            ..Default::default()
        };
        (studio, model)
    }

    #[test]
    fn skin_triangle() {
        let (studio, model) = triangle_model(0);
        let transforms = [Affine3A::from_translation(vec3(0.0, 0.0, 5.0))];

        let mut context = SkinningContext::new(LightingParams::default());
        let meshes = context.skin(&studio, &model, 0, &transforms);

        assert_eq!(1, meshes.len());
        assert_eq!(Some(0), meshes[0].texture_index);
        assert_eq!(vec![0, 1, 2], meshes[0].indices);
        assert_eq!(vec3(1.0, 0.0, 5.0), meshes[0].vertices[1].position);
        assert_eq!(Vec2::new(0.5, 0.5), meshes[0].vertices[1].uv);
        assert_relative_eq!(224.0 / 255.0, meshes[0].vertices[0].color.x);
    }

    #[test]
    fn skin_rotated_bone_lighting() {
        let (studio, model) = triangle_model(0);
        // Rotate the normal to face the light.
        let transforms = [Affine3A::from_quat(Quat::from_rotation_x(std::f32::consts::PI))];

        let mut context = SkinningContext::default();
        let meshes = context.skin(&studio, &model, 0, &transforms);

        assert_relative_eq!(32.0 / 255.0, meshes[0].vertices[0].color.x, epsilon = 0.0001);
        assert!(meshes[0].vertices[0].normal.abs_diff_eq(-Vec3::Z, 0.0001));
    }

    #[test]
    fn skin_invalid_skin_uses_family_zero() {
        let (studio, model) = triangle_model(0);
        let mut context = SkinningContext::default();
        let meshes = context.skin(&studio, &model, 3, &[Affine3A::IDENTITY]);
        assert_eq!(Some(0), meshes[0].texture_index);
    }

    #[test]
    fn skin_chrome() {
        let (studio, model) = triangle_model(0x2);
        let mut context = SkinningContext::default();
        context.set_view(ViewParams {
            origin: vec3(-10.0, 0.0, 0.0),
            right: Vec3::Y,
        });
        let meshes = context.skin(&studio, &model, 0, &[Affine3A::IDENTITY]);
        assert!(meshes[0].vertices[0].uv.abs_diff_eq(Vec2::new(0.5, 1.0), 0.0001));

        // Changing the view updates the cached chrome vectors.
        context.set_view(ViewParams {
            origin: vec3(0.0, 0.0, -10.0),
            right: Vec3::Y,
        });
        let meshes = context.skin(&studio, &model, 0, &[Affine3A::IDENTITY]);
        assert!(meshes[0].vertices[0].uv.abs_diff_eq(Vec2::new(0.5, 0.5), 0.0001));
    }
}
