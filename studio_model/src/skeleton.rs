use glam::{Affine3A, Vec3, vec3};
use studio_lib::mdl::CHANNEL_COUNT;

use crate::{
    animation::{BonePose, angle_quaternion},
    error::ModelDataError,
};

/// The bone hierarchy for a model.
/// Bones always appear after their parents.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    pub name: String,
    /// The index of the parent [Bone] in [bones](struct.Skeleton.html#structfield.bones)
    /// or `None` if this is a root bone.
    pub parent_index: Option<usize>,
    pub flags: i32,
    /// The index into [bone_controllers](crate::StudioModel::bone_controllers) for each channel.
    pub controllers: [Option<usize>; CHANNEL_COUNT],
    /// The rest position followed by the rest Euler angles in radians.
    pub values: [f32; CHANNEL_COUNT],
    /// The scale applied to compressed animation values for each channel.
    pub scales: [f32; CHANNEL_COUNT],
}

#[derive(Debug, PartialEq, Clone)]
pub struct Hitbox {
    pub bone: usize,
    pub group: i32,
    pub bbmin: Vec3,
    pub bbmax: Vec3,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Attachment {
    pub name: String,
    pub attachment_type: i32,
    pub bone: usize,
    pub origin: Vec3,
    pub vectors: [Vec3; 3],
}

impl Bone {
    /// The pose from the rest values without any animation applied.
    pub fn rest_pose(&self) -> BonePose {
        let [x, y, z, rx, ry, rz] = self.values;
        BonePose {
            rotation: angle_quaternion(vec3(rx, ry, rz)),
            position: vec3(x, y, z),
        }
    }
}

impl Skeleton {
    pub fn from_bones(
        bones: &[studio_lib::mdl::Bone],
        controller_count: usize,
    ) -> Result<Self, ModelDataError> {
        let bones = bones
            .iter()
            .enumerate()
            .map(|(i, bone)| {
                // Parents must appear first to accumulate transforms in a single pass.
                let parent_index = match bone.parent {
                    -1 => None,
                    p if p >= 0 && (p as usize) < i => Some(p as usize),
                    p => {
                        return Err(ModelDataError::InvalidBoneParent {
                            bone: i,
                            parent: p,
                        });
                    }
                };

                let mut controllers = [None; CHANNEL_COUNT];
                for (controller, index) in controllers.iter_mut().zip(bone.bone_controllers) {
                    *controller = match index {
                        -1 => None,
                        i => Some(checked_index("bone controller", i, controller_count)?),
                    };
                }

                Ok(Bone {
                    name: bone.name.to_string_lossy(),
                    parent_index,
                    flags: bone.flags,
                    controllers,
                    values: bone.values,
                    scales: bone.scales,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { bones })
    }

    /// The indices of all bones without a parent.
    pub fn root_bones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.parent_index.is_none().then_some(i))
    }

    pub fn rest_poses(&self) -> Vec<BonePose> {
        self.bones.iter().map(|b| b.rest_pose()).collect()
    }

    /// Accumulate the local `poses` for each bone into world space `transforms`.
    ///
    /// Missing poses use the identity pose.
    pub fn solve(&self, poses: &[BonePose], transforms: &mut Vec<Affine3A>) {
        transforms.clear();
        for (i, bone) in self.bones.iter().enumerate() {
            let pose = poses.get(i).unwrap_or(&BonePose::IDENTITY);
            let local = Affine3A::from_rotation_translation(pose.rotation, pose.position);

            let world = match bone.parent_index.and_then(|p| transforms.get(p)) {
                Some(parent) => *parent * local,
                None => local,
            };
            transforms.push(world);
        }
    }

    /// The world space transform for each bone from the rest values.
    pub fn rest_transforms(&self) -> Vec<Affine3A> {
        let mut transforms = Vec::new();
        self.solve(&self.rest_poses(), &mut transforms);
        transforms
    }
}

impl Hitbox {
    /// The corners of the bounding box transformed by the hitbox bone.
    pub fn world_corners(&self, transforms: &[Affine3A]) -> [Vec3; 8] {
        let transform = transforms.get(self.bone).unwrap_or(&Affine3A::IDENTITY);
        let (min, max) = (self.bbmin, self.bbmax);
        [
            vec3(min.x, min.y, min.z),
            vec3(max.x, min.y, min.z),
            vec3(max.x, max.y, min.z),
            vec3(min.x, max.y, min.z),
            vec3(min.x, min.y, max.z),
            vec3(max.x, min.y, max.z),
            vec3(max.x, max.y, max.z),
            vec3(min.x, max.y, max.z),
        ]
        .map(|p| transform.transform_point3(p))
    }
}

impl Attachment {
    pub fn world_origin(&self, transforms: &[Affine3A]) -> Vec3 {
        transforms
            .get(self.bone)
            .unwrap_or(&Affine3A::IDENTITY)
            .transform_point3(self.origin)
    }
}

pub(crate) fn checked_index(
    kind: &'static str,
    index: i32,
    len: usize,
) -> Result<usize, ModelDataError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(ModelDataError::IndexOutOfRange {
            kind,
            index: index.into(),
            len,
        })
}
