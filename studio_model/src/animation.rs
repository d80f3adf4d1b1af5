//! Utilities for evaluating sequence animations.
//!
//! Each sequence stores up to 4 blend tracks with compressed values for each bone channel.
//! Channel values are decoded with [decode_channel] and combined with the bone's rest values,
//! scales, and controller adjustments to produce a local [BonePose] for each bone.
use glam::{Quat, Vec3};
use studio_lib::mdl::{CHANNEL_COUNT, MotionFlags};
pub use studio_lib::mdl::{AnimRun, BoneAnimation};

use crate::{StudioModel, controller::controller_adjustments, skeleton::Bone};

/// The local rotation and position of a bone relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub rotation: Quat,
    pub position: Vec3,
}

impl BonePose {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Sequence {
    pub name: String,
    pub frames_per_second: f32,
    pub looping: bool,
    pub activity: i32,
    pub activity_weight: i32,
    pub frame_count: usize,
    pub events: Vec<SequenceEvent>,
    /// Position axes of the [motion_bone](#structfield.motion_bone) removed after evaluation.
    pub motion_type: MotionFlags,
    pub motion_bone: Option<usize>,
    pub linear_movement: Vec3,
    pub bbmin: Vec3,
    pub bbmax: Vec3,
    /// Animation for each blend and bone with 1, 2, or 4 blends.
    pub blends: Vec<Vec<BoneAnimation>>,
    pub blend_types: [MotionFlags; 2],
    pub blend_start: [f32; 2],
    pub blend_end: [f32; 2],
    pub sequence_group: usize,
    pub entry_node: i32,
    pub exit_node: i32,
    pub node_flags: i32,
    pub next_sequence: i32,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SequenceEvent {
    pub frame: i32,
    pub event: i32,
    pub event_type: i32,
    pub options: String,
}

/// Mutable animation inputs for a single model instance.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct AnimationState {
    /// The index into [sequences](crate::StudioModel::sequences).
    /// Out of range values wrap around the sequence count.
    pub sequence: usize,
    pub frame: f32,
    /// Weights for blending between tracks with `255` selecting the second track.
    pub blending: [u8; 2],
    pub controllers: [u8; 4],
    pub mouth: u8,
    /// The combined selection for all body parts.
    pub body: usize,
    pub skin: usize,
}

/// Per instance buffers reused between calls to [PoseContext::evaluate].
#[derive(Debug, Clone, Default)]
pub struct PoseContext {
    poses: Vec<BonePose>,
    blend_poses: [Vec<BonePose>; 3],
    adjustments: Vec<f32>,
}

impl PoseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the local pose for each bone in `model` for the current sequence and frame.
    /// Models without sequences use the rest pose.
    pub fn evaluate(&mut self, model: &StudioModel, state: &AnimationState) -> &[BonePose] {
        let skeleton = &model.skeleton;
        controller_adjustments(
            &model.bone_controllers,
            &state.controllers,
            state.mouth,
            &mut self.adjustments,
        );

        let sequence = match model.sequences.len() {
            0 => None,
            len => model.sequences.get(state.sequence % len),
        };
        let Some(sequence) = sequence else {
            self.poses.clear();
            self.poses
                .extend(skeleton.bones.iter().map(|b| b.rest_pose()));
            return &self.poses;
        };

        let (frame, s) = sequence.sample_frame(state.frame);
        let adj = &self.adjustments;
        let blend0 = f32::from(state.blending[0]) / 255.0;
        let blend1 = f32::from(state.blending[1]) / 255.0;

        let [p1, p2, p3] = &mut self.blend_poses;
        match sequence.blends.as_slice() {
            [a] => {
                evaluate_track(&skeleton.bones, a, frame, s, adj, &mut self.poses);
            }
            [a, b] => {
                evaluate_track(&skeleton.bones, a, frame, s, adj, &mut self.poses);
                evaluate_track(&skeleton.bones, b, frame, s, adj, p1);
                blend_poses(&mut self.poses, p1, blend0);
            }
            [a, b, c, d] => {
                evaluate_track(&skeleton.bones, a, frame, s, adj, &mut self.poses);
                evaluate_track(&skeleton.bones, b, frame, s, adj, p1);
                evaluate_track(&skeleton.bones, c, frame, s, adj, p2);
                evaluate_track(&skeleton.bones, d, frame, s, adj, p3);

                blend_poses(&mut self.poses, p1, blend0);
                blend_poses(p2, p3, blend0);
                blend_poses(&mut self.poses, p2, blend1);
            }
            _ => {
                self.poses.clear();
                self.poses
                    .extend(skeleton.bones.iter().map(|b| b.rest_pose()));
            }
        }

        apply_motion(sequence, &mut self.poses);

        &self.poses
    }
}

impl Sequence {
    /// The frame index and interpolation factor for `frame`.
    ///
    /// Looping sequences wrap into `[0, frame_count - 1)`.
    /// Other sequences clamp to `[0, frame_count - 1]`.
    pub fn sample_frame(&self, frame: f32) -> (usize, f32) {
        let frame = self.wrap_frame(frame);
        let index = frame.floor();
        (index as usize, frame - index)
    }

    /// Apply the looping or clamping policy to an unbounded frame.
    pub fn wrap_frame(&self, frame: f32) -> f32 {
        if self.frame_count <= 1 || !frame.is_finite() {
            return 0.0;
        }

        let final_frame = (self.frame_count - 1) as f32;
        if self.looping {
            let frame = frame.rem_euclid(final_frame);
            // rem_euclid can round up to the divisor for tiny negative values.
            if frame >= final_frame { 0.0 } else { frame }
        } else {
            frame.clamp(0.0, final_frame)
        }
    }

    /// Events with a frame in `[start, end)` for frames before wrapping.
    /// Looping sequences also check frames after wrapping around the end.
    /// Other sequences include the final frame only on the step that reaches it.
    pub fn events_crossed(&self, start: f32, end: f32) -> Vec<SequenceEvent> {
        if !(end > start) || !start.is_finite() || !end.is_finite() {
            return Vec::new();
        }

        let final_frame = self.frame_count.saturating_sub(1) as f32;
        self.events
            .iter()
            .filter(|e| {
                let frame = e.frame as f32;
                if self.looping && final_frame > 0.0 {
                    // Count the loop iterations k with start <= frame + k * final_frame < end.
                    let first = ((start - frame) / final_frame).ceil();
                    let last = ((end - frame) / final_frame).ceil();
                    last > first
                } else {
                    // Clamped sequences stay on the final frame without crossing it again.
                    start < final_frame
                        && frame >= start
                        && (frame < end || (frame == final_frame && end >= final_frame))
                }
            })
            .cloned()
            .collect()
    }
}

/// Decode the raw values at `frame` and `frame + 1` from the run-length encoded `runs`.
///
/// Frames past the frames covered by `runs` use the last value.
pub fn decode_channel(runs: &[AnimRun], frame: usize) -> (i16, i16) {
    let mut k = frame;
    let mut run_index = None;
    for (i, run) in runs.iter().enumerate() {
        let total = usize::from(run.total);
        if k < total {
            run_index = Some(i);
            break;
        }
        k -= total;
    }

    let Some(i) = run_index else {
        let last = runs
            .last()
            .and_then(|r| r.values.last())
            .copied()
            .unwrap_or_default();
        return (last, last);
    };

    let run = &runs[i];
    let Some(held) = run.values.last().copied() else {
        return (0, 0);
    };

    let value = run.values.get(k).copied().unwrap_or(held);
    let next = match run.values.get(k + 1) {
        Some(next) => *next,
        None if k + 1 < usize::from(run.total) => held,
        None => runs
            .get(i + 1)
            .and_then(|r| r.values.first())
            .copied()
            .unwrap_or(held),
    };
    (value, next)
}

/// Convert Euler angles in radians with roll (x), pitch (y), and yaw (z) to a quaternion.
pub fn angle_quaternion(angles: Vec3) -> Quat {
    let (sy, cy) = (angles.z * 0.5).sin_cos();
    let (sp, cp) = (angles.y * 0.5).sin_cos();
    let (sr, cr) = (angles.x * 0.5).sin_cos();

    Quat::from_xyzw(
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    )
}

/// Spherical interpolation along the shortest path.
/// The result is exactly `p` for `t = 0.0` and `q` or `-q` for `t = 1.0`.
pub fn quaternion_slerp(p: Quat, q: Quat, t: f32) -> Quat {
    let q = if (p - q).length_squared() > (p + q).length_squared() {
        -q
    } else {
        q
    };

    let cosom = p.dot(q);
    let (sclp, sclq) = if (1.0 - cosom) > 0.000001 {
        let omega = cosom.acos();
        let sinom = omega.sin();
        (
            ((1.0 - t) * omega).sin() / sinom,
            (t * omega).sin() / sinom,
        )
    } else {
        (1.0 - t, t)
    };

    p * sclp + q * sclq
}

/// Blend `poses` towards `other` by `s` clamped to `[0, 1]`.
pub fn blend_poses(poses: &mut [BonePose], other: &[BonePose], s: f32) {
    let s = s.clamp(0.0, 1.0);
    for (pose, other) in poses.iter_mut().zip(other) {
        pose.rotation = quaternion_slerp(pose.rotation, other.rotation, s);
        pose.position = pose.position * (1.0 - s) + other.position * s;
    }
}

fn evaluate_track(
    bones: &[Bone],
    track: &[BoneAnimation],
    frame: usize,
    s: f32,
    adjustments: &[f32],
    poses: &mut Vec<BonePose>,
) {
    poses.clear();
    poses.extend(bones.iter().zip(track).map(|(bone, animation)| BonePose {
        rotation: bone_rotation(bone, animation, frame, s, adjustments),
        position: bone_position(bone, animation, frame, s, adjustments),
    }));
}

fn channel_values(
    bone: &Bone,
    animation: &BoneAnimation,
    channel: usize,
    frame: usize,
    adjustments: &[f32],
) -> (f32, f32) {
    let rest = bone.values[channel];
    let (v1, v2) = match &animation.channels[channel] {
        Some(runs) => {
            let (v1, v2) = decode_channel(runs, frame);
            let scale = bone.scales[channel];
            (rest + f32::from(v1) * scale, rest + f32::from(v2) * scale)
        }
        None => (rest, rest),
    };

    let adjustment = bone.controllers[channel]
        .and_then(|c| adjustments.get(c))
        .copied()
        .unwrap_or_default();
    (v1 + adjustment, v2 + adjustment)
}

fn bone_rotation(
    bone: &Bone,
    animation: &BoneAnimation,
    frame: usize,
    s: f32,
    adjustments: &[f32],
) -> Quat {
    let mut angle1 = Vec3::ZERO;
    let mut angle2 = Vec3::ZERO;
    for (i, channel) in (3..CHANNEL_COUNT).enumerate() {
        let (a1, a2) = channel_values(bone, animation, channel, frame, adjustments);
        angle1[i] = a1;
        angle2[i] = a2;
    }

    if angle1 != angle2 {
        quaternion_slerp(angle_quaternion(angle1), angle_quaternion(angle2), s)
    } else {
        angle_quaternion(angle1)
    }
}

fn bone_position(
    bone: &Bone,
    animation: &BoneAnimation,
    frame: usize,
    s: f32,
    adjustments: &[f32],
) -> Vec3 {
    let mut position = Vec3::ZERO;
    for channel in 0..3 {
        let (p1, p2) = channel_values(bone, animation, channel, frame, adjustments);
        position[channel] = p1 * (1.0 - s) + p2 * s;
    }
    position
}

fn apply_motion(sequence: &Sequence, poses: &mut [BonePose]) {
    if let Some(pose) = sequence.motion_bone.and_then(|i| poses.get_mut(i)) {
        let motion = sequence.motion_type;
        if motion.x() {
            pose.position.x = 0.0;
        }
        if motion.y() {
            pose.position.y = 0.0;
        }
        if motion.z() {
            pose.position.z = 0.0;
        }
    }
}
