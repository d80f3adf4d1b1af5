//! Per instance animation state for a shared [StudioModel].
use std::sync::Arc;

use glam::{Affine3A, Vec3};

use crate::{
    StudioModel,
    animation::{AnimationState, PoseContext, Sequence, SequenceEvent},
    controller::{MOUTH_CHANNEL, quantize_blend},
    error::SelectError,
    skinning::{SkinnedMesh, SkinningContext},
};

/// An object with skeletal animation driven by time.
pub trait Animate {
    /// Advance the current frame by `dt` seconds and return the events crossed during the step.
    fn advance(&mut self, dt: f32) -> Vec<SequenceEvent>;

    /// Evaluate the current pose and compute the world space transform for each bone.
    fn setup_bones(&mut self) -> &[Affine3A];
}

/// A single instance of a model with its own animation state and scratch buffers.
///
/// Setters return an error and leave the state unchanged for out of range selections.
#[derive(Debug, Clone)]
pub struct ModelEntity {
    model: Arc<StudioModel>,
    state: AnimationState,
    pose: PoseContext,
    transforms: Vec<Affine3A>,
    skinning: SkinningContext,
}

impl ModelEntity {
    /// Create an instance playing the first sequence with controllers and blends set to `0.0`.
    pub fn new(model: Arc<StudioModel>) -> Self {
        let mut entity = Self {
            model,
            state: AnimationState::default(),
            pose: PoseContext::new(),
            transforms: Vec::new(),
            skinning: SkinningContext::default(),
        };

        for channel in 0..4 {
            entity.set_controller(channel, 0.0).ok();
        }
        entity.set_mouth(0.0);
        for blender in 0..2 {
            entity.set_blending(blender, 0.0).ok();
        }
        entity
    }

    pub fn model(&self) -> &Arc<StudioModel> {
        &self.model
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn skinning(&self) -> &SkinningContext {
        &self.skinning
    }

    /// Access the lighting and view parameters used by [Self::draw].
    pub fn skinning_mut(&mut self) -> &mut SkinningContext {
        &mut self.skinning
    }

    /// The world space bone transforms from the last call to [Animate::setup_bones].
    pub fn transforms(&self) -> &[Affine3A] {
        &self.transforms
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        match self.model.sequences.len() {
            0 => None,
            len => self.model.sequences.get(self.state.sequence % len),
        }
    }

    /// Select a sequence and restart from frame 0.
    pub fn set_sequence(&mut self, index: usize) -> Result<(), SelectError> {
        let len = self.model.sequences.len();
        if index >= len {
            return Err(SelectError::Sequence { index, len });
        }
        self.state.sequence = index;
        self.state.frame = 0.0;
        Ok(())
    }

    /// Set the current frame using the looping or clamping policy of the current sequence.
    pub fn set_frame(&mut self, frame: f32) {
        let frame = match self.sequence() {
            Some(sequence) => sequence.wrap_frame(frame),
            None => 0.0,
        };
        self.state.frame = frame;
    }

    /// Set controller `channel` from `0` to `3` and return the value actually represented.
    /// Channels without a controller return `value` unchanged.
    pub fn set_controller(&mut self, channel: usize, value: f32) -> Result<f32, SelectError> {
        if channel >= MOUTH_CHANNEL {
            return Err(SelectError::Controller { channel });
        }

        match self.model.bone_controllers.iter().find(|c| c.channel == channel) {
            Some(controller) => {
                let (byte, value) = controller.quantize(value);
                self.state.controllers[channel] = byte;
                Ok(value)
            }
            None => Ok(value),
        }
    }

    /// Set the mouth controller and return the value actually represented.
    pub fn set_mouth(&mut self, value: f32) -> f32 {
        match self
            .model
            .bone_controllers
            .iter()
            .find(|c| c.channel == MOUTH_CHANNEL)
        {
            Some(controller) => {
                let (byte, value) = controller.quantize_mouth(value);
                self.state.mouth = byte;
                value
            }
            None => value,
        }
    }

    /// Set `blender` `0` or `1` for the current sequence and return the value actually represented.
    /// Sequences without a blend type for `blender` return `value` unchanged.
    pub fn set_blending(&mut self, blender: usize, value: f32) -> Result<f32, SelectError> {
        if blender >= 2 {
            return Err(SelectError::Blender { index: blender });
        }

        let Some(sequence) = self.sequence() else {
            return Ok(value);
        };
        match quantize_blend(
            sequence.blend_types[blender],
            sequence.blend_start[blender],
            sequence.blend_end[blender],
            value,
        ) {
            Some((byte, value)) => {
                self.state.blending[blender] = byte;
                Ok(value)
            }
            None => Ok(value),
        }
    }

    /// The active model index for `body_part`.
    pub fn body_group(&self, body_part: usize) -> Option<usize> {
        self.model
            .active_model(body_part, self.state.body)
            .map(|(i, _)| i)
    }

    /// Select model `value` for `body_part` without changing other body parts.
    pub fn set_body_group(&mut self, body_part: usize, value: usize) -> Result<(), SelectError> {
        let len = self.model.body_parts.len();
        let part = self
            .model
            .body_parts
            .get(body_part)
            .ok_or(SelectError::BodyPart {
                index: body_part,
                len,
            })?;
        if value >= part.models.len() {
            return Err(SelectError::BodyPartModel {
                body_part,
                index: value,
                len: part.models.len(),
            });
        }

        let current = self.body_group(body_part).unwrap_or_default();
        self.state.body = self.state.body - current * part.base + value * part.base;
        Ok(())
    }

    pub fn set_skin(&mut self, skin: usize) -> Result<(), SelectError> {
        let len = self.model.skin_families.len();
        if skin >= len {
            return Err(SelectError::Skin { index: skin, len });
        }
        self.state.skin = skin;
        Ok(())
    }

    /// Skin the active model for `body_part` using the transforms from [Animate::setup_bones].
    pub fn draw(&mut self, body_part: usize) -> Result<&[SkinnedMesh], SelectError> {
        let len = self.model.body_parts.len();
        let (_, model) = self
            .model
            .active_model(body_part, self.state.body)
            .ok_or(SelectError::BodyPart {
                index: body_part,
                len,
            })?;

        if self.transforms.len() != self.model.skeleton.bones.len() {
            self.model.skeleton.solve(
                self.pose.evaluate(&self.model, &self.state),
                &mut self.transforms,
            );
        }

        Ok(self
            .skinning
            .skin(&self.model, model, self.state.skin, &self.transforms))
    }

    /// The world space origin of each attachment.
    pub fn attachment_origins(&self) -> Vec<Vec3> {
        self.model
            .attachments
            .iter()
            .map(|a| a.world_origin(&self.transforms))
            .collect()
    }

    /// The world space corners of each hitbox.
    pub fn hitbox_corners(&self) -> Vec<[Vec3; 8]> {
        self.model
            .hitboxes
            .iter()
            .map(|h| h.world_corners(&self.transforms))
            .collect()
    }
}

impl Animate for ModelEntity {
    fn advance(&mut self, dt: f32) -> Vec<SequenceEvent> {
        let Some(sequence) = self.sequence() else {
            return Vec::new();
        };

        let start = self.state.frame;
        let end = start + dt * sequence.frames_per_second;
        let events = sequence.events_crossed(start, end);
        let frame = sequence.wrap_frame(end);
        self.state.frame = frame;
        events
    }

    fn setup_bones(&mut self) -> &[Affine3A] {
        let poses = self.pose.evaluate(&self.model, &self.state);
        self.model.skeleton.solve(poses, &mut self.transforms);
        &self.transforms
    }
}
