#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use studio_model::{Animate, ModelEntity, StudioModel};

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    model: Vec<u8>,
    sequence: usize,
    frame: f32,
    controllers: [f32; 4],
    mouth: f32,
    blending: [f32; 2],
    body: usize,
    skin: usize,
    dt: f32,
}

fuzz_target!(|input: Input| {
    if let Ok(model) = StudioModel::from_bytes(&input.model) {
        let body_part_count = model.body_parts.len();
        let mut entity = ModelEntity::new(Arc::new(model));

        let _ = entity.set_sequence(input.sequence);
        entity.set_frame(input.frame);
        for (i, value) in input.controllers.into_iter().enumerate() {
            let _ = entity.set_controller(i, value);
        }
        entity.set_mouth(input.mouth);
        for (i, value) in input.blending.into_iter().enumerate() {
            let _ = entity.set_blending(i, value);
        }
        let _ = entity.set_skin(input.skin);

        entity.advance(input.dt);
        for i in 0..body_part_count {
            let _ = entity.set_body_group(i, input.body);
            let _ = entity.draw(i);
        }
        let _ = entity.attachment_origins();
        let _ = entity.hitbox_corners();
    }
});
