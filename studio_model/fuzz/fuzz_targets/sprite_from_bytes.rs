#![no_main]

use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    spr: Vec<u8>,
    elapsed: f32,
    frames_per_second: f32,
}

fuzz_target!(|input: Input| {
    if let Ok(sprite) = studio_model::Sprite::from_bytes(&input.spr) {
        let _ = sprite.select_frame(input.elapsed, input.frames_per_second);
    }
});
