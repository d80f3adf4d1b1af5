#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    model: Vec<u8>,
    textures: Option<Vec<u8>>,
    sequence_groups: BTreeMap<usize, Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let files = studio_model::ModelFiles {
        name: "fuzz".to_string(),
        model: input.model,
        textures: input.textures,
        sequence_groups: input.sequence_groups,
    };
    let _ = studio_model::StudioModel::from_files(&files);
});
