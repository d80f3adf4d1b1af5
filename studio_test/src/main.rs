use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use studio_model::{Animate, ModelEntity, Sprite, StudioModel};

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// The game folder containing .mdl and .spr files like "valve/models".
    root_folder: String,

    /// The file type to check.
    #[arg(long, value_enum, default_value_t = FileType::All)]
    file_type: FileType,

    /// The number of evenly spaced frames to evaluate for each sequence.
    #[arg(long, default_value_t = 4)]
    frames: usize,

    /// Log level for messages while loading files.
    #[arg(long, default_value_t = log::LevelFilter::Warn)]
    log_level: log::LevelFilter,
}

#[derive(Copy, PartialEq, Clone, Eq, ValueEnum)]
enum FileType {
    Mdl,
    Spr,
    All,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()?;

    let start = std::time::Instant::now();

    if matches!(cli.file_type, FileType::Mdl | FileType::All) {
        println!("Checking *.mdl...");
        check_all(&cli.root_folder, "*.mdl", |path| check_model(path, cli.frames))?;
    }

    if matches!(cli.file_type, FileType::Spr | FileType::All) {
        println!("Checking *.spr...");
        check_all(&cli.root_folder, "*.spr", check_sprite)?;
    }

    println!("Finished in {:?}", start.elapsed());
    Ok(())
}

fn check_all<F>(root: &str, pattern: &str, check_file: F) -> anyhow::Result<()>
where
    F: Fn(&Path) -> anyhow::Result<()> + Sync,
{
    let count = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);

    globwalk::GlobWalkerBuilder::from_patterns(root, &[pattern])
        .case_insensitive(true)
        .build()?
        .filter_map(|e| e.ok())
        .par_bridge()
        .for_each(|entry| {
            let path = entry.path();
            if is_auxiliary_model(path) {
                return;
            }

            count.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = check_file(path) {
                failures.fetch_add(1, Ordering::Relaxed);
                println!("Error checking {path:?}: {e:?}");
            }
        });

    println!(
        "{} of {} files checked successfully",
        count.load(Ordering::Relaxed) - failures.load(Ordering::Relaxed),
        count.load(Ordering::Relaxed)
    );
    Ok(())
}

// Texture files like "scientistT.mdl" and sequence group files like "scientist01.mdl"
// are loaded along with the main model "scientist.mdl".
fn is_auxiliary_model(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };

    let main_stem = if let Some(stem) = stem.strip_suffix('T') {
        stem
    } else if stem.len() > 2 && stem.as_bytes()[stem.len() - 2..].iter().all(u8::is_ascii_digit) {
        &stem[..stem.len() - 2]
    } else {
        return false;
    };
    path.with_file_name(format!("{main_stem}.mdl")).exists()
}

fn check_model(path: &Path, frames: usize) -> anyhow::Result<()> {
    let model = studio_model::load_model(path).with_context(|| format!("loading {path:?}"))?;
    let sequence_count = model.sequences.len();
    let body_part_count = model.body_parts.len();

    let mut entity = ModelEntity::new(Arc::new(model));
    for sequence in 0..sequence_count {
        entity.set_sequence(sequence)?;
        let last_frame = entity
            .sequence()
            .map(|s| s.frame_count.saturating_sub(1) as f32)
            .unwrap_or_default();

        for i in 0..frames.max(1) {
            let frame = if frames > 1 {
                last_frame * i as f32 / (frames - 1) as f32
            } else {
                0.0
            };
            entity.set_frame(frame);
            check_transforms(entity.setup_bones(), path, sequence, frame)?;

            for body_part in 0..body_part_count {
                entity.draw(body_part)?;
            }
        }
    }
    Ok(())
}

fn check_transforms(
    transforms: &[glam::Affine3A],
    path: &Path,
    sequence: usize,
    frame: f32,
) -> anyhow::Result<()> {
    if let Some(i) = transforms.iter().position(|t| !t.is_finite()) {
        anyhow::bail!(
            "non finite transform for bone {i} in {path:?} sequence {sequence} frame {frame}"
        );
    }
    Ok(())
}

fn check_sprite(path: &Path) -> anyhow::Result<()> {
    let sprite = studio_model::load_sprite(path).with_context(|| format!("loading {path:?}"))?;

    // Sample a full cycle of frames.
    let frame_duration = 1.0 / studio_model::sprite::DEFAULT_FRAMES_PER_SECOND;
    for i in 0..sprite.frames.len() {
        let elapsed = i as f32 * frame_duration;
        if sprite
            .select_frame(elapsed, studio_model::sprite::DEFAULT_FRAMES_PER_SECOND)
            .is_none()
        {
            anyhow::bail!("no image for frame {i}");
        }
    }
    check_image_sizes(&sprite)
}

fn check_image_sizes(sprite: &Sprite) -> anyhow::Result<()> {
    let images = sprite.frames.iter().flat_map(|f| match f {
        studio_model::sprite::SpriteFrame::Single(image) => std::slice::from_ref(image),
        studio_model::sprite::SpriteFrame::Group(group) => group.images.as_slice(),
    });
    for image in images {
        let expected = image.width as usize * image.height as usize;
        if image.pixels.len() != expected {
            anyhow::bail!(
                "expected {expected} pixels but found {}",
                image.pixels.len()
            );
        }
    }
    Ok(())
}
