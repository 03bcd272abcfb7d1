use std::path::PathBuf;

use log::info;
use volume_prep::{
    Result,
    enums::{Interpolation, Orientation},
    io::save_file,
    volume::{DEFAULT_SLICE_SIZE, slice_stem},
    volume_loader::VolumeLoader,
};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().unwrap_or_else(|| "scan.nii.gz".to_string()));
    let outdir = PathBuf::from(args.next().unwrap_or_else(|| "slices".to_string()));
    std::fs::create_dir_all(&outdir)?;

    let volume = VolumeLoader::load_from_file(&input)?;
    info!("Loaded {:?} with spacing {:?}", volume.dim(), volume.spacing());

    let middle = volume.dim().1 / 2;
    if let Some(preview) =
        volume.get_image_from_axis(middle, Orientation::Coronal, Interpolation::Linear)
    {
        let path = outdir.join("preview.png");
        if let Err(e) = preview.save(&path) {
            log::warn!("could not write {}: {e}", path.display());
        }
    }

    let written = volume.deconstruct(&input, &outdir, DEFAULT_SLICE_SIZE, DEFAULT_SLICE_SIZE)?;
    info!("Wrote {} slices to {}", written.len(), outdir.display());

    let stem = slice_stem(&input);
    let rebuilt = VolumeLoader::reconstruct_like(&stem, &outdir, &volume)?;
    let target = outdir.join(format!("{stem}_reconstructed.nii.gz"));
    save_file(&target, rebuilt.data.view().into_dyn(), rebuilt.header())?;
    Ok(())
}
