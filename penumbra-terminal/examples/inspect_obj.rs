/// Example: Print the materials and draw batches of an OBJ file
///
/// Usage: cargo run --example inspect_obj -- path/to/model.obj [scale]
use std::env;
use std::path::Path;

use anyhow::Context;
use penumbra_core::model::{plan_batches, Layer};
use penumbra_core::MeshAsset;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let Some(path) = args.get(1).map(Path::new) else {
        eprintln!("Usage: {} <obj-file> [scale]", args[0]);
        return Ok(());
    };
    let scale = match args.get(2) {
        Some(value) => value.parse().context("scale must be a number")?,
        None => 1.0,
    };

    let search_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let asset = MeshAsset::load(path, scale, search_dir)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    println!(
        "{}: {} vertices, {} faces",
        path.display(),
        asset.vertices().len(),
        asset.faces().len()
    );
    for material in asset.materials().iter() {
        println!(
            "  material {:<20} dissolve {:.2} {}",
            material.name,
            material.dissolve,
            material.diffuse_texture.as_ref().map(|t| t.display().to_string()).unwrap_or_default()
        );
    }

    for batch in plan_batches(asset.faces(), asset.materials()) {
        let layer = match batch.layer {
            Layer::Opaque => "opaque",
            Layer::Transparent => "transparent",
        };
        let material = batch
            .material
            .and_then(|index| asset.materials().get(index))
            .map(|m| m.name.as_str())
            .unwrap_or("<none>");
        let end = batch.first + batch.count;
        println!("  {:<11} {:>7}..{:<7} {}", layer, batch.first, end, material);
    }

    Ok(())
}
