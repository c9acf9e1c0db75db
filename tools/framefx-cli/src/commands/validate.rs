//! Validate an instruction track file.

use std::path::PathBuf;

use framefx_composition_model::InstructionTrack;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating track at: {}", path.display());

    let track = InstructionTrack::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load track: {e}"))?;

    println!("  Instructions: {}", track.len());
    println!(
        "  Duration: {:.3}s",
        framefx_common::clock::ns_to_secs(track.duration_ns())
    );
    for instruction in track.iter() {
        let filter = instruction.filter().unwrap_or("(passthrough)");
        println!(
            "  {} {} {} ({} parameter override(s))",
            instruction.time_range,
            instruction.source_track_id,
            filter,
            instruction.parameters.len()
        );
    }

    println!("\nTrack is valid.");
    Ok(())
}
