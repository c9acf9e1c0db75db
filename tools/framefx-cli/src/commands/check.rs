//! Report which rendering backend the engine would use.

use framefx_common::config::{config_file_path, AppConfig};
use framefx_render_engine::{RenderingContext, SoftwareBackendFactory};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("framefx System Check");
    println!("{}", "=".repeat(50));
    println!("Config file: {}", config_file_path().display());
    println!("  Backend preference: {:?}", config.engine.backend);
    println!(
        "  Worker: {} ({})",
        config.engine.worker_name,
        config.engine.worker_priority.as_str()
    );

    // No hardware backend ships with the CLI; hosts register their own.
    match RenderingContext::build(config.engine.backend, None, &SoftwareBackendFactory) {
        Ok(ctx) => println!(
            "[OK] Rendering backend: {} ({})",
            ctx.backend_name(),
            ctx.backend_kind()
        ),
        Err(e) => println!("[FAIL] No rendering backend: {e}"),
    }

    match super::load_catalog(config, None) {
        Ok(catalog) => println!("[OK] Filter catalog: {} filter(s)", catalog.len()),
        Err(e) => println!("[FAIL] {e}"),
    }

    Ok(())
}
