//! List the filter catalog.

use std::path::PathBuf;

use framefx_common::config::AppConfig;

pub fn run(config: &AppConfig, catalog: Option<PathBuf>) -> anyhow::Result<()> {
    let catalog = super::load_catalog(config, catalog)?;

    println!("Filters ({})", catalog.len());
    println!("{}", "=".repeat(50));
    for descriptor in catalog.iter() {
        println!(
            "{:<12} {:<20} kernel: {}",
            descriptor.id, descriptor.display_name, descriptor.backend_name
        );
        for (name, value) in &descriptor.defaults {
            println!("     {name} = {value}");
        }
    }

    Ok(())
}
