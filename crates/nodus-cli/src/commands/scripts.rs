//! List task scripts.

use super::load_catalog;
use nodus_core::Config;

pub fn run(config: Config) -> anyhow::Result<()> {
    let catalog = load_catalog(&config)?;
    println!("{}", catalog.dir().display());
    for name in catalog.names() {
        println!("  {}", name);
    }
    Ok(())
}
