use std::path::Path;

use anyhow::Context;
use so_core::config::Config;

/// Print the effective configuration: the file at `path`, or the defaults.
pub fn show(path: &Path) -> anyhow::Result<()> {
    let config = if path.exists() {
        Config::load_from(path)?
    } else {
        println!("# {} does not exist; showing defaults", path.display());
        Config::default()
    };
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Write the default configuration to `path`.
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    std::fs::write(path, Config::default().to_toml()?)
        .with_context(|| format!("Could not write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
