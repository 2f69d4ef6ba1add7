use std::{fs, path::Path};

use anyhow::{Context, Result};
use shared::config::client::{Config, ConfigFormat};

/// Writes a default configuration file into `directory`.
///
/// # Errors
/// Returns an error if the format is unsupported or if writing the file fails.
pub fn generate_config(format: &str, directory: &Path) -> Result<()> {
    let format: ConfigFormat = format.parse()?;
    let rendered = Config::with_defaults().render(format)?;
    let path = directory.join(format.file_name());

    fs::write(&path, rendered)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!(
        "Configuration file '{}' generated successfully.",
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_each_format_that_loads_back() {
        let dir = TempDir::new().unwrap();
        for format in ["yaml", "json", "toml"] {
            generate_config(format, dir.path()).unwrap();
        }

        for name in ["config.yaml", "config.json", "config.toml"] {
            let loaded = Config::from_file(&dir.path().join(name)).unwrap();
            assert_eq!(loaded.api, Config::with_defaults().api);
        }
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        assert!(generate_config("ini", dir.path()).is_err());
    }
}
