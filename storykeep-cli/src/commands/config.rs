use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use shared::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    fn default_file_name(self) -> &'static str {
        match self {
            Self::Yaml => "storykeep.yaml",
            Self::Json => "storykeep.json",
            Self::Toml => "storykeep.toml",
        }
    }
}

/// Writes a configuration file holding every default, ready to be edited.
///
/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(format: ConfigFormat, output: Option<&Path>) -> Result<()> {
    let config = Config::with_defaults();
    let path = output.map_or_else(|| PathBuf::from(format.default_file_name()), Path::to_path_buf);

    let serialized = match format {
        ConfigFormat::Yaml => serde_yml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
    };

    let mut file = fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(serialized.as_bytes())?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(())
}
