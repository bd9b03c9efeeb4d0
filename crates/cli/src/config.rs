//! Configuration commands.
//!
//! Configuration is loaded from TOML files and merged with environment variables
//! prefixed with `FORUM_ADS__`. For example, `FORUM_ADS__ENGINE__HOOK_NAME`
//! will override `engine.hook_name` in the TOML file.

use std::fs;
use std::path::Path;

use forum_ads_common::settings::Settings;

use crate::error::CliError;

/// Load a TOML file, merge environment overrides and validate the result.
///
/// Returns the settings together with their merged TOML rendering.
pub(crate) fn load_and_merge_config(file: &Path) -> Result<(Settings, String), CliError> {
    let content = fs::read_to_string(file)?;
    log::debug!("Loading config from: {}", file.display());

    let settings = Settings::from_toml(&content)
        .map_err(|e| CliError::Config(format!("Failed to parse and merge config: {e:?}")))?;

    let merged_toml = settings
        .to_toml()
        .map_err(|e| CliError::Config(format!("Failed to serialize merged config: {e:?}")))?;

    Ok((settings, merged_toml))
}

/// Settings from `file`, or the defaults when no file is given.
pub(crate) fn load_or_default(file: Option<&Path>) -> Result<Settings, CliError> {
    match file {
        Some(file) => load_and_merge_config(file).map(|(settings, _)| settings),
        None => Ok(Settings::default()),
    }
}

/// Validate a configuration file and describe what it configures.
pub fn validate(file: &Path, verbose: bool) -> Result<String, CliError> {
    let (settings, merged_toml) = load_and_merge_config(file)?;

    let mut report = format!(
        "Configuration is valid\n  File: {}\n  Hook: {}\n  Registry key: {}\n",
        file.display(),
        settings.engine.hook_name,
        settings.engine.registry_key,
    );

    if verbose {
        let value: toml::Value = toml::from_str(&merged_toml)?;
        if let Some(table) = value.as_table() {
            report.push_str("\nSections found:\n");
            for key in table.keys() {
                report.push_str(&format!("  - [{key}]\n"));
            }
        }
        report.push_str("\nMerged configuration:\n---\n");
        report.push_str(&merged_toml);
        report.push_str("---\n");
    }

    Ok(report)
}
