use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_SHARDS;

const PROJECT_FILE: &str = ".memcloadrc";

/// Configuration file handler for memcload
#[derive(Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub defaults: Option<String>,
    pub shards: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Find project-level .memcloadrc by walking up from the current directory
    pub fn find_project_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_config_from(&current)
    }

    pub fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_FILE))
            .find(|path| path.is_file())
    }

    /// User config file locations in order of preference:
    /// `<config dir>/memcload/config.ini`, then `~/.memcloadrc`
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("memcload").join("config.ini"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(PROJECT_FILE));
        }
        paths
    }

    /// Load configuration with precedence: project > user > defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::get_user_config_paths().into_iter().find(|p| p.is_file()) {
            config = Self::merge_configs(config, Self::load_from_path(&path)?);
        }

        if let Some(project_path) = Self::find_project_config() {
            config = Self::merge_configs(config, Self::load_from_path(&project_path)?);
        }

        Ok(config)
    }

    /// Load configuration with optional custom config file path
    pub fn load_with_custom_path(custom_path: Option<&str>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(Path::new(path)),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Ok(Self::parse_ini_content(&content))
    }

    fn parse_ini_content(content: &str) -> Self {
        let mut config = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match current_section.as_str() {
                "" if key == "defaults" => config.defaults = Some(value.to_string()),
                "shards" => {
                    config.shards.insert(key.to_string(), value.to_string());
                }
                // Unknown keys and sections are ignored
                _ => {}
            }
        }

        config
    }

    /// Merge two configurations, the overlay taking precedence
    fn merge_configs(base: Self, overlay: Self) -> Self {
        let mut shards = base.shards;
        shards.extend(overlay.shards);
        Self {
            defaults: overlay.defaults.or(base.defaults),
            shards,
        }
    }

    /// Shards as command-line arguments.
    ///
    /// Device types with their own flag use it (`--idfa ADDR`); anything
    /// else becomes `--shard TYPE=ADDR`.
    pub fn shard_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (dev_type, addr) in &self.shards {
            if DEFAULT_SHARDS.iter().any(|(named, _)| named == dev_type) {
                args.push(format!("--{}", dev_type));
                args.push(addr.clone());
            } else {
                args.push("--shard".to_string());
                args.push(format!("{}={}", dev_type, addr));
            }
        }
        args
    }

    /// Prepend config file shards and defaults to the user's arguments.
    ///
    /// The program name stays first; arguments given on the command line
    /// come last so they win.
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>> {
        let mut args = args.into_iter();
        let mut result: Vec<String> = args.next().into_iter().collect();

        result.extend(self.shard_args());

        if let Some(defaults) = &self.defaults {
            let default_args =
                shell_words::split(defaults).context("Invalid defaults: failed to parse arguments")?;
            result.extend(default_args);
        }

        result.extend(args);
        Ok(result)
    }

    /// Show configuration information with precedence details
    pub fn show_config() {
        println!("Configuration precedence: CLI > project .memcloadrc > user config > defaults\n");

        let project_config_path = Self::find_project_config();
        let user_config_paths = Self::get_user_config_paths();
        let user_config_path = user_config_paths.iter().find(|p| p.is_file());

        match Self::load() {
            Ok(merged) => {
                let mut loaded_from = Vec::new();
                if let Some(path) = &project_config_path {
                    loaded_from.push(format!("Project: {}", path.display()));
                }
                if let Some(path) = user_config_path {
                    loaded_from.push(format!("User: {}", path.display()));
                }

                if loaded_from.is_empty() {
                    println!("No configuration files found. Using defaults.");
                } else {
                    println!("Configuration loaded from:");
                    for source in loaded_from {
                        println!("  {}", source);
                    }
                }

                if let Some(defaults) = &merged.defaults {
                    println!("\nActive defaults:");
                    println!("  defaults = {}", defaults);
                }

                if !merged.shards.is_empty() {
                    println!("\nActive shards:");
                    for (dev_type, addr) in &merged.shards {
                        println!("  {} = {}", dev_type, addr);
                    }
                }
            }
            Err(e) => eprintln!("Error loading configuration: {:#}", e),
        }

        println!("\nConfiguration search locations (in precedence order):");
        match &project_config_path {
            Some(path) => println!("  1. Project: {} (found)", path.display()),
            None => println!("  1. Project: .memcloadrc (searched up directory tree, not found)"),
        }
        for (i, path) in user_config_paths.iter().enumerate() {
            let status = if path.is_file() { "(found)" } else { "(not found)" };
            println!("  {}. User: {} {}", i + 2, path.display(), status);
        }

        if project_config_path.is_none() && user_config_path.is_none() {
            println!("\nExample configuration file (.memcloadrc):");
            println!();
            println!("# Arguments applied to every memcload run");
            println!("defaults = --pattern '/data/appsinstalled/*.tsv.gz' --workers 8 --stats");
            println!();
            println!("[shards]");
            println!("idfa = 10.0.0.1:11211");
            println!("gaid = 10.0.0.2:11211");
            println!("oaid = 10.0.0.5:11211");
        }
    }
}
