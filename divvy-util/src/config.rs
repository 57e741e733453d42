//! Configuration resolution: command-line options override environment variables,
//! which override a TOML config file found via the XDG base directory spec.
//!
//! This is a smaller cousin of the config-bag pattern used elsewhere for CLI tools in
//! this family — same precedence order and the same per-field command-line / env /
//! TOML key derivation, trimmed down to the handful of knobs a dispatch run actually
//! takes.

use anyhow::{Context as _, Result};
use clap::ArgMatches;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use toml::Table;
use xdg::BaseDirectories;

pub struct ConfigBag {
    args: ArgMatches,
    env_prefix: String,
    env: HashMap<String, String>,
    file: Option<(PathBuf, Table)>,
}

impl ConfigBag {
    /// Build a bag from parsed CLI matches, process environment variables, and the
    /// first `config.toml` found under the XDG config directories for `app_prefix`.
    pub fn load(args: ArgMatches, env_prefix: &str, app_prefix: &str) -> Result<Self> {
        let prefixed = format!("{env_prefix}_");
        let env = std::env::vars()
            .filter(|(k, _)| k.starts_with(&prefixed))
            .collect();

        let file = if let Ok(dirs) = BaseDirectories::with_prefix(app_prefix) {
            dirs.find_config_file("config.toml").and_then(|path| {
                fs::read_to_string(&path)
                    .ok()
                    .and_then(|contents| contents.parse::<Table>().ok())
                    .map(|table| (path, table))
            })
        } else {
            None
        };

        Ok(Self {
            args,
            env_prefix: prefixed,
            env,
            file,
        })
    }

    #[cfg(test)]
    fn from_parts(
        args: ArgMatches,
        env_prefix: &str,
        env: impl IntoIterator<Item = (String, String)>,
        toml_contents: Option<&str>,
    ) -> Result<Self> {
        let file = toml_contents
            .map(|c| c.parse::<Table>().map(|t| (PathBuf::from("<test>"), t)))
            .transpose()?;
        Ok(Self {
            args,
            env_prefix: format!("{env_prefix}_"),
            env: env.into_iter().collect(),
            file,
        })
    }

    fn env_key(&self, field: &str) -> String {
        self.env_prefix
            .chars()
            .chain(field.chars())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    fn toml_key(field: &str) -> String {
        field.chars().map(|c| if c == '_' { '-' } else { c }).collect()
    }

    /// Resolve a value-bearing field: command-line option, then environment
    /// variable, then config file key, trying each in that order.
    pub fn get<T>(&self, field: &str) -> Result<Option<T>>
    where
        T: FromStr + for<'a> Deserialize<'a>,
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        if let Some(raw) = self.args.get_one::<String>(field) {
            return Ok(Some(T::from_str(raw).with_context(|| {
                format!("parsing command-line option `--{field}`")
            })?));
        }

        let env_key = self.env_key(field);
        if let Some(raw) = self.env.get(&env_key) {
            return Ok(Some(T::from_str(raw).with_context(|| {
                format!("parsing environment variable `{env_key}`")
            })?));
        }

        if let Some((path, table)) = &self.file {
            let toml_key = Self::toml_key(field);
            if let Some(value) = table.get(&toml_key) {
                return T::deserialize(value.clone())
                    .map(Some)
                    .with_context(|| {
                        format!(
                            "parsing key `{toml_key}` in config file `{}`",
                            path.to_string_lossy()
                        )
                    });
            }
        }

        Ok(None)
    }

    pub fn get_or<T>(&self, field: &str, default: T) -> Result<T>
    where
        T: FromStr + for<'a> Deserialize<'a>,
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        Ok(self.get(field)?.unwrap_or(default))
    }

    /// Resolve a boolean flag. A `clap` flag only counts when it was actually passed
    /// (not merely defaulted), so that an env var or config file entry underneath it
    /// can still take effect when the flag is absent from the command line.
    pub fn get_flag(&self, field: &str) -> Result<Option<bool>> {
        if self.args.get_flag(field) {
            return Ok(Some(true));
        }

        let env_key = self.env_key(field);
        if let Some(raw) = self.env.get(&env_key) {
            return Ok(Some(bool::from_str(raw).with_context(|| {
                format!("parsing environment variable `{env_key}`")
            })?));
        }

        if let Some((path, table)) = &self.file {
            let toml_key = Self::toml_key(field);
            if let Some(value) = table.get(&toml_key) {
                return bool::deserialize(value.clone()).map(Some).with_context(|| {
                    format!(
                        "parsing key `{toml_key}` in config file `{}`",
                        path.to_string_lossy()
                    )
                });
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};

    fn matches(args: &[&str]) -> ArgMatches {
        Command::new("test")
            .arg(Arg::new("workers").long("workers").action(ArgAction::Set))
            .arg(Arg::new("verbose").long("verbose").action(ArgAction::SetTrue))
            .get_matches_from(args)
    }

    #[test]
    fn command_line_wins_over_env_and_file() {
        let bag = ConfigBag::from_parts(
            matches(&["test", "--workers=4"]),
            "divvy",
            [("DIVVY_WORKERS".to_string(), "9".to_string())],
            Some("workers = 2"),
        )
        .unwrap();
        assert_eq!(bag.get::<u32>("workers").unwrap(), Some(4));
    }

    #[test]
    fn env_wins_over_file() {
        let bag = ConfigBag::from_parts(
            matches(&["test"]),
            "divvy",
            [("DIVVY_WORKERS".to_string(), "9".to_string())],
            Some("workers = 2"),
        )
        .unwrap();
        assert_eq!(bag.get::<u32>("workers").unwrap(), Some(9));
    }

    #[test]
    fn falls_through_to_file() {
        let bag =
            ConfigBag::from_parts(matches(&["test"]), "divvy", [], Some("workers = 2")).unwrap();
        assert_eq!(bag.get::<u32>("workers").unwrap(), Some(2));
    }

    #[test]
    fn missing_everywhere_is_none() {
        let bag = ConfigBag::from_parts(matches(&["test"]), "divvy", [], None).unwrap();
        assert_eq!(bag.get::<u32>("workers").unwrap(), None);
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let bag = ConfigBag::from_parts(matches(&["test"]), "divvy", [], None).unwrap();
        assert_eq!(bag.get_or::<u32>("workers", 1).unwrap(), 1);
    }

    #[test]
    fn flag_true_on_command_line() {
        let bag =
            ConfigBag::from_parts(matches(&["test", "--verbose"]), "divvy", [], None).unwrap();
        assert_eq!(bag.get_flag("verbose").unwrap(), Some(true));
    }

    #[test]
    fn flag_falls_through_to_env_when_absent_from_command_line() {
        let bag = ConfigBag::from_parts(
            matches(&["test"]),
            "divvy",
            [("DIVVY_VERBOSE".to_string(), "true".to_string())],
            None,
        )
        .unwrap();
        assert_eq!(bag.get_flag("verbose").unwrap(), Some(true));
    }
}
