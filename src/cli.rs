use crate::config::ViewerConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;

pub const DEFAULT_CONFIG_PATH: &str = "assets/config/viewer.json";

/// Command-line overrides for the viewer. Flags are `--config <path>`,
/// `--width <px>`, `--height <px>`, `--vsync <on|off>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config_path: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --config/--width/--height/--vsync with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config_path = Some(value),
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: --config, --width, --height, --vsync."),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> &str {
        self.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }

    pub fn into_config_overrides(self) -> ViewerConfigOverrides {
        ViewerConfigOverrides { width: self.width, height: self.height, vsync: self.vsync }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = ["vitrine", "--config", "custom.json", "--width", "1600", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.config_path(), "custom.json");
        let config = overrides.into_config_overrides();
        assert_eq!(config.width, Some(1600));
        assert_eq!(config.vsync, Some(false));
    }

    #[test]
    fn default_config_path_applies() {
        let overrides = CliOverrides::parse(["vitrine"]).expect("parse");
        assert_eq!(overrides.config_path(), DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["vitrine", "--width"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"));
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = CliOverrides::parse(["vitrine", "--mirror", "on"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"));
    }
}
