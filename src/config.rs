//! Configuration
//!
//! The daemon is configured by an INI-style file:
//!
//! ```text
//! [camwarden]
//! log_level: info          # quiet | info | debug | dev
//! delete_log: false
//! no_proxy: false
//! on_shutdown: leave       # leave | terminate
//!
//! [cam front]
//! mode: ustreamer
//! port: 8080
//! device: /dev/v4l/by-id/usb-Vendor_Camera-video-index0
//! resolution: 1280x720
//! max_fps: 30
//! v4l2ctl: brightness=128,focus_absolute=30
//! custom_flags: --quality 90
//! ```
//!
//! Parsing produces [`RawSection`]s; [`CamSettings::from_section`] then
//! validates one `[cam ...]` section into typed settings.

use crate::error::{CamError, Result};
use crate::logging::{LogLevel, SectionLogger};
use crate::streamer::StreamerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Name of the mandatory global section
pub const GLOBAL_SECTION: &str = "camwarden";

/// Keyword of camera sections: `[cam <name>]`
pub const CAM_KEYWORD: &str = "cam";

/// One `[header]` block with its keys in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub header: String,
    pub entries: Vec<(String, String)>,
}

impl RawSection {
    /// First word of the header (`cam` in `[cam front]`)
    pub fn keyword(&self) -> &str {
        self.header.split_whitespace().next().unwrap_or("")
    }

    /// Remainder of the header (`front` in `[cam front]`)
    pub fn name(&self) -> String {
        self.header
            .split_whitespace()
            .skip(1)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse INI text into sections
///
/// Accepts `key: value` and `key = value`, full-line `#`/`;` comments and
/// inline ` #` comments. Keys are lower-cased. Indented lines continue the
/// previous value.
pub fn parse_ini(text: &str) -> Result<Vec<RawSection>> {
    let mut sections: Vec<RawSection> = Vec::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = strip_inline_comment(raw_line);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') {
            let header = trimmed
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .ok_or_else(|| {
                    CamError::config(format!("line {}: malformed section header", lineno + 1))
                })?;
            sections.push(RawSection {
                header: header.trim().to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            return Err(CamError::config(format!(
                "line {}: key outside of any section",
                lineno + 1
            )));
        };

        if line.starts_with(char::is_whitespace) {
            if let Some((_, value)) = section.entries.last_mut() {
                value.push(' ');
                value.push_str(trimmed);
                continue;
            }
        }

        let split = trimmed
            .find([':', '='])
            .ok_or_else(|| CamError::config(format!("line {}: expected 'key: value'", lineno + 1)))?;
        let key = trimmed[..split].trim().to_ascii_lowercase();
        let value = trimmed[split + 1..].trim().to_string();
        section.entries.push((key, value));
    }

    Ok(sections)
}

fn strip_inline_comment(line: &str) -> &str {
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Boolean in the spellings config files commonly use
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        other => Err(CamError::config(format!("'{}' is not a boolean", other))),
    }
}

/// `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CamError::config(format!("'{}' is not of format '<width>x<height>'!", s));
        let (w, h) = s.trim().split_once('x').ok_or_else(invalid)?;
        Ok(Self {
            width: w.trim().parse().map_err(|_| invalid())?,
            height: h.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What happens to running streamer processes when the daemon shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave streamer processes running
    #[default]
    Leave,
    /// Kill streamer processes still running at shutdown
    Terminate,
}

impl FromStr for OrphanPolicy {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leave" => Ok(OrphanPolicy::Leave),
            "terminate" => Ok(OrphanPolicy::Terminate),
            other => Err(CamError::config(format!(
                "on_shutdown must be 'leave' or 'terminate', got '{}'",
                other
            ))),
        }
    }
}

/// Global `[camwarden]` settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DaemonSettings {
    pub log_level: LogLevel,
    pub delete_log: bool,
    pub no_proxy: bool,
    pub on_shutdown: OrphanPolicy,
}

impl DaemonSettings {
    pub fn from_section(section: &RawSection) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(level) = section.get("log_level") {
            settings.log_level = level.parse()?;
        }
        if let Some(value) = section.get("delete_log") {
            settings.delete_log = parse_bool(value)?;
        }
        if let Some(value) = section.get("no_proxy") {
            settings.no_proxy = parse_bool(value)?;
        }
        if let Some(value) = section.get("on_shutdown") {
            settings.on_shutdown = value.parse()?;
        }
        Ok(settings)
    }
}

/// Validated `[cam <name>]` settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamSettings {
    pub name: String,
    pub mode: StreamerKind,
    pub port: u16,
    pub device: String,
    pub resolution: Resolution,
    pub max_fps: u32,
    pub no_proxy: bool,
    pub custom_flags: String,
    pub v4l2ctl: String,
}

impl CamSettings {
    const KNOWN_KEYS: [&'static str; 8] = [
        "mode",
        "port",
        "device",
        "resolution",
        "max_fps",
        "no_proxy",
        "custom_flags",
        "v4l2ctl",
    ];

    /// Validate one camera section
    ///
    /// Unknown keys are logged and ignored. A missing or malformed
    /// required key fails the whole section.
    pub fn from_section(section: &RawSection, daemon: &DaemonSettings) -> Result<Self> {
        let log = SectionLogger::new(format!("[{}]", section.header));
        for (key, _) in &section.entries {
            if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                log.warn(format!("Parameter '{}' is not supported!", key));
            }
        }

        let invalid = |key: &str, value: &str| {
            CamError::config(format!(
                "[{}]: Parameter '{}' has invalid value '{}'",
                section.header, key, value
            ))
        };

        let mode = required(section, "mode")?;
        let port = required(section, "port")?;
        let max_fps = required(section, "max_fps")?;
        let resolution = required(section, "resolution")?;

        Ok(Self {
            name: section.name(),
            mode: mode.parse().map_err(|_| invalid("mode", mode))?,
            port: port.parse().map_err(|_| invalid("port", port))?,
            device: required(section, "device")?.to_string(),
            resolution: resolution.parse()?,
            max_fps: max_fps.parse().map_err(|_| invalid("max_fps", max_fps))?,
            no_proxy: match section.get("no_proxy") {
                Some(v) => parse_bool(v)?,
                None => daemon.no_proxy,
            },
            custom_flags: section.get("custom_flags").unwrap_or("").to_string(),
            v4l2ctl: section.get("v4l2ctl").unwrap_or("").to_string(),
        })
    }

    /// Section label used in log prefixes
    pub fn section_label(&self) -> String {
        format!("[{} {}]", CAM_KEYWORD, self.name)
    }
}

fn required<'a>(section: &'a RawSection, key: &str) -> Result<&'a str> {
    section.get(key).filter(|v| !v.is_empty()).ok_or_else(|| {
        CamError::config(format!(
            "[{}]: Parameter '{}' incorrectly set or missing but is required!",
            section.header, key
        ))
    })
}

/// Parsed config file
#[derive(Debug, Clone)]
pub struct Config {
    pub daemon: DaemonSettings,
    /// Every non-global section, unvalidated, in file order
    pub sections: Vec<RawSection>,
}

impl Config {
    /// Parse config text; a missing or invalid global section is fatal
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections = parse_ini(text)?;
        let global = sections
            .iter()
            .position(|s| s.header == GLOBAL_SECTION)
            .ok_or_else(|| {
                CamError::config(format!("Missing '[{}]' section", GLOBAL_SECTION))
            })?;
        let global = sections.remove(global);
        Ok(Self {
            daemon: DaemonSettings::from_section(&global)?,
            sections,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CamError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[camwarden]
log_level: debug
no_proxy: true   # applies to every cam

[cam front]
mode: ustreamer
port: 8080
device: /dev/video0
resolution: 1280x720
max_fps: 30
v4l2ctl: brightness=128
custom_flags: --quality 90
";

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.daemon.log_level, LogLevel::Debug);
        assert!(config.daemon.no_proxy);
        assert_eq!(config.sections.len(), 1);
        assert_eq!(config.sections[0].keyword(), "cam");
        assert_eq!(config.sections[0].name(), "front");

        let cam = CamSettings::from_section(&config.sections[0], &config.daemon).unwrap();
        assert_eq!(cam.mode, StreamerKind::Ustreamer);
        assert_eq!(cam.port, 8080);
        assert_eq!(cam.resolution, Resolution { width: 1280, height: 720 });
        assert_eq!(cam.max_fps, 30);
        assert!(cam.no_proxy);
        assert_eq!(cam.v4l2ctl, "brightness=128");
        assert_eq!(cam.custom_flags, "--quality 90");
        assert_eq!(cam.section_label(), "[cam front]");
    }

    #[test]
    fn test_missing_global_section_is_fatal() {
        let err = Config::parse("[cam front]\nmode: ustreamer\n").unwrap_err();
        assert!(matches!(err, CamError::Config(_)));
    }

    #[test]
    fn test_missing_required_key() {
        let sections = parse_ini("[cam front]\nmode: ustreamer\nport: 8080\n").unwrap();
        let err = CamSettings::from_section(&sections[0], &DaemonSettings::default()).unwrap_err();
        assert!(err.to_string().contains("max_fps"));
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!(
            "640x480".parse::<Resolution>().unwrap().to_string(),
            "640x480"
        );
        assert!("640".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_orphan_policy() {
        assert_eq!("terminate".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Terminate);
        assert!("kill".parse::<OrphanPolicy>().is_err());
        assert_eq!(OrphanPolicy::default(), OrphanPolicy::Leave);
    }

    #[test]
    fn test_continuation_lines() {
        let sections = parse_ini("[cam a]\ncustom_flags: --one\n    --two\n").unwrap();
        assert_eq!(sections[0].get("custom_flags"), Some("--one --two"));
    }
}
