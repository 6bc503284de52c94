//! ESP Web Tools manifest.
//!
//! The browser flashing widget fetches `manifest.json` and then each part it
//! lists, resolving relative paths against the manifest's own URL:
//!
//! ```json
//! {
//!   "name": "BonicBot",
//!   "version": "1.2.0",
//!   "new_install_prompt_erase": true,
//!   "builds": [
//!     { "chipFamily": "ESP32-S3", "parts": [{ "path": "firmware.bin", "offset": 0 }] }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chip families the widget knows how to flash.
pub const CHIP_FAMILIES: &[&str] = &[
    "ESP32", "ESP32-C2", "ESP32-C3", "ESP32-C5", "ESP32-C6", "ESP32-H2", "ESP32-P4", "ESP32-S2",
    "ESP32-S3", "ESP8266",
];

/// Errors loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_assistant_domain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_install_prompt_erase: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_install_improv_wait_time: Option<u32>,

    pub builds: Vec<Build>,
}

/// Images for one chip family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub chip_family: String,
    pub parts: Vec<Part>,
}

/// One image and its flash offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub path: String,
    pub offset: u32,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Problems that would make the widget refuse or misflash the manifest.
    /// Empty when the manifest is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push("name is empty".to_string());
        }
        if self.version.trim().is_empty() {
            issues.push("version is empty".to_string());
        }
        if self.builds.is_empty() {
            issues.push("no builds listed".to_string());
        }

        let mut families = HashSet::new();
        for (i, build) in self.builds.iter().enumerate() {
            if !CHIP_FAMILIES.contains(&build.chip_family.as_str()) {
                issues.push(format!(
                    "builds[{i}]: unknown chipFamily `{}`",
                    build.chip_family
                ));
            }
            if !families.insert(build.chip_family.as_str()) {
                issues.push(format!(
                    "builds[{i}]: chipFamily `{}` listed twice",
                    build.chip_family
                ));
            }
            if build.parts.is_empty() {
                issues.push(format!("builds[{i}]: no parts"));
            }

            let mut offsets = HashSet::new();
            for (j, part) in build.parts.iter().enumerate() {
                if part.path.trim().is_empty() {
                    issues.push(format!("builds[{i}].parts[{j}]: path is empty"));
                }
                if !offsets.insert(part.offset) {
                    issues.push(format!(
                        "builds[{i}].parts[{j}]: offset {:#x} used twice",
                        part.offset
                    ));
                }
            }
        }

        issues
    }

    /// Part paths served from next to the manifest (absolute URLs skipped),
    /// without duplicates.
    pub fn local_parts(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for part in self.builds.iter().flat_map(|b| &b.parts) {
            let path = part.path.as_str();
            let remote = path.contains("://") || path.starts_with("//");
            if !remote && !path.is_empty() && !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "name": "BonicBot",
        "version": "1.0.0",
        "new_install_prompt_erase": true,
        "builds": [
            {
                "chipFamily": "ESP32-S3",
                "parts": [
                    { "path": "firmware.bin", "offset": 0 },
                    { "path": "https://cdn.example.com/extra.bin", "offset": 65536 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.builds[0].chip_family, "ESP32-S3");
        assert_eq!(manifest.new_install_prompt_erase, Some(true));
        assert!(manifest.validate().is_empty());
        assert_eq!(manifest.local_parts(), vec!["firmware.bin"]);
    }

    #[test]
    fn test_serializes_camel_case_chip_family() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["builds"][0]["chipFamily"], "ESP32-S3");
        assert!(json.get("funding_url").is_none());
    }

    #[test]
    fn test_validation_issues() {
        let manifest = Manifest {
            name: "".to_string(),
            version: "1".to_string(),
            home_assistant_domain: None,
            funding_url: None,
            new_install_prompt_erase: None,
            new_install_improv_wait_time: None,
            builds: vec![
                Build {
                    chip_family: "ESP32".to_string(),
                    parts: vec![
                        Part { path: "a.bin".to_string(), offset: 0x1000 },
                        Part { path: "b.bin".to_string(), offset: 0x1000 },
                    ],
                },
                Build {
                    chip_family: "RP2040".to_string(),
                    parts: vec![],
                },
            ],
        };

        assert_eq!(
            manifest.validate(),
            vec![
                "name is empty".to_string(),
                "builds[0].parts[1]: offset 0x1000 used twice".to_string(),
                "builds[1]: unknown chipFamily `RP2040`".to_string(),
                "builds[1]: no parts".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_builds_is_parse_error() {
        assert!(Manifest::from_json(r#"{"name":"x","version":"1"}"#).is_err());
    }
}
