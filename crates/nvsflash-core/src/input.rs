//! Generator input: CSV files and their row model.
//!
//! The CSV layout is the one `nvs_partition_gen` reads:
//!
//! ```text
//! key,type,encoding,value
//! # comments and blank lines are ignored
//! bonicbot,namespace,,
//! device_id,data,string,BB-0001
//! calibration,file,binary,cal.bin
//! ```
//!
//! The same [`Row`] type is accepted as JSON by the HTTP API.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NvsError;
use crate::nvs::{PartitionWriter, Version};
use crate::value::{Encoding, NvsValue};

/// Row type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    /// Opens a namespace named by `key`.
    Namespace,
    /// `value` holds the data as text in `encoding`.
    Data,
    /// `value` is a path whose contents are decoded with `encoding`.
    File,
}

impl FromStr for RowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "namespace" => Ok(Self::Namespace),
            "data" => Ok(Self::Data),
            "file" => Ok(Self::File),
            _ => Err(format!("unknown row type `{s}`")),
        }
    }
}

/// One line of generator input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: RowKind,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub value: String,
}

impl Row {
    pub fn namespace(name: impl Into<String>) -> Self {
        Self {
            key: name.into(),
            kind: RowKind::Namespace,
            encoding: String::new(),
            value: String::new(),
        }
    }

    pub fn data(key: impl Into<String>, encoding: Encoding, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RowKind::Data,
            encoding: encoding.as_str().to_string(),
            value: value.into(),
        }
    }
}

/// Partition parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub size: usize,
    pub version: Version,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            size: 0x4000,
            version: Version::V2,
        }
    }
}

/// Resolves the paths named by `file` rows.
pub trait FileSource {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Rejects every `file` row. Used where input comes from the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFiles;

impl FileSource for NoFiles {
    fn read(&self, _path: &str) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "file entries are not accepted here",
        ))
    }
}

/// Reads `file` rows relative to a base directory.
#[derive(Debug, Clone)]
pub struct DirFiles {
    base: PathBuf,
    confined: bool,
}

impl DirFiles {
    /// Only paths inside `base` are readable.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            confined: true,
        }
    }

    /// Relative paths resolve against `base`, absolute paths and `..` are
    /// allowed. For local CLI use.
    pub fn unconfined(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            confined: false,
        }
    }
}

impl FileSource for DirFiles {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let relative = Path::new(path);
        if self.confined
            && relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "path escapes the input directory",
            ));
        }
        std::fs::read(self.base.join(relative))
    }
}

/// Parse generator CSV text into rows.
///
/// Header names are matched ignoring case. Missing trailing fields read as
/// empty, so `wifi,namespace` is a complete namespace row.
pub fn parse_csv(text: &str) -> Result<Vec<Row>, NvsError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(key_col), Some(type_col)) = (column("key"), column("type")) else {
        return Err(NvsError::Csv {
            line: 1,
            message: "expected header row `key,type,encoding,value`".to_string(),
        });
    };
    let encoding_col = column("encoding");
    let value_col = column("value");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string()
        };
        let kind: RowKind = field(Some(type_col))
            .parse()
            .map_err(|message| NvsError::Csv { line, message })?;
        rows.push(Row {
            key: field(Some(key_col)),
            kind,
            encoding: field(encoding_col),
            value: field(value_col),
        });
    }
    Ok(rows)
}

/// Parse a partition size: decimal or `0x` hex.
pub fn parse_size(text: &str) -> Result<usize, NvsError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => trimmed.parse::<usize>(),
    };
    parsed.map_err(|_| NvsError::InvalidSize(text.to_string()))
}

/// Build a partition image from rows.
///
/// The first row must open a namespace.
pub fn generate(
    rows: &[Row],
    options: &GenerateOptions,
    files: &dyn FileSource,
) -> Result<Vec<u8>, NvsError> {
    let mut writer = PartitionWriter::new(options.size, options.version)?;

    for row in rows {
        match row.kind {
            RowKind::Namespace => writer.namespace(&row.key)?,
            RowKind::Data => {
                let encoding: Encoding = row.encoding.parse()?;
                let value = NvsValue::parse(&row.key, encoding, &row.value)?;
                writer.write(&row.key, &value)?;
            }
            RowKind::File => {
                let encoding: Encoding = row.encoding.parse()?;
                let contents = files.read(&row.value).map_err(|e| NvsError::File {
                    key: row.key.clone(),
                    path: row.value.clone(),
                    reason: e.to_string(),
                })?;
                let value = NvsValue::from_file(&row.key, encoding, contents)?;
                writer.write(&row.key, &value)?;
            }
        }
    }

    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvs::read_partition;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
key,type,encoding,value
# device identity
bonicbot,namespace,,
device_id,data,string,BB-0001

boots,data,u16,3
";

    #[test]
    fn test_parse_csv() {
        let rows = parse_csv(SAMPLE).unwrap();
        assert_eq!(
            rows,
            vec![
                Row::namespace("bonicbot"),
                Row::data("device_id", Encoding::String, "BB-0001"),
                Row::data("boots", Encoding::U16, "3"),
            ]
        );
    }

    #[test]
    fn test_short_namespace_row() {
        let rows = parse_csv("key,type,encoding,value\nwifi,namespace\n").unwrap();
        assert_eq!(rows, vec![Row::namespace("wifi")]);
    }

    #[test]
    fn test_header_and_type_ignore_case() {
        let rows = parse_csv("Key,Type,Encoding,Value\nwifi,NAMESPACE,,\nssid,Data,string,home\n")
            .unwrap();
        assert_eq!(
            rows,
            vec![
                Row::namespace("wifi"),
                Row::data("ssid", Encoding::String, "home"),
            ]
        );
    }

    #[test]
    fn test_missing_header() {
        let err = parse_csv("bonicbot,namespace,,\n").unwrap_err();
        assert!(matches!(err, NvsError::Csv { line: 1, .. }));
    }

    #[test]
    fn test_unknown_row_type_reports_line() {
        let err = parse_csv("key,type,encoding,value\nns,namespace,,\nx,blob,string,1\n")
            .unwrap_err();
        assert!(matches!(err, NvsError::Csv { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x4000").unwrap(), 0x4000);
        assert_eq!(parse_size(" 24576 ").unwrap(), 24576);
        assert!(matches!(parse_size("4k"), Err(NvsError::InvalidSize(_))));
    }

    #[test]
    fn test_generate_from_csv() {
        let rows = parse_csv(SAMPLE).unwrap();
        let image = generate(&rows, &GenerateOptions::default(), &NoFiles).unwrap();
        assert_eq!(image.len(), 0x4000);

        let partition = read_partition(&image).unwrap();
        assert_eq!(partition.get("bonicbot", "boots"), Some(&NvsValue::U16(3)));
    }

    #[test]
    fn test_first_row_must_be_namespace() {
        let rows = vec![Row::data("device_id", Encoding::String, "x")];
        let err = generate(&rows, &GenerateOptions::default(), &NoFiles).unwrap_err();
        assert!(matches!(err, NvsError::NoNamespace(_)));
    }

    #[test]
    fn test_file_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cal.bin"), [1u8, 2, 3]).unwrap();

        let mut rows = vec![Row::namespace("cfg")];
        rows.push(Row {
            key: "cal".to_string(),
            kind: RowKind::File,
            encoding: "binary".to_string(),
            value: "cal.bin".to_string(),
        });

        let image = generate(&rows, &GenerateOptions::default(), &DirFiles::new(dir.path())).unwrap();
        let partition = read_partition(&image).unwrap();
        assert_eq!(partition.get("cfg", "cal"), Some(&NvsValue::Blob(vec![1, 2, 3])));

        let err = generate(&rows, &GenerateOptions::default(), &NoFiles).unwrap_err();
        assert!(matches!(err, NvsError::File { .. }));
    }

    #[test]
    fn test_confined_paths() {
        let dir = tempfile::tempdir().unwrap();
        let files = DirFiles::new(dir.path());
        let err = files.read("../secret").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(files.read("/etc/hostname").is_err());
    }
}
