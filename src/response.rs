use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, StorageError};

/// Timestamp format used in JSON listings (no zone designator, always UTC)
const LISTING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One entry of a container listing.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Object path within the container, with leading slash
    pub path: String,
    /// MIME type reported by the server (empty for pseudo-directories)
    pub content_type: String,
    /// Object size in bytes
    pub bytes: u64,
    /// Content hash as hex digest
    pub hash: String,
    /// Last modification time; absent for pseudo-directories
    pub last_modified: Option<DateTime<Utc>>,
}

/// Raw listing entry as returned by the server. Pseudo-directory rows
/// produced by a delimiter query carry `subdir` instead of `name`.
#[derive(Debug, Deserialize)]
struct RawEntry {
    name: Option<String>,
    subdir: Option<String>,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    last_modified: String,
}

impl ObjectEntry {
    fn from_raw(raw: RawEntry) -> Result<Option<Self>> {
        match (raw.name, raw.subdir) {
            (Some(name), _) => {
                let stamp =
                    NaiveDateTime::parse_from_str(&raw.last_modified, LISTING_TIME_FORMAT)?;
                Ok(Some(ObjectEntry {
                    path: format!("/{}", name),
                    content_type: raw.content_type,
                    bytes: raw.bytes,
                    hash: raw.hash,
                    last_modified: Some(stamp.and_utc()),
                }))
            }
            (None, Some(subdir)) => Ok(Some(ObjectEntry {
                path: format!("/{}", subdir),
                content_type: raw.content_type,
                bytes: raw.bytes,
                hash: raw.hash,
                last_modified: None,
            })),
            (None, None) => {
                warn!("listing entry carries neither name nor subdir, skipping");
                Ok(None)
            }
        }
    }
}

/// Parse a JSON listing body. `path` is the already-stripped path filter the
/// request was sent with: an empty path means a delimiter was requested, and
/// the pseudo-directory rows it produces are dropped so only direct objects
/// remain.
pub(crate) fn parse_listing(body: &[u8], path: Option<&str>) -> Result<Vec<ObjectEntry>> {
    let raw: Vec<RawEntry> = serde_json::from_slice(body)?;
    let mut entries = Vec::with_capacity(raw.len());
    for entry in raw {
        if path == Some("") && entry.subdir.is_some() {
            continue;
        }
        if let Some(entry) = ObjectEntry::from_raw(entry)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Usage counters for one container, from a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Number of objects stored in the container
    pub count: u64,
    /// Total bytes stored in the container
    pub usage: u64,
    /// Whether the container is publicly readable
    pub public: bool,
    /// Bytes transferred out of the container
    pub tx: u64,
    /// Bytes received into the container
    pub rx: u64,
}

/// Metadata for one object, from a HEAD request.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object size in bytes
    pub content_length: u64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// Content hash as hex digest
    pub hash: String,
    /// MIME type of the object
    pub content_type: String,
    /// Number of times the object has been downloaded
    pub downloads: u64,
}

/// Outcome of a server-side archive extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractReport {
    /// Number of objects the server created from the archive
    #[serde(rename = "Number Files Created")]
    pub files_created: u64,

    /// Per-file extraction failures reported by the server
    #[serde(rename = "Errors", default)]
    pub errors: Vec<serde_json::Value>,
}

pub(crate) fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str> {
    headers
        .get(name)
        .ok_or(StorageError::MissingHeader(name))?
        .to_str()
        .map_err(|_| StorageError::InvalidHeader(name))
}

fn header_u64(headers: &HeaderMap, name: &'static str) -> Result<u64> {
    required_header(headers, name)?
        .parse()
        .map_err(|_| StorageError::InvalidHeader(name))
}

fn header_u64_or_zero(headers: &HeaderMap, name: &'static str) -> Result<u64> {
    match headers.get(name) {
        None => Ok(0),
        Some(_) => header_u64(headers, name),
    }
}

pub(crate) fn container_info_from_headers(headers: &HeaderMap) -> Result<ContainerInfo> {
    let meta_type = headers
        .get("X-Container-Meta-Type")
        .and_then(|value| value.to_str().ok());
    Ok(ContainerInfo {
        count: header_u64(headers, "X-Container-Object-Count")?,
        usage: header_u64(headers, "X-Container-Bytes-Used")?,
        public: meta_type == Some("public"),
        // the server spells it without the double r
        tx: header_u64_or_zero(headers, "X-Transfered-Bytes")?,
        rx: header_u64_or_zero(headers, "X-Received-Bytes")?,
    })
}

pub(crate) fn object_info_from_headers(headers: &HeaderMap) -> Result<ObjectInfo> {
    let stamp = DateTime::parse_from_rfc2822(required_header(headers, "Last-Modified")?)?;
    Ok(ObjectInfo {
        content_length: header_u64(headers, "Content-Length")?,
        last_modified: stamp.with_timezone(&Utc),
        hash: required_header(headers, "ETag")?.to_string(),
        content_type: required_header(headers, "Content-Type")?.to_string(),
        downloads: header_u64_or_zero(headers, "X-Object-Downloads")?,
    })
}
