use crate::auth::Credential;
use crate::client::{create_storage_client, create_transfer_client, Config};
use crate::container::Container;
use crate::error::{Result, StorageError};
use crate::response::{
    container_info_from_headers, object_info_from_headers, parse_listing, required_header,
    ContainerInfo, ExtractReport, ObjectEntry, ObjectInfo,
};
use chrono::Utc;
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{HeaderMap, ACCEPT, ETAG};
use reqwest::StatusCode;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

/// Identity headers sent to the token-issuing endpoint
const AUTH_USER: &str = "X-Auth-User";
const AUTH_KEY: &str = "X-Auth-Key";

/// Bearer-token header carried by every storage request
const AUTH_TOKEN: &str = "X-Auth-Token";

/// Handshake response headers
const STORAGE_URL: &str = "X-Storage-Url";
const EXPIRE_TOKEN: &str = "X-Expire-Auth-Token";

/// Source-reference header for server-side copies
const COPY_FROM: &str = "X-Copy-From";

/// Container visibility header
const META_TYPE: &str = "X-Container-Meta-Type";

/// Default chunk size for streamed downloads (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Archive formats the server can unpack on upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archive {
    Tar,
    TarGz,
    TarBz2,
}

impl Archive {
    /// Value sent as the extract-archive query flag
    pub fn as_str(self) -> &'static str {
        match self {
            Archive::Tar => "tar",
            Archive::TarGz => "tar.gz",
            Archive::TarBz2 => "tar.bz2",
        }
    }
}

/// Client for a Swift-compatible object-storage service.
///
/// Authenticates eagerly on construction and holds the issued credential in
/// an exclusively-owned slot. Every operation runs through a refresh wrapper:
/// a credential inside the expiry safety margin is replaced before the
/// request is dispatched, and a 401 response triggers exactly one
/// re-authentication followed by one replay of the request.
pub struct Storage {
    /// HTTP client for API requests
    client: Client,
    /// HTTP client for streamed transfers
    transfer: Client,
    /// Account identity and auth endpoint
    config: Config,
    /// Live credential; replaced wholesale on refresh
    credential: Mutex<Credential>,
}

impl Storage {
    /// Authenticate against the default endpoint and create a client
    pub fn new(user: &str, key: &str) -> Result<Self> {
        Self::with_config(Config::new(user, key))
    }

    /// Authenticate with a custom configuration and create a client
    pub fn with_config(config: Config) -> Result<Self> {
        let client = create_storage_client();
        let credential = authenticate(&client, &config)?;
        Ok(Storage {
            transfer: create_transfer_client(),
            credential: Mutex::new(credential),
            client,
            config,
        })
    }

    /// Re-run the authentication handshake and replace the held credential
    pub fn authenticate(&self) -> Result<()> {
        let credential = authenticate(&self.client, &self.config)?;
        *self.credential.lock().unwrap() = credential;
        Ok(())
    }

    /// Bind a container name, yielding per-container accessors
    pub fn container(&self, name: &str) -> Container<'_> {
        Container::new(self, name)
    }

    /// List objects in a container.
    ///
    /// `path` restricts the listing to one directory level (its leading
    /// slash is stripped before it is sent); `prefix` filters by name
    /// prefix. A root path (`"/"` or `""`) lists only direct objects.
    pub fn list(
        &self,
        container: &str,
        path: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectEntry>> {
        let path = path.map(strip_path);
        self.with_refresh(|credential| {
            let url = list_url(&credential.storage_url, container, path, prefix)?;
            let request = self
                .client
                .get(url)
                .header(AUTH_TOKEN, credential.token.as_str());
            let response = check(request.send()?)?;
            let body = response.bytes()?;
            parse_listing(&body, path)
        })
    }

    /// Download an object in full
    pub fn get(&self, container: &str, path: &str, headers: Option<HeaderMap>) -> Result<Vec<u8>> {
        self.with_refresh(|credential| {
            let mut request = self
                .client
                .get(object_url(&credential.storage_url, container, path))
                .header(AUTH_TOKEN, credential.token.as_str());
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            let response = check(request.send()?)?;
            Ok(response.bytes()?.to_vec())
        })
    }

    /// Download an object as a lazy sequence of byte chunks
    pub fn get_stream(
        &self,
        container: &str,
        path: &str,
        headers: Option<HeaderMap>,
    ) -> Result<ByteChunks> {
        self.with_refresh(|credential| {
            let mut request = self
                .transfer
                .get(object_url(&credential.storage_url, container, path))
                .header(AUTH_TOKEN, credential.token.as_str());
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            let response = check(request.send()?)?;
            Ok(ByteChunks::new(response))
        })
    }

    /// Upload an object from a byte slice.
    ///
    /// Plain uploads carry an ETag header with the md5 digest of the body so
    /// the server can verify integrity, and expect a 201. With `extract` the
    /// server unpacks the uploaded archive server-side and the parsed
    /// [`ExtractReport`] is returned.
    pub fn put(
        &self,
        container: &str,
        path: &str,
        content: &[u8],
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>> {
        self.with_refresh(|credential| {
            let mut request = self
                .client
                .put(put_url(&credential.storage_url, container, path, extract)?)
                .header(AUTH_TOKEN, credential.token.as_str());
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            request = match extract {
                Some(_) => request.header(ACCEPT, "application/json"),
                None => request.header(ETAG, etag(content)),
            };
            let response = check(request.body(content.to_vec()).send()?)?;
            finish_upload(response, extract)
        })
    }

    /// Upload an object from a streaming byte source.
    ///
    /// `body` is a factory producing a fresh reader, not a reader: a replay
    /// after a 401 must not reuse a partially consumed stream, so the
    /// wrapper requests a new one for each attempt.
    pub fn put_stream<R, F>(
        &self,
        container: &str,
        path: &str,
        body: F,
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>>
    where
        F: Fn() -> std::io::Result<R>,
        R: Read + Send + 'static,
    {
        self.with_refresh(|credential| {
            let reader = body()?;
            let mut request = self
                .transfer
                .put(put_url(&credential.storage_url, container, path, extract)?)
                .header(AUTH_TOKEN, credential.token.as_str());
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            if extract.is_some() {
                request = request.header(ACCEPT, "application/json");
            }
            let response = check(request.body(Body::new(reader)).send()?)?;
            finish_upload(response, extract)
        })
    }

    /// Upload an object from a local file. The file is reopened for a
    /// replayed attempt.
    pub fn put_file(
        &self,
        container: &str,
        path: &str,
        filename: impl AsRef<Path>,
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>> {
        let filename = filename.as_ref();
        self.put_stream(
            container,
            path,
            || std::fs::File::open(filename),
            headers,
            extract,
        )
    }

    /// Delete an object, returning the response headers. With `force` a 404
    /// counts as success.
    pub fn remove(&self, container: &str, path: &str, force: bool) -> Result<HeaderMap> {
        self.with_refresh(|credential| {
            let response = self
                .client
                .delete(object_url(&credential.storage_url, container, path))
                .header(AUTH_TOKEN, credential.token.as_str())
                .send()?;
            if force && response.status() == StatusCode::NOT_FOUND {
                return Ok(response.headers().clone());
            }
            let response = require(check(response)?, &[StatusCode::NO_CONTENT])?;
            Ok(response.headers().clone())
        })
    }

    /// Copy an object within a container server-side
    pub fn copy(
        &self,
        container: &str,
        src: &str,
        dst: &str,
        headers: Option<HeaderMap>,
    ) -> Result<()> {
        self.with_refresh(|credential| {
            let mut request = self
                .client
                .put(object_url(&credential.storage_url, container, dst))
                .header(AUTH_TOKEN, credential.token.as_str())
                .header(COPY_FROM, format!("{}{}", container, src));
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            require(check(request.send()?)?, &[StatusCode::CREATED])?;
            Ok(())
        })
    }

    /// Fetch usage counters for a container
    pub fn container_info(&self, container: &str) -> Result<ContainerInfo> {
        self.with_refresh(|credential| {
            let request = self
                .client
                .head(container_url(&credential.storage_url, container))
                .header(AUTH_TOKEN, credential.token.as_str());
            let response = require(check(request.send()?)?, &[StatusCode::NO_CONTENT])?;
            container_info_from_headers(response.headers())
        })
    }

    /// Fetch metadata for a single object
    pub fn object_info(&self, container: &str, path: &str) -> Result<ObjectInfo> {
        self.with_refresh(|credential| {
            let request = self
                .client
                .head(object_url(&credential.storage_url, container, path))
                .header(AUTH_TOKEN, credential.token.as_str());
            let response = require(check(request.send()?)?, &[StatusCode::OK])?;
            object_info_from_headers(response.headers())
        })
    }

    /// Create a container with the given visibility
    pub fn create_container(
        &self,
        container: &str,
        public: bool,
        headers: Option<HeaderMap>,
    ) -> Result<()> {
        let visibility = if public { "public" } else { "private" };
        self.with_refresh(|credential| {
            let mut request = self
                .client
                .put(container_url(&credential.storage_url, container))
                .header(AUTH_TOKEN, credential.token.as_str())
                .header(META_TYPE, visibility);
            if let Some(extra) = &headers {
                request = request.headers(extra.clone());
            }
            require(
                check(request.send()?)?,
                &[StatusCode::CREATED, StatusCode::ACCEPTED],
            )?;
            Ok(())
        })
    }

    /// Delete a container. `recursive` removes all members first; `force`
    /// treats a missing container (or member) as already deleted.
    pub fn drop_container(&self, container: &str, force: bool, recursive: bool) -> Result<()> {
        if recursive {
            for entry in self.list(container, None, None)? {
                self.remove(container, &entry.path, force)?;
            }
        }
        self.with_refresh(|credential| {
            let response = self
                .client
                .delete(container_url(&credential.storage_url, container))
                .header(AUTH_TOKEN, credential.token.as_str())
                .send()?;
            if force && response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            require(check(response)?, &[StatusCode::NO_CONTENT])?;
            Ok(())
        })
    }

    fn with_refresh<T, O>(&self, op: O) -> Result<T>
    where
        O: Fn(&Credential) -> Result<T>,
    {
        execute_with_refresh(
            &self.credential,
            || authenticate(&self.client, &self.config),
            op,
        )
    }
}

/// Run one storage operation with the credential-refresh policy applied.
///
/// Before the first attempt the held credential is checked against the
/// expiry safety margin and replaced if stale; the check-and-replace happens
/// under the slot lock, so concurrent callers cannot dispatch with a stale
/// credential or refresh twice for the same staleness. A 401 from the
/// attempt re-authenticates unconditionally and replays the operation
/// exactly once; the replay's outcome is final. All other errors propagate
/// untouched.
fn execute_with_refresh<T, A, O>(slot: &Mutex<Credential>, reauth: A, op: O) -> Result<T>
where
    A: Fn() -> Result<Credential>,
    O: Fn(&Credential) -> Result<T>,
{
    let credential = {
        let mut held = slot.lock().unwrap();
        if held.is_expired(Utc::now()) {
            debug!("storage token near expiry, refreshing before dispatch");
            *held = reauth()?;
        }
        held.clone()
    };
    match op(&credential) {
        Err(StorageError::Unauthorized) => {
            debug!("server rejected storage token, refreshing and replaying once");
            let credential = {
                let mut held = slot.lock().unwrap();
                *held = reauth()?;
                held.clone()
            };
            op(&credential)
        }
        outcome => outcome,
    }
}

/// Perform the authentication handshake and build a fresh credential
fn authenticate(client: &Client, config: &Config) -> Result<Credential> {
    debug!(url = %config.auth_url, "requesting storage token");
    let response = client
        .get(config.auth_url.as_str())
        .header(AUTH_USER, config.user.as_str())
        .header(AUTH_KEY, config.key.as_str())
        .send()?;
    let status = response.status();
    if status != StatusCode::NO_CONTENT {
        return Err(StorageError::Auth {
            status: status.as_u16(),
        });
    }
    let headers = response.headers();
    let token = required_header(headers, AUTH_TOKEN)?.to_string();
    let storage_url = required_header(headers, STORAGE_URL)?;
    let ttl: i64 = required_header(headers, EXPIRE_TOKEN)?
        .parse()
        .map_err(|_| StorageError::InvalidHeader(EXPIRE_TOKEN))?;
    debug!(ttl, "storage token issued");
    Ok(Credential::new(token, storage_url, ttl, Utc::now()))
}

/// Lazily reads a download body in fixed-size chunks.
///
/// Yields `DEFAULT_CHUNK_SIZE` chunks unless reconfigured; the final chunk
/// is whatever remains.
pub struct ByteChunks {
    response: Response,
    chunk_size: usize,
}

impl ByteChunks {
    fn new(response: Response) -> Self {
        ByteChunks {
            response,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Change the chunk size for subsequent reads
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Iterator for ByteChunks {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.response.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) => return Some(Err(err.into())),
            }
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

/// Map non-success statuses to typed errors. 401 gets its own variant so
/// the retry wrapper can absorb it.
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(StorageError::Unauthorized);
    }
    let body = response.text().unwrap_or_default();
    Err(StorageError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Enforce an operation's contracted success status
fn require(response: Response, expected: &[StatusCode]) -> Result<Response> {
    if expected.contains(&response.status()) {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Err(StorageError::Http { status, body })
}

/// Plain uploads expect a 201 and no body; extraction responds 200 with a
/// JSON report.
fn finish_upload(response: Response, extract: Option<Archive>) -> Result<Option<ExtractReport>> {
    match extract {
        Some(_) => {
            let response = require(response, &[StatusCode::OK])?;
            let body = response.bytes()?;
            Ok(Some(serde_json::from_slice(&body)?))
        }
        None => {
            require(response, &[StatusCode::CREATED])?;
            Ok(None)
        }
    }
}

fn etag(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

fn strip_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

fn container_url(storage_url: &str, container: &str) -> String {
    format!("{}/{}", storage_url, container)
}

fn object_url(storage_url: &str, container: &str, path: &str) -> String {
    format!("{}/{}{}", storage_url, container, path)
}

fn list_url(
    storage_url: &str,
    container: &str,
    path: Option<&str>,
    prefix: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(&container_url(storage_url, container))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("format", "json");
        if let Some(path) = path {
            query.append_pair("path", path);
            if path.is_empty() {
                query.append_pair("delimiter", "/");
            }
        }
        if let Some(prefix) = prefix {
            query.append_pair("prefix", prefix);
        }
    }
    Ok(url)
}

fn put_url(
    storage_url: &str,
    container: &str,
    path: &str,
    extract: Option<Archive>,
) -> Result<Url> {
    let mut url = Url::parse(&object_url(storage_url, container, path))?;
    if let Some(format) = extract {
        url.query_pairs_mut()
            .append_pair("extract-archive", format.as_str());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn held_credential(ttl_seconds: i64) -> Mutex<Credential> {
        Mutex::new(Credential::new(
            "tok0".to_string(),
            "https://storage.test/v1/acc",
            ttl_seconds,
            Utc::now(),
        ))
    }

    fn counting_reauth(count: &Cell<u32>) -> impl Fn() -> Result<Credential> + '_ {
        move || {
            count.set(count.get() + 1);
            Ok(Credential::new(
                format!("tok{}", count.get()),
                "https://storage.test/v1/acc",
                3600,
                Utc::now(),
            ))
        }
    }

    #[test]
    fn test_fresh_credential_skips_handshake() {
        let slot = held_credential(3600);
        let reauths = Cell::new(0);
        let attempts = Cell::new(0);

        let result = execute_with_refresh(&slot, counting_reauth(&reauths), |credential| {
            attempts.set(attempts.get() + 1);
            Ok(credential.token.clone())
        });

        assert_eq!(result.unwrap(), "tok0");
        assert_eq!(reauths.get(), 0);
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_near_expiry_refreshes_before_dispatch() {
        let slot = held_credential(60);
        let reauths = Cell::new(0);
        let attempts = Cell::new(0);

        let result = execute_with_refresh(&slot, counting_reauth(&reauths), |credential| {
            attempts.set(attempts.get() + 1);
            Ok(credential.token.clone())
        });

        // the operation never sees the stale token
        assert_eq!(result.unwrap(), "tok1");
        assert_eq!(reauths.get(), 1);
        assert_eq!(attempts.get(), 1);
        assert_eq!(slot.lock().unwrap().token, "tok1");
    }

    #[test]
    fn test_unauthorized_triggers_single_replay() {
        let slot = held_credential(3600);
        let reauths = Cell::new(0);
        let attempts = Cell::new(0);

        let result = execute_with_refresh(&slot, counting_reauth(&reauths), |credential| {
            attempts.set(attempts.get() + 1);
            if credential.token == "tok0" {
                Err(StorageError::Unauthorized)
            } else {
                Ok(credential.token.clone())
            }
        });

        assert_eq!(result.unwrap(), "tok1");
        assert_eq!(reauths.get(), 1);
        assert_eq!(attempts.get(), 2);
        assert_eq!(slot.lock().unwrap().token, "tok1");
    }

    #[test]
    fn test_second_unauthorized_is_final() {
        let slot = held_credential(3600);
        let reauths = Cell::new(0);
        let attempts = Cell::new(0);

        let result: Result<()> =
            execute_with_refresh(&slot, counting_reauth(&reauths), |_credential| {
                attempts.set(attempts.get() + 1);
                Err(StorageError::Unauthorized)
            });

        assert!(matches!(result, Err(StorageError::Unauthorized)));
        assert_eq!(reauths.get(), 1);
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_other_errors_propagate_without_refresh() {
        let slot = held_credential(3600);
        let reauths = Cell::new(0);
        let attempts = Cell::new(0);

        let result: Result<()> =
            execute_with_refresh(&slot, counting_reauth(&reauths), |_credential| {
                attempts.set(attempts.get() + 1);
                Err(StorageError::Http {
                    status: 500,
                    body: "server error".to_string(),
                })
            });

        assert!(matches!(result, Err(StorageError::Http { status: 500, .. })));
        assert_eq!(reauths.get(), 0);
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_replay_requests_a_fresh_body() {
        let slot = held_credential(3600);
        let reauths = Cell::new(0);
        let bodies = Cell::new(0);

        // mirrors put_stream: the operation closure asks the factory for a
        // new reader on every attempt
        let body_factory = || {
            bodies.set(bodies.get() + 1);
            std::io::Result::Ok(std::io::Cursor::new(b"payload".to_vec()))
        };

        let result = execute_with_refresh(&slot, counting_reauth(&reauths), |credential| {
            let _reader = body_factory()?;
            if credential.token == "tok0" {
                Err(StorageError::Unauthorized)
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(bodies.get(), 2);
    }

    #[test]
    fn test_failed_refresh_surfaces_auth_error() {
        let slot = held_credential(60);
        let attempts = Cell::new(0);

        let result: Result<()> = execute_with_refresh(
            &slot,
            || Err(StorageError::Auth { status: 403 }),
            |_credential| {
                attempts.set(attempts.get() + 1);
                Ok(())
            },
        );

        assert!(matches!(result, Err(StorageError::Auth { status: 403 })));
        assert_eq!(attempts.get(), 0);
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("/"), "");
        assert_eq!(strip_path("/photos"), "photos");
        assert_eq!(strip_path("photos"), "photos");
        assert_eq!(strip_path(""), "");
    }

    #[test]
    fn test_list_url_root_gets_delimiter() {
        let url = list_url("https://storage.test/v1/acc", "c", Some(""), None).unwrap();
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "format" && value == "json"));
        assert!(url.query_pairs().any(|(key, value)| key == "path" && value.is_empty()));
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "delimiter" && value == "/"));
    }

    #[test]
    fn test_list_url_nested_path_has_no_delimiter() {
        let url = list_url("https://storage.test/v1/acc", "c", Some("photos"), None).unwrap();
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "path" && value == "photos"));
        assert!(!url.query_pairs().any(|(key, _)| key == "delimiter"));
    }

    #[test]
    fn test_list_url_prefix_only() {
        let url = list_url("https://storage.test/v1/acc", "c", None, Some("img-")).unwrap();
        assert!(!url.query_pairs().any(|(key, _)| key == "path"));
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "prefix" && value == "img-"));
    }

    #[test]
    fn test_object_urls_join_raw_paths() {
        assert_eq!(
            object_url("https://storage.test/v1/acc", "backups", "/db/dump.gz"),
            "https://storage.test/v1/acc/backups/db/dump.gz"
        );
        assert_eq!(
            container_url("https://storage.test/v1/acc", "backups"),
            "https://storage.test/v1/acc/backups"
        );
    }

    #[test]
    fn test_put_url_extract_flag() {
        let url = put_url(
            "https://storage.test/v1/acc",
            "site",
            "/assets",
            Some(Archive::TarGz),
        )
        .unwrap();
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "extract-archive" && value == "tar.gz"));

        let plain = put_url("https://storage.test/v1/acc", "site", "/assets", None).unwrap();
        assert!(plain.query().is_none());
    }

    #[test]
    fn test_etag_matches_md5_hex() {
        assert_eq!(etag(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(etag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_archive_flags() {
        assert_eq!(Archive::Tar.as_str(), "tar");
        assert_eq!(Archive::TarGz.as_str(), "tar.gz");
        assert_eq!(Archive::TarBz2.as_str(), "tar.bz2");
    }
}
