use crate::error::Result;
use crate::response::{ContainerInfo, ExtractReport, ObjectEntry, ObjectInfo};
use crate::storage::{Archive, ByteChunks, Storage};
use reqwest::header::HeaderMap;
use std::io::Read;
use std::path::Path;

/// A container name bound to a [`Storage`] client.
///
/// Every method forwards to the corresponding [`Storage`] operation with the
/// bound name as the container argument, so callers working against a single
/// container do not have to repeat it.
pub struct Container<'a> {
    storage: &'a Storage,
    name: String,
}

impl<'a> Container<'a> {
    pub(crate) fn new(storage: &'a Storage, name: &str) -> Self {
        Container {
            storage,
            name: name.to_string(),
        }
    }

    /// Name of the bound container
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List objects, see [`Storage::list`]
    pub fn list(&self, path: Option<&str>, prefix: Option<&str>) -> Result<Vec<ObjectEntry>> {
        self.storage.list(&self.name, path, prefix)
    }

    /// Download an object in full
    pub fn get(&self, path: &str, headers: Option<HeaderMap>) -> Result<Vec<u8>> {
        self.storage.get(&self.name, path, headers)
    }

    /// Download an object as a lazy sequence of byte chunks
    pub fn get_stream(&self, path: &str, headers: Option<HeaderMap>) -> Result<ByteChunks> {
        self.storage.get_stream(&self.name, path, headers)
    }

    /// Upload an object from a byte slice
    pub fn put(
        &self,
        path: &str,
        content: &[u8],
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>> {
        self.storage.put(&self.name, path, content, headers, extract)
    }

    /// Upload an object from a streaming byte source, see
    /// [`Storage::put_stream`] for the body-factory contract
    pub fn put_stream<R, F>(
        &self,
        path: &str,
        body: F,
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>>
    where
        F: Fn() -> std::io::Result<R>,
        R: Read + Send + 'static,
    {
        self.storage
            .put_stream(&self.name, path, body, headers, extract)
    }

    /// Upload an object from a local file
    pub fn put_file(
        &self,
        path: &str,
        filename: impl AsRef<Path>,
        headers: Option<HeaderMap>,
        extract: Option<Archive>,
    ) -> Result<Option<ExtractReport>> {
        self.storage
            .put_file(&self.name, path, filename, headers, extract)
    }

    /// Delete an object
    pub fn remove(&self, path: &str, force: bool) -> Result<HeaderMap> {
        self.storage.remove(&self.name, path, force)
    }

    /// Copy an object within this container server-side
    pub fn copy(&self, src: &str, dst: &str, headers: Option<HeaderMap>) -> Result<()> {
        self.storage.copy(&self.name, src, dst, headers)
    }

    /// Fetch usage counters for this container
    pub fn info(&self) -> Result<ContainerInfo> {
        self.storage.container_info(&self.name)
    }

    /// Fetch metadata for a single object
    pub fn object_info(&self, path: &str) -> Result<ObjectInfo> {
        self.storage.object_info(&self.name, path)
    }
}
