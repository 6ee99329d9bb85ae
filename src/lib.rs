//! # swiftstore - Swift-compatible cloud storage client
//!
//! A Rust client for object-storage services speaking the Swift REST
//! protocol. The client authenticates against a token-issuing endpoint,
//! caches the issued token together with the storage endpoint URL, and
//! re-authenticates transparently when the token nears expiry or the server
//! rejects it.
//!
//! ## Features
//!
//! - Token handshake with proactive renewal ahead of the expiry margin
//! - One-shot replay of requests failed with 401, including streaming
//!   uploads (bodies come from a factory so a replay gets a fresh stream)
//! - Container and object operations: list, get, put, copy, remove, stat,
//!   create, drop
//! - Server-side archive extraction for tar uploads
//! - Typed errors distinguishing auth failures, HTTP errors, and transport
//!   failures
//!
//! ## Basic Usage
//!
//! ```no_run
//! use swiftstore::Storage;
//!
//! fn main() -> Result<(), swiftstore::StorageError> {
//!     let storage = Storage::new("account", "secret-key")?;
//!
//!     storage.create_container("backups", false, None)?;
//!     storage.put("backups", "/notes.txt", b"remember the milk", None, None)?;
//!
//!     for entry in storage.list("backups", Some("/"), None)? {
//!         println!("{} ({} bytes)", entry.path, entry.bytes);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Working with one container
//!
//! ```no_run
//! use swiftstore::Storage;
//!
//! # fn main() -> Result<(), swiftstore::StorageError> {
//! let storage = Storage::new("account", "secret-key")?;
//! let backups = storage.container("backups");
//!
//! backups.put("/notes.txt", b"remember the milk", None, None)?;
//! let body = backups.get("/notes.txt", None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Archive extraction
//!
//! ```no_run
//! use swiftstore::{Archive, Storage};
//!
//! # fn main() -> Result<(), swiftstore::StorageError> {
//! let storage = Storage::new("account", "secret-key")?;
//! let report = storage
//!     .put_file("site", "/", "assets.tar.gz", None, Some(Archive::TarGz))?
//!     .expect("extraction always yields a report");
//! println!("{} files created", report.files_created);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod container;
pub mod error;
pub mod response;
pub mod storage;

// Re-export main types for convenience
pub use auth::Credential;
pub use client::Config;
pub use container::Container;
pub use error::{Result, StorageError};
pub use response::{ContainerInfo, ExtractReport, ObjectEntry, ObjectInfo};
pub use storage::{Archive, ByteChunks, Storage, DEFAULT_CHUNK_SIZE};
