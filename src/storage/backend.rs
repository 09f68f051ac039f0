//! Abstract storage backend trait.
//!
//! Every storage backend must implement [`StorageBackend`].  Reads are
//! handed back as lazy byte streams so the delivery path never buffers
//! a whole object in memory; the handler's footprint stays O(1) in the
//! object size, and back-pressure from the client connection propagates
//! into the storage read.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;

/// A readable object: response metadata plus a lazily-consumed byte
/// stream.
///
/// Dropping the stream mid-read aborts the underlying storage read,
/// which is how client disconnects cancel backend work.
pub struct ObjectStream {
    /// MIME type recorded when the object was stored.
    pub content_type: String,
    /// Hex integrity digest, without surrounding quotes.
    pub etag: String,
    /// Object size in bytes, when the backend knows it up front.
    pub size: Option<u64>,
    /// The object bytes.
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

/// Async object storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetch the object at `key`.
    ///
    /// `Ok(None)` means no object lives at the key -- an expected,
    /// client-visible miss.  `Err` means the backend itself failed and
    /// is reported as an upstream error.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectStream>>> + Send + '_>>;

    /// Write `data` at `key` with the given content type, returning the
    /// unquoted hex etag of the stored object.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}
