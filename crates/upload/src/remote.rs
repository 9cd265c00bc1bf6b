//! The receiving side of an upload, as seen from the sender.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bulkup_protocol::{
    CompleteBatchRequest, CompleteBatchResponse, UploadChunkRequest, UploadChunkResponse,
};

use crate::error::UploadError;

/// Caller-supplied credentials, attached to every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bearer_token: String,
    /// Identity of the uploading user or service.
    pub identity: String,
}

impl Credentials {
    pub fn new(bearer_token: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            identity: identity.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Where a batch lands on the receiver, plus who is sending it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingInfo {
    pub owner_id: String,
    pub repository_name: String,
    /// Optional sub-area of the repository; empty for none.
    pub section: String,
    pub credentials: Credentials,
}

/// Abstract connection to the receiver.
///
/// Implementations copy whatever they need from `credentials` before
/// returning the future. Keeping this a trait makes the coordinator
/// testable with mocks.
pub trait UploadRemote: Send + Sync {
    /// Delivers one chunk. A response with `error` set is a failure.
    fn upload_chunk(
        &self,
        credentials: &Credentials,
        request: UploadChunkRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UploadChunkResponse, UploadError>> + Send + '_>>;

    /// Closes a transaction. Receivers must treat repeats as no-ops.
    fn complete_batch(
        &self,
        credentials: &Credentials,
        request: CompleteBatchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompleteBatchResponse, UploadError>> + Send + '_>>;
}
