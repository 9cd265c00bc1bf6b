use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk upload RPC
// ---------------------------------------------------------------------------

/// One chunk of a file plus everything the receiver needs to reassemble it.
///
/// The `blob` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    #[serde(with = "base64_bytes")]
    pub blob: Vec<u8>,
    pub file_size_kb: f64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub chunk_index: u64,
    pub filename: String,
    pub upload_id: String,
    /// SHA-256 hex digest of `blob` (empty means no verification).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Uploads a single chunk into a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub owner_id: String,
    pub repository_name: String,
    pub destination_path: String,
    pub chunk: ChunkPayload,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
    pub transaction_id: String,
}

/// A file as indexed by the receiver, returned once it is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub path: String,
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository_name: String,
}

/// Receiver reply to a chunk upload. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_node: Option<FileNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadChunkResponse {
    /// A successful reply, optionally carrying the indexed file.
    pub fn ok(file_node: Option<FileNode>) -> Self {
        Self {
            file_node,
            error: None,
        }
    }

    /// A reply reporting a receiver-side failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            file_node: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch completion RPC
// ---------------------------------------------------------------------------

/// Closes a transaction once every file is accounted for.
///
/// Sent exactly once per transaction id; receivers treat it as idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBatchRequest {
    pub owner_id: String,
    pub repository_name: String,
    pub transaction_id: String,
    pub success: bool,
    pub has_failures: bool,
}

/// Receiver acknowledgement of a batch completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteBatchResponse {
    pub success: bool,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
