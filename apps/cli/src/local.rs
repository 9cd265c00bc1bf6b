//! Receiver that reassembles uploads in a local directory.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use bulkup_protocol::{
    CompleteBatchRequest, CompleteBatchResponse, FileNode, UploadChunkRequest,
    UploadChunkResponse,
};
use bulkup_transfer::ChunkAssembler;
use bulkup_upload::{Credentials, UploadError, UploadRemote};
use tracing::{debug, info};

/// Directory under the receiver root holding one manifest per transaction.
const MANIFEST_DIR: &str = ".bulkup";

pub struct LocalReceiver {
    root: PathBuf,
    repository_name: String,
    assembler: Arc<Mutex<ChunkAssembler>>,
    completed: Mutex<HashSet<String>>,
}

impl LocalReceiver {
    pub fn new(root: &Path) -> Result<Self, UploadError> {
        std::fs::create_dir_all(root)?;
        let repository_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".into());
        Ok(Self {
            root: root.to_path_buf(),
            repository_name,
            assembler: Arc::new(Mutex::new(ChunkAssembler::new(root))),
            completed: Mutex::new(HashSet::new()),
        })
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    fn completed_ids(&self) -> Result<MutexGuard<'_, HashSet<String>>, UploadError> {
        self.completed
            .lock()
            .map_err(|_| UploadError::Remote("completion lock poisoned".into()))
    }

    fn manifest_path(&self, transaction_id: &str) -> PathBuf {
        self.root
            .join(MANIFEST_DIR)
            .join(format!("{transaction_id}.json"))
    }
}

impl UploadRemote for LocalReceiver {
    fn upload_chunk(
        &self,
        _credentials: &Credentials,
        request: UploadChunkRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UploadChunkResponse, UploadError>> + Send + '_>> {
        let assembler = Arc::clone(&self.assembler);
        Box::pin(async move {
            let destination = request.destination_path.clone();
            let written = tokio::task::spawn_blocking(move || {
                let mut assembler = assembler
                    .lock()
                    .map_err(|_| UploadError::Remote("assembler lock poisoned".into()))?;
                Ok::<_, UploadError>((
                    assembler.write_chunk(&request.destination_path, &request.chunk),
                    request,
                ))
            })
            .await
            .map_err(|e| UploadError::Remote(format!("task join error: {e}")))??;

            match written {
                (Ok(true), request) => Ok(UploadChunkResponse::ok(Some(FileNode {
                    path: destination,
                    name: request.chunk.filename,
                    size_bytes: (request.chunk.file_size_kb * 1024.0).round() as u64,
                    repository_name: request.repository_name,
                }))),
                (Ok(false), _) => Ok(UploadChunkResponse::ok(None)),
                (Err(e), _) => Ok(UploadChunkResponse::failed(e.to_string())),
            }
        })
    }

    fn complete_batch(
        &self,
        _credentials: &Credentials,
        request: CompleteBatchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompleteBatchResponse, UploadError>> + Send + '_>> {
        Box::pin(async move {
            if self.completed_ids()?.contains(&request.transaction_id) {
                debug!(transaction = %request.transaction_id, "repeated completion ignored");
                return Ok(CompleteBatchResponse { success: true });
            }

            let path = self.manifest_path(&request.transaction_id);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, serde_json::to_vec_pretty(&request)?).await?;

            // Only a written manifest counts as closed.
            self.completed_ids()?.insert(request.transaction_id.clone());

            info!(
                transaction = %request.transaction_id,
                has_failures = request.has_failures,
                "batch closed on receiver"
            );
            Ok(CompleteBatchResponse { success: true })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkup_protocol::{ChunkPayload, TransactionStatus};
    use bulkup_transfer::{ChunkPlanner, SourceHandle, checksum_bytes};
    use bulkup_upload::{CoordinatorOptions, RoutingInfo, RunOutcome, UploadCoordinator};

    fn request(dest: &str, index: u64, total: u64, chunk_size: u64, blob: &[u8]) -> UploadChunkRequest {
        UploadChunkRequest {
            owner_id: "o".into(),
            repository_name: "r".into(),
            destination_path: dest.into(),
            chunk: ChunkPayload {
                blob: blob.to_vec(),
                file_size_kb: 0.0,
                chunk_size,
                total_chunks: total,
                chunk_index: index,
                filename: "f".into(),
                upload_id: "u".into(),
                checksum: checksum_bytes(blob),
            },
            section: String::new(),
            transaction_id: "tx".into(),
        }
    }

    #[tokio::test]
    async fn coordinator_reassembles_files() {
        let recv = tempfile::tempdir().unwrap();
        let receiver = Arc::new(LocalReceiver::new(recv.path()).unwrap());

        let mut coord = UploadCoordinator::new(
            receiver.clone(),
            RoutingInfo::default(),
            CoordinatorOptions {
                workers: 3,
                max_in_flight: 3,
            },
        );
        let planner = ChunkPlanner::new(7).unwrap();
        let data_a: Vec<u8> = (0..100u8).collect();
        let data_b = b"short".to_vec();
        let tx = coord.transaction_id().to_string();
        coord
            .enqueue_all([
                planner
                    .plan("in/a.bin", SourceHandle::memory(data_a.clone()), 100, &tx)
                    .unwrap(),
                planner
                    .plan("b.txt", SourceHandle::memory(data_b.clone()), 5, &tx)
                    .unwrap(),
            ])
            .unwrap();

        let RunOutcome::Completed(outcome) = coord.run().await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outcome.completed_files, 2);
        assert_eq!(outcome.file_nodes.len(), 2);
        assert_eq!(coord.transaction().status(), TransactionStatus::Completed);

        assert_eq!(std::fs::read(recv.path().join("in/a.bin")).unwrap(), data_a);
        assert_eq!(std::fs::read(recv.path().join("b.txt")).unwrap(), data_b);
        assert!(receiver.manifest_path(&tx).exists());
    }

    #[tokio::test]
    async fn bad_checksum_is_reported_in_response() {
        let recv = tempfile::tempdir().unwrap();
        let receiver = LocalReceiver::new(recv.path()).unwrap();

        let mut req = request("x.bin", 0, 1, 4, b"abcd");
        req.chunk.checksum = checksum_bytes(b"other");
        let resp = receiver
            .upload_chunk(&Credentials::default(), req)
            .await
            .unwrap();
        assert!(resp.error.is_some());
        assert!(resp.file_node.is_none());
    }

    #[tokio::test]
    async fn duplicate_chunk_overwrites() {
        let recv = tempfile::tempdir().unwrap();
        let receiver = LocalReceiver::new(recv.path()).unwrap();
        let creds = Credentials::default();

        receiver.upload_chunk(&creds, request("d.bin", 0, 2, 4, b"aaaa")).await.unwrap();
        receiver.upload_chunk(&creds, request("d.bin", 0, 2, 4, b"aaaa")).await.unwrap();
        let resp = receiver.upload_chunk(&creds, request("d.bin", 1, 2, 4, b"bb")).await.unwrap();
        assert!(resp.file_node.is_some());
        assert_eq!(std::fs::read(recv.path().join("d.bin")).unwrap(), b"aaaabb");
    }

    #[tokio::test]
    async fn completion_is_idempotent() {
        let recv = tempfile::tempdir().unwrap();
        let receiver = LocalReceiver::new(recv.path()).unwrap();
        let req = CompleteBatchRequest {
            owner_id: "o".into(),
            repository_name: "r".into(),
            transaction_id: "tx-9".into(),
            success: true,
            has_failures: false,
        };

        for _ in 0..2 {
            let resp = receiver
                .complete_batch(&Credentials::default(), req.clone())
                .await
                .unwrap();
            assert!(resp.success);
        }
        let manifest = std::fs::read_to_string(receiver.manifest_path("tx-9")).unwrap();
        let stored: CompleteBatchRequest = serde_json::from_str(&manifest).unwrap();
        assert_eq!(stored, req);
    }

    #[tokio::test]
    async fn failed_manifest_write_is_not_remembered() {
        let recv = tempfile::tempdir().unwrap();
        let receiver = LocalReceiver::new(recv.path()).unwrap();
        let req = CompleteBatchRequest {
            owner_id: "o".into(),
            repository_name: "r".into(),
            transaction_id: "tx-3".into(),
            success: true,
            has_failures: false,
        };

        // A plain file where the manifest directory should be.
        let blocker = recv.path().join(MANIFEST_DIR);
        std::fs::write(&blocker, b"in the way").unwrap();
        assert!(
            receiver
                .complete_batch(&Credentials::default(), req.clone())
                .await
                .is_err()
        );
        assert!(!receiver.manifest_path("tx-3").exists());

        std::fs::remove_file(&blocker).unwrap();
        let resp = receiver
            .complete_batch(&Credentials::default(), req)
            .await
            .unwrap();
        assert!(resp.success);
        assert!(receiver.manifest_path("tx-3").exists());
    }
}
