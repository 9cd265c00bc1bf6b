fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bulkup_protocol::{
        CompleteBatchRequest, CompleteBatchResponse, TransactionProgress, TransactionStatus,
        UploadChunkRequest, UploadChunkResponse,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Receivers may send `65` where Rust writes `65.0`; both mean the same.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Parses a fixture, re-serializes it, and compares the JSON values
    /// (order-independent, float-normalized).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_upload_chunk_request() {
        let req: UploadChunkRequest = roundtrip_test("upload_chunk_request.json");
        assert_eq!(req.chunk.blob, b"Hello");
        assert_eq!(req.chunk.checksum, bulkup_transfer::checksum_bytes(&req.chunk.blob));
        assert_eq!(req.chunk.chunk_size, bulkup_protocol::CHUNK_SIZE);
        assert_eq!(req.section, "raw");
    }

    #[test]
    fn fixture_upload_chunk_response() {
        let resp: UploadChunkResponse = roundtrip_test("upload_chunk_response.json");
        assert!(resp.error.is_none());
        assert_eq!(resp.file_node.unwrap().size_bytes, 1536);
    }

    #[test]
    fn fixture_upload_chunk_error() {
        let resp: UploadChunkResponse = roundtrip_test("upload_chunk_error.json");
        assert!(resp.file_node.is_none());
        assert_eq!(resp.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn fixture_complete_batch_request() {
        let req: CompleteBatchRequest = roundtrip_test("complete_batch_request.json");
        assert!(req.has_failures);
        assert!(!req.success);
    }

    #[test]
    fn fixture_complete_batch_response() {
        let resp: CompleteBatchResponse = roundtrip_test("complete_batch_response.json");
        assert!(resp.success);
    }

    #[test]
    fn fixture_transaction_progress() {
        let p: TransactionProgress = roundtrip_test("transaction_progress.json");
        assert_eq!(p.status, TransactionStatus::InProgress);
        assert_eq!(p.percentage(), 50.0);
    }

    #[test]
    fn empty_optional_fields_are_omitted() {
        let json = serde_json::to_value(UploadChunkResponse::ok(None)).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
