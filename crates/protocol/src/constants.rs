//! Sizes and thresholds shared across the pipeline.

const MIB: u64 = 1024 * 1024;

/// Fixed chunk size: 5 MiB.
///
/// Every chunk of one file must agree with the size used to compute its
/// chunk count, otherwise the receiver reassembles garbage.
pub const CHUNK_SIZE: u64 = 5 * MIB;

/// Maximum number of entries a directory listing returns per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Interactive mode: files above this size need user confirmation (10 MiB).
pub const INTERACTIVE_WARN_BYTES: u64 = 10 * MIB;

/// Interactive mode: files above this size are rejected (100 MiB).
pub const INTERACTIVE_REJECT_BYTES: u64 = 100 * MIB;

/// Unattended mode: files above this size are silently excluded (1.8 GiB).
pub const UNATTENDED_HARD_REJECT_BYTES: u64 = 1_932_735_283;

/// Extensions excluded from upload unless configured otherwise.
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &["DS_Store", "tmp", "swp", "part", "crdownload"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered() {
        assert!(INTERACTIVE_WARN_BYTES < INTERACTIVE_REJECT_BYTES);
        assert!(INTERACTIVE_REJECT_BYTES < UNATTENDED_HARD_REJECT_BYTES);
    }

    #[test]
    fn hard_reject_is_one_point_eight_gib() {
        let gib = 1024.0 * 1024.0 * 1024.0;
        let expected = (1.8 * gib) as u64;
        assert_eq!(UNATTENDED_HARD_REJECT_BYTES, expected);
    }
}
