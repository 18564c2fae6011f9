//! Error-message classification for strings crossing a plugin boundary.
//!
//! Plugins report failures as plain strings (a C string from a native
//! plugin, a guest-memory string from WASM). The bridge recovers the error
//! category from well-known message prefixes so routing layers can dispatch
//! on the variant; anything unrecognized lands in [`FsError::Io`].

use agfs_core::FsError;

/// Maps a plugin error message back onto the shared taxonomy.
///
/// Matching is on the lowercased message prefix, mirroring how the bridge
/// renders [`FsError`]s when sending them the other way.
pub(crate) fn classify(message: &str) -> FsError {
    let msg = message.trim();
    let lower = msg.to_ascii_lowercase();
    if lower.starts_with("not found") || lower.contains("no such file") {
        FsError::NotFound(msg.to_string())
    } else if lower.starts_with("permission denied") {
        FsError::PermissionDenied(msg.to_string())
    } else if lower.starts_with("already exists") || lower.contains("file exists") {
        FsError::AlreadyExists(msg.to_string())
    } else if lower.starts_with("not supported") || lower.contains("not implemented") {
        FsError::NotSupported(msg.to_string())
    } else if lower.starts_with("timed out") || lower.contains("timeout") {
        FsError::Timeout(msg.to_string())
    } else if lower.starts_with("invalid argument") {
        FsError::InvalidArgument(msg.to_string())
    } else {
        FsError::Io(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_display() {
        let original = FsError::NotFound("/queue/item".into());
        let back = classify(&original.to_string());
        assert!(matches!(back, FsError::NotFound(_)));

        let original = FsError::NotSupported("open_handle".into());
        assert!(classify(&original.to_string()).is_not_supported());
    }

    #[test]
    fn test_foreign_phrasings() {
        assert!(matches!(
            classify("no such file or directory: /x"),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            classify("fs_chmod not implemented"),
            FsError::NotSupported(_)
        ));
        assert!(matches!(classify("disk exploded"), FsError::Io(_)));
    }
}
