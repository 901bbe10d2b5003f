//! Failure classification.
//!
//! Maps the free-text reason of a transfer failure to a `JobErrorKind`. The
//! rules are case-insensitive substring checks evaluated in order; the first
//! rule that matches wins. The copy primitives expose no richer signal at this
//! point, so the message text is all there is to go on.

use crate::model::JobErrorKind;

pub fn classify_error(message: &str) -> JobErrorKind {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("locked") || has("being used by another process") || has("access denied") {
        return JobErrorKind::Transient;
    }

    if (has("disk") && has("space")) || has("not enough space") {
        return JobErrorKind::DiskSpace;
    }

    if has("permission") || has("unauthorized") || has("access is denied") {
        return JobErrorKind::Permissions;
    }

    if has("not found") || has("path too long") || has("invalid path") {
        return JobErrorKind::FileSystem;
    }

    JobErrorKind::Unknown
}
