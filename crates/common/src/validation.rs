//! Input validation utilities to prevent panics on external input
//!
//! Session ids arrive in URL paths and are used as metric labels and file names, so they are
//! bounded and restricted. Tracked-object payloads come from an external tracker and are checked
//! before they reach the engine.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::traffic::TrackedFrame;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (session ids, lane ids)
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum number of tracked objects accepted in a single frame
pub const MAX_OBJECTS_PER_FRAME: usize = 4096;

/// Maximum length of a class label
pub const MAX_CLASS_LABEL_LENGTH: usize = 64;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Current Unix timestamp in milliseconds, safely handling clock errors
///
/// Logs a warning and returns 0 if the system clock is before the epoch
pub fn safe_unix_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate resource ID (session_id, lane id)
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    // Prevent path traversal in IDs
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

// ============================================================================
// Tracker Payload Validation
// ============================================================================

/// Validate a tracked frame before it is handed to the congestion engine
///
/// Rejects oversized frames, malformed boxes and overlong labels. Duplicate ids are left to
/// the engine, which keeps the first occurrence.
pub fn validate_tracked_frame(frame: &TrackedFrame) -> Result<()> {
    if frame.objects.len() > MAX_OBJECTS_PER_FRAME {
        return Err(anyhow!(
            "frame {} carries {} objects (maximum {})",
            frame.frame_index,
            frame.objects.len(),
            MAX_OBJECTS_PER_FRAME
        ));
    }

    for obj in &frame.objects {
        if !obj.bbox.is_well_formed() {
            return Err(anyhow!(
                "track {} has a malformed bbox {:?} (expected finite x1<x2, y1<y2)",
                obj.id,
                obj.bbox
            ));
        }
        validate_length(&obj.class_label, MAX_CLASS_LABEL_LENGTH, "class_label")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::{BoundingBox, TrackedObject};

    #[test]
    fn test_validate_id() {
        assert!(validate_id("camera-01", "session_id").is_ok());
        assert!(validate_id("", "session_id").is_err());
        assert!(validate_id("../etc", "session_id").is_err());
        assert!(validate_id("a/b", "session_id").is_err());
        assert!(validate_id(&"x".repeat(MAX_ID_LENGTH + 1), "session_id").is_err());
    }

    #[test]
    fn test_validate_tracked_frame() {
        let mut frame = TrackedFrame {
            frame_index: 0,
            timestamp_ms: None,
            objects: vec![TrackedObject::new(
                1,
                BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                "car",
            )],
        };
        assert!(validate_tracked_frame(&frame).is_ok());

        frame.objects[0].bbox = BoundingBox::new(10.0, 0.0, 0.0, 10.0);
        assert!(validate_tracked_frame(&frame).is_err());
    }

    #[test]
    fn test_safe_timestamps() {
        // 2020-01-01T00:00:00Z
        assert!(safe_unix_millis() > 1_577_836_800_000);
    }
}
