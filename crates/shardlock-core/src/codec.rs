//! Name and content codecs for lock records.
//!
//! A lock record's object name is
//! `<enc(resource)>.<enc(owner)>.<millis-or-never>.lock`, where `enc()`
//! percent-encodes every byte outside `[A-Za-z0-9_-]`. Keeping `.` and `%`
//! out of the encoded components makes the segment grammar unambiguous and
//! guarantees that prefix listings for one resource can never match
//! another. The record body carries the same three fields as versioned
//! JSON and is the authoritative source when reconstructing a descriptor.

use chrono::{DateTime, TimeZone, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::descriptor::LockDescriptor;
use crate::error::{LockError, LockResult};

/// Suffix shared by every lock object name.
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// Expiry segment used when a lock never expires.
pub const NO_EXPIRY_MARKER: &str = "never";

/// Version written into every lock record body.
const CONTENT_VERSION: u32 = 1;

/// Every byte outside `[A-Za-z0-9_-]` is percent-encoded, so the `.`
/// delimiter and `%` itself can never appear raw inside a component.
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Encode a descriptor into its remote object name. Deterministic and
/// total for any validly constructed descriptor.
pub fn encode_name(descriptor: &LockDescriptor) -> String {
    let expiry = match descriptor.expires_at() {
        Some(at) => at.timestamp_millis().to_string(),
        None => NO_EXPIRY_MARKER.to_string(),
    };
    format!(
        "{}.{}.{}{}",
        utf8_percent_encode(descriptor.resource(), COMPONENT_ENCODE_SET),
        utf8_percent_encode(descriptor.owner(), COMPONENT_ENCODE_SET),
        expiry,
        LOCK_FILE_SUFFIX
    )
}

/// Decode a lock object name back into a descriptor without reading
/// content. Partial: any name outside the scheme fails with
/// [`LockError::Malformed`].
pub fn decode_name(name: &str) -> LockResult<LockDescriptor> {
    let stem = name
        .strip_suffix(LOCK_FILE_SUFFIX)
        .ok_or_else(|| malformed(name, "missing .lock suffix"))?;
    let segments: Vec<&str> = stem.split('.').collect();
    if segments.len() != 3 {
        return Err(malformed(
            name,
            "expected resource, owner and expiry segments",
        ));
    }
    let resource = decode_component(segments[0], name)?;
    let owner = decode_component(segments[1], name)?;
    if resource.is_empty() {
        return Err(malformed(name, "empty resource segment"));
    }
    if owner.is_empty() {
        return Err(malformed(name, "empty owner segment"));
    }
    let expires_at = parse_expiry(segments[2], name)?;
    Ok(LockDescriptor::from_parts(resource, owner, expires_at))
}

/// Listing prefix scoping to one resource's locks. The trailing delimiter
/// keeps resources whose names share a textual prefix apart ("file1" never
/// matches "file10").
pub fn resource_prefix(resource: &str) -> String {
    format!("{}.", utf8_percent_encode(resource, COMPONENT_ENCODE_SET))
}

/// Whether `name` belongs to `resource`'s locks.
pub fn matches_resource_prefix(name: &str, resource: &str) -> bool {
    name.starts_with(&resource_prefix(resource))
}

/// On-wire JSON body of a lock record.
#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    version: u32,
    resource: String,
    owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

/// Serialize a descriptor into the versioned record body written at
/// acquire time.
pub fn encode_contents(descriptor: &LockDescriptor) -> LockResult<Vec<u8>> {
    let record = LockRecord {
        version: CONTENT_VERSION,
        resource: descriptor.resource().to_string(),
        owner: descriptor.owner().to_string(),
        expires_at_ms: descriptor.expires_at().map(|at| at.timestamp_millis()),
    };
    serde_json::to_vec(&record)
        .map_err(|e| LockError::Malformed(format!("failed to serialize lock record: {}", e)))
}

/// Parse a record body back into a descriptor. Rejects unknown versions
/// and empty fields as [`LockError::Malformed`].
pub fn decode_contents(bytes: &[u8]) -> LockResult<LockDescriptor> {
    let record: LockRecord = serde_json::from_slice(bytes)
        .map_err(|e| LockError::Malformed(format!("failed to parse lock record: {}", e)))?;
    if record.version != CONTENT_VERSION {
        return Err(LockError::Malformed(format!(
            "unsupported lock record version {}",
            record.version
        )));
    }
    let expires_at = match record.expires_at_ms {
        Some(ms) => Some(millis_to_datetime(ms).ok_or_else(|| {
            LockError::Malformed(format!("lock record expiry {} out of range", ms))
        })?),
        None => None,
    };
    LockDescriptor::new(record.resource, record.owner, expires_at)
        .map_err(|_| LockError::Malformed("lock record has empty fields".to_string()))
}

fn decode_component(segment: &str, name: &str) -> LockResult<String> {
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_| malformed(name, "segment is not valid UTF-8"))?;
    // Percent decoding is lenient; re-encoding catches stray `%` bytes and
    // non-canonical escapes.
    if utf8_percent_encode(&decoded, COMPONENT_ENCODE_SET).to_string() != segment {
        return Err(malformed(name, "segment is not canonically encoded"));
    }
    Ok(decoded.into_owned())
}

fn parse_expiry(segment: &str, name: &str) -> LockResult<Option<DateTime<Utc>>> {
    if segment == NO_EXPIRY_MARKER {
        return Ok(None);
    }
    let ms: i64 = segment
        .parse()
        .map_err(|_| malformed(name, "expiry is neither epoch millis nor 'never'"))?;
    // Integer parsing tolerates `+` and leading zeros; names do not, or the
    // decoded descriptor would re-encode to a different object name.
    if ms.to_string() != segment {
        return Err(malformed(name, "expiry is not canonically encoded"));
    }
    millis_to_datetime(ms)
        .map(Some)
        .ok_or_else(|| malformed(name, "expiry millis out of range"))
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn malformed(name: &str, reason: &str) -> LockError {
    LockError::Malformed(format!("name '{}': {}", name, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn test_encode_name_with_expiry() {
        let descriptor =
            LockDescriptor::new("segment-5", "snap-1", Some(millis(1_700_000_000_000))).unwrap();
        assert_eq!(
            descriptor.lock_name(),
            "segment-5.snap-1.1700000000000.lock"
        );
    }

    #[test]
    fn test_encode_name_without_expiry() {
        let descriptor = LockDescriptor::new("segment-5", "snap-1", None).unwrap();
        assert_eq!(descriptor.lock_name(), "segment-5.snap-1.never.lock");
    }

    #[test]
    fn test_encode_name_escapes_delimiters() {
        let descriptor = LockDescriptor::new("seg.5", "snap%1", None).unwrap();
        assert_eq!(descriptor.lock_name(), "seg%2E5.snap%251.never.lock");
    }

    #[test]
    fn test_round_trip_plain() {
        let descriptor =
            LockDescriptor::new("segment-5", "snap-1", Some(millis(1_700_000_000_000))).unwrap();
        assert_eq!(decode_name(&descriptor.lock_name()).unwrap(), descriptor);
    }

    #[test]
    fn test_round_trip_no_expiry() {
        let descriptor = LockDescriptor::new("segment-5", "snap-1", None).unwrap();
        assert_eq!(decode_name(&descriptor.lock_name()).unwrap(), descriptor);
    }

    #[test]
    fn test_round_trip_hostile_components() {
        let descriptor = LockDescriptor::new(
            "shards/№5 data.seg",
            "snap-α.1%",
            Some(millis(1_700_000_000_000)),
        )
        .unwrap();
        let name = descriptor.lock_name();
        assert_eq!(name.matches('.').count(), 3);
        assert_eq!(decode_name(&name).unwrap(), descriptor);
    }

    #[test]
    fn test_decode_rejects_malformed_names() {
        let cases = [
            "",
            "file",
            "file.lock",
            "a.b.lock",
            "a.b.c.d.lock",
            "a.b.never",
            "a.b.12x3.lock",
            "a.b.+100.lock",
            "a.b.0100.lock",
            "a.b..lock",
            ".o.never.lock",
            "r..never.lock",
            "a%2.b.never.lock",
            "a%zz.b.never.lock",
            "a.b.never.LOCK",
        ];
        for name in cases {
            let err = decode_name(name).unwrap_err();
            assert!(
                matches!(err, LockError::Malformed(_)),
                "expected Malformed for {:?}, got {:?}",
                name,
                err
            );
        }
    }

    #[test]
    fn test_decode_rejects_non_canonical_case() {
        // Encoding always emits uppercase hex.
        assert!(decode_name("seg%2e5.o.never.lock").is_err());
        assert!(decode_name("seg%2E5.o.never.lock").is_ok());
    }

    #[test]
    fn test_resource_prefix_has_trailing_delimiter() {
        assert_eq!(resource_prefix("file1"), "file1.");
        assert_eq!(resource_prefix("seg.5"), "seg%2E5.");
    }

    #[test]
    fn test_prefix_isolation_between_similar_resources() {
        let lock10 = LockDescriptor::new("file10", "owner-1", None)
            .unwrap()
            .lock_name();
        let lock1 = LockDescriptor::new("file1", "owner-1", None)
            .unwrap()
            .lock_name();
        assert!(matches_resource_prefix(&lock1, "file1"));
        assert!(!matches_resource_prefix(&lock10, "file1"));
        assert!(matches_resource_prefix(&lock10, "file10"));
        assert!(!matches_resource_prefix(&lock1, "file10"));
    }

    #[test]
    fn test_contents_round_trip() {
        let descriptor =
            LockDescriptor::new("segment-5", "snap-1", Some(millis(1_700_000_000_000))).unwrap();
        let bytes = encode_contents(&descriptor).unwrap();
        assert_eq!(decode_contents(&bytes).unwrap(), descriptor);
    }

    #[test]
    fn test_contents_omit_absent_expiry() {
        let descriptor = LockDescriptor::new("segment-5", "snap-1", None).unwrap();
        let bytes = encode_contents(&descriptor).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!text.contains("expires_at_ms"));
        assert_eq!(decode_contents(&bytes).unwrap().expires_at(), None);
    }

    #[test]
    fn test_contents_reject_unknown_version() {
        let bytes = br#"{"version":2,"resource":"a","owner":"b"}"#;
        let err = decode_contents(bytes).unwrap_err();
        assert!(matches!(err, LockError::Malformed(_)));
    }

    #[test]
    fn test_contents_reject_garbage() {
        let err = decode_contents(b"not json").unwrap_err();
        assert!(matches!(err, LockError::Malformed(_)));
    }

    #[test]
    fn test_contents_reject_empty_fields() {
        let bytes = br#"{"version":1,"resource":"","owner":"b"}"#;
        let err = decode_contents(bytes).unwrap_err();
        assert!(matches!(err, LockError::Malformed(_)));
    }
}
