use chrono::{DateTime, TimeZone, Utc};

use crate::codec;
use crate::error::{LockError, LockResult};

/// An immutable description of one lock record: the resource being
/// protected, the identity holding it, and an optional expiry.
///
/// Construction goes through [`LockDescriptor::new`], which rejects empty
/// fields, so an instance in hand is always valid. A lock with an expiry is
/// active strictly before that instant; a lock without one never expires on
/// its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDescriptor {
    resource: String,
    owner: String,
    expires_at: Option<DateTime<Utc>>,
}

impl LockDescriptor {
    /// Create a descriptor, validating that `resource` and `owner` are
    /// non-empty. The expiry is truncated to millisecond precision, the
    /// precision carried on the wire, so a descriptor always equals its
    /// decoded round-trip.
    pub fn new(
        resource: impl Into<String>,
        owner: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> LockResult<Self> {
        let resource = resource.into();
        let owner = owner.into();
        require_non_empty(&resource, "resource")?;
        require_non_empty(&owner, "owner")?;
        Ok(Self {
            resource,
            owner,
            expires_at: expires_at.map(truncate_to_millis),
        })
    }

    /// Construction for the codec, which validates name well-formedness
    /// itself before calling this.
    pub(crate) fn from_parts(
        resource: String,
        owner: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            resource,
            owner,
            expires_at,
        }
    }

    /// The resource this lock protects.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The identity holding this lock.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// When this lock stops being active, if ever.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True iff the descriptor carries an expiry that `now` has reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// The derived remote object name for this lock record.
    pub fn lock_name(&self) -> String {
        codec::encode_name(self)
    }
}

/// Reject empty descriptor fields with [`LockError::InvalidArgument`].
pub(crate) fn require_non_empty(value: &str, what: &str) -> LockResult<()> {
    if value.is_empty() {
        return Err(LockError::InvalidArgument(format!(
            "lock {} must not be empty",
            what
        )));
    }
    Ok(())
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .unwrap_or(at)
}
