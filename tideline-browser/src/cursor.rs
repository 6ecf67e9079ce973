//! Pagination cursors and their opaque token encoding.
//!
//! All resumption state lives in the token the caller holds; the server keeps
//! nothing between pages. A token is bound to the topic and partition scope it
//! was issued for and authenticated with an HMAC, so a foreign, stale or
//! edited token is rejected instead of resuming at a wrong offset.
//!
//! # Token Layout
//!
//! ```text
//! +---------+-----------+------------+-------------+---------+----------+
//! | version | direction | page index | fingerprint | ts flag | [ts i64] |
//! |   u8    |    u8     |  u32 BE    |   8 bytes   |   u8    |          |
//! +---------+-----------+------------+-------------+---------+----------+
//! | count u16 BE | count x (partition u64 BE, next offset u64 BE) | mac |
//! +--------------+------------------------------------------------+-----+
//! ```
//!
//! The MAC is HMAC-SHA256 over everything before it, truncated to 16 bytes.
//! The whole thing is rendered as unpadded URL-safe base64.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::{Buf, BufMut, BytesMut};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tideline_core::{Offset, PartitionId, Timestamp};

use crate::config::ConfigError;
use crate::error::{BrowseError, BrowseResult};
use crate::page::SortDirection;

type HmacSha256 = Hmac<Sha256>;

/// Current token format version.
const CURSOR_VERSION: u8 = 1;

/// Bytes of the scope fingerprint.
const FINGERPRINT_LEN: usize = 8;

/// Bytes of the truncated MAC.
const MAC_LEN: usize = 16;

/// Fixed header: version, direction, page index, fingerprint, ts flag.
const HEADER_LEN: usize = 1 + 1 + 4 + FINGERPRINT_LEN + 1;

/// Bytes per partition entry.
const ENTRY_LEN: usize = 16;

/// Resume position of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionCursor {
    /// The partition.
    pub partition: PartitionId,
    /// Next offset to examine in scan direction.
    pub next_offset: Offset,
}

impl PartitionCursor {
    /// Creates a partition cursor.
    #[must_use]
    pub const fn new(partition: PartitionId, next_offset: Offset) -> Self {
        Self {
            partition,
            next_offset,
        }
    }
}

/// Resume state of a browsing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Partitions with data left, ascending by partition.
    pub partitions: Vec<PartitionCursor>,
    /// Direction of the session.
    pub direction: SortDirection,
    /// 1-based index of the page this cursor fetches.
    pub page_index: u32,
    /// Timestamp bound of the session, if any.
    pub timestamp_lower_bound: Option<Timestamp>,
}

impl PageCursor {
    /// Returns the resume offset of a partition, if it still has data.
    #[must_use]
    pub fn offset_for(&self, partition: PartitionId) -> Option<Offset> {
        self.partitions
            .binary_search_by_key(&partition, |entry| entry.partition)
            .ok()
            .map(|idx| self.partitions[idx].next_offset)
    }
}

/// The topic and partition set a browsing session covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorScope {
    topic: String,
    partitions: Vec<PartitionId>,
}

impl CursorScope {
    /// Creates a scope; partitions are sorted and deduplicated.
    #[must_use]
    pub fn new(topic: impl Into<String>, mut partitions: Vec<PartitionId>) -> Self {
        partitions.sort_unstable();
        partitions.dedup();
        Self {
            topic: topic.into(),
            partitions,
        }
    }

    /// Returns the topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the partitions in ascending order.
    #[must_use]
    pub fn partitions(&self) -> &[PartitionId] {
        &self.partitions
    }

    /// Returns true if the partition belongs to the scope.
    #[must_use]
    pub fn contains(&self, partition: PartitionId) -> bool {
        self.partitions.binary_search(&partition).is_ok()
    }

    /// Digest of topic and partition set.
    fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.topic.as_bytes());
        hasher.update([0u8]);
        for partition in &self.partitions {
            hasher.update(partition.get().to_be_bytes());
        }
        let digest = hasher.finalize();
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        out
    }
}

/// Encodes and decodes cursor tokens.
#[derive(Clone)]
pub struct CursorCodec {
    /// Keyed MAC, cloned per token.
    mac: HmacSha256,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

impl CursorCodec {
    /// Creates a codec keyed with `secret`.
    ///
    /// # Errors
    /// Returns an error if the secret is empty.
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::MissingSecret)?;
        Ok(Self { mac })
    }

    /// Encodes a cursor issued for `scope` into an opaque token.
    ///
    /// Encoding is deterministic: the same cursor and scope always produce
    /// the same token.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Partition count is bounded by the scope.
    pub fn encode(&self, scope: &CursorScope, cursor: &PageCursor) -> String {
        let mut buf = BytesMut::with_capacity(
            HEADER_LEN + 8 + 2 + cursor.partitions.len() * ENTRY_LEN + MAC_LEN,
        );
        buf.put_u8(CURSOR_VERSION);
        buf.put_u8(cursor.direction.as_byte());
        buf.put_u32(cursor.page_index);
        buf.put_slice(&scope.fingerprint());
        match cursor.timestamp_lower_bound {
            Some(ts) => {
                buf.put_u8(1);
                buf.put_i64(ts.as_millis());
            }
            None => buf.put_u8(0),
        }
        buf.put_u16(cursor.partitions.len() as u16);
        for entry in &cursor.partitions {
            buf.put_u64(entry.partition.get());
            buf.put_u64(entry.next_offset.get());
        }

        let mut mac = self.mac.clone();
        mac.update(&buf);
        let tag = mac.finalize().into_bytes();
        buf.put_slice(&tag[..MAC_LEN]);

        URL_SAFE_NO_PAD.encode(&buf)
    }

    /// Decodes a token and verifies it belongs to `scope`.
    ///
    /// # Errors
    /// Returns `InvalidCursor` if the token is malformed, fails
    /// authentication, or was issued for another topic or partition set.
    pub fn decode(&self, token: &str, scope: &CursorScope) -> BrowseResult<PageCursor> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| invalid("token is not valid base64"))?;

        if raw.len() < HEADER_LEN + 2 + MAC_LEN {
            return Err(invalid("token is truncated"));
        }

        let (body, tag) = raw.split_at(raw.len() - MAC_LEN);
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_truncated_left(tag)
            .map_err(|_| invalid("token signature mismatch"))?;

        let mut buf = body;
        if buf.get_u8() != CURSOR_VERSION {
            return Err(invalid("unsupported token version"));
        }
        let direction =
            SortDirection::from_byte(buf.get_u8()).ok_or_else(|| invalid("unknown sort direction"))?;
        let page_index = buf.get_u32();
        if page_index == 0 {
            return Err(invalid("page index must be positive"));
        }

        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        buf.copy_to_slice(&mut fingerprint);
        if fingerprint != scope.fingerprint() {
            return Err(invalid("token was issued for a different topic or partition set"));
        }

        let timestamp_lower_bound = match buf.get_u8() {
            0 => None,
            1 => {
                if buf.remaining() < 8 {
                    return Err(invalid("token is truncated"));
                }
                Some(Timestamp::from_millis(buf.get_i64()))
            }
            _ => return Err(invalid("unknown timestamp flag")),
        };

        if buf.remaining() < 2 {
            return Err(invalid("token is truncated"));
        }
        let count = buf.get_u16() as usize;
        if buf.remaining() != count * ENTRY_LEN {
            return Err(invalid("partition list length mismatch"));
        }

        let mut partitions = Vec::with_capacity(count);
        for _ in 0..count {
            let partition = PartitionId::new(buf.get_u64());
            let next_offset = Offset::new(buf.get_u64());
            if !scope.contains(partition) {
                return Err(invalid("partition outside the browsing scope"));
            }
            if partitions
                .last()
                .is_some_and(|prev: &PartitionCursor| prev.partition >= partition)
            {
                return Err(invalid("partitions are not strictly ascending"));
            }
            partitions.push(PartitionCursor::new(partition, next_offset));
        }

        Ok(PageCursor {
            partitions,
            direction,
            page_index,
            timestamp_lower_bound,
        })
    }
}

const fn invalid(reason: &'static str) -> BrowseError {
    BrowseError::InvalidCursor { reason }
}
