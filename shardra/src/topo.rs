use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use eyre::eyre;
use serde::{Deserialize, Serialize};

use crate::{error::RouterError, query::TabletType};

/// An opaque, ordered byte string locating a row within a keyspace's shard
/// partition. The empty value is `MinKey`: unroutable, short-circuits reads
/// and DML to a no-op, and is rejected on insert.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct KeyspaceId(Bytes);

impl KeyspaceId {
    pub fn min() -> Self {
        Self(Bytes::new())
    }

    pub fn is_min(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    pub fn from_bytes(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_u64(&self) -> Option<u64> {
        let raw: [u8; 8] = self.0.as_ref().try_into().ok()?;
        Some(u64::from_be_bytes(raw))
    }

    /// Lowercase hex, the one text rendering used in bind vars, routing
    /// comments, and lookup-table cells.
    pub fn hex(&self) -> String {
        use fmt::Write;
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    pub fn from_hex(text: &str) -> eyre::Result<Self> {
        if text.len() % 2 != 0 {
            return Err(eyre!("odd-length keyspace id {text:?}"));
        }
        let mut raw = Vec::with_capacity(text.len() / 2);
        for pair in text.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair)?;
            raw.push(u8::from_str_radix(pair, 16)?);
        }
        Ok(Self(raw.into()))
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyspaceId({self})")
    }
}

/// Half-open range `[start, end)` on the keyspace-id order. An empty bound
/// is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: KeyspaceId,
    pub end: KeyspaceId,
}

impl KeyRange {
    pub fn new(start: KeyspaceId, end: KeyspaceId) -> Self {
        Self { start, end }
    }

    /// Parses `"40-80"`, `"-40"`, `"c0-"` or `"-"` (full range).
    pub fn parse(spec: &str) -> eyre::Result<Self> {
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| eyre!("malformed key range {spec:?}"))?;
        Ok(Self {
            start: KeyspaceId::from_hex(start)?,
            end: KeyspaceId::from_hex(end)?,
        })
    }

    pub fn contains(&self, ksid: &KeyspaceId) -> bool {
        &self.start <= ksid && (self.end.is_min() || ksid < &self.end)
    }

    pub fn intersects(&self, other: &KeyRange) -> bool {
        (self.end.is_min() || other.start < self.end)
            && (other.end.is_min() || self.start < other.end)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One shard of a keyspace, named by its key range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub name: String,
    pub key_range: KeyRange,
}

impl Shard {
    /// Builds a shard from its canonical `start-end` name.
    pub fn from_spec(spec: &str) -> eyre::Result<Self> {
        Ok(Self {
            name: spec.to_owned(),
            key_range: KeyRange::parse(spec)?,
        })
    }
}

/// The topology service view the router consumes. The shard set may change
/// between calls; the router re-fetches per statement.
#[async_trait]
pub trait SrvTopo: Send + Sync + fmt::Debug {
    /// Resolves `(keyspace, tablet type)` to the effective keyspace name and
    /// its ordered shard partition. The effective name may differ from the
    /// requested one while a keyspace is being rerouted; callers must use
    /// the returned name downstream.
    async fn get_keyspace_shards(
        &self,
        cell: &str,
        keyspace: &str,
        tablet_type: TabletType,
    ) -> Result<(String, Vec<Shard>), RouterError>;
}

/// Ordered binary search for the unique shard whose range contains `ksid`.
pub fn shard_for_keyspace_id(
    keyspace: &str,
    shards: &[Shard],
    ksid: &KeyspaceId,
) -> Result<String, RouterError> {
    let idx = shards.partition_point(|shard| shard.key_range.start <= *ksid);
    if idx > 0 && shards[idx - 1].key_range.contains(ksid) {
        return Ok(shards[idx - 1].name.clone());
    }
    Err(RouterError::NoShardForKeyspaceId {
        keyspace: keyspace.to_owned(),
        ksid: ksid.hex(),
    })
}

/// All shards whose range intersects `range`, in partition order.
pub fn shards_for_key_range(shards: &[Shard], range: &KeyRange) -> Vec<String> {
    shards
        .iter()
        .filter(|shard| shard.key_range.intersects(range))
        .map(|shard| shard.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> Vec<Shard> {
        ["-40", "40-80", "80-c0", "c0-"]
            .into_iter()
            .map(|spec| Shard::from_spec(spec).unwrap())
            .collect()
    }

    #[test]
    fn hex_round_trip() {
        let ksid = KeyspaceId::from_u64(0x1668_9b0a_38b2_d772);
        assert_eq!(ksid.hex(), "16689b0a38b2d772");
        assert_eq!(KeyspaceId::from_hex(&ksid.hex()).unwrap(), ksid);
    }

    #[test]
    fn shard_lookup_covers_partition() {
        let shards = partition();
        for (hex, expected) in [
            ("00deadbeef000000", "-40"),
            ("4000000000000000", "40-80"),
            ("7fffffffffffffff", "40-80"),
            ("bb00000000000000", "80-c0"),
            ("ff00000000000000", "c0-"),
        ] {
            let ksid = KeyspaceId::from_hex(hex).unwrap();
            let shard = shard_for_keyspace_id("ks", &shards, &ksid).unwrap();
            assert_eq!(shard, expected, "ksid {hex}");
        }
    }

    #[test]
    fn key_range_shard_match() {
        let shards = partition();
        let one = KeyRange::parse("40-60").unwrap();
        assert_eq!(shards_for_key_range(&shards, &one), vec!["40-80"]);

        let two = KeyRange::parse("40-a0").unwrap();
        assert_eq!(shards_for_key_range(&shards, &two), vec!["40-80", "80-c0"]);

        let all = KeyRange::parse("-").unwrap();
        assert_eq!(shards_for_key_range(&shards, &all).len(), 4);
    }

    #[test]
    fn range_boundaries_are_half_open() {
        let range = KeyRange::parse("40-80").unwrap();
        assert!(range.contains(&KeyspaceId::from_hex("40").unwrap()));
        assert!(!range.contains(&KeyspaceId::from_hex("80").unwrap()));
    }
}
