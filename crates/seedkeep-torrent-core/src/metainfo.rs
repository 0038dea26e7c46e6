//! Minimal `.torrent` metainfo reader used to derive identities and magnets.

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use url::form_urlencoded;

use crate::error::{TorrentError, TorrentResult};
use crate::identity::ContentIdentity;

/// Deepest list/dict nesting accepted while locating the `info` bytes.
const MAX_DEPTH: usize = 64;

/// Metadata extracted from a bencoded `.torrent` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetainfo {
    identity: ContentIdentity,
    name: Option<String>,
    trackers: Vec<String>,
}

impl TorrentMetainfo {
    /// Decode the payload and hash its `info` dictionary as it appears on disk.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Metainfo`] when the payload is not a bencoded
    /// dictionary with an `info` dictionary.
    pub fn from_bytes(bytes: &[u8]) -> TorrentResult<Self> {
        let root: Value = serde_bencode::from_bytes(bytes).map_err(|_| TorrentError::Metainfo {
            reason: "not_bencode",
        })?;
        let Value::Dict(root) = root else {
            return Err(TorrentError::Metainfo {
                reason: "root_not_dict",
            });
        };
        let info = root
            .get(b"info".as_slice())
            .ok_or(TorrentError::Metainfo {
                reason: "missing_info",
            })?;
        let Value::Dict(info_dict) = info else {
            return Err(TorrentError::Metainfo {
                reason: "info_not_dict",
            });
        };

        let raw = info_span(bytes).ok_or(TorrentError::Metainfo {
            reason: "info_span",
        })?;
        let digest = Sha1::digest(raw);
        let identity = ContentIdentity::from_digest(digest.as_slice()).ok_or(
            TorrentError::Metainfo {
                reason: "digest_length",
            },
        )?;

        let name = info_dict.get(b"name".as_slice()).and_then(as_text);
        let trackers = collect_trackers(
            root.get(b"announce".as_slice()),
            root.get(b"announce-list".as_slice()),
        );

        Ok(Self {
            identity,
            name,
            trackers,
        })
    }

    /// Identity derived from the `info` dictionary.
    #[must_use]
    pub const fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    /// Display name advertised by the payload.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Announce URLs in tier order with duplicates removed.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    /// Render an equivalent magnet URI.
    #[must_use]
    pub fn magnet_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("xt", &format!("urn:btih:{}", self.identity));
        if let Some(name) = &self.name {
            query.append_pair("dn", name);
        }
        for tracker in &self.trackers {
            query.append_pair("tr", tracker);
        }
        format!("magnet:?{}", query.finish())
    }
}

/// Bytes of the top-level `info` value, unchanged from the payload.
fn info_span(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.first() != Some(&b'd') {
        return None;
    }
    let mut pos = 1;
    while *bytes.get(pos)? != b'e' {
        let (key, value_start) = string_at(bytes, pos)?;
        let value_end = skip_value(bytes, value_start, 0)?;
        if key == b"info" {
            return bytes.get(value_start..value_end);
        }
        pos = value_end;
    }
    None
}

/// Byte string starting at `pos` and the offset just past it.
fn string_at(bytes: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let colon = pos + bytes.get(pos..)?.iter().position(|byte| *byte == b':')?;
    let len: usize = std::str::from_utf8(bytes.get(pos..colon)?)
        .ok()?
        .parse()
        .ok()?;
    let end = colon.checked_add(1)?.checked_add(len)?;
    Some((bytes.get(colon + 1..end)?, end))
}

/// Offset just past the value starting at `pos`.
fn skip_value(bytes: &[u8], pos: usize, depth: usize) -> Option<usize> {
    if depth > MAX_DEPTH {
        return None;
    }
    match bytes.get(pos)? {
        b'i' => {
            let close = bytes.get(pos..)?.iter().position(|byte| *byte == b'e')?;
            Some(pos + close + 1)
        }
        b'l' | b'd' => {
            let mut cursor = pos + 1;
            while *bytes.get(cursor)? != b'e' {
                cursor = skip_value(bytes, cursor, depth + 1)?;
            }
            Some(cursor + 1)
        }
        b'0'..=b'9' => string_at(bytes, pos).map(|(_, end)| end),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn collect_trackers(announce: Option<&Value>, announce_list: Option<&Value>) -> Vec<String> {
    let mut trackers: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !url.is_empty() && !trackers.contains(&url) {
            trackers.push(url);
        }
    };

    if let Some(Value::List(tiers)) = announce_list {
        for tier in tiers {
            if let Value::List(urls) = tier {
                urls.iter().filter_map(as_text).for_each(&mut push);
            }
        }
    }
    if let Some(url) = announce.and_then(as_text) {
        push(url);
    }
    trackers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"d8:announce25:http://tracker.test/annce");
        bytes.extend_from_slice(b"4:infod6:lengthi1024e4:name8:demo.iso");
        bytes.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
        bytes.extend_from_slice(&[7_u8; 20]);
        bytes.extend_from_slice(b"ee");
        bytes
    }

    #[test]
    fn hashes_info_dictionary_bytes() -> TorrentResult<()> {
        let payload = sample_payload();
        let metainfo = TorrentMetainfo::from_bytes(&payload)?;

        let start = payload
            .windows(6)
            .position(|window| window == b"4:info")
            .map(|pos| pos + 6)
            .expect("info key present");
        let info_bytes = &payload[start..payload.len() - 1];
        let expected = hex::encode(Sha1::digest(info_bytes));

        assert_eq!(metainfo.identity().as_str(), expected);
        assert_eq!(metainfo.name(), Some("demo.iso"));
        assert_eq!(metainfo.trackers(), ["http://tracker.test/annce"]);
        Ok(())
    }

    #[test]
    fn unsorted_info_keys_hash_as_written() -> TorrentResult<()> {
        let written: &[u8] = b"d4:name8:demo.iso6:lengthi1024ee";
        let mut payload = b"d4:info".to_vec();
        payload.extend_from_slice(written);
        payload.extend_from_slice(b"8:announce9:udp://a:1e");

        let metainfo = TorrentMetainfo::from_bytes(&payload)?;

        assert_eq!(
            metainfo.identity().as_str(),
            hex::encode(Sha1::digest(written))
        );
        let sorted = hex::encode(Sha1::digest(b"d6:lengthi1024e4:name8:demo.isoe"));
        assert_ne!(metainfo.identity().as_str(), sorted);
        assert_eq!(metainfo.trackers(), ["udp://a:1"]);
        Ok(())
    }

    #[test]
    fn info_span_refuses_runaway_nesting() {
        let mut payload = b"d4:info".to_vec();
        payload.extend(std::iter::repeat_n(b'l', MAX_DEPTH + 2));
        payload.extend(std::iter::repeat_n(b'e', MAX_DEPTH + 2));
        payload.push(b'e');
        assert!(info_span(&payload).is_none());
        assert_eq!(info_span(b"d4:infoi7ee"), Some(b"i7e".as_slice()));
        assert!(info_span(b"d4:info5:abce").is_none());
    }

    #[test]
    fn magnet_uri_resolves_to_same_identity() -> TorrentResult<()> {
        let metainfo = TorrentMetainfo::from_bytes(&sample_payload())?;
        let magnet = metainfo.magnet_uri();
        assert!(magnet.starts_with("magnet:?xt=urn%3Abtih%3A"));
        assert_eq!(
            &ContentIdentity::from_magnet(&magnet)?,
            metainfo.identity()
        );
        Ok(())
    }

    #[test]
    fn rejects_payloads_without_info() {
        assert!(matches!(
            TorrentMetainfo::from_bytes(b"d8:announce3:urle"),
            Err(TorrentError::Metainfo {
                reason: "missing_info"
            })
        ));
        assert!(matches!(
            TorrentMetainfo::from_bytes(b"not bencode"),
            Err(TorrentError::Metainfo { .. })
        ));
        assert!(matches!(
            TorrentMetainfo::from_bytes(b"li1ee"),
            Err(TorrentError::Metainfo {
                reason: "root_not_dict"
            })
        ));
    }
}
