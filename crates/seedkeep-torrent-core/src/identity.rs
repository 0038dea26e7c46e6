//! Canonical content identity (BTIH) resolution.
//!
//! # Design
//! - Every accepted spelling of an info hash collapses to one lowercase 40-hex key.
//! - Resolution is pure: identical input always yields identical output, and malformed
//!   input always fails rather than producing a guessed value.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{TorrentError, TorrentResult};
use crate::metainfo::TorrentMetainfo;

const BTIH_PREFIX: &str = "urn:btih:";
const HEX_LEN: usize = 40;
const BASE32_LEN: usize = 32;
const DIGEST_LEN: usize = 20;

/// Canonical 40-character lowercase hex info hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Normalise a `urn:btih:` string, raw 40-hex, or 32-character base32 hash.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidIdentity`] for any other input.
    pub fn normalize(value: &str) -> TorrentResult<Self> {
        let hash = strip_btih_prefix(value).unwrap_or(value);
        match hash.len() {
            HEX_LEN if hash.bytes().all(|byte| byte.is_ascii_hexdigit()) => {
                Ok(Self(hash.to_ascii_lowercase()))
            }
            HEX_LEN => Err(TorrentError::invalid_identity(value, "non_hex_digit")),
            BASE32_LEN => {
                let decoded = BASE32
                    .decode(hash.to_ascii_uppercase().as_bytes())
                    .map_err(|_| TorrentError::invalid_identity(value, "invalid_base32"))?;
                Self::from_digest(&decoded)
                    .ok_or_else(|| TorrentError::invalid_identity(value, "digest_length"))
            }
            _ => Err(TorrentError::invalid_identity(value, "length")),
        }
    }

    /// Resolve the first valid BTIH among the `xt` parameters of a magnet URI.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidIdentity`] when the input is not a magnet URI
    /// or none of its `xt` parameters normalise.
    pub fn from_magnet(uri: &str) -> TorrentResult<Self> {
        let parsed =
            Url::parse(uri).map_err(|_| TorrentError::invalid_identity(uri, "unparseable_uri"))?;
        if parsed.scheme() != "magnet" {
            return Err(TorrentError::invalid_identity(uri, "not_magnet"));
        }

        parsed
            .query_pairs()
            .filter(|(key, _)| key == "xt")
            .find_map(|(_, value)| Self::normalize(&value).ok())
            .ok_or_else(|| TorrentError::invalid_identity(uri, "no_btih"))
    }

    /// Resolve the identity of an in-memory `.torrent` payload.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Metainfo`] when the payload cannot be decoded.
    pub fn from_torrent_bytes(bytes: &[u8]) -> TorrentResult<Self> {
        let metainfo = TorrentMetainfo::from_bytes(bytes)?;
        Self::from_magnet(&metainfo.magnet_uri())
    }

    /// Resolve the identity of a `.torrent` file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Io`] when the file cannot be read and
    /// [`TorrentError::Metainfo`] when it cannot be decoded.
    pub fn from_torrent_file(path: &Path) -> TorrentResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| TorrentError::Io {
            operation: "identity.read_torrent_file",
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_torrent_bytes(&bytes)
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Option<Self> {
        (digest.len() == DIGEST_LEN).then(|| Self(hex::encode(digest)))
    }

    /// Borrow the canonical hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_btih_prefix(value: &str) -> Option<&str> {
    let head = value.get(..BTIH_PREFIX.len())?;
    head.eq_ignore_ascii_case(BTIH_PREFIX)
        .then(|| &value[BTIH_PREFIX.len()..])
}

impl Display for ContentIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for ContentIdentity {
    type Err = TorrentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::normalize(value)
    }
}

impl TryFrom<String> for ContentIdentity {
    type Error = TorrentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

impl From<ContentIdentity> for String {
    fn from(identity: ContentIdentity) -> Self {
        identity.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef01234567";
    // RFC 4648 base32 of the same 20 bytes.
    const B32: &str = "AERUKZ4JVPG66AJDIVTYTK6N54ASGRLH";

    #[test]
    fn normalize_accepts_every_spelling() -> TorrentResult<()> {
        let expected = ContentIdentity::normalize(HEX)?;
        assert_eq!(expected.as_str(), HEX);
        assert_eq!(ContentIdentity::normalize(&HEX.to_uppercase())?, expected);
        assert_eq!(ContentIdentity::normalize(&format!("urn:btih:{HEX}"))?, expected);
        assert_eq!(ContentIdentity::normalize(&format!("URN:BTIH:{HEX}"))?, expected);
        assert_eq!(ContentIdentity::normalize(B32)?, expected);
        assert_eq!(ContentIdentity::normalize(&B32.to_lowercase())?, expected);
        assert_eq!(ContentIdentity::normalize(&format!("urn:btih:{B32}"))?, expected);
        Ok(())
    }

    #[test]
    fn normalize_rejects_malformed_input() {
        let too_long = format!("{HEX}0");
        for value in [
            "",
            "urn:btih:",
            "abc",
            &HEX[..39],
            too_long.as_str(),
            "0123456789abcdef0123456789abcdef0123456z",
            "AERUKZ4JVPG66AJDIVTYTK6N54ASGRL1",
            "urn:sha1:0123456789abcdef0123456789abcdef01234567",
            " 0123456789abcdef0123456789abcdef01234567",
        ] {
            assert!(
                matches!(
                    ContentIdentity::normalize(value),
                    Err(TorrentError::InvalidIdentity { .. })
                ),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn from_magnet_returns_first_valid_btih() -> TorrentResult<()> {
        let other = "fedcba98765432100123456789abcdef01234567";
        let uri = format!(
            "magnet:?xt=urn:btmh:1220deadbeef&xt=urn:btih:{B32}&xt=urn:btih:{other}&dn=demo"
        );
        assert_eq!(ContentIdentity::from_magnet(&uri)?.as_str(), HEX);
        Ok(())
    }

    #[test]
    fn from_magnet_requires_magnet_scheme_and_btih() {
        let http = format!("https://example.com/?xt=urn:btih:{HEX}");
        assert!(ContentIdentity::from_magnet(&http).is_err());
        assert!(ContentIdentity::from_magnet("magnet:?dn=nothing").is_err());
        assert!(ContentIdentity::from_magnet("magnet:?xt=urn:btih:short").is_err());
        assert!(ContentIdentity::from_magnet("not a uri").is_err());
    }

    #[test]
    fn string_conversions_normalise() -> anyhow::Result<()> {
        let identity = ContentIdentity::try_from(format!("urn:btih:{}", HEX.to_uppercase()))?;
        assert_eq!(identity.as_str(), HEX);
        assert_eq!(String::from(identity.clone()), HEX);
        assert_eq!(identity.to_string().parse::<ContentIdentity>()?, identity);
        Ok(())
    }
}
