//! Akamai player verification.
//!
//! Manifests protected by `pv-2.0` require every bootstrap and fragment
//! request to carry a `pvtoken` signed with HMAC-SHA256 and the `hdntl`
//! token from the manifest, both as query parameters.

use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use tracing::warn;

use crate::error::HdsError;

/// Percent-encoding set matching a query-parameter value: everything but
/// ASCII alphanumerics and `_ . - ~` is escaped.
pub(crate) const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Like [`QUERY_VALUE`], but `=` survives: the hdntl token is a
/// pre-formed `name=value` pair.
const HDNTL_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'=');

/// Builds the `?pvtoken=…&hdntl=…` query suffix for a manifest's
/// `pv-2.0` value. Returns an empty string when the manifest is not
/// protected, or when no player hash / key is configured.
pub fn player_verification(
    pv: Option<&str>,
    player: Option<&str>,
    key: Option<&[u8]>,
) -> Result<String, HdsError> {
    let Some(pv) = pv.filter(|pv| !pv.is_empty()) else {
        return Ok(String::new());
    };
    let (Some(player), Some(key)) = (player, key) else {
        warn!("manifest requires player verification but no player hash or key is configured");
        return Ok(String::new());
    };

    let (data, hdntl) = pv
        .split_once(';')
        .ok_or_else(|| HdsError::Format(format!("malformed pv-2.0 value {pv:?}")))?;

    let msg = format!("st=0~exp=9999999999~acl=*~data={data}!{player}");
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| HdsError::Format("invalid player verification key".to_owned()))?;
    mac.update(msg.as_bytes());
    let token = format!("{msg}~hmac={}", hex::encode(mac.finalize().into_bytes()));

    // hdntl also works as a cookie, but pvtoken only works in the URL, so
    // both go into the query string.
    Ok(format!(
        "?pvtoken={}&{}",
        utf8_percent_encode(&token, QUERY_VALUE),
        utf8_percent_encode(hdntl, HDNTL_VALUE)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef";

    #[test]
    fn unprotected_manifest_yields_empty_suffix() {
        assert_eq!(
            player_verification(None, Some("hash"), Some(KEY)).unwrap(),
            ""
        );
        assert_eq!(player_verification(Some(""), Some("hash"), Some(KEY)).unwrap(), "");
    }

    #[test]
    fn missing_configuration_yields_empty_suffix() {
        let pv = Some("data;hdntl=token");
        assert_eq!(player_verification(pv, None, Some(KEY)).unwrap(), "");
        assert_eq!(player_verification(pv, Some("hash"), None).unwrap(), "");
    }

    #[test]
    fn missing_separator_is_an_error() {
        assert!(player_verification(Some("no-separator"), Some("h"), Some(KEY)).is_err());
    }

    #[test]
    fn token_is_deterministic_and_encoded() {
        let pv = Some("someData==;hdntl=exp=111~acl=%2f*");
        let first = player_verification(pv, Some("playerHash="), Some(KEY)).unwrap();
        let second = player_verification(pv, Some("playerHash="), Some(KEY)).unwrap();
        assert_eq!(first, second);

        // st=0~exp=9999999999~acl=*~data=someData==!playerHash= with the
        // separators percent-encoded, then the hex HMAC.
        let expected_prefix =
            "?pvtoken=st%3D0~exp%3D9999999999~acl%3D%2A~data%3DsomeData%3D%3D%21playerHash%3D~hmac%3D";
        assert!(
            first.starts_with(expected_prefix),
            "unexpected prefix: {first}"
        );

        // 64 hex digits of HMAC-SHA256, then the hdntl with '=' kept.
        let rest = &first[expected_prefix.len()..];
        let (hmac_hex, hdntl) = rest.split_once('&').unwrap();
        assert_eq!(hmac_hex.len(), 64);
        assert!(hmac_hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hdntl, "hdntl=exp=111~acl=%252f%2A");
    }

    #[test]
    fn different_keys_produce_different_tokens() {
        let pv = Some("data;hdntl=x");
        let a = player_verification(pv, Some("h"), Some(b"key-a".as_slice())).unwrap();
        let b = player_verification(pv, Some("h"), Some(b"key-b".as_slice())).unwrap();
        assert_ne!(a, b);
    }
}
