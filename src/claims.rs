use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::types::Subject;

/// Identity claims derived from an id token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IdentityClaims {
    pub subject: Subject,
    pub email: Option<String>,
    /// `name`, else `preferred_username`, else `sub`.
    pub display_name: String,
    pub groups: Vec<String>,
    pub preferred_username: Option<String>,
    pub nonce: Option<String>,
}

/// Parses the payload of a compact `header.payload.signature` token.
///
/// The signature is not verified: the id token is only ever obtained
/// directly from the token endpoint over TLS.
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] if the token does not have exactly three
/// segments, the payload is not base64url, not a JSON object, or lacks `sub`.
pub fn parse_id_token(id_token: &str) -> Result<IdentityClaims, Error> {
    let payload = decode_payload(id_token)?;
    claims_from_json(&payload)
}

/// Decodes the middle segment of a compact token into a JSON object.
pub(crate) fn decode_payload(token: &str) -> Result<JsonValue, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    let payload: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {e}")))?;
    if !payload.is_object() {
        return Err(Error::MalformedToken("payload is not a JSON object".into()));
    }
    Ok(payload)
}

fn claims_from_json(payload: &JsonValue) -> Result<IdentityClaims, Error> {
    let string_claim =
        |key: &str| payload.get(key).and_then(JsonValue::as_str).map(str::to_owned);

    let sub = string_claim("sub")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MalformedToken("missing claim: sub".into()))?;
    let preferred_username = string_claim("preferred_username");
    let display_name = string_claim("name")
        .or_else(|| preferred_username.clone())
        .unwrap_or_else(|| sub.clone());

    Ok(IdentityClaims {
        subject: Subject(sub),
        email: string_claim("email"),
        display_name,
        groups: normalize_groups(payload.get("groups")),
        preferred_username,
        nonce: string_claim("nonce"),
    })
}

/// Accepts a list of strings or a single string; anything else is no groups.
pub(crate) fn normalize_groups(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_owned)
            .collect(),
        Some(JsonValue::String(group)) => vec![group.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an unsigned compact token around `payload`.
    pub(crate) fn make_id_token(payload: &JsonValue) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn name_falls_back_to_sub() {
        let token = make_id_token(&serde_json::json!({
            "sub": "u1",
            "email": "a@b.com",
            "groups": ["staff"],
        }));
        let claims = parse_id_token(&token).unwrap();
        assert_eq!(claims.subject.as_str(), "u1");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.groups, vec!["staff"]);
        assert_eq!(claims.display_name, "u1");
        assert_eq!(claims.preferred_username, None);
    }

    #[test]
    fn name_falls_back_to_preferred_username() {
        let token = make_id_token(&serde_json::json!({
            "sub": "u1",
            "preferred_username": "jdoe",
        }));
        let claims = parse_id_token(&token).unwrap();
        assert_eq!(claims.display_name, "jdoe");
        assert_eq!(claims.preferred_username.as_deref(), Some("jdoe"));
    }

    #[test]
    fn name_preferred_when_present() {
        let token = make_id_token(&serde_json::json!({
            "sub": "u1",
            "name": "Jane Doe",
            "preferred_username": "jdoe",
            "nonce": "n-1",
        }));
        let claims = parse_id_token(&token).unwrap();
        assert_eq!(claims.display_name, "Jane Doe");
        assert_eq!(claims.nonce.as_deref(), Some("n-1"));
    }

    #[test]
    fn single_string_group_normalized() {
        let token = make_id_token(&serde_json::json!({ "sub": "u1", "groups": "admins" }));
        let claims = parse_id_token(&token).unwrap();
        assert_eq!(claims.groups, vec!["admins"]);
    }

    #[test]
    fn absent_groups_are_empty() {
        let token = make_id_token(&serde_json::json!({ "sub": "u1" }));
        assert!(parse_id_token(&token).unwrap().groups.is_empty());
    }

    #[test]
    fn padded_payload_accepted() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u"}"#);
        let padded = format!("{payload}{}", "=".repeat((4 - payload.len() % 4) % 4));
        let token = format!("e30.{padded}.sig");
        assert_eq!(parse_id_token(&token).unwrap().subject.as_str(), "u");
    }

    #[test]
    fn wrong_segment_count_rejected() {
        assert!(matches!(
            parse_id_token("a.b"),
            Err(Error::MalformedToken(_))
        ));
        assert!(matches!(
            parse_id_token("a.b.c.d"),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn non_json_payload_rejected() {
        let body = URL_SAFE_NO_PAD.encode("not json");
        let token = format!("e30.{body}.sig");
        assert!(matches!(
            parse_id_token(&token),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn missing_sub_rejected() {
        let token = make_id_token(&serde_json::json!({ "email": "a@b.com" }));
        assert!(matches!(
            parse_id_token(&token),
            Err(Error::MalformedToken(_))
        ));
    }
}
