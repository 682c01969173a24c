/// Signed mini-app session verification
///
/// The hosting client hands the mini-app an `initData` query string signed
/// with a key derived from the bot secret. Verification is one-way: no
/// handshake with the platform is needed.
use crate::error::{WardenError, WardenResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Fixed key used to derive the signing secret from the bot token
const WEB_APP_KEY: &[u8] = b"WebAppData";

/// Authenticated platform identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Authorization payload, classified once at the request boundary
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPayload {
    /// Query-string encoded `initData` carrying a `hash` field
    Signed(String),
    /// Already-decoded identity object containing an `id`
    Decoded(Map<String, Value>),
}

impl SessionPayload {
    pub fn parse(raw: &str) -> WardenResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WardenError::Authentication(
                "Init data not provided".to_string(),
            ));
        }

        if raw.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
                if map.contains_key("id") {
                    return Ok(SessionPayload::Decoded(map));
                }
            }
        }

        Ok(SessionPayload::Signed(raw.to_string()))
    }
}

/// Verifies session payloads against the bot secret
#[derive(Clone)]
pub struct WebAppVerifier {
    secret_key: Vec<u8>,
    allow_unsigned: bool,
}

impl std::fmt::Debug for WebAppVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAppVerifier")
            .field("allow_unsigned", &self.allow_unsigned)
            .finish_non_exhaustive()
    }
}

impl WebAppVerifier {
    /// Create a verifier for a bot token.
    ///
    /// `allow_unsigned` admits pre-decoded identity objects without any
    /// signature and must stay off outside trusted deployments.
    pub fn new(bot_token: &str, allow_unsigned: bool) -> WardenResult<Self> {
        Ok(Self {
            secret_key: derive_secret_key(bot_token)?,
            allow_unsigned,
        })
    }

    /// Verify a raw `authorization` header value
    pub fn verify(&self, raw: &str) -> WardenResult<Identity> {
        self.verify_payload(SessionPayload::parse(raw)?)
    }

    pub fn verify_payload(&self, payload: SessionPayload) -> WardenResult<Identity> {
        match payload {
            SessionPayload::Decoded(map) => {
                if !self.allow_unsigned {
                    tracing::warn!("Rejected unsigned identity payload");
                    return Err(WardenError::Authentication(
                        "Unsigned identity payloads are not accepted".to_string(),
                    ));
                }
                identity_from_user(&map)
            }
            SessionPayload::Signed(init_data) => self.verify_signed(&init_data),
        }
    }

    fn verify_signed(&self, init_data: &str) -> WardenResult<Identity> {
        let mut fields = parse_query(init_data)?;

        let received_hash = fields
            .remove("hash")
            .ok_or_else(|| WardenError::Authentication("Hash not found".to_string()))?;

        let check_string = data_check_string(&fields);
        let expected = sign(&self.secret_key, &check_string)?;

        if expected != received_hash {
            tracing::debug!("Session payload signature mismatch");
            return Err(WardenError::Authentication("Invalid hash".to_string()));
        }

        let user = fields.get("user").map(String::as_str).unwrap_or("{}");
        let user: Map<String, Value> = serde_json::from_str(user)
            .map_err(|e| WardenError::Authentication(format!("Malformed user object: {}", e)))?;

        identity_from_user(&user)
    }
}

/// Build the signed `initData` string for a set of fields.
///
/// Mirrors what the hosting client produces; used by tooling and tests.
pub fn sign_fields(bot_token: &str, fields: &[(&str, &str)]) -> WardenResult<String> {
    let secret_key = derive_secret_key(bot_token)?;
    let map: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let hash = sign(&secret_key, &data_check_string(&map))?;

    let mut encoded: Vec<String> = fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    encoded.push(format!("hash={}", hash));
    Ok(encoded.join("&"))
}

/// secret = HMAC-SHA256(key = "WebAppData", message = bot token)
fn derive_secret_key(bot_token: &str) -> WardenResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(WEB_APP_KEY)
        .map_err(|e| WardenError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(bot_token.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sign(secret_key: &[u8], check_string: &str) -> WardenResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret_key)
        .map_err(|e| WardenError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(check_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sorted `key=value` lines joined with `\n`
fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a query string the way form decoders do: `+` is a space, blank
/// values and pairs without `=` are dropped, the first duplicate wins.
fn parse_query(raw: &str) -> WardenResult<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();

    for pair in raw.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        let key = decode_component(key)?;
        let value = decode_component(value)?;
        fields.entry(key).or_insert(value);
    }

    Ok(fields)
}

fn decode_component(raw: &str) -> WardenResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| WardenError::Authentication(format!("Malformed payload encoding: {}", e)))
}

fn identity_from_user(user: &Map<String, Value>) -> WardenResult<Identity> {
    let user_id = match user.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .filter(|id| *id > 0)
    .ok_or_else(|| WardenError::Authentication("User ID not found".to_string()))?;

    let text = |key: &str| user.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(Identity {
        user_id,
        username: text("username"),
        first_name: text("first_name"),
        last_name: text("last_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:TEST-secret";

    fn signed_payload(user: &str) -> String {
        sign_fields(
            BOT_TOKEN,
            &[
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", user),
                ("auth_date", "1700000000"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_verify_valid_payload() {
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        let payload = signed_payload(r#"{"id":42,"first_name":"Ann","username":"ann"}"#);

        let identity = verifier.verify(&payload).unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.username.as_deref(), Some("ann"));
        assert_eq!(identity.first_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_check_string_is_sorted_and_newline_joined() {
        let mut fields = BTreeMap::new();
        fields.insert("user".to_string(), "{}".to_string());
        fields.insert("auth_date".to_string(), "1".to_string());
        fields.insert("query_id".to_string(), "q".to_string());

        assert_eq!(data_check_string(&fields), "auth_date=1\nquery_id=q\nuser={}");
    }

    #[test]
    fn test_known_signature_vector() {
        // Derivation order: key "WebAppData", message bot token
        let secret = derive_secret_key(BOT_TOKEN).unwrap();
        let mut mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        mac.update(BOT_TOKEN.as_bytes());
        assert_eq!(secret, mac.finalize().into_bytes().to_vec());

        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(b"auth_date=1\nuser={\"id\":7}");
        let expected = hex::encode(mac.finalize().into_bytes());

        let payload = format!(
            "auth_date=1&user={}&hash={}",
            urlencoding::encode("{\"id\":7}"),
            expected
        );
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        assert_eq!(verifier.verify(&payload).unwrap().user_id, 7);
    }

    #[test]
    fn test_tampered_field_fails() {
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        let payload = signed_payload(r#"{"id":42}"#).replace("1700000000", "1700000001");

        assert!(matches!(
            verifier.verify(&payload),
            Err(WardenError::Authentication(_))
        ));
    }

    #[test]
    fn test_every_hash_byte_mutation_fails() {
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        let payload = signed_payload(r#"{"id":42}"#);
        let (body, hash) = payload.rsplit_once("hash=").unwrap();

        for i in 0..hash.len() {
            let mut bytes = hash.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = format!("{}hash={}", body, String::from_utf8(bytes).unwrap());
            assert!(verifier.verify(&mutated).is_err(), "mutation at {} accepted", i);
        }
    }

    #[test]
    fn test_wrong_bot_token_fails() {
        let verifier = WebAppVerifier::new("999:other", false).unwrap();
        assert!(verifier.verify(&signed_payload(r#"{"id":42}"#)).is_err());
    }

    #[test]
    fn test_missing_hash_and_empty_payload() {
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        assert!(verifier.verify("").is_err());
        assert!(verifier.verify("   ").is_err());
        assert!(verifier.verify("user=%7B%22id%22%3A1%7D").is_err());
    }

    #[test]
    fn test_signed_payload_without_user_id_fails() {
        let verifier = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        assert!(verifier.verify(&signed_payload(r#"{"first_name":"x"}"#)).is_err());
        assert!(verifier.verify(&signed_payload(r#"{"id":0}"#)).is_err());
        assert!(verifier.verify(&signed_payload("not json")).is_err());
    }

    #[test]
    fn test_unsigned_identity_is_gated() {
        let strict = WebAppVerifier::new(BOT_TOKEN, false).unwrap();
        let lenient = WebAppVerifier::new(BOT_TOKEN, true).unwrap();

        assert!(strict.verify(r#"{"id": 77}"#).is_err());
        assert_eq!(lenient.verify(r#"{"id": 77}"#).unwrap().user_id, 77);
        assert_eq!(lenient.verify(r#"{"id": "78"}"#).unwrap().user_id, 78);
    }

    #[test]
    fn test_payload_classification() {
        assert!(matches!(
            SessionPayload::parse(r#"{"id":1}"#).unwrap(),
            SessionPayload::Decoded(_)
        ));
        // JSON without an id is treated as a (failing) signed payload
        assert!(matches!(
            SessionPayload::parse(r#"{"name":"x"}"#).unwrap(),
            SessionPayload::Signed(_)
        ));
        assert!(matches!(
            SessionPayload::parse("a=1&hash=ff").unwrap(),
            SessionPayload::Signed(_)
        ));
    }

    #[test]
    fn test_parse_query_form_semantics() {
        let fields = parse_query("a=1&b=&c&a=2&d=hello+world&e=%7B%7D").unwrap();
        assert_eq!(fields.get("a").map(String::as_str), Some("1"));
        assert!(!fields.contains_key("b"));
        assert!(!fields.contains_key("c"));
        assert_eq!(fields.get("d").map(String::as_str), Some("hello world"));
        assert_eq!(fields.get("e").map(String::as_str), Some("{}"));
    }
}
