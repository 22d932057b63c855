//! AWS Signature Version 4 request signing
//!
//! Signs the `host` and `x-amz-date` headers (plus `x-amz-security-token` for
//! temporary credentials), which is all the gateway control plane requires.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::Credentials;

/// Service name used in the credential scope
pub const SERVICE: &str = "apigateway";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// A request to be signed
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Host header value, including a non-default port
    pub host: &'a str,
    pub path: &'a str,
    /// Unencoded query parameters
    pub query: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs in the order they should be sent
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("x-amz-date", self.amz_date.clone()),
            ("authorization", self.authorization.clone()),
        ];
        if let Some(token) = &self.security_token {
            pairs.push(("x-amz-security-token", token.clone()));
        }
        pairs
    }
}

/// Sign `request` for `region` at `time`
pub fn sign(
    credentials: &Credentials,
    region: &str,
    time: DateTime<Utc>,
    request: &SigningRequest<'_>,
) -> SignedHeaders {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();

    let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", request.host.trim(), amz_date);
    let mut signed_headers = String::from("host;x-amz-date");
    if let Some(token) = &credentials.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token.trim()));
        signed_headers.push_str(";x-amz-security-token");
    }

    let query = canonical_query(request.query);
    let payload_hash = hex::encode(Sha256::digest(request.payload));
    let canonical_request = [
        request.method,
        request.path,
        query.as_str(),
        canonical_headers.as_str(),
        signed_headers.as_str(),
        payload_hash.as_str(),
    ]
    .join("\n");

    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
    let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        request_hash.as_str(),
    ]
    .join("\n");

    let key = signing_key(&credentials.secret_access_key, &date, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
        ),
        amz_date,
        security_token: credentials.session_token.clone(),
    }
}

/// Derive the signing key for a date, region and service
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Encode and sort query parameters
pub fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode everything except unreserved characters
pub fn uri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
