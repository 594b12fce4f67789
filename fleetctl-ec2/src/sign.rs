//! AWS Signature Version 4 for the EC2 Query API.
//!
//! Only the shape this client actually sends is implemented: a POST to `/`
//! with a form-encoded body and no query string. The signed header set is
//! `content-type;host;x-amz-date` plus `x-amz-security-token` when temporary
//! credentials are in play.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use fleetctl_core::Credentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "ec2";

/// Content type of every Query API request
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Headers the caller must attach to the outgoing request
pub(crate) struct SignatureParts {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        <Hmac<Sha256>>::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4"+secret, date), region), service), "aws4_request")
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn canonical_request(
    host: &str,
    amz_date: &str,
    security_token: Option<&str>,
    payload_hash: &str,
) -> (String, String) {
    let mut header_lines = vec![
        format!("content-type:{}", FORM_CONTENT_TYPE),
        format!("host:{}", host),
        format!("x-amz-date:{}", amz_date),
    ];
    let mut signed: Vec<&str> = vec!["content-type", "host", "x-amz-date"];
    if let Some(token) = security_token {
        header_lines.push(format!("x-amz-security-token:{}", token));
        signed.push("x-amz-security-token");
    }
    let signed_headers = signed.join(";");
    let request = format!(
        "POST\n/\n\n{}\n\n{}\n{}",
        header_lines.join("\n"),
        signed_headers,
        payload_hash
    );
    (request, signed_headers)
}

/// Sign a Query API POST and return the headers to attach
pub(crate) fn sign_post(
    credentials: &Credentials,
    region: &str,
    host: &str,
    body: &str,
    now: DateTime<Utc>,
) -> SignatureParts {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let payload_hash = sha256_hex(body.as_bytes());
    let (canonical, signed_headers) = canonical_request(
        host,
        &amz_date,
        credentials.session_token.as_deref(),
        &payload_hash,
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    );

    SignatureParts {
        amz_date,
        authorization,
        security_token: credentials.session_token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_credentials(token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: token.map(|t| t.to_string()),
        }
    }

    #[test]
    fn test_signing_key_matches_published_example() {
        // Derivation example from the Signature V4 documentation
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_canonical_request_layout() {
        let payload_hash = sha256_hex(b"Action=DescribeInstances&Version=2016-11-15");
        let (canonical, signed) = canonical_request(
            "ec2.us-west-2.amazonaws.com",
            "20150830T123600Z",
            None,
            &payload_hash,
        );
        assert_eq!(signed, "content-type;host;x-amz-date");
        assert_eq!(
            canonical,
            format!(
                "POST\n/\n\n\
                 content-type:application/x-www-form-urlencoded; charset=utf-8\n\
                 host:ec2.us-west-2.amazonaws.com\n\
                 x-amz-date:20150830T123600Z\n\n\
                 content-type;host;x-amz-date\n{}",
                payload_hash
            )
        );
    }

    #[test]
    fn test_sign_post_header_shape() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let parts = sign_post(
            &test_credentials(None),
            "us-west-2",
            "ec2.us-west-2.amazonaws.com",
            "Action=DescribeInstances&Version=2016-11-15",
            now,
        );

        assert_eq!(parts.amz_date, "20150830T123600Z");
        assert!(parts.security_token.is_none());
        assert!(parts.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-west-2/ec2/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, Signature="
        ));
        let signature = parts.authorization.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_token_joins_signed_headers() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let parts = sign_post(
            &test_credentials(Some("FQoGZXIvYXdzEXAMPLE")),
            "us-west-2",
            "ec2.us-west-2.amazonaws.com",
            "Action=DescribeInstances&Version=2016-11-15",
            now,
        );
        assert!(parts
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
        assert_eq!(parts.security_token.as_deref(), Some("FQoGZXIvYXdzEXAMPLE"));
    }

    #[test]
    fn test_signature_changes_with_body() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let creds = test_credentials(None);
        let a = sign_post(&creds, "us-west-2", "ec2.us-west-2.amazonaws.com", "a=1", now);
        let b = sign_post(&creds, "us-west-2", "ec2.us-west-2.amazonaws.com", "a=2", now);
        assert_ne!(a.authorization, b.authorization);
    }
}
