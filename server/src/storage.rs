//! Presigned upload URLs for S3-compatible object storage.
//!
//! Clients upload photo bytes straight to the bucket with a query-string
//! SigV4 URL, so the server never proxies image data.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),
}

#[derive(Debug, Clone)]
pub struct UploadSigner {
    bucket: String,
    region: String,
    endpoint: Option<String>,
    access_key: String,
    secret_key: String,
    expires_in: u64,
}

impl UploadSigner {
    pub fn from_config(config: &StorageConfig) -> Self {
        let endpoint = config.endpoint.trim().trim_end_matches('/');
        Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: (!endpoint.is_empty()).then(|| endpoint.to_string()),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            expires_in: config.upload_expiry_secs,
        }
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Scheme, host and object path for `key`.
    fn locate(&self, key: &str) -> (String, String, String) {
        let key = uri_encode(key, false);
        match &self.endpoint {
            Some(endpoint) => {
                let (scheme, host) = match endpoint.split_once("://") {
                    Some((scheme, host)) => (scheme, host),
                    None => ("https", endpoint.as_str()),
                };
                (
                    scheme.to_string(),
                    host.to_string(),
                    format!("/{}/{}", uri_encode(&self.bucket, true), key),
                )
            }
            None => {
                let host = if self.region == "us-east-1" {
                    format!("{}.s3.amazonaws.com", self.bucket)
                } else {
                    format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
                };
                ("https".to_string(), host, format!("/{key}"))
            }
        }
    }

    /// Unsigned location of the object once uploaded.
    pub fn object_url(&self, key: &str) -> String {
        let (scheme, host, path) = self.locate(key);
        format!("{scheme}://{host}{path}")
    }

    /// Presigned PUT for `key`, valid for the configured expiry.
    pub fn presign_put(&self, key: &str, content_type: &str) -> Result<String, SignError> {
        self.presign("PUT", key, Some(content_type), Utc::now())
    }

    /// Query-string SigV4 presign. When `content_type` is given it is a signed
    /// header and the uploader must send exactly that value.
    pub fn presign(
        &self,
        method: &str,
        key: &str,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, SignError> {
        let (scheme, host, path) = self.locate(key);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.region);

        let (canonical_headers, signed_headers) = match content_type {
            Some(ct) => (format!("content-type:{}\nhost:{host}\n", ct.trim()), "content-type;host"),
            None => (format!("host:{host}\n"), "host"),
        };

        // Already in sorted order.
        let query = [
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", format!("{}/{scope}", self.access_key)),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", self.expires_in.to_string()),
            ("X-Amz-SignedHeaders", signed_headers.to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request = format!(
            "{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, b"s3")?;
        let k_signing = hmac(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "{scheme}://{host}{path}?{query}&X-Amz-Signature={signature}"
        ))
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding as SigV4 expects it: unreserved characters pass through,
/// everything else is `%XX`. `/` is kept unless `encode_slash` is set.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
