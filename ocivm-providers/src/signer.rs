use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

use ocivm_common::error::{Error, Result};

use crate::config::Credentials;

/// RSA-SHA256 request signer (draft-cavage HTTP signatures, the scheme the
/// provider's API authenticates with). `keyId` is the
/// `tenancy/user/fingerprint` triple; the signing key is the PEM private key
/// referenced by the credentials.
pub struct RequestSigner {
    key_id: String,
    key: EncodingKey,
}

impl RequestSigner {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let pem = std::fs::read(&credentials.key_file).map_err(|_| Error::Configuration {
            missing: vec![format!("readable key_file at {}", credentials.key_file)],
        })?;
        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| Error::Configuration {
            missing: vec![format!("RSA private key in {}: {e}", credentials.key_file)],
        })?;
        Ok(RequestSigner {
            key_id: format!(
                "{}/{}/{}",
                credentials.tenancy, credentials.user, credentials.fingerprint
            ),
            key,
        })
    }

    /// Headers for one request: `date`, the signed `authorization`, and the
    /// body digest headers for bodied requests. The same header values go
    /// into the signing string and onto the wire.
    pub fn sign(&self, method: &Method, url: &Url, body: Option<&[u8]>) -> Result<HeaderMap> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let host = url
            .host_str()
            .ok_or_else(|| Error::Transport {
                operation: "sign_request",
                message: format!("url without host: {url}"),
            })?
            .to_string();
        let target = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        let mut signed_headers = vec!["(request-target)", "date", "host"];
        let mut signing_lines = vec![
            format!(
                "(request-target): {} {target}",
                method.as_str().to_lowercase()
            ),
            format!("date: {date}"),
            format!("host: {host}"),
        ];

        let mut headers = HeaderMap::new();
        headers.insert("date", header_value("date", &date)?);

        if let Some(body) = body {
            let digest = STANDARD.encode(Sha256::digest(body));
            signed_headers.extend(["content-length", "content-type", "x-content-sha256"]);
            signing_lines.push(format!("content-length: {}", body.len()));
            signing_lines.push("content-type: application/json".to_string());
            signing_lines.push(format!("x-content-sha256: {digest}"));
            headers.insert(
                "content-type",
                HeaderValue::from_static("application/json"),
            );
            headers.insert(
                "content-length",
                header_value("content-length", &body.len().to_string())?,
            );
            headers.insert("x-content-sha256", header_value("x-content-sha256", &digest)?);
        }

        let signature = self.signature(signing_lines.join("\n").as_bytes())?;
        let authorization = format!(
            "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            signed_headers.join(" "),
            signature
        );
        headers.insert("authorization", header_value("authorization", &authorization)?);
        Ok(headers)
    }

    fn signature(&self, message: &[u8]) -> Result<String> {
        // jsonwebtoken emits base64url without padding; the signature header
        // wants standard base64.
        let urlsafe =
            jsonwebtoken::crypto::sign(message, &self.key, Algorithm::RS256).map_err(|e| {
                Error::Transport {
                    operation: "sign_request",
                    message: format!("rsa signing failed: {e}"),
                }
            })?;
        let raw = URL_SAFE_NO_PAD
            .decode(urlsafe.as_bytes())
            .map_err(|e| Error::Transport {
                operation: "sign_request",
                message: format!("signature transcode failed: {e}"),
            })?;
        Ok(STANDARD.encode(raw))
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::Transport {
        operation: "sign_request",
        message: format!("invalid {name} header value"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_target_includes_query() {
        let url = Url::parse(
            "https://iaas.us-phoenix-1.oraclecloud.com/20160918/instances?compartmentId=t",
        )
        .unwrap();
        let target = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        assert_eq!(target, "/20160918/instances?compartmentId=t");
    }

    #[test]
    fn body_digest_is_standard_base64_of_sha256() {
        let digest = STANDARD.encode(Sha256::digest(b"{}"));
        // sha256("{}")
        assert_eq!(digest, "RBNvo1WzZ4oRRq0W9+hknpT7T8If536DEMBg9hyq/4o=");
    }
}
