use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::utils::http::get_http_client;

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|err| anyhow!("Invalid HMAC key: {}", err))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `kSigning` from the SigV4 derivation chain.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date)?;
    let k_region = hmac_sha256(&k_date, region)?;
    let k_service = hmac_sha256(&k_region, service)?;
    hmac_sha256(&k_service, "aws4_request")
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Object URL {} has no host", url))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Headers a signed request has to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct S3Client {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    bucket: String,
    endpoint: Option<String>,
}

impl S3Client {
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.s3_configured() {
            return Err(anyhow!(
                "AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and AWS_S3_BUCKET are required to publish"
            ));
        }
        let endpoint = config.aws_s3_endpoint.trim().trim_end_matches('/');
        Ok(Self {
            access_key_id: config.aws_access_key_id.trim().to_string(),
            secret_access_key: config.aws_secret_access_key.trim().to_string(),
            region: config.aws_region.trim().to_string(),
            bucket: config.aws_s3_bucket.trim().to_string(),
            endpoint: (!endpoint.is_empty()).then(|| endpoint.to_string()),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Virtual-hosted URL on AWS, path-style when a custom endpoint is set.
    pub fn object_url(&self, key: &str) -> Result<Url> {
        let (base, bucket_in_path) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), true),
            None => (
                format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
                false,
            ),
        };
        let mut url = Url::parse(&base).with_context(|| format!("Invalid S3 endpoint {base}"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("S3 endpoint {} cannot take a path", base))?;
            segments.pop_if_empty();
            if bucket_in_path {
                segments.push(&self.bucket);
            }
            segments.extend(key.split('/').filter(|segment| !segment.is_empty()));
        }
        Ok(url)
    }

    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let host = host_header(url)?;
        let content_sha256 = sha256_hex(payload);

        let canonical_request = format!(
            "{method}\n{path}\n{query}\nhost:{host}\nx-amz-content-sha256:{content_sha256}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{content_sha256}",
            path = url.path(),
            query = url.query().unwrap_or(""),
        );
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "{SIGNING_ALGORITHM}\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let key = signing_key(&self.secret_access_key, &date, &self.region, SERVICE)?;
        let signature = hex::encode(hmac_sha256(&key, &string_to_sign)?);
        let authorization = format!(
            "{SIGNING_ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.access_key_id
        );

        Ok(SignedHeaders {
            authorization,
            amz_date,
            content_sha256,
            host,
        })
    }

    pub async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(key)?;
        let signed = self.sign("PUT", &url, &bytes, Utc::now())?;
        let size = bytes.len();

        let response = get_http_client()
            .put(url.clone())
            .header("authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", key))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Upload of {} failed with status {}: {}",
                key,
                status,
                body.trim()
            ));
        }
        info!("Uploaded {} ({} bytes) to s3://{}/{}", key, size, self.bucket, key);
        Ok(())
    }
}
