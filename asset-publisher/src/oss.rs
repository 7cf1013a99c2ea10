//! # OSS object-store client
//!
//! Implements [`ObjectStore`] over plain HTTP with `reqwest`, signing each
//! request with the bucket's access key (header signature, HMAC-SHA1).
//!
//! - `put` uploads the file body with a `Content-MD5` and a content type
//!   guessed from the extension, plus whatever headers the engine asks for.
//! - `get` is a `HEAD` request; a 404 becomes a not-found [`StoreError`].
//! - Error bodies (`<Error><Code>..</Code><Message>..</Message></Error>`) are
//!   surfaced through the store's own code and message.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode, Url};
use sha1::Sha1;
use tracing::{debug, info};

use asset_publisher_core::contract::{ObjectStore, HeadResponse, PutOptions, PutResponse};
use asset_publisher_core::error::StoreError;

use crate::load_config::StoreConfig;

const OSS_HEADER_PREFIX: &str = "x-oss-";

pub struct OssClient {
    http: reqwest::Client,
    base: Url,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
}

impl OssClient {
    /// Build a client for the configured bucket. `timeout` applies to existence checks;
    /// uploads carry their own timeout in [`PutOptions`].
    pub fn new(config: &StoreConfig, timeout: Duration) -> Result<Self> {
        let base = match &config.endpoint {
            Some(endpoint) if endpoint.contains("://") => endpoint.clone(),
            Some(endpoint) => format!("https://{endpoint}"),
            None => format!("https://{}.{}.aliyuncs.com", config.bucket, config.region),
        };
        let base = Url::parse(&base).with_context(|| format!("Invalid store endpoint {base:?}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!(endpoint = %base, bucket = %config.bucket, "Initialized OSS client");
        Ok(Self {
            http,
            base,
            bucket: config.bucket.clone(),
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
        })
    }

    fn object_name(key: &str) -> &str {
        key.trim_start_matches('/')
    }

    fn object_url(&self, key: &str) -> Url {
        // Keys hang off the endpoint's own path, if it has one.
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}/{}", Self::object_name(key)));
        url
    }

    fn authorization(
        &self,
        verb: &Method,
        content_md5: &str,
        content_type: &str,
        date: &str,
        headers: &BTreeMap<String, String>,
        key: &str,
    ) -> Result<String, StoreError> {
        let resource = format!("/{}/{}", self.bucket, Self::object_name(key));
        let signature = sign(
            &self.access_key_secret,
            verb.as_str(),
            content_md5,
            content_type,
            date,
            headers,
            &resource,
        )?;
        Ok(format!("OSS {}:{}", self.access_key_id, signature))
    }
}

#[async_trait]
impl ObjectStore for OssClient {
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError> {
        let body = tokio::fs::read(local_path).await.map_err(|e| {
            StoreError::new("FileRead", format!("{}: {e}", local_path.display()))
        })?;
        let content_md5 = base64::engine::general_purpose::STANDARD.encode(md5::compute(&body).0);
        let content_type = content_type_for(local_path);
        let date = http_date();
        let url = self.object_url(key);
        let authorization = self.authorization(
            &Method::PUT,
            &content_md5,
            content_type,
            &date,
            &options.headers,
            key,
        )?;

        debug!(key, url = %url, bytes = body.len(), "Sending PUT");
        let mut request = self
            .http
            .put(url.clone())
            .timeout(options.timeout)
            .header("Content-MD5", &content_md5)
            .header("Content-Type", content_type)
            .header("Date", &date)
            .header("Authorization", authorization);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(PutResponse {
                url: url.to_string(),
            });
        }
        let text = response.text().await.unwrap_or_default();
        Err(service_error(status, &text))
    }

    async fn get(&self, key: &str) -> Result<HeadResponse, StoreError> {
        let date = http_date();
        let authorization =
            self.authorization(&Method::HEAD, "", "", &date, &BTreeMap::new(), key)?;

        let response = self
            .http
            .head(self.object_url(key))
            .header("Date", &date)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::not_found(key)),
            status if status.is_success() => Ok(HeadResponse {
                status: status.as_u16(),
            }),
            // HEAD responses carry no body
            status => Err(service_error(status, "")),
        }
    }
}

/// Header signature: base64(HMAC-SHA1(secret, string-to-sign)).
pub fn sign(
    secret: &str,
    verb: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    headers: &BTreeMap<String, String>,
    resource: &str,
) -> Result<String, StoreError> {
    let string_to_sign = format!(
        "{verb}\n{content_md5}\n{content_type}\n{date}\n{}{resource}",
        canonical_oss_headers(headers)
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| StoreError::new("Signature", e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// `x-oss-*` headers, lowercased and sorted, one `name:value\n` each.
fn canonical_oss_headers(headers: &BTreeMap<String, String>) -> String {
    let mut oss: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .filter(|(k, _)| k.starts_with(OSS_HEADER_PREFIX))
        .collect();
    oss.sort();
    oss.into_iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect()
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::new("ConnectionTimeout", e.to_string())
    } else {
        StoreError::new("Request", e.to_string())
    }
}

/// Map a non-success response into the store's own identifiers.
fn service_error(status: StatusCode, body: &str) -> StoreError {
    let code = xml_tag(body, "Code").unwrap_or_else(|| match status {
        StatusCode::FORBIDDEN => "AccessDenied".to_string(),
        StatusCode::CONFLICT => "FileAlreadyExists".to_string(),
        StatusCode::NOT_FOUND => "NoSuchKey".to_string(),
        other => format!("Status{}", other.as_u16()),
    });
    let message = xml_tag(body, "Message")
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    StoreError::new(code, message).with_status(status.as_u16())
}

fn xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    Some(body[start..start + len].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config(endpoint: Option<&str>) -> StoreConfig {
        StoreConfig {
            region: "oss-cn-hangzhou".to_string(),
            bucket: "static-assets".to_string(),
            access_key_id: "id".to_string(),
            access_key_secret: "secret".to_string(),
            endpoint: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn signs_put_with_oss_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("X-OSS-Meta-Author".to_string(), "foo@example.com".to_string());
        headers.insert("x-oss-magic".to_string(), "abracadabra".to_string());
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());

        let signature = sign(
            "OtxrzxIsfpFjA7SwPzILwy8Bw21TLhquhboDYROV",
            "PUT",
            "ODBGOERFMDMzQTczRUY3NUE3NzA5QzdFNUYzMDQxNEM=",
            "text/html",
            "Thu, 17 Nov 2005 18:49:58 GMT",
            &headers,
            "/examplebucket/nelson",
        )
        .unwrap();
        assert_eq!(signature, "pufSoxODhq4iOx2XUvDkPqN90fI=");
    }

    #[test]
    fn signs_head_request() {
        let signature = sign(
            "secret",
            "HEAD",
            "",
            "",
            "Thu, 17 Nov 2005 18:49:58 GMT",
            &BTreeMap::new(),
            "/bucket/app/a.js",
        )
        .unwrap();
        assert_eq!(signature, "5KymXXOEvS5B+MaHaZPgFdMaS3I=");
    }

    #[test]
    fn default_endpoint_is_virtual_hosted() {
        let client = OssClient::new(&store_config(None), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.object_url("/app/a.js").as_str(),
            "https://static-assets.oss-cn-hangzhou.aliyuncs.com/app/a.js"
        );
    }

    #[test]
    fn custom_endpoint_without_scheme_gets_https() {
        let client =
            OssClient::new(&store_config(Some("cdn.example.com")), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.object_url("app/a.js").as_str(),
            "https://cdn.example.com/app/a.js"
        );
    }

    #[test]
    fn endpoint_path_prefix_is_kept() {
        for endpoint in ["https://proxy.example.com/oss", "https://proxy.example.com/oss/"] {
            let client =
                OssClient::new(&store_config(Some(endpoint)), Duration::from_secs(5)).unwrap();
            assert_eq!(
                client.object_url("/app/a.js").as_str(),
                "https://proxy.example.com/oss/app/a.js"
            );
        }
    }

    #[test]
    fn error_body_codes_are_surfaced() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>FileAlreadyExists</Code>
  <Message>The object you specified already exists and can not be overwritten.</Message>
</Error>"#;
        let err = service_error(StatusCode::CONFLICT, body);
        assert_eq!(err.code, "FileAlreadyExists");
        assert_eq!(err.name, "FileAlreadyExistsError");
        assert!(err.message.starts_with("The object you specified"));
        assert_eq!(err.status, Some(409));
    }

    #[test]
    fn bodiless_errors_fall_back_to_status() {
        let err = service_error(StatusCode::FORBIDDEN, "");
        assert_eq!(err.code, "AccessDenied");
        assert_eq!(err.message, "Forbidden");
        assert!(!err.is_not_found());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("a.JS")), "application/javascript");
        assert_eq!(content_type_for(Path::new("app.css")), "text/css");
        assert_eq!(content_type_for(Path::new("a.js.map")), "application/json");
        assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
    }
}
