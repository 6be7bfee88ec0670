use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hostpack_core::{Error, Result};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::http::{build_client, download};
use crate::{DistributionStorage, EndpointOptions};

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// S3 bucket accessed over HTTPS, SigV4-signed when credentials are present.
///
/// `resourceid` names the bucket and `host` the region. A non-empty `rooturl`
/// switches to path-style addressing against that endpoint.
#[derive(Debug)]
pub struct AwsS3DistStorage {
    options: EndpointOptions,
    client: Client,
}

impl AwsS3DistStorage {
    pub fn new(options: &EndpointOptions) -> Result<Self> {
        Ok(Self {
            options: options.clone(),
            client: build_client(options)?,
        })
    }

    fn bucket(&self) -> &str {
        self.options.resourceid.as_deref().unwrap_or_default()
    }

    fn region(&self) -> &str {
        self.options.host.as_deref().unwrap_or_default()
    }

    /// Returns `(host, canonical_uri)` for an object key.
    fn object_location(&self, key: &str) -> (String, String) {
        let key = key.trim_start_matches('/');
        let rooturl = self.options.rooturl.trim_end_matches('/');
        if rooturl.is_empty() {
            let mut host = format!("{}.s3.{}.amazonaws.com", self.bucket(), self.region());
            if let Some(port) = self.options.port.filter(|port| *port != 0 && *port != 443) {
                host.push_str(&format!(":{port}"));
            }
            (host, canonical_uri(&format!("/{key}")))
        } else {
            let host = rooturl
                .split_once("://")
                .map(|(_, rest)| rest)
                .unwrap_or(rooturl)
                .to_string();
            (host, canonical_uri(&format!("/{}/{key}", self.bucket())))
        }
    }

    fn url_scheme(&self) -> &str {
        self.options
            .rooturl
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("https")
    }
}

impl DistributionStorage for AwsS3DistStorage {
    fn options(&self) -> &EndpointOptions {
        &self.options
    }

    fn verify_options(&self) -> Result<()> {
        if self.bucket().trim().is_empty() {
            return Err(Error::InvalidEndpoint(
                "aws-s3-http endpoint requires 'resourceid' (bucket name)".to_string(),
            ));
        }
        if self.region().trim().is_empty() {
            return Err(Error::InvalidEndpoint(
                "aws-s3-http endpoint requires 'host' (region)".to_string(),
            ));
        }
        let has_id = self.options.accessid.as_deref().is_some_and(|id| !id.is_empty());
        let has_secret = self.options.secret.as_deref().is_some_and(|s| !s.is_empty());
        if has_id != has_secret {
            return Err(Error::InvalidEndpoint(
                "aws-s3-http credentials need both 'accessid' and 'secret'".to_string(),
            ));
        }
        Ok(())
    }

    fn fetch_resource(&self, rel_path: &str, destination: &Path) -> Result<()> {
        let (host, uri) = self.object_location(rel_path);
        let url = format!("{}://{host}{uri}", self.url_scheme());
        debug!(%url, destination = %destination.display(), "fetching from s3");

        let mut request = self.client.get(&url);
        if let Some((access_id, secret)) = self.options.credentials() {
            let signed =
                sign_get_request(access_id, secret, self.region(), &host, &uri, Utc::now())?;
            request = request
                .header("x-amz-date", signed.amz_date)
                .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
                .header("authorization", signed.authorization);
        }
        download(request, &url, destination)
    }
}

pub(crate) struct SignedHeaders {
    pub(crate) amz_date: String,
    pub(crate) authorization: String,
}

pub(crate) fn sign_get_request(
    access_id: &str,
    secret: &str,
    region: &str,
    host: &str,
    canonical_uri: &str,
    now: DateTime<Utc>,
) -> Result<SignedHeaders> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");

    let canonical_request = format!(
        "GET\n{canonical_uri}\n\nhost:{host}\nx-amz-content-sha256:{EMPTY_PAYLOAD_SHA256}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{EMPTY_PAYLOAD_SHA256}"
    );
    let string_to_sign = format!(
        "{SIGNING_ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let key = signing_key(secret, &date, region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{SIGNING_ALGORITHM} Credential={access_id}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
        ),
        amz_date,
    })
}

pub(crate) fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let date_key = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let region_key = hmac_sha256(&date_key, region.as_bytes())?;
    let service_key = hmac_sha256(&region_key, service.as_bytes())?;
    hmac_sha256(&service_key, b"aws4_request")
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| Error::InvalidEndpoint(format!("invalid signing key: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encodes each path segment the way SigV4 expects for S3.
pub(crate) fn canonical_uri(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
