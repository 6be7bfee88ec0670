use std::path::Path;

use hostpack_core::{Error, FetchErrorKind, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::driver::{join_url, write_via_part_file};
use crate::{DistributionStorage, EndpointOptions};

/// Plain HTTP(S) distribution storage with optional basic authentication.
#[derive(Debug)]
pub struct HttpDistStorage {
    options: EndpointOptions,
    client: Client,
}

impl HttpDistStorage {
    pub fn new(options: &EndpointOptions) -> Result<Self> {
        Ok(Self {
            options: options.clone(),
            client: build_client(options)?,
        })
    }
}

impl DistributionStorage for HttpDistStorage {
    fn options(&self) -> &EndpointOptions {
        &self.options
    }

    fn verify_options(&self) -> Result<()> {
        let url = Url::parse(&self.options.rooturl).map_err(|err| {
            Error::InvalidEndpoint(format!("rooturl '{}': {err}", self.options.rooturl))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidEndpoint(format!(
                "rooturl '{}' must use http or https",
                self.options.rooturl
            )));
        }
        if url.host_str().is_none() {
            return Err(Error::InvalidEndpoint(format!(
                "rooturl '{}' has no host",
                self.options.rooturl
            )));
        }
        Ok(())
    }

    fn fetch_resource(&self, rel_path: &str, destination: &Path) -> Result<()> {
        let url = join_url(&self.options.rooturl, rel_path);
        debug!(%url, destination = %destination.display(), "fetching over http");

        let mut request = self.client.get(&url);
        if let Some((user, password)) = self.options.credentials() {
            request = request.basic_auth(user, Some(password));
        }
        download(request, &url, destination)
    }
}

pub(crate) fn build_client(options: &EndpointOptions) -> Result<Client> {
    Client::builder()
        .timeout(options.timeout())
        .build()
        .map_err(|err| Error::InvalidEndpoint(format!("failed to build http client: {err}")))
}

pub(crate) fn download(request: RequestBuilder, url: &str, destination: &Path) -> Result<()> {
    let mut response = request
        .send()
        .map_err(|err| Error::fetch(url, classify_transport_error(&err), err.to_string()))?;
    if let Some(kind) = classify_status(response.status()) {
        return Err(Error::fetch(
            url,
            kind,
            format!("server responded with status {}", response.status()),
        ));
    }

    write_via_part_file(destination, |file| {
        response
            .copy_to(file)
            .map(|_| ())
            .map_err(|err| Error::fetch(url, classify_transport_error(&err), err.to_string()))
    })
}

pub(crate) fn classify_status(status: StatusCode) -> Option<FetchErrorKind> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        404 | 410 => FetchErrorKind::NotFound,
        401 | 403 => FetchErrorKind::InvalidCredentials,
        429 | 503 => FetchErrorKind::RateLimited,
        502 => FetchErrorKind::ConnectionReset,
        408 | 504 => FetchErrorKind::Timeout,
        _ => FetchErrorKind::Transport,
    })
}

fn classify_transport_error(err: &reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_connect() || err.is_body() || err.is_decode() {
        FetchErrorKind::ConnectionReset
    } else {
        FetchErrorKind::Transport
    }
}
