//! Thin reqwest wrapper for Graph API requests.
//!
//! Prepends the API base to relative paths, attaches the bearer token and
//! classifies failures into [`RemoteErrorKind`]s. Follow-up links returned by
//! the server (delta paging) arrive as absolute URLs and pass through as-is.

use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::Credential;
use crate::error::{FsError, FsResult, RemoteErrorKind};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> FsResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client })
    }

    fn full_url(url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", GRAPH_API_BASE, url)
        }
    }

    async fn send(&self, request: RequestBuilder) -> FsResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FsError::Remote {
            kind: classify_status(status, &body),
            message: format!("{}: {}", status, body),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, cred: &Credential) -> FsResult<T> {
        let url = Self::full_url(url);
        debug!("GET {}", url);
        let response = self
            .send(self.client.get(&url).header("Authorization", cred.bearer()))
            .await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub async fn get_bytes(&self, url: &str, cred: &Credential) -> FsResult<Vec<u8>> {
        let url = Self::full_url(url);
        debug!("GET {}", url);
        let response = self
            .send(self.client.get(&url).header("Authorization", cred.bearer()))
            .await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        cred: &Credential,
    ) -> FsResult<T> {
        let url = Self::full_url(url);
        debug!("POST {}", url);
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Authorization", cred.bearer())
                    .json(body),
            )
            .await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        cred: &Credential,
    ) -> FsResult<T> {
        let url = Self::full_url(url);
        debug!("PATCH {}", url);
        let response = self
            .send(
                self.client
                    .patch(&url)
                    .header("Authorization", cred.bearer())
                    .json(body),
            )
            .await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub async fn put_bytes<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Vec<u8>,
        cred: &Credential,
    ) -> FsResult<T> {
        let url = Self::full_url(url);
        debug!("PUT {} ({} bytes)", url, body.len());
        let response = self
            .send(
                self.client
                    .put(&url)
                    .header("Authorization", cred.bearer())
                    .header("Content-Type", "application/octet-stream")
                    .body(body),
            )
            .await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub async fn delete(&self, url: &str, cred: &Credential) -> FsResult<()> {
        let url = Self::full_url(url);
        debug!("DELETE {}", url);
        self.send(
            self.client
                .delete(&url)
                .header("Authorization", cred.bearer()),
        )
        .await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> FsError {
    FsError::remote(RemoteErrorKind::Network, err.to_string())
}

fn decode_error(err: reqwest::Error) -> FsError {
    FsError::remote(
        RemoteErrorKind::Server,
        format!("unexpected response payload: {}", err),
    )
}

fn classify_status(status: StatusCode, body: &str) -> RemoteErrorKind {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        RemoteErrorKind::Auth
    } else if status == StatusCode::NOT_FOUND {
        RemoteErrorKind::NotFound
    } else if body.contains("nameAlreadyExists") {
        RemoteErrorKind::NameConflict
    } else {
        RemoteErrorKind::Server
    }
}
