use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use url::Url;

use super::{Blob, BlobStore, PutOutcome, StoreError, validate_key};

/// Remote object store speaking plain HTTP verbs on `<base-url>/<key>`.
///
/// `GET` returns the object (404 = absent), `PUT` replaces it, `DELETE`
/// removes it and `HEAD` probes existence. Conditional writes send
/// `If-Match: <etag>` (or `If-None-Match: *` for create-only) and treat
/// `412 Precondition Failed` as a conflict. The token, if any, is sent as
/// a bearer credential on every call.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| StoreError::Config(format!("invalid blob store URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "blob store URL {base_url:?} cannot be a base"
            )));
        }
        // Url::join drops the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token,
        })
    }

    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        validate_key(key)?;
        self.base
            .join(key)
            .map_err(|_| StoreError::InvalidKey(key.to_string()))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn unexpected(status: StatusCode, key: &str) -> StoreError {
    StoreError::Status {
        status: status.as_u16(),
        key: key.to_string(),
    }
}

#[async_trait]
impl BlobStore for HttpStore {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        let url = self.object_url(key)?;
        let resp = self.request(reqwest::Method::GET, url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let version = resp
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let bytes = resp.bytes().await?.to_vec();
                Ok(Some(Blob { bytes, version }))
            }
            s => Err(unexpected(s, key)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let resp = self
            .request(reqwest::Method::PUT, url)
            .header(CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(resp.status(), key))
        }
    }

    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        let url = self.object_url(key)?;
        let builder = self
            .request(reqwest::Method::PUT, url)
            .header(CONTENT_TYPE, "application/json");
        let builder = match expected {
            Some(etag) => builder.header(IF_MATCH, etag),
            None => builder.header(IF_NONE_MATCH, "*"),
        };
        let resp = builder.body(bytes).send().await?;

        match resp.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            s if s.is_success() => Ok(PutOutcome::Written),
            s => Err(unexpected(s, key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let resp = self.request(reqwest::Method::DELETE, url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            s => Err(unexpected(s, key)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(key)?;
        let resp = self.request(reqwest::Method::HEAD, url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(unexpected(s, key)),
        }
    }
}
