use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::{
    header::{ACCEPT, CONTENT_TYPE},
    Request, Response,
};
use serde::de::DeserializeOwned;

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header(ACCEPT, "application/json")
}

/// Whether the response declares a JSON body.
pub(crate) fn is_json(response: &Response<Vec<u8>>) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// GET a JSON document, failing on any non-success status.
pub(crate) async fn get_json<H, T>(http_client: &H, url: &str) -> Result<T>
where
    H: AsyncHttpClient + ?Sized,
    T: DeserializeOwned,
{
    let request = base_request()
        .method("GET")
        .uri(url)
        .body(vec![])
        .context("failed to build request")?;

    let response = http_client
        .execute(request)
        .await
        .with_context(|| format!("failed to make request at {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = String::from_utf8_lossy(response.body());
        bail!("request to {url} was unsuccessful (status: {status}): {body}")
    }

    serde_json::from_slice(response.body())
        .with_context(|| format!("failed to parse response from {url} as JSON (status: {status})"))
}

/// POST an `application/x-www-form-urlencoded` body.
pub(crate) async fn post_form<H>(
    http_client: &H,
    url: &str,
    form: &[(&str, String)],
) -> Result<Response<Vec<u8>>>
where
    H: AsyncHttpClient + ?Sized,
{
    let body = serde_urlencoded::to_string(form).context("failed to encode form body")?;
    let request = base_request()
        .method("POST")
        .uri(url)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.into_bytes())
        .context("failed to build request")?;

    http_client
        .execute(request)
        .await
        .with_context(|| format!("failed to make request at {url}"))
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
