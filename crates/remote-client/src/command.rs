use remote_proto::protocol::{CommandRequest, ErrorBody, PropertyWrite, COMMAND_PATH, PROPERTY_PATH};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::SyncError;

/// Request/response side of the bridge: property reads, property writes and
/// commands.
///
/// Holds no reference to the state store.  A successful write is only
/// reflected locally once the feed (or the poller) reports the new value.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared HTTP client, reused by the event session so connections pool.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn set_property(&self, name: &str, value: Value) -> Result<(), SyncError> {
        let body = PropertyWrite::new(name, value).to_json();
        debug!("set_property {}", body);
        let resp = self
            .client
            .post(self.url(PROPERTY_PATH))
            .json(&body)
            .send()
            .await?;
        check(resp).await.map(drop)
    }

    pub async fn command(&self, cmd: &str, args: Vec<Value>) -> Result<(), SyncError> {
        let body = CommandRequest {
            cmd: cmd.to_string(),
            args,
        };
        debug!("command {:?}", body);
        let resp = self
            .client
            .post(self.url(COMMAND_PATH))
            .json(&body)
            .send()
            .await?;
        check(resp).await.map(drop)
    }

    /// `<base>/property/<name>` with `name` percent-encoded as one segment.
    pub fn property_url(&self, name: &str) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.url(PROPERTY_PATH)).map_err(SyncError::transport)?;
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::transport(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("base url {} cannot carry a path", self.base_url),
                ))
            })?
            .push(name);
        Ok(url)
    }

    /// Reads one property.  A reply without the requested key yields `null`.
    pub async fn get_property(&self, name: &str) -> Result<Value, SyncError> {
        let url = self.property_url(name)?;
        let resp = self.client.get(url).send().await?;
        let resp = check(resp).await?;
        let mut body: Value = resp.json().await?;
        Ok(body
            .get_mut(name)
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

/// Passes 2xx replies through; turns anything else into `Remote` carrying the
/// body's `error` text, or `Status` when the body has none.
async fn check(resp: Response) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(SyncError::Remote(body.error)),
        Err(_) => {
            debug!("non-JSON error body ({}): {:?}", status, text);
            Err(SyncError::Status(status))
        }
    }
}
