//! JSON gateway client. Request signing and protobuf decoding live behind the
//! gateway; this side only speaks plain JSON over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use url::Url;

use super::{GameApi, MissionRecord, Snapshot};
use crate::error::{Error, Result};
use crate::sync::cancel::CancelToken;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGameApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid api_base_url {base_url:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &CancelToken, url: Url) -> Result<T> {
        token.check()?;
        debug!("GET {url}");
        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                let preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
                debug!("API response error ({status}): {preview}");
                return Err(Error::Api {
                    status: Some(status.as_u16()),
                    message: format!("{status}: {preview}"),
                });
            }
            serde_json::from_str::<T>(&body)
                .map_err(|e| Error::api(format!("malformed response: {e}")))
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Interrupted),
            result = request => result,
        }
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn fetch_account_snapshot(
        &self,
        token: &CancelToken,
        account_id: &str,
    ) -> Result<Snapshot> {
        let url = self.endpoint("first_contact", &[("eid", account_id)])?;
        self.get_json(token, url).await
    }

    async fn fetch_mission_record(
        &self,
        token: &CancelToken,
        account_id: &str,
        mission_id: &str,
        start_timestamp: f64,
    ) -> Result<MissionRecord> {
        let start = start_timestamp.to_string();
        let url = self.endpoint(
            "complete_mission",
            &[
                ("eid", account_id),
                ("mission_id", mission_id),
                ("start_time", start.as_str()),
            ],
        )?;
        self.get_json(token, url).await
    }
}
