//! reqwest-backed implementation of the server contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use taskdock_core::wire::{DirListing, DriveList};
use taskdock_core::TaskRecord;

use crate::api::{ApiError, TaskApi};

const CLIENT_TIMEOUT_SECS: u64 = 10;

pub struct HttpTaskApi {
    client: Client,
    base_url: Url,
}

impl HttpTaskApi {
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn url_with_path_query(&self, endpoint: &str, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(endpoint);
        url.query_pairs_mut().clear().append_pair("path", path);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn expect_success(
        &self,
        path: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, ApiError> {
        let response = response.map_err(|err| ApiError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn list_tasks(&self) -> Result<Vec<String>, ApiError> {
        self.get_json("tasks").await
    }

    async fn snapshot(&self) -> Result<Vec<TaskRecord>, ApiError> {
        self.get_json("processes").await
    }

    async fn fetch(&self, name: &str) -> Result<TaskRecord, ApiError> {
        self.get_json(&format!("processes/{name}")).await
    }

    async fn open(&self, name: &str) -> Result<TaskRecord, ApiError> {
        let path = format!("processes/{name}");
        let response = self.client.post(self.endpoint(&path)).send().await;
        let response = self.expect_success(&path, response).await?;
        response
            .json::<TaskRecord>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn close(&self, name: &str) -> Result<(), ApiError> {
        let path = format!("processes/{name}");
        let response = self.client.delete(self.endpoint(&path)).send().await;
        self.expect_success(&path, response).await?;
        Ok(())
    }

    async fn probe_redirect(&self, name: &str, timeout: Duration) -> Result<(), ApiError> {
        let path = format!("processes/{name}/redirect");
        let response = self
            .client
            .get(self.endpoint(&path))
            .timeout(timeout)
            .send()
            .await;
        self.expect_success(&path, response).await?;
        Ok(())
    }

    fn redirect_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("processes/{name}/redirect"));
        url
    }

    async fn shutdown_host(&self) -> Result<(), ApiError> {
        let response = self.client.get(self.endpoint("shutdown")).send().await;
        self.expect_success("shutdown", response).await?;
        Ok(())
    }

    async fn set_monitors(&self, on: bool) -> Result<(), ApiError> {
        let path = if on { "monitors/on" } else { "monitors/off" };
        let response = self.client.get(self.endpoint(path)).send().await;
        self.expect_success(path, response).await?;
        Ok(())
    }

    async fn drives(&self) -> Result<DriveList, ApiError> {
        self.get_json("drives").await
    }

    async fn list_dir(&self, path: &str) -> Result<DirListing, ApiError> {
        let url = self.url_with_path_query("list", path);
        let response = self.client.get(url).send().await;
        let response = self.expect_success("list", response).await?;
        response
            .json::<DirListing>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    fn download_url(&self, path: &str) -> Url {
        self.url_with_path_query("download", path)
    }
}
