use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use maqraa_common::{AppError, ProviderConfig};

/// PostgREST error code for "zero rows where one was requested". The only
/// table failure that is not a failure: the row simply does not exist yet.
const NO_ROWS_CODE: &str = "PGRST116";

/// Media type asking the data API for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Deserialize)]
struct TableErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// HTTP client for the hosted data API tables.
#[derive(Clone)]
pub struct TableClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl TableClient {
    pub fn new(url: &str, anon_key: &str, config: &ProviderConfig) -> Result<Self, AppError> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::Internal(format!("Invalid provider URL {url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn bearer<'a>(&'a self, access_token: Option<&'a str>) -> &'a str {
        access_token.unwrap_or(&self.anon_key)
    }

    /// Single-row lookup by `user_id`. Returns `Ok(None)` when no row
    /// exists; every other failure is a `ProfileStore` error for the
    /// caller to log and degrade on.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
        access_token: Option<&str>,
    ) -> Result<Option<T>, AppError> {
        let response = self
            .http
            .get(self.endpoint(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer(access_token))
            .header(ACCEPT, SINGLE_OBJECT)
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let row = response
                .json::<T>()
                .await
                .map_err(|e| AppError::ProfileStore(format!("Malformed row from {table}: {e}")))?;
            return Ok(Some(row));
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(error) = serde_json::from_str::<TableErrorBody>(&body) {
            if error.code.as_deref() == Some(NO_ROWS_CODE) {
                return Ok(None);
            }
            if let Some(message) = error.message {
                return Err(AppError::ProfileStore(message));
            }
        }

        // The single-object representation answers 406 when zero rows match.
        if status == StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }

        Err(AppError::ProfileStore(format!(
            "{table} query returned status {status}"
        )))
    }

    /// Insert one row and return its stored representation.
    pub async fn insert_one<B, T>(
        &self,
        table: &str,
        row: &B,
        access_token: Option<&str>,
    ) -> Result<T, AppError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer(access_token))
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        Self::parse_row(table, response).await
    }

    /// Merge-upsert keyed by the given conflict column, returning the
    /// stored representation.
    pub async fn upsert_one<B, T>(
        &self,
        table: &str,
        row: &B,
        on_conflict: &str,
        access_token: Option<&str>,
    ) -> Result<T, AppError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer(access_token))
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", on_conflict)])
            .json(row)
            .send()
            .await?;

        Self::parse_row(table, response).await
    }

    async fn parse_row<T: DeserializeOwned>(
        table: &str,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::ProfileStore(format!("Malformed row from {table}: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TableErrorBody>(&body)
            .ok()
            .and_then(|error| match (error.message, error.details) {
                (Some(message), Some(details)) => Some(format!("{message}: {details}")),
                (Some(message), None) => Some(message),
                (None, Some(details)) => Some(details),
                (None, None) => None,
            })
            .unwrap_or_else(|| format!("{table} write returned status {status}"));

        Err(AppError::ProfileStore(message))
    }
}
