use reqwest::{Client as HttpClient, Response};

use crate::{
    error::{AppError, AppResult},
    middleware::USER_ID_HEADER,
    models::{ProgressRow, SeenUpdate},
};

/// Client view of the progress store's HTTP contract
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProgressApi: Send + Sync {
    /// `GET /episodes[?show_id=]`
    async fn fetch_progress(&self, series_id: Option<u64>) -> AppResult<Vec<ProgressRow>>;

    /// `POST /episodes`
    async fn upsert_seen(&self, update: &SeenUpdate) -> AppResult<()>;

    /// `DELETE /episodes/{showId}`
    async fn delete_series(&self, series_id: u64) -> AppResult<()>;
}

/// [`ProgressApi`] over reqwest
#[derive(Clone)]
pub struct HttpProgressApi {
    http_client: HttpClient,
    api_url: String,
    user_id: String,
}

impl HttpProgressApi {
    pub fn new(api_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            400 => AppError::Validation(body),
            401 => AppError::Unauthorized(body),
            409 => AppError::Conflict(body),
            _ => AppError::Internal(format!("progress API returned status {}: {}", status, body)),
        })
    }
}

#[async_trait::async_trait]
impl ProgressApi for HttpProgressApi {
    async fn fetch_progress(&self, series_id: Option<u64>) -> AppResult<Vec<ProgressRow>> {
        let mut request = self
            .http_client
            .get(format!("{}/episodes", self.api_url))
            .header(USER_ID_HEADER, &self.user_id);
        if let Some(series_id) = series_id {
            request = request.query(&[("show_id", series_id)]);
        }

        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn upsert_seen(&self, update: &SeenUpdate) -> AppResult<()> {
        let response = self
            .http_client
            .post(format!("{}/episodes", self.api_url))
            .header(USER_ID_HEADER, &self.user_id)
            .json(update)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete_series(&self, series_id: u64) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/episodes/{}", self.api_url, series_id))
            .header(USER_ID_HEADER, &self.user_id)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
