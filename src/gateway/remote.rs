use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, info};

use super::{validate_farm, FarmGateway, FarmPage, PageRequest};
use crate::error::{FARM_CONFLICT, HTTP_STATUS, HTTP_TRANSPORT, VALIDATION_REMOTE};
use crate::model::Farm;
use crate::{AppError, AppResult};

pub const DEFAULT_REMOTE_PAGE_SIZE: u32 = 50;

/// Client for a server exposing the `/farms` HTTP surface.
#[derive(Clone)]
pub struct RemoteGateway {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl RemoteGateway {
    pub fn new(base_url: &str) -> AppResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> AppResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AppError::new(HTTP_TRANSPORT, format!("Invalid base URL: {e}"))
                .with_context("url", base_url)
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::new(HTTP_TRANSPORT, "Base URL cannot carry a path")
                .with_context("url", base_url.to_string()));
        }
        Ok(RemoteGateway {
            client,
            base_url,
            page_size: DEFAULT_REMOTE_PAGE_SIZE,
        })
    }

    /// Page size used when walking every page for an unpaginated load.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                AppError::new(HTTP_TRANSPORT, "Base URL cannot carry a path")
                    .with_context("url", self.base_url.to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, page: PageRequest) -> AppResult<FarmPage> {
        let mut url = self.endpoint(&["farms"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.page.to_string())
            .append_pair("limit", &page.limit.to_string());
        debug!(target: "citrus_farms", event = "remote_request", method = "GET", url = %url);
        let response = self.client.get(url).send().await?;
        Ok(check(response).await?.json::<FarmPage>().await?)
    }

    async fn post_farm(&self, farm: &Farm, strict: bool) -> AppResult<Farm> {
        let mut url = self.endpoint(&["farms"])?;
        if strict {
            url.query_pairs_mut().append_pair("strict", "true");
        }
        debug!(target: "citrus_farms", event = "remote_request", method = "POST", url = %url);
        let response = self.client.post(url).json(farm).send().await?;
        Ok(check(response).await?.json::<Farm>().await?)
    }
}

/// Passes successful responses through; turns everything else into an [`AppError`].
async fn check(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();

    if let Ok(remote) = serde_json::from_str::<AppError>(&body) {
        return Err(remote);
    }

    let code = match status {
        StatusCode::CONFLICT => FARM_CONFLICT,
        StatusCode::BAD_REQUEST => VALIDATION_REMOTE,
        _ => HTTP_STATUS,
    };
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| format!("Server responded with {status}"));
    Err(AppError::new(code, message)
        .with_context("status", status.as_u16().to_string())
        .with_context("url", url))
}

#[async_trait]
impl FarmGateway for RemoteGateway {
    async fn load_all(&self, page: Option<PageRequest>) -> AppResult<FarmPage> {
        if let Some(page) = page {
            return self.fetch_page(page).await;
        }

        let mut farms = Vec::new();
        let mut current = 1;
        loop {
            let batch = self
                .fetch_page(PageRequest::new(current, self.page_size)?)
                .await?;
            farms.extend(batch.farms);
            if current >= batch.total_pages {
                break;
            }
            current += 1;
        }
        let total_pages = if farms.is_empty() { 0 } else { 1 };
        Ok(FarmPage { farms, total_pages })
    }

    async fn save(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let saved = self
            .post_farm(&farm, false)
            .await
            .map_err(|e| e.with_context("operation", "save").with_context("id", farm.id.clone()))?;
        info!(target: "citrus_farms", event = "farm_saved", id = %saved.id, backend = "remote");
        Ok(saved)
    }

    async fn create(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let saved = self
            .post_farm(&farm, true)
            .await
            .map_err(|e| e.with_context("operation", "create").with_context("id", farm.id.clone()))?;
        info!(target: "citrus_farms", event = "farm_created", id = %saved.id, backend = "remote");
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let url = self.endpoint(&["farms", id])?;
        debug!(target: "citrus_farms", event = "remote_request", method = "DELETE", url = %url);
        let response = self.client.delete(url).send().await?;
        check(response)
            .await
            .map_err(|e| e.with_context("operation", "delete").with_context("id", id))?;
        info!(target: "citrus_farms", event = "farm_deleted", id = %id, backend = "remote");
        Ok(())
    }

    async fn replace_all(&self, farms: Vec<Farm>) -> AppResult<()> {
        for farm in &farms {
            validate_farm(farm)?;
        }
        let url = self.endpoint(&["farms", "restore"])?;
        debug!(target: "citrus_farms", event = "remote_request", method = "POST", url = %url);
        let response = self.client.post(url).json(&farms).send().await?;
        check(response)
            .await
            .map_err(|e| e.with_context("operation", "replace_all"))?;
        info!(target: "citrus_farms", event = "restore_applied", records = farms.len(), backend = "remote");
        Ok(())
    }
}
