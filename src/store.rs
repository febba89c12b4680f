use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::records::{drop_unidentified, Collections, RawRecord, COLLECTIONS};

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
const PAGE_SIZE: usize = 100;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<RawRecord>,
    #[serde(default)]
    offset: Option<String>,
}

/// Fetch every collection from the record store, concurrently. A table that
/// cannot be fetched degrades to an empty collection with a warning so the
/// build still runs; only missing credentials abort up front.
pub async fn fetch_all_collections() -> Result<Collections> {
    let api_key = std::env::var("ARCHIVE_API_KEY")
        .map_err(|_| anyhow!("ARCHIVE_API_KEY environment variable must be set"))?;
    let base_id = std::env::var("ARCHIVE_BASE_ID")
        .map_err(|_| anyhow!("ARCHIVE_BASE_ID environment variable must be set"))?;
    let api_url =
        std::env::var("ARCHIVE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("build HTTP client")?;

    let mut handles = Vec::new();
    for (table, _) in COLLECTIONS {
        let client = client.clone();
        let url = format!("{}/{}/{}", api_url, base_id, table);
        let api_key = api_key.clone();
        handles.push((
            *table,
            tokio::spawn(async move { fetch_table(&client, &url, &api_key).await }),
        ));
    }

    let mut collections = Collections::default();
    for (table, handle) in handles {
        match handle.await? {
            Ok(records) => {
                info!("Fetched {} {} records", records.len(), table);
                *collections.get_mut(table) = drop_unidentified(table, records);
            }
            Err(e) => {
                warn!("Could not fetch {}: {:#}; continuing with empty collection", table, e);
            }
        }
    }
    Ok(collections)
}

/// Page through one table, following the offset cursor until exhausted.
async fn fetch_table(client: &reqwest::Client, url: &str, api_key: &str) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut offset: Option<String> = None;

    loop {
        let page = fetch_page_with_retry(client, url, api_key, offset.as_deref()).await?;
        records.extend(page.records);
        match page.offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }
    Ok(records)
}

async fn fetch_page_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    offset: Option<&str>,
) -> Result<RecordPage> {
    for attempt in 0..=MAX_RETRIES {
        match fetch_page(client, url, api_key, offset).await {
            Ok(page) => return Ok(page),
            Err(e) => {
                let msg = e.to_string();
                let retryable = msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503");
                if !retryable || attempt == MAX_RETRIES {
                    return Err(e);
                }
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Retryable error fetching {} (attempt {}/{}), backing off {:.1}s",
                    url,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
    unreachable!("retry loop always returns");
}

async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    offset: Option<&str>,
) -> Result<RecordPage> {
    let mut query: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
    if let Some(o) = offset {
        query.push(("offset", o.to_string()));
    }

    let response = client
        .get(url)
        .bearer_auth(api_key)
        .query(&query)
        .send()
        .await
        .with_context(|| format!("request {}", url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("record store returned {} for {}", status.as_u16(), url));
    }

    response
        .json::<RecordPage>()
        .await
        .with_context(|| format!("decode record page from {}", url))
}
