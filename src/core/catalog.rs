use crate::domain::model::TerritoryRef;
use crate::domain::ports::{CatalogPage, CatalogSource};
use crate::utils::error::{ExplorerError, Result};
use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CATALOG_ENDPOINT: &str =
    "https://www.donneesquebec.ca/recherche/api/3/action/datastore_search";
pub const DEFAULT_RESOURCE_ID: &str = "d2db6102-9215-4abc-9b5b-2c37f2e12618";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_NAME_COLUMN: &str = "nom du territoire";
pub const DEFAULT_URL_COLUMN: &str = "lien";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// CKAN `datastore_search` client.
pub struct HttpCatalogSource {
    client: Client,
    endpoint: String,
    resource_id: String,
    timeout: Option<Duration>,
}

impl HttpCatalogSource {
    pub fn new(endpoint: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            resource_id: resource_id.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<CatalogPage> {
        let limit = limit.to_string();
        let offset = offset.to_string();

        let mut request = self.client.get(&self.endpoint).query(&[
            ("resource_id", self.resource_id.as_str()),
            ("limit", limit.as_str()),
            ("offset", offset.as_str()),
        ]);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(
            "📡 Catalog request: {} (offset={}, limit={})",
            self.endpoint,
            offset,
            limit
        );

        let response = request
            .send()
            .await
            .map_err(|e| ExplorerError::source_unavailable(e.to_string()))?;

        let status = response.status();
        tracing::debug!("Catalog response status: {}", status);
        if !status.is_success() {
            return Err(ExplorerError::source_unavailable(format!(
                "catalog returned HTTP {}",
                status
            )));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| ExplorerError::source_unavailable(format!("invalid JSON: {}", e)))?;

        match body.get_mut("result").and_then(|result| result.get_mut("records")) {
            Some(Value::Array(records)) => Ok(std::mem::take(records)),
            _ => Err(ExplorerError::source_unavailable(
                "response has no result.records array",
            )),
        }
    }
}

/// `column=value` restriction applied to catalog rows, e.g. `région=Estrie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerritoryFilter {
    pub column: String,
    pub value: String,
}

impl FromStr for TerritoryFilter {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((column, value)) if !column.trim().is_empty() => Ok(Self {
                column: normalize_column(column),
                value: value.trim().to_string(),
            }),
            _ => Err(ExplorerError::InvalidConfigValueError {
                field: "filter".to_string(),
                value: s.to_string(),
                reason: "expected COLUMN=VALUE".to_string(),
            }),
        }
    }
}

impl TerritoryFilter {
    fn matches(&self, row: &Map<String, Value>) -> bool {
        row.get(&self.column)
            .and_then(cell_text)
            .map(|cell| cell.to_lowercase() == self.value.to_lowercase())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    pub page_size: usize,
    pub name_column: String,
    pub url_column: String,
    pub cache_ttl: Duration,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            url_column: DEFAULT_URL_COLUMN.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Territory directory loader with a time-bounded cache of catalog rows.
pub struct TerritoryDirectory<S: CatalogSource> {
    source: S,
    options: DirectoryOptions,
    rows: Cache<String, Arc<Vec<Map<String, Value>>>>,
}

impl<S: CatalogSource> TerritoryDirectory<S> {
    pub fn new(source: S, options: DirectoryOptions) -> Self {
        let rows = Cache::builder()
            .max_capacity(16)
            .time_to_live(options.cache_ttl)
            .build();
        Self {
            source,
            options,
            rows,
        }
    }

    /// Loads the directory sorted by name, optionally restricted by `filter`.
    pub async fn load(&self, filter: Option<&TerritoryFilter>) -> Result<Vec<TerritoryRef>> {
        let rows = self.rows().await?;
        if rows.is_empty() {
            tracing::warn!("⚠️ Catalog returned no records");
            return Ok(Vec::new());
        }

        let available: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();

        let mut expected = vec![
            self.options.name_column.clone(),
            self.options.url_column.clone(),
        ];
        if let Some(filter) = filter {
            expected.push(filter.column.clone());
        }
        if expected.iter().any(|c| !available.contains(c.as_str())) {
            return Err(ExplorerError::SchemaMismatch {
                expected,
                available: available.iter().map(|c| c.to_string()).collect(),
            });
        }

        let mut territories = Vec::new();
        for row in rows.iter() {
            if filter.is_some_and(|f| !f.matches(row)) {
                continue;
            }
            let name = row.get(&self.options.name_column).and_then(cell_text);
            let url = row.get(&self.options.url_column).and_then(cell_text);
            match (name, url) {
                (Some(name), Some(document_url)) => territories.push(TerritoryRef {
                    name,
                    document_url,
                }),
                _ => tracing::warn!("Skipping catalog row without name or link: {:?}", row),
            }
        }
        territories.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!("📋 Loaded {} territories", territories.len());
        Ok(territories)
    }

    pub fn invalidate(&self) {
        self.rows.invalidate_all();
    }

    async fn rows(&self) -> Result<Arc<Vec<Map<String, Value>>>> {
        let key = self.source.resource_id().to_string();
        if let Some(rows) = self.rows.get(&key) {
            tracing::debug!("Catalog cache hit for {}", key);
            return Ok(rows);
        }

        let rows = Arc::new(self.fetch_all().await?);
        self.rows.insert(key, rows.clone());
        Ok(rows)
    }

    /// Requests pages until one comes back shorter than the page size.
    async fn fetch_all(&self) -> Result<Vec<Map<String, Value>>> {
        let limit = self.options.page_size.max(1);
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.source.fetch_page(offset, limit).await?;
            let len = page.len();
            for record in page {
                match record {
                    Value::Object(obj) => rows.push(normalize_columns(obj)),
                    other => tracing::warn!("Skipping non-object catalog record: {}", other),
                }
            }
            tracing::debug!("Catalog page at offset {}: {} records", offset, len);

            if len < limit {
                break;
            }
            offset += limit;
        }

        Ok(rows)
    }
}

/// Case-insensitive, trimmed lookup by territory name.
pub fn find_territory<'a>(territories: &'a [TerritoryRef], name: &str) -> Option<&'a TerritoryRef> {
    let wanted = name.trim().to_lowercase();
    territories
        .iter()
        .find(|t| t.name.trim().to_lowercase() == wanted)
}

fn normalize_column(column: &str) -> String {
    column.trim().to_lowercase()
}

fn normalize_columns(row: Map<String, Value>) -> Map<String, Value> {
    row.into_iter()
        .map(|(key, value)| (normalize_column(&key), value))
        .collect()
}

fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
