//! Record store adapters.
//!
//! The dashboard only ever needs two things from a spreadsheet backend: every
//! row of a named worksheet, and appending one row to a worksheet. Failures of
//! either kind surface as [`DashboardError::StoreUnavailable`]; nothing is retried.

use crate::config::StoreBackend;
use crate::error::{DashboardError, DashboardResult};
use crate::loader;
use crate::table::RawTable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// All rows of `sheet`, first row being the header.
    async fn fetch_rows(&self, sheet: &str) -> DashboardResult<RawTable>;

    /// Appends a single row; values are written in the given order.
    async fn append_row(&self, sheet: &str, values: Vec<String>) -> DashboardResult<()>;
}

/// One `<sheet>.csv` file per worksheet inside a directory.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvStore { dir: dir.into() }
    }

    fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet))
    }
}

/// Runs blocking file work off the async worker threads.
async fn blocking<T, F>(work: F) -> DashboardResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DashboardResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DashboardError::StoreUnavailable(format!("File task failed: {}", e)))?
}

fn append_csv(path: &Path, values: &[String]) -> DashboardResult<()> {
    let file = OpenOptions::new().append(true).open(path).map_err(|e| {
        DashboardError::StoreUnavailable(format!("Cannot open {}: {}", path.display(), e))
    })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer
        .write_record(values)
        .and_then(|_| writer.flush().map_err(csv::Error::from))
        .map_err(|e| DashboardError::StoreUnavailable(format!("Append failed: {}", e)))
}

#[async_trait]
impl RecordStore for CsvStore {
    async fn fetch_rows(&self, sheet: &str) -> DashboardResult<RawTable> {
        let path = self.sheet_path(sheet);
        blocking(move || loader::raw_from_csv_file(path)).await
    }

    async fn append_row(&self, sheet: &str, values: Vec<String>) -> DashboardResult<()> {
        let path = self.sheet_path(sheet);
        let target = path.clone();
        blocking(move || append_csv(&target, &values)).await?;

        tracing::debug!(sheet, path = %path.display(), "Appended row to csv store");
        Ok(())
    }
}

/// Worksheets held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: Mutex<HashMap<String, RawTable>>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, name: &str, table: RawTable) -> Self {
        self.put_sheet(name, table);
        self
    }

    pub fn put_sheet(&self, name: &str, table: RawTable) {
        let mut sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        sheets.insert(name.to_string(), table);
    }

    pub fn sheet(&self, name: &str) -> Option<RawTable> {
        let sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        sheets.get(name).cloned()
    }

    /// Makes every call fail as if the network were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(|e| e.into_inner()) = unavailable;
    }

    fn check_available(&self) -> DashboardResult<()> {
        if *self.unavailable.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DashboardError::StoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_rows(&self, sheet: &str) -> DashboardResult<RawTable> {
        self.check_available()?;
        self.sheet(sheet)
            .ok_or_else(|| DashboardError::StoreUnavailable(format!("No worksheet named '{}'", sheet)))
    }

    async fn append_row(&self, sheet: &str, values: Vec<String>) -> DashboardResult<()> {
        self.check_available()?;
        let mut sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        let table = sheets
            .get_mut(sheet)
            .ok_or_else(|| DashboardError::StoreUnavailable(format!("No worksheet named '{}'", sheet)))?;
        table.rows.push(values);
        Ok(())
    }
}

/// Store for the configured backend.
pub fn from_config(backend: &StoreBackend) -> DashboardResult<Arc<dyn RecordStore>> {
    match backend {
        StoreBackend::Csv { dir } => {
            tracing::info!(dir = %dir.display(), "Using csv record store");
            Ok(Arc::new(CsvStore::new(dir.clone())))
        }
        #[cfg(feature = "web")]
        StoreBackend::Sheets {
            api_base,
            spreadsheet_id,
            access_token,
            api_key,
        } => {
            let auth = match (access_token, api_key) {
                (Some(token), _) => SheetsAuth::Bearer(token.clone()),
                (None, Some(key)) => SheetsAuth::ApiKey(key.clone()),
                (None, None) => SheetsAuth::None,
            };
            tracing::info!(spreadsheet = %spreadsheet_id, "Using Google Sheets record store");
            Ok(Arc::new(SheetsStore::new(api_base.clone(), spreadsheet_id.clone(), auth)))
        }
        #[cfg(not(feature = "web"))]
        StoreBackend::Sheets { .. } => Err(DashboardError::Config(
            "the sheets store needs the `web` feature".to_string(),
        )),
    }
}

#[cfg(feature = "web")]
pub use sheets::{SheetsAuth, SheetsStore};

#[cfg(feature = "web")]
mod sheets {
    use super::RecordStore;
    use crate::error::{DashboardError, DashboardResult};
    use crate::table::RawTable;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SheetsAuth {
        /// OAuth access token; required for appends.
        Bearer(String),
        /// API key; read access to shared sheets only.
        ApiKey(String),
        None,
    }

    /// Google Sheets v4 `values` API client.
    pub struct SheetsStore {
        http: reqwest::Client,
        base_url: String,
        spreadsheet_id: String,
        auth: SheetsAuth,
    }

    #[derive(Debug, Deserialize)]
    struct ValueRange {
        #[serde(default)]
        values: Vec<Vec<Value>>,
    }

    #[derive(Debug, Serialize)]
    struct AppendBody<'a> {
        values: [&'a [String]; 1],
    }

    impl SheetsStore {
        pub fn new(
            base_url: impl Into<String>,
            spreadsheet_id: impl Into<String>,
            auth: SheetsAuth,
        ) -> Self {
            Self {
                http: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                spreadsheet_id: spreadsheet_id.into(),
                auth,
            }
        }

        /// `{base}/spreadsheets/{id}/values/{range}`
        fn values_url(&self, range: &str) -> String {
            format!(
                "{}/spreadsheets/{}/values/{}",
                self.base_url,
                self.spreadsheet_id,
                urlencoding::encode(range)
            )
        }

        fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
            match &self.auth {
                SheetsAuth::Bearer(token) => builder.bearer_auth(token),
                SheetsAuth::ApiKey(key) => builder.query(&[("key", key)]),
                SheetsAuth::None => builder,
            }
        }

        async fn check(resp: reqwest::Response) -> DashboardResult<reqwest::Response> {
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DashboardError::StoreUnavailable(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    body
                )));
            }
            Ok(resp)
        }
    }

    fn cell_text(value: Value) -> String {
        match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    #[async_trait]
    impl RecordStore for SheetsStore {
        async fn fetch_rows(&self, sheet: &str) -> DashboardResult<RawTable> {
            let req = self
                .http
                .get(self.values_url(sheet))
                .query(&[("valueRenderOption", "FORMATTED_VALUE")]);
            let resp = self.authed(req).send().await?;
            let resp = Self::check(resp).await?;
            let body: ValueRange = resp
                .json()
                .await
                .map_err(|e| DashboardError::StoreUnavailable(format!("decode: {}", e)))?;

            let grid = body
                .values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect();
            let table = RawTable::from_grid(grid);
            tracing::info!(sheet, rows = table.rows.len(), "Fetched worksheet");
            Ok(table)
        }

        async fn append_row(&self, sheet: &str, values: Vec<String>) -> DashboardResult<()> {
            let url = format!("{}:append", self.values_url(sheet));
            let req = self
                .http
                .post(url)
                .query(&[
                    ("valueInputOption", "USER_ENTERED"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&AppendBody {
                    values: [values.as_slice()],
                });
            let resp = self.authed(req).send().await?;
            Self::check(resp).await?;
            tracing::info!(sheet, "Appended row to worksheet");
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn complaints() -> RawTable {
        RawTable::new(
            vec!["Car Number".into(), "Date".into(), "Remark".into(), "Info".into()],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn memory_store_appends_and_fails_on_demand() {
        let store = MemoryStore::new().with_sheet("Complained", complaints());
        store
            .append_row("Complained", vec!["MH12".into(), "2024-03-10".into()])
            .await
            .unwrap();
        assert_eq!(store.fetch_rows("Complained").await.unwrap().rows.len(), 1);

        assert!(store.fetch_rows("Missing").await.is_err());
        store.set_unavailable(true);
        assert!(matches!(
            store.fetch_rows("Complained").await,
            Err(DashboardError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn csv_store_reads_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Complained.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Car Number,Date,Remark,Info").unwrap();
        writeln!(file, "DL3C,2024-03-01,Brake noise,").unwrap();
        drop(file);

        let store = CsvStore::new(dir.path());
        store
            .append_row(
                "Complained",
                vec!["MH12".into(), "2024-03-10".into(), "Late, again".into(), "".into()],
            )
            .await
            .unwrap();

        let raw = store.fetch_rows("Complained").await.unwrap();
        assert_eq!(raw.headers[0], "Car Number");
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.rows[1][2], "Late, again");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn csv_appends_run_on_blocking_threads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Complained.csv"), "Car Number,Date,Remark,Info\n").unwrap();
        let store = Arc::new(CsvStore::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_row("Complained", vec![format!("CAR{}", n), "2024-03-10".into(), "r".into(), "".into()])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.fetch_rows("Complained").await.unwrap().rows.len(), 8);

        let failed: DashboardResult<()> = blocking(|| panic!("disk gone")).await;
        assert!(matches!(failed, Err(DashboardError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn csv_store_missing_sheet_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        assert!(matches!(
            store.fetch_rows("nope").await,
            Err(DashboardError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.append_row("nope", vec!["x".into()]).await,
            Err(DashboardError::StoreUnavailable(_))
        ));
    }
}
