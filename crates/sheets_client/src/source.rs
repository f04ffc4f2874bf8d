//! Transport trait over the tabular data source.
//!
//! The façade talks to this trait so it can run against the REST client in
//! production and an in-memory fake in tests.

use std::collections::HashMap;

use async_trait::async_trait;

use common::Error;

/// Handle to an opened spreadsheet document.
#[derive(Debug, Clone)]
pub struct WorkbookHandle {
    pub spreadsheet_id: String,
    pub title: String,
}

#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Resolve a document id into a handle, verifying it exists.
    async fn open(&self, spreadsheet_id: &str) -> Result<WorkbookHandle, Error>;

    /// Names of every tab in the document.
    async fn list_tabs(&self, wb: &WorkbookHandle) -> Result<Vec<String>, Error>;

    /// Full cell grid of one tab, rows outer, stringified values.
    async fn read_all_cells(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
    ) -> Result<Vec<Vec<String>>, Error>;

    /// Tab rows as records, using the first row as field names.
    async fn read_records(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
    ) -> Result<Vec<HashMap<String, String>>, Error>;

    /// Append rows to the end of a tab. Never rewrites existing rows.
    async fn append_rows(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), Error>;

    /// Create an empty tab with the given title.
    async fn add_tab(&self, wb: &WorkbookHandle, tab: &str) -> Result<(), Error>;
}
