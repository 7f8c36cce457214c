use crate::error::{DashboardError, DashboardResult};
use crate::record::{Column, ServiceRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A worksheet as the record store hands it over: a header row plus string cells.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { headers, rows }
    }

    /// Splits a grid whose first row is the header.
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return RawTable::default();
        }
        let headers = grid.remove(0);
        RawTable {
            headers,
            rows: grid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows padded or truncated to the header width.
    pub fn padded_rows(&self) -> Vec<Vec<String>> {
        let width = self.headers.len();
        self.rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.resize(width, String::new());
                row
            })
            .collect()
    }
}

/// Header-to-position mapping for every required column, resolved once per load.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    positions: HashMap<Column, usize>,
}

impl Schema {
    /// Resolves all columns or reports every one that is absent.
    pub fn resolve(headers: &[String]) -> DashboardResult<Self> {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = Column::from_header(header) {
                positions.entry(column).or_insert(idx);
            }
        }

        let missing: Vec<String> = Column::ALL
            .iter()
            .filter(|col| !positions.contains_key(col))
            .map(|col| col.header().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(DashboardError::MissingColumns(missing));
        }

        Ok(Schema { positions })
    }

    pub fn cell<'a>(&self, row: &'a [String], column: Column) -> &'a str {
        self.positions
            .get(&column)
            .and_then(|idx| row.get(*idx))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

/// The in-memory snapshot of every service record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceTable {
    records: Vec<ServiceRecord>,
}

impl ServiceTable {
    pub fn new(records: Vec<ServiceRecord>) -> Self {
        ServiceTable { records }
    }

    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grid_splits_header_row() {
        let grid = vec![
            headers(&["City", "Car No"]),
            headers(&["Pune", "MH12"]),
        ];
        let raw = RawTable::from_grid(grid);
        assert_eq!(raw.headers, headers(&["City", "Car No"]));
        assert_eq!(raw.rows.len(), 1);
        assert!(RawTable::from_grid(Vec::new()).headers.is_empty());
    }

    #[test]
    fn short_rows_are_padded() {
        let raw = RawTable::new(headers(&["A", "B", "C"]), vec![headers(&["1"])]);
        assert_eq!(raw.padded_rows(), vec![headers(&["1", "", ""])]);
    }

    #[test]
    fn schema_reports_all_missing_columns() {
        let err = Schema::resolve(&headers(&["Source Name", "City"])).unwrap_err();
        match err {
            DashboardError::MissingColumns(cols) => {
                assert_eq!(cols.len(), Column::ALL.len() - 2);
                assert!(cols.contains(&"total Gmv".to_string()));
                assert!(!cols.contains(&"City".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn schema_reads_cells_by_header() {
        let all: Vec<String> = Column::ALL.iter().map(|c| c.header().to_string()).collect();
        let schema = Schema::resolve(&all).unwrap();
        let mut row = vec![String::new(); all.len()];
        row[2] = "Pune".into();
        assert_eq!(schema.cell(&row, Column::City), "Pune");
        assert_eq!(schema.cell(&row[..1], Column::City), "");
    }
}
