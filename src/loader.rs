use crate::error::{DashboardError, DashboardResult};
use crate::record::{Column, ServiceRecord};
use crate::table::{RawTable, Schema, ServiceTable};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Read;
use std::path::Path;

lazy_static! {
    static ref NUMBER_REGEX: Regex = Regex::new(r"-?\d[\d,]*(?:\.\d+)?|-?\.\d+").unwrap();
}

// Day-first before month-first: the franchise sheets are filled in dd-mm-yyyy.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%d-%m-%Y %H:%M:%S"];

/// Build the typed table from a raw worksheet
///
/// The schema is checked once up front; a sheet missing any expected column is
/// rejected as a whole instead of rendering partial views later on.
///
/// # Arguments
/// * `raw` - Header row and string cells as fetched from the store
///
/// # Returns
/// * `DashboardResult<ServiceTable>` - The typed records or `MissingColumns`
pub fn build_table(raw: &RawTable) -> DashboardResult<ServiceTable> {
    let schema = Schema::resolve(&raw.headers)?;

    let records = raw
        .padded_rows()
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| parse_record(&schema, row))
        .collect();

    Ok(ServiceTable::new(records))
}

fn parse_record(schema: &Schema, row: &[String]) -> ServiceRecord {
    let text = |col: Column| schema.cell(row, col).trim().to_string();
    let invoice = text(Column::InvoiceLink);

    ServiceRecord {
        source_name: text(Column::SourceName),
        registration_id: text(Column::RegistrationId),
        city: text(Column::City),
        service_name: text(Column::ServiceName),
        car_name: text(Column::CarName),
        customer_name: text(Column::CustomerName),
        car_model: text(Column::CarModel),
        car_odometer: parse_number(schema.cell(row, Column::CarOdometer)),
        car_no: text(Column::CarNo),
        mobile_no: text(Column::MobileNo),
        delivered_date: parse_date(schema.cell(row, Column::DeliveredDate)),
        invoice_link: if invoice.is_empty() { None } else { Some(invoice) },
        amount_wo_gst: parse_number(schema.cell(row, Column::AmountWoGst)),
        total_gmv: parse_number(schema.cell(row, Column::TotalGmv)),
        password: schema.cell(row, Column::Password).to_string(),
        owner_password: schema.cell(row, Column::OwnerPassword).to_string(),
    }
}

/// Lenient date parsing; anything unrecognised becomes `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }

    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .filter(|part| part.len() < trimmed.len());

    for candidate in std::iter::once(trimmed).chain(date_part) {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return Some(date);
            }
        }
    }

    None
}

/// First numeric token of a cell, ignoring currency symbols, grouping commas and units.
pub fn parse_number(raw: &str) -> Option<f64> {
    let token = NUMBER_REGEX.find(raw.trim())?;
    token.as_str().replace(',', "").parse::<f64>().ok()
}

/// Read a worksheet exported as CSV
///
/// The first record is the header row; ragged rows are accepted and padded
/// later by [`RawTable::padded_rows`].
pub fn raw_from_csv<R: Read>(reader: R) -> DashboardResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| DashboardError::StoreUnavailable(format!("Failed to read header row: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| DashboardError::StoreUnavailable(format!("Failed to read row: {}", e)))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    Ok(RawTable::new(headers, rows))
}

/// Load a worksheet from a CSV file on disk.
pub fn raw_from_csv_file(filepath: impl AsRef<Path>) -> DashboardResult<RawTable> {
    let path = filepath.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        DashboardError::StoreUnavailable(format!("Cannot open {}: {}", path.display(), e))
    })?;
    raw_from_csv(file)
}
