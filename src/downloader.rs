use crate::error::{DashboardError, DashboardResult};
use crate::record::{Column, ServiceRecord};
use chrono::NaiveDate;

/// Columns of the "Show Data" table and its exports.
pub const DATA_COLUMNS: [Column; 10] = [
    Column::SourceName,
    Column::RegistrationId,
    Column::City,
    Column::ServiceName,
    Column::CarName,
    Column::CustomerName,
    Column::CarOdometer,
    Column::CarNo,
    Column::MobileNo,
    Column::DeliveredDate,
];

/// Columns of the owner's billing table.
pub const BILL_COLUMNS: [Column; 11] = [
    Column::CustomerName,
    Column::RegistrationId,
    Column::City,
    Column::ServiceName,
    Column::CarName,
    Column::CarOdometer,
    Column::CarNo,
    Column::MobileNo,
    Column::DeliveredDate,
    Column::AmountWoGst,
    Column::TotalGmv,
];

/// Convert filtered records to CSV
///
/// The header row is always written, so an empty selection still yields a
/// valid file with just the column names. Dates are ISO and missing values
/// are empty cells.
///
/// # Arguments
/// * `rows` - The records to export
/// * `columns` - Which columns to write, in order
///
/// # Returns
/// * `DashboardResult<String>` - CSV content
pub fn to_csv(rows: &[&ServiceRecord], columns: &[Column]) -> DashboardResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.header()))?;
    for record in rows {
        writer.write_record(columns.iter().map(|c| record.display(*c)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DashboardError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DashboardError::Export(e.to_string()))
}

/// Convert filtered records to XLSX
///
/// One worksheet, header in the first row. Numeric columns are written as
/// numbers so that they sum in a spreadsheet application; everything else is text.
///
/// # Returns
/// * `DashboardResult<Vec<u8>>` - XLSX file content
#[cfg(feature = "web")]
pub fn to_xlsx(rows: &[&ServiceRecord], columns: &[Column]) -> DashboardResult<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Filtered Data")?;

    for (c, column) in columns.iter().enumerate() {
        worksheet.write_string(0, c as u16, column.header())?;
    }

    for (r, record) in rows.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, column) in columns.iter().enumerate() {
            let col = c as u16;
            match record.numeric(*column) {
                Some(value) => worksheet.write_number(row, col, value)?,
                None => worksheet.write_string(row, col, record.display(*column))?,
            };
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}

/// `filtered_data_<ddmmyy>.<ext>`
pub fn export_filename(extension: &str, date: NaiveDate) -> String {
    format!("filtered_data_{}.{}", date.format("%d%m%y"), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::fixtures::record;

    #[test]
    fn empty_selection_exports_header_only() {
        let csv = to_csv(&[], &DATA_COLUMNS).unwrap();
        assert_eq!(
            csv,
            "Source Name,Registration ID,City,Service Name,Car Name,Customer Name,\
             Car Odometer,Car No,Mobile No,Delivered Date\n"
        );
    }

    #[test]
    fn rows_use_display_values() {
        let dated = record("alpha", "Pune", "Wash, Polish", "MH12", Some("2024-03-10"));
        let undated = record("alpha", "Pune", "Wash", "MH13", None);
        let csv = to_csv(&[&dated, &undated], &BILL_COLUMNS).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("Amount_WO_gst,total Gmv"));
        assert!(lines[1].contains("\"Wash, Polish\""));
        assert!(lines[1].ends_with("2024-03-10,1000,1180"));
        assert!(lines[2].ends_with("9800000000,,1000,1180"));
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_container() {
        let row = record("alpha", "Pune", "Wash", "MH12", Some("2024-03-10"));
        let bytes = to_xlsx(&[&row], &DATA_COLUMNS).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn filenames_carry_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_filename("csv", date), "filtered_data_090324.csv");
        assert_eq!(export_filename("xlsx", date), "filtered_data_090324.xlsx");
    }
}
