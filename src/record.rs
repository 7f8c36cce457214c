use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Columns of the service-record worksheet, in the order the sheet usually carries them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    SourceName,
    RegistrationId,
    City,
    ServiceName,
    CarName,
    CustomerName,
    CarModel,
    CarOdometer,
    CarNo,
    MobileNo,
    DeliveredDate,
    InvoiceLink,
    AmountWoGst,
    TotalGmv,
    Password,
    OwnerPassword,
}

impl Column {
    pub const ALL: [Column; 16] = [
        Column::SourceName,
        Column::RegistrationId,
        Column::City,
        Column::ServiceName,
        Column::CarName,
        Column::CustomerName,
        Column::CarModel,
        Column::CarOdometer,
        Column::CarNo,
        Column::MobileNo,
        Column::DeliveredDate,
        Column::InvoiceLink,
        Column::AmountWoGst,
        Column::TotalGmv,
        Column::Password,
        Column::OwnerPassword,
    ];

    /// Header text as it appears in the sheet.
    pub fn header(&self) -> &'static str {
        match self {
            Column::SourceName => "Source Name",
            Column::RegistrationId => "Registration ID",
            Column::City => "City",
            Column::ServiceName => "Service Name",
            Column::CarName => "Car Name",
            Column::CustomerName => "Customer Name",
            Column::CarModel => "Car Model",
            Column::CarOdometer => "Car Odometer",
            Column::CarNo => "Car No",
            Column::MobileNo => "Mobile No",
            Column::DeliveredDate => "Delivered Date",
            Column::InvoiceLink => "Invoice Link",
            Column::AmountWoGst => "Amount_WO_gst",
            Column::TotalGmv => "total Gmv",
            Column::Password => "Password",
            Column::OwnerPassword => "owner_password",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let wanted = header.trim();
        Column::ALL
            .iter()
            .copied()
            .find(|col| col.header().eq_ignore_ascii_case(wanted))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Column::CarOdometer | Column::AmountWoGst | Column::TotalGmv
        )
    }
}

/// One completed or registered service job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub source_name: String,
    pub registration_id: String,
    pub city: String,
    pub service_name: String,
    pub car_name: String,
    pub customer_name: String,
    pub car_model: String,
    pub car_odometer: Option<f64>,
    pub car_no: String,
    pub mobile_no: String,
    pub delivered_date: Option<NaiveDate>,
    pub invoice_link: Option<String>,
    pub amount_wo_gst: Option<f64>,
    pub total_gmv: Option<f64>,
    pub password: String,
    pub owner_password: String,
}

impl ServiceRecord {
    /// Case-insensitive, whitespace-tolerant source comparison.
    pub fn belongs_to(&self, source_name: &str) -> bool {
        normalize_source(&self.source_name) == normalize_source(source_name)
    }

    /// Display text for a column. Dates are ISO, missing values are empty.
    pub fn display(&self, column: Column) -> String {
        match column {
            Column::SourceName => self.source_name.clone(),
            Column::RegistrationId => self.registration_id.clone(),
            Column::City => self.city.clone(),
            Column::ServiceName => self.service_name.clone(),
            Column::CarName => self.car_name.clone(),
            Column::CustomerName => self.customer_name.clone(),
            Column::CarModel => self.car_model.clone(),
            Column::CarOdometer => format_number(self.car_odometer),
            Column::CarNo => self.car_no.clone(),
            Column::MobileNo => self.mobile_no.clone(),
            Column::DeliveredDate => self
                .delivered_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            Column::InvoiceLink => self.invoice_link.clone().unwrap_or_default(),
            Column::AmountWoGst => format_number(self.amount_wo_gst),
            Column::TotalGmv => format_number(self.total_gmv),
            Column::Password | Column::OwnerPassword => String::new(),
        }
    }

    pub fn numeric(&self, column: Column) -> Option<f64> {
        match column {
            Column::CarOdometer => self.car_odometer,
            Column::AmountWoGst => self.amount_wo_gst,
            Column::TotalGmv => self.total_gmv,
            _ => None,
        }
    }
}

pub fn normalize_source(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Integral values print without a fractional part, the way the sheet shows them.
pub fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{}", v),
        None => String::new(),
    }
}

/// A customer complaint appended to the complaints worksheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub car_number: String,
    pub complaint_date: NaiveDate,
    pub remark: String,
    pub additional_info: String,
}

impl Complaint {
    /// Column order of the complaints worksheet.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.car_number.clone(),
            self.complaint_date.format("%Y-%m-%d").to_string(),
            self.remark.clone(),
            self.additional_info.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case_and_padding() {
        assert_eq!(Column::from_header(" source name "), Some(Column::SourceName));
        assert_eq!(Column::from_header("Total GMV"), Some(Column::TotalGmv));
        assert_eq!(Column::from_header("Customer Phone"), None);
    }

    #[test]
    fn numbers_print_like_the_sheet() {
        assert_eq!(format_number(Some(12000.0)), "12000");
        assert_eq!(format_number(Some(1499.5)), "1499.5");
        assert_eq!(format_number(None), "");
    }

    #[test]
    fn complaint_row_order() {
        let complaint = Complaint {
            car_number: "MH12AB1234".into(),
            complaint_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            remark: "AC not cooling".into(),
            additional_info: String::new(),
        };
        assert_eq!(
            complaint.to_row(),
            vec!["MH12AB1234", "2024-03-10", "AC not cooling", ""]
        );
    }

    #[test]
    fn complaint_serializes_dates_as_iso() {
        let complaint = Complaint {
            car_number: "MH12AB1234".into(),
            complaint_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            remark: "AC not cooling".into(),
            additional_info: String::new(),
        };
        let json = serde_json::to_value(&complaint).unwrap();
        assert_eq!(json["complaint_date"], "2024-03-10");
        let back: Complaint = serde_json::from_value(json).unwrap();
        assert_eq!(back, complaint);
    }
}
