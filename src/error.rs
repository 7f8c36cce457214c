use chrono::NaiveDate;
use thiserror::Error;

/// Every failure a request (or the startup load) can run into.
///
/// Empty results are not errors: see [`crate::filter::ViewResult`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Required columns are missing from the sheet: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Incorrect Source Name or Password. Please try again.")]
    InvalidCredentials,

    #[error("Start date {start} must be earlier than or equal to end date {end}.")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Please select a valid search option ({0} is not one of your cities).")]
    InvalidSelection(String),

    #[error("This section is only accessible to the Owner. Please log in with the Owner password!")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;

impl From<std::io::Error> for DashboardError {
    fn from(e: std::io::Error) -> Self {
        DashboardError::Io(e.to_string())
    }
}

impl From<csv::Error> for DashboardError {
    fn from(e: csv::Error) -> Self {
        DashboardError::Export(e.to_string())
    }
}

#[cfg(feature = "web")]
impl From<reqwest::Error> for DashboardError {
    fn from(e: reqwest::Error) -> Self {
        DashboardError::StoreUnavailable(e.to_string())
    }
}

#[cfg(feature = "web")]
impl From<handlebars::RenderError> for DashboardError {
    fn from(e: handlebars::RenderError) -> Self {
        DashboardError::Render(e.to_string())
    }
}

#[cfg(feature = "web")]
impl From<handlebars::TemplateError> for DashboardError {
    fn from(e: handlebars::TemplateError) -> Self {
        DashboardError::Render(e.to_string())
    }
}

#[cfg(feature = "web")]
impl From<rust_xlsxwriter::XlsxError> for DashboardError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        DashboardError::Export(e.to_string())
    }
}

#[cfg(feature = "web")]
impl DashboardError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            DashboardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            DashboardError::Forbidden => StatusCode::FORBIDDEN,
            DashboardError::InvalidRange { .. }
            | DashboardError::InvalidSelection(_)
            | DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
            DashboardError::MissingColumns(_)
            | DashboardError::Render(_)
            | DashboardError::Export(_)
            | DashboardError::Config(_)
            | DashboardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for DashboardError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error</title></head>\
             <body><div class=\"feedback error\">{}</div><p><a href=\"/\">Back to the dashboard</a></p></body></html>",
            handlebars::html_escape(&self.to_string())
        );
        (status, axum::response::Html(body)).into_response()
    }
}
