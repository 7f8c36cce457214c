use axum::{
    Extension, Form, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::aggregate::{self, GroupKey};
use crate::config::Config;
use crate::downloader::{self, BILL_COLUMNS, DATA_COLUMNS};
use crate::error::{DashboardError, DashboardResult};
use crate::filter::{self, CitySelection, DateRange, ViewQuery, ViewResult};
use crate::graph::{self, GraphOptions};
use crate::loader;
use crate::login::{self, CredentialVerifier, Role, SessionStore};
use crate::record::{Column, Complaint};
use crate::store::{self, RecordStore};
use crate::table::ServiceTable;
use crate::views::{self, FilterForm, PageContext, Section, TableView, Views};

/// The table currently served, or why there is none.
#[derive(Debug, Clone)]
enum Snapshot {
    Loaded(Arc<ServiceTable>),
    Failed(DashboardError),
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub verifier: Box<dyn CredentialVerifier>,
    pub sessions: SessionStore,
    pub views: Views,
    snapshot: RwLock<Snapshot>,
}

impl AppState {
    /// State with no table loaded yet; call [`AppState::refresh`] before serving.
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> DashboardResult<Self> {
        Ok(AppState {
            verifier: config.credentials.verifier(),
            sessions: SessionStore::new(config.session_ttl),
            views: Views::new()?,
            snapshot: RwLock::new(Snapshot::Failed(DashboardError::StoreUnavailable(
                "Data has not been loaded yet.".to_string(),
            ))),
            config,
            store,
        })
    }

    /// The current snapshot, or the error of the last load if none ever succeeded.
    pub fn table(&self) -> DashboardResult<Arc<ServiceTable>> {
        match &*self.snapshot.read().unwrap_or_else(|e| e.into_inner()) {
            Snapshot::Loaded(table) => Ok(table.clone()),
            Snapshot::Failed(e) => Err(e.clone()),
        }
    }

    /// Reload the record sheet
    ///
    /// A failed reload keeps serving the previous snapshot. The lock is only
    /// taken after the fetch has completed.
    ///
    /// # Returns
    /// * `DashboardResult<usize>` - Number of records now loaded
    pub async fn refresh(&self) -> DashboardResult<usize> {
        let sheet = &self.config.records_sheet;
        let loaded = match self.store.fetch_rows(sheet).await {
            Ok(raw) => loader::build_table(&raw),
            Err(e) => Err(e),
        };

        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        match loaded {
            Ok(table) => {
                let count = table.len();
                tracing::info!(sheet = %sheet, records = count, "Record table loaded");
                *snapshot = Snapshot::Loaded(Arc::new(table));
                Ok(count)
            }
            Err(e) => {
                tracing::error!(sheet = %sheet, "Loading records failed: {}", e);
                if let Snapshot::Failed(_) = *snapshot {
                    *snapshot = Snapshot::Failed(e.clone());
                }
                Err(e)
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_home))
        .route("/dashboard", get(serve_dashboard))
        .route("/analytics", get(serve_analytics))
        .route("/data", get(serve_data))
        .route("/data/export.csv", get(export_csv))
        .route("/data/export.xlsx", get(export_xlsx))
        .route("/bill", get(serve_bill))
        .route("/complaints", get(serve_complaints).post(submit_complaint))
        .route("/refresh", post(refresh_data))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route(
            "/logout",
            get(login::handle_logout).post(login::handle_logout),
        )
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = store::from_config(&config.store)?;
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config, store)?);

    // Serve the login page even if the first load fails; it shows the reason.
    if let Err(e) = state.refresh().await {
        tracing::warn!("Starting without records: {}", e);
    }

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// City and date filters as submitted by the filter form (`YYYY-MM-DD`).
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub city: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl FilterParams {
    pub fn to_query(&self) -> DashboardResult<ViewQuery> {
        let start = parse_form_date(self.start.as_deref(), "start")?;
        let end = parse_form_date(self.end.as_deref(), "end")?;
        Ok(ViewQuery {
            city: CitySelection::parse(self.city.as_deref()),
            range: DateRange::from_bounds(start, end)?,
        })
    }

    fn form(&self, scope: &filter::Scope<'_>) -> FilterForm {
        FilterForm::new(
            scope,
            self.city.as_deref(),
            self.start.as_deref(),
            self.end.as_deref(),
        )
    }
}

fn parse_form_date(value: Option<&str>, field: &str) -> DashboardResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| DashboardError::Validation(format!("Invalid {} date '{}'", field, raw))),
    }
}

fn source_of(role: &Role) -> &str {
    role.source_name().unwrap_or_default()
}

/// Errors a filtered page shows inline instead of failing the request.
fn is_user_error(e: &DashboardError) -> bool {
    matches!(
        e,
        DashboardError::InvalidRange { .. }
            | DashboardError::InvalidSelection(_)
            | DashboardError::Validation(_)
    )
}

#[derive(Serialize)]
struct HomeBody {
    greeting: &'static str,
    total_orders: usize,
    repeat_orders: usize,
    working_cities: usize,
    latest_delivery: Option<String>,
}

async fn serve_home(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(flash): Query<FlashQuery>,
) -> DashboardResult<Html<String>> {
    let table = state.table()?;
    let scope = filter::scope_to_source(&table, source_of(&role));
    let stats = aggregate::dashboard_stats(scope.rows());

    let body = HomeBody {
        greeting: views::greeting(Local::now().hour()),
        total_orders: stats.total_orders,
        repeat_orders: stats.repeat_orders,
        working_cities: stats.working_cities,
        latest_delivery: scope
            .date_bounds()
            .map(|(_, latest)| latest.format("%d %b %Y").to_string()),
    };
    let ctx = PageContext {
        role: &role,
        section: Section::Home,
        title: "Home",
        notice: flash.notice,
        error: flash.error,
    };
    state.views.render("home", ctx, body)
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub car_no: Option<String>,
}

#[derive(Serialize)]
struct DetailRow {
    cells: Vec<String>,
    invoice: Option<String>,
}

#[derive(Serialize)]
struct DetailTable {
    headers: Vec<&'static str>,
    rows: Vec<DetailRow>,
}

#[derive(Serialize)]
struct DashboardBody {
    empty: Option<&'static str>,
    stats: aggregate::DashboardStats,
    car_no: String,
    car_numbers: Vec<String>,
    details: Option<DetailTable>,
}

const DETAIL_COLUMNS: [Column; 8] = [
    Column::RegistrationId,
    Column::CustomerName,
    Column::City,
    Column::ServiceName,
    Column::CarName,
    Column::CarModel,
    Column::CarOdometer,
    Column::DeliveredDate,
];

async fn serve_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<DashboardParams>,
) -> DashboardResult<Html<String>> {
    let table = state.table()?;
    let scope = filter::scope_to_source(&table, source_of(&role));
    let car_no = params.car_no.unwrap_or_default().trim().to_string();

    let mut notice = None;
    let details = if car_no.is_empty() {
        None
    } else {
        let matches = scope.with_car_no(&car_no);
        if matches.is_empty() {
            notice = Some(format!("No order found for car number {}.", car_no));
            None
        } else {
            Some(DetailTable {
                headers: DETAIL_COLUMNS.iter().map(|c| c.header()).collect(),
                rows: matches
                    .iter()
                    .map(|r| DetailRow {
                        cells: DETAIL_COLUMNS.iter().map(|c| r.display(*c)).collect(),
                        invoice: r
                            .invoice_link
                            .as_deref()
                            .and_then(views::safe_link)
                            .map(str::to_string),
                    })
                    .collect(),
            })
        }
    };

    let body = DashboardBody {
        empty: scope
            .is_empty()
            .then_some("No data available for this Source Name."),
        stats: aggregate::dashboard_stats(scope.rows()),
        car_numbers: scope.car_numbers().into_iter().map(str::to_string).collect(),
        car_no,
        details,
    };
    let ctx = PageContext {
        role: &role,
        section: Section::Dashboard,
        title: "Dashboard",
        notice,
        error: None,
    };
    state.views.render("dashboard", ctx, body)
}

/// Filter the snapshot for a page, keeping user errors for inline display.
fn filtered<'a>(
    table: &'a ServiceTable,
    role: &Role,
    params: &FilterParams,
) -> DashboardResult<Result<ViewResult<'a>, DashboardError>> {
    let outcome = params
        .to_query()
        .and_then(|query| filter::apply(table, source_of(role), &query));
    match outcome {
        Ok(result) => Ok(Ok(result)),
        Err(e) if is_user_error(&e) => Ok(Err(e)),
        Err(e) => Err(e),
    }
}

/// Render a filtered page, with status 400 when the filter was rejected.
fn render_filtered<T: Serialize>(
    state: &AppState,
    template: &str,
    ctx: PageContext<'_>,
    body: T,
) -> DashboardResult<Response> {
    let status = if ctx.error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let page = state.views.render(template, ctx, body)?;
    Ok((status, page).into_response())
}

#[derive(Serialize)]
struct AnalyticsBody {
    filter: FilterForm,
    empty: Option<&'static str>,
    has_rows: bool,
    repeats: aggregate::RepeatStats,
    repeat_percentage: String,
    by_city: Vec<aggregate::GroupCount>,
    by_service: Vec<aggregate::GroupCount>,
    city_chart: String,
    service_chart: String,
}

async fn serve_analytics(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<FilterParams>,
) -> DashboardResult<Response> {
    let table = state.table()?;
    let scope = filter::scope_to_source(&table, source_of(&role));
    let outcome = filtered(&table, &role, &params)?;

    let (rows, empty, error) = match &outcome {
        Ok(result) => (result.rows(), views::empty_message(result), None),
        Err(e) => (&[][..], None, Some(e.to_string())),
    };

    let by_city = aggregate::group_count(rows, GroupKey::City);
    let by_service = aggregate::group_count(rows, GroupKey::Service);
    let repeats = aggregate::repeat_stats(rows);

    let city_chart = graph::create_bar_chart(
        &by_city,
        &GraphOptions {
            title: "Orders by City".to_string(),
            x_label: "City".to_string(),
            ..GraphOptions::default()
        },
    )?;
    let service_chart = graph::create_bar_chart(
        &by_service,
        &GraphOptions {
            title: "Orders by Service".to_string(),
            x_label: "Service".to_string(),
            ..GraphOptions::default()
        },
    )?;

    let body = AnalyticsBody {
        filter: params.form(&scope),
        empty,
        has_rows: !rows.is_empty(),
        repeat_percentage: format!("{:.2}", repeats.percentage()),
        repeats,
        by_city,
        by_service,
        city_chart,
        service_chart,
    };
    let ctx = PageContext {
        role: &role,
        section: Section::Analytics,
        title: "Analytics",
        notice: None,
        error,
    };
    render_filtered(&state, "analytics", ctx, body)
}

#[derive(Serialize)]
struct DataBody {
    filter: FilterForm,
    empty: Option<&'static str>,
    has_rows: bool,
    count: usize,
    table: TableView,
}

async fn serve_data(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<FilterParams>,
) -> DashboardResult<Response> {
    let table = state.table()?;
    let scope = filter::scope_to_source(&table, source_of(&role));
    let outcome = filtered(&table, &role, &params)?;

    let (rows, empty, error) = match &outcome {
        Ok(result) => (result.rows(), views::empty_message(result), None),
        Err(e) => (&[][..], None, Some(e.to_string())),
    };

    let body = DataBody {
        filter: params.form(&scope),
        empty,
        has_rows: !rows.is_empty(),
        count: rows.len(),
        table: TableView::new(rows, &DATA_COLUMNS),
    };
    let ctx = PageContext {
        role: &role,
        section: Section::Data,
        title: "Show Data",
        notice: None,
        error,
    };
    render_filtered(&state, "data", ctx, body)
}

fn attachment(content_type: &'static str, filename: String, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<FilterParams>,
) -> DashboardResult<Response> {
    let table = state.table()?;
    let result = filter::apply(&table, source_of(&role), &params.to_query()?)?;
    let csv = downloader::to_csv(result.rows(), &DATA_COLUMNS)?;

    tracing::info!(source = source_of(&role), rows = result.rows().len(), "CSV export");
    Ok(attachment(
        "text/csv; charset=utf-8",
        downloader::export_filename("csv", Local::now().date_naive()),
        csv.into_bytes(),
    ))
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<FilterParams>,
) -> DashboardResult<Response> {
    let table = state.table()?;
    let result = filter::apply(&table, source_of(&role), &params.to_query()?)?;
    let xlsx = downloader::to_xlsx(result.rows(), &DATA_COLUMNS)?;

    tracing::info!(source = source_of(&role), rows = result.rows().len(), "XLSX export");
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        downloader::export_filename("xlsx", Local::now().date_naive()),
        xlsx,
    ))
}

#[derive(Serialize)]
struct BillBody {
    filter: FilterForm,
    empty: Option<&'static str>,
    has_rows: bool,
    summary: aggregate::BillingSummary,
    table: TableView,
}

async fn serve_bill(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(params): Query<FilterParams>,
) -> DashboardResult<Response> {
    if !role.is_owner() {
        tracing::warn!(source = source_of(&role), "Bill view refused for non-owner");
        return Err(DashboardError::Forbidden);
    }

    let table = state.table()?;
    let scope = filter::scope_to_source(&table, source_of(&role));
    let outcome = filtered(&table, &role, &params)?;

    let (rows, empty, error) = match &outcome {
        Ok(result) => (result.rows(), views::empty_message(result), None),
        Err(e) => (&[][..], None, Some(e.to_string())),
    };

    let body = BillBody {
        filter: params.form(&scope),
        empty,
        has_rows: !rows.is_empty(),
        summary: aggregate::billing_summary(rows),
        table: TableView::new(rows, &BILL_COLUMNS),
    };
    let ctx = PageContext {
        role: &role,
        section: Section::Bill,
        title: "Bill Data",
        notice: None,
        error,
    };
    render_filtered(&state, "bill", ctx, body)
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ComplaintForm {
    #[serde(default)]
    pub car_number: String,
    #[serde(default)]
    pub complaint_date: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub additional_info: String,
}

impl ComplaintForm {
    /// Required fields present and the date not in the past.
    pub fn validate(&self, today: NaiveDate) -> DashboardResult<Complaint> {
        let car_number = self.car_number.trim();
        let remark = self.remark.trim();
        if car_number.is_empty() || remark.is_empty() {
            return Err(DashboardError::Validation(
                "Please fill in all required fields!".to_string(),
            ));
        }

        let complaint_date = match parse_form_date(Some(self.complaint_date.as_str()), "complaint")? {
            Some(date) => date,
            None => today,
        };
        if complaint_date < today {
            return Err(DashboardError::Validation(
                "Complaint date cannot be earlier than today.".to_string(),
            ));
        }

        Ok(Complaint {
            car_number: car_number.to_string(),
            complaint_date,
            remark: remark.to_string(),
            additional_info: self.additional_info.trim().to_string(),
        })
    }
}

#[derive(Serialize)]
struct ComplaintsBody {
    today: String,
    form: ComplaintForm,
    car_numbers: Vec<String>,
    complaints: TableView,
    sheet_error: Option<String>,
}

async fn complaints_page(
    state: &AppState,
    role: &Role,
    form: ComplaintForm,
    flash: FlashQuery,
    status: StatusCode,
) -> DashboardResult<Response> {
    let today = Local::now().date_naive();
    let car_numbers = match state.table() {
        Ok(table) => filter::scope_to_source(&table, source_of(role))
            .car_numbers()
            .into_iter()
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    };

    let (complaints, sheet_error) = match state.store.fetch_rows(&state.config.complaints_sheet).await {
        Ok(raw) => (
            TableView {
                rows: raw.padded_rows(),
                headers: raw.headers,
            },
            None,
        ),
        Err(e) => {
            tracing::warn!("Complaint sheet unavailable: {}", e);
            (TableView::default(), Some(e.to_string()))
        }
    };

    let form = ComplaintForm {
        complaint_date: if form.complaint_date.is_empty() {
            today.format("%Y-%m-%d").to_string()
        } else {
            form.complaint_date
        },
        ..form
    };

    let body = ComplaintsBody {
        today: today.format("%Y-%m-%d").to_string(),
        form,
        car_numbers,
        complaints,
        sheet_error,
    };
    let ctx = PageContext {
        role,
        section: Section::Complaints,
        title: "Complaints",
        notice: flash.notice,
        error: flash.error,
    };
    let page = state.views.render("complaints", ctx, body)?;
    Ok((status, page).into_response())
}

async fn serve_complaints(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Query(flash): Query<FlashQuery>,
) -> DashboardResult<Response> {
    complaints_page(&state, &role, ComplaintForm::default(), flash, StatusCode::OK).await
}

/// Append one complaint row; nothing is retried.
async fn submit_complaint(
    State(state): State<Arc<AppState>>,
    Extension(role): Extension<Role>,
    Form(form): Form<ComplaintForm>,
) -> DashboardResult<Response> {
    let complaint = match form.validate(Local::now().date_naive()) {
        Ok(complaint) => complaint,
        Err(e) => {
            let flash = FlashQuery {
                notice: None,
                error: Some(e.to_string()),
            };
            return complaints_page(&state, &role, form, flash, e.status_code()).await;
        }
    };

    state
        .store
        .append_row(&state.config.complaints_sheet, complaint.to_row())
        .await?;
    tracing::info!(
        source = source_of(&role),
        car = %complaint.car_number,
        "Complaint registered"
    );

    Ok(Redirect::to("/complaints?notice=Complaint%20submitted%20successfully!").into_response())
}

async fn refresh_data(State(state): State<Arc<AppState>>) -> Redirect {
    let target = match state.refresh().await {
        Ok(count) => format!(
            "/?notice={}",
            urlencoding::encode(&format!("Data refreshed: {} records loaded.", count))
        ),
        Err(e) => format!("/?error={}", urlencoding::encode(&e.to_string())),
    };
    Redirect::to(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn filter_params_parse_dates_and_city() {
        let params = FilterParams {
            city: Some("Pune".into()),
            start: Some("2024-03-01".into()),
            end: Some("".into()),
        };
        let query = params.to_query().unwrap();
        assert_eq!(query.city, CitySelection::City("Pune".into()));
        let range = query.range.unwrap();
        assert_eq!(range.start, ymd(2024, 3, 1));
        assert_eq!(range.end, NaiveDate::MAX);

        let bad = FilterParams {
            start: Some("03/01/2024".into()),
            ..FilterParams::default()
        };
        assert!(matches!(bad.to_query(), Err(DashboardError::Validation(_))));

        let inverted = FilterParams {
            start: Some("2024-03-10".into()),
            end: Some("2024-03-01".into()),
            ..FilterParams::default()
        };
        assert!(matches!(
            inverted.to_query(),
            Err(DashboardError::InvalidRange { .. })
        ));
    }

    #[test]
    fn complaint_validation() {
        let today = ymd(2024, 3, 10);
        let form = ComplaintForm {
            car_number: " MH12AB1234 ".into(),
            complaint_date: "2024-03-10".into(),
            remark: "AC not cooling".into(),
            additional_info: String::new(),
        };
        let complaint = form.validate(today).unwrap();
        assert_eq!(complaint.car_number, "MH12AB1234");

        let missing = ComplaintForm {
            remark: "  ".into(),
            ..form.clone()
        };
        assert_eq!(
            missing.validate(today),
            Err(DashboardError::Validation(
                "Please fill in all required fields!".into()
            ))
        );

        let past = ComplaintForm {
            complaint_date: "2024-03-09".into(),
            ..form.clone()
        };
        assert!(past.validate(today).is_err());

        let undated = ComplaintForm {
            complaint_date: String::new(),
            ..form
        };
        assert_eq!(undated.validate(today).unwrap().complaint_date, today);
    }
}
