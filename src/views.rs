//! Page rendering.
//!
//! Every page is a handlebars template wrapped in the shared `layout` partial.
//! Handlers build a serializable body; [`Views::render`] adds the menu and the
//! flash messages. Handlebars escapes every `{{value}}`, so only the chart SVG
//! is inserted raw.

use crate::error::DashboardResult;
use crate::filter::{ALL_CITIES, CitySelection, Scope, ViewResult};
use crate::login::Role;
use crate::record::{Column, ServiceRecord};
use axum::response::Html;
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Home,
    Dashboard,
    Analytics,
    Data,
    Bill,
    Complaints,
}

#[derive(Debug, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
    pub active: bool,
}

/// Menu entries for a role; "Bill Data" only for owners.
pub fn menu(role: &Role, active: Section) -> Vec<NavItem> {
    let mut items = vec![
        ("Home", "/", Section::Home),
        ("Dashboard", "/dashboard", Section::Dashboard),
        ("Analytics", "/analytics", Section::Analytics),
        ("Show Data", "/data", Section::Data),
    ];
    if role.is_owner() {
        items.push(("Bill Data", "/bill", Section::Bill));
    }
    items.push(("Complaints", "/complaints", Section::Complaints));

    items
        .into_iter()
        .map(|(label, href, section)| NavItem {
            label,
            href,
            active: section == active,
        })
        .collect()
}

/// What the layout needs besides the page body.
#[derive(Debug)]
pub struct PageContext<'a> {
    pub role: &'a Role,
    pub section: Section,
    pub title: &'a str,
    pub notice: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct Page<'a, T: Serialize> {
    title: &'a str,
    source: &'a str,
    role: &'static str,
    nav: Vec<NavItem>,
    notice: Option<String>,
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct LoginPage {
    title: &'static str,
    notice: Option<String>,
    error: Option<String>,
}

handlebars_helper!(money: |value: f64| format_money(value));

pub struct Views {
    registry: Handlebars<'static>,
}

impl Views {
    pub fn new() -> DashboardResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_helper("money", Box::new(money));
        registry.register_partial("layout", include_str!("templates/layout.hbs"))?;
        registry.register_partial("filter_form", include_str!("templates/filter_form.hbs"))?;

        let pages = [
            ("login", include_str!("templates/login.hbs")),
            ("home", include_str!("templates/home.hbs")),
            ("dashboard", include_str!("templates/dashboard.hbs")),
            ("analytics", include_str!("templates/analytics.hbs")),
            ("data", include_str!("templates/data.hbs")),
            ("bill", include_str!("templates/bill.hbs")),
            ("complaints", include_str!("templates/complaints.hbs")),
        ];
        for (name, source) in pages {
            registry.register_template_string(name, source)?;
        }

        Ok(Views { registry })
    }

    /// Render a signed-in page
    ///
    /// # Arguments
    /// * `template` - Registered page name
    /// * `ctx` - Role, active menu entry and flash messages
    /// * `body` - Page-specific fields, flattened next to the layout fields
    pub fn render<T: Serialize>(
        &self,
        template: &str,
        ctx: PageContext<'_>,
        body: T,
    ) -> DashboardResult<Html<String>> {
        let page = Page {
            title: ctx.title,
            source: ctx.role.source_name().unwrap_or_default(),
            role: ctx.role.label(),
            nav: menu(ctx.role, ctx.section),
            notice: ctx.notice,
            error: ctx.error,
            body,
        };
        Ok(Html(self.registry.render(template, &page)?))
    }

    pub fn login(&self, notice: Option<String>, error: Option<String>) -> DashboardResult<Html<String>> {
        let page = LoginPage {
            title: "Login",
            notice,
            error,
        };
        Ok(Html(self.registry.render("login", &page)?))
    }
}

/// `₹1,234.50`: comma-grouped thousands, two decimals.
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}₹{}.{}", sign, grouped, fraction)
}

/// Invoice links are only rendered for http(s) targets.
pub fn safe_link(url: &str) -> Option<&str> {
    let url = url.trim();
    let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Some(url),
        _ => None,
    }
}

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good Morning",
        12..=17 => "Good Afternoon",
        _ => "Good Evening",
    }
}

#[derive(Debug, Serialize)]
pub struct CityOption {
    pub name: String,
    pub selected: bool,
}

/// City selector, date inputs and the query string reused by export links.
#[derive(Debug, Serialize)]
pub struct FilterForm {
    pub cities: Vec<CityOption>,
    pub all_selected: bool,
    pub all_label: &'static str,
    pub start: String,
    pub end: String,
    pub query: String,
}

impl FilterForm {
    /// Date inputs default to the earliest and latest delivery of the chosen
    /// city (or the whole source). The query string only carries what was
    /// actually submitted.
    pub fn new(scope: &Scope<'_>, city: Option<&str>, start: Option<&str>, end: Option<&str>) -> Self {
        let selection = CitySelection::parse(city);
        let chosen = match &selection {
            CitySelection::City(name) => Some(name.as_str()),
            CitySelection::All => None,
        };
        let start = start.map(str::trim).filter(|s| !s.is_empty());
        let end = end.map(str::trim).filter(|s| !s.is_empty());

        let mut query = Vec::new();
        if let Some(city) = chosen {
            query.push(format!("city={}", urlencoding::encode(city)));
        }
        if let Some(start) = start {
            query.push(format!("start={}", urlencoding::encode(start)));
        }
        if let Some(end) = end {
            query.push(format!("end={}", urlencoding::encode(end)));
        }

        let bounds = match chosen {
            Some(city) => Scope::new(scope.rows().iter().copied().filter(|r| r.city == city).collect())
                .date_bounds(),
            None => scope.date_bounds(),
        };
        let start = start
            .map(str::to_string)
            .or_else(|| bounds.map(|(lo, _)| lo.format("%Y-%m-%d").to_string()))
            .unwrap_or_default();
        let end = end
            .map(str::to_string)
            .or_else(|| bounds.map(|(_, hi)| hi.format("%Y-%m-%d").to_string()))
            .unwrap_or_default();

        FilterForm {
            cities: scope
                .cities()
                .into_iter()
                .map(|name| CityOption {
                    name: name.to_string(),
                    selected: Some(name) == chosen,
                })
                .collect(),
            all_selected: chosen.is_none(),
            all_label: ALL_CITIES,
            start,
            end,
            query: query.join("&"),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    pub fn new(rows: &[&ServiceRecord], columns: &[Column]) -> Self {
        TableView {
            headers: columns.iter().map(|c| c.header().to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| columns.iter().map(|c| r.display(*c)).collect())
                .collect(),
        }
    }
}

/// Message for the two empty filter outcomes.
pub fn empty_message(result: &ViewResult<'_>) -> Option<&'static str> {
    match result {
        ViewResult::Rows(_) => None,
        ViewResult::NoDataForSource => Some("No data available for this Source Name."),
        ViewResult::NoDataInRange => Some("No data available for the selected city and date range."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::fixtures::alpha_table;
    use crate::filter::scope_to_source;

    #[test]
    fn money_is_grouped() {
        assert_eq!(format_money(1234.5), "₹1,234.50");
        assert_eq!(format_money(1234567.891), "₹1,234,567.89");
        assert_eq!(format_money(999.0), "₹999.00");
        assert_eq!(format_money(0.0), "₹0.00");
        assert_eq!(format_money(-1500.0), "-₹1,500.00");
    }

    #[test]
    fn greeting_follows_the_clock() {
        assert_eq!(greeting(8), "Good Morning");
        assert_eq!(greeting(11), "Good Morning");
        assert_eq!(greeting(12), "Good Afternoon");
        assert_eq!(greeting(13), "Good Afternoon");
        assert_eq!(greeting(17), "Good Afternoon");
        assert_eq!(greeting(18), "Good Evening");
        assert_eq!(greeting(20), "Good Evening");
    }

    #[test]
    fn bill_menu_is_owner_only() {
        let user = menu(&Role::User("alpha".into()), Section::Home);
        let owner = menu(&Role::Owner("alpha".into()), Section::Bill);
        assert!(!user.iter().any(|item| item.href == "/bill"));
        assert!(owner.iter().any(|item| item.href == "/bill" && item.active));
        assert_eq!(owner.len(), user.len() + 1);
    }

    #[test]
    fn filter_form_defaults_to_date_bounds() {
        let table = alpha_table();
        let scope = scope_to_source(&table, "alpha");
        let form = FilterForm::new(&scope, Some("Delhi"), None, None);
        assert_eq!(form.start, "2024-03-20");
        assert_eq!(form.end, "2024-03-20");
        assert!(!form.all_selected);
        assert!(form.cities.iter().any(|c| c.name == "Delhi" && c.selected));
        assert_eq!(form.query, "city=Delhi");

        let submitted = FilterForm::new(&scope, Some("all cities"), Some("2024-03-02"), Some(""));
        assert!(submitted.all_selected);
        assert_eq!(submitted.start, "2024-03-02");
        assert_eq!(submitted.end, "2024-03-20");
        assert_eq!(submitted.query, "start=2024-03-02");

        let pune = FilterForm::new(&scope, Some("Pune"), None, None);
        assert_eq!(pune.start, "2024-03-01");
        assert_eq!(pune.end, "2024-03-05");

        let everything = FilterForm::new(&scope, None, None, None);
        assert_eq!(everything.start, "2024-03-01");
        assert_eq!(everything.end, "2024-03-20");
    }

    #[test]
    fn only_web_links_are_kept() {
        assert_eq!(safe_link("https://files.example.com/inv/1.pdf"), Some("https://files.example.com/inv/1.pdf"));
        assert_eq!(safe_link(" HTTP://example.com/a "), Some("HTTP://example.com/a"));
        assert_eq!(safe_link("javascript:alert(1)"), None);
        assert_eq!(safe_link("JavaScript://%0aalert(1)"), None);
        assert_eq!(safe_link("data:text/html,<b>x</b>"), None);
        assert_eq!(safe_link("/relative/path"), None);
    }

    #[test]
    fn pages_render_escaped() {
        let views = Views::new().unwrap();
        let role = Role::Owner("alpha".into());
        let html = views
            .render(
                "home",
                PageContext {
                    role: &role,
                    section: Section::Home,
                    title: "Home",
                    notice: Some("<b>hi</b>".into()),
                    error: None,
                },
                serde_json::json!({ "greeting": "Good Morning", "total_orders": 4, "working_cities": 2, "repeat_orders": 1 }),
            )
            .unwrap()
            .0;
        assert!(html.contains("Good Morning"));
        assert!(html.contains("Bill Data"));
        assert!(html.contains("&lt;b&gt;hi"));
        assert!(!html.contains("<b>hi"));

        let login = views.login(None, Some("Incorrect Source Name or Password. Please try again.".into())).unwrap().0;
        assert!(login.contains("Incorrect Source Name or Password"));
    }
}
