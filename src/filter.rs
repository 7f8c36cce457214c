//! Narrowing the record table down to what one session may see.

use crate::error::{DashboardError, DashboardResult};
use crate::record::ServiceRecord;
use crate::table::ServiceTable;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Label of the city sentinel shown in the selectors.
pub const ALL_CITIES: &str = "All Cities";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CitySelection {
    #[default]
    All,
    City(String),
}

impl CitySelection {
    /// Empty input and the "All Cities" sentinel both mean no restriction.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => CitySelection::All,
            Some(value) if value.eq_ignore_ascii_case(ALL_CITIES) => CitySelection::All,
            Some(value) => CitySelection::City(value.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CitySelection::All => ALL_CITIES,
            CitySelection::City(city) => city,
        }
    }
}

/// Inclusive delivery-date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DashboardResult<Self> {
        let range = DateRange { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Open-ended on whichever side is missing.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DashboardResult<Option<Self>> {
        match (start, end) {
            (None, None) => Ok(None),
            (start, end) => DateRange::new(
                start.unwrap_or(NaiveDate::MIN),
                end.unwrap_or(NaiveDate::MAX),
            )
            .map(Some),
        }
    }

    pub fn validate(&self) -> DashboardResult<()> {
        if self.start > self.end {
            return Err(DashboardError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewQuery {
    pub city: CitySelection,
    pub range: Option<DateRange>,
}

/// Rows of a single source, possibly narrowed further.
#[derive(Clone, Debug, PartialEq)]
pub struct Scope<'a> {
    rows: Vec<&'a ServiceRecord>,
}

impl<'a> Scope<'a> {
    pub fn new(rows: Vec<&'a ServiceRecord>) -> Self {
        Scope { rows }
    }

    pub fn rows(&self) -> &[&'a ServiceRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct cities in first-appearance order.
    pub fn cities(&self) -> Vec<&'a str> {
        distinct(self.rows.iter().map(|r| r.city.as_str()))
    }

    /// Distinct vehicle identifiers in first-appearance order.
    pub fn car_numbers(&self) -> Vec<&'a str> {
        distinct(self.rows.iter().map(|r| r.car_no.as_str()))
    }

    /// Earliest and latest parseable delivery date.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.rows.iter().filter_map(|r| r.delivered_date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    pub fn with_car_no(&self, car_no: &str) -> Vec<&'a ServiceRecord> {
        self.rows
            .iter()
            .copied()
            .filter(|r| r.car_no == car_no)
            .collect()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

/// Outcome of a filter: either rows, or one of the two empty states.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewResult<'a> {
    Rows(Scope<'a>),
    NoDataForSource,
    NoDataInRange,
}

impl<'a> ViewResult<'a> {
    pub fn rows(&self) -> &[&'a ServiceRecord] {
        match self {
            ViewResult::Rows(scope) => scope.rows(),
            _ => &[],
        }
    }
}

/// Every row of the table that belongs to `source_name`.
pub fn scope_to_source<'a>(table: &'a ServiceTable, source_name: &str) -> Scope<'a> {
    Scope::new(
        table
            .records()
            .iter()
            .filter(|r| r.belongs_to(source_name))
            .collect(),
    )
}

/// Apply the full view filter for one source
///
/// An inverted date range is rejected before any row is looked at. A city that
/// the source never worked in is rejected as an invalid selection. Rows
/// without a parseable delivery date are dropped only when a range is given.
///
/// # Arguments
/// * `table` - The full snapshot
/// * `source_name` - Source taken from the session role
/// * `query` - City selection and optional date range
pub fn apply<'a>(
    table: &'a ServiceTable,
    source_name: &str,
    query: &ViewQuery,
) -> DashboardResult<ViewResult<'a>> {
    if let Some(range) = &query.range {
        range.validate()?;
    }

    let scope = scope_to_source(table, source_name);
    if scope.is_empty() {
        return Ok(ViewResult::NoDataForSource);
    }

    let mut rows = scope.rows().to_vec();

    if let CitySelection::City(city) = &query.city {
        if !scope.cities().contains(&city.as_str()) {
            return Err(DashboardError::InvalidSelection(city.clone()));
        }
        rows.retain(|r| &r.city == city);
    }

    if let Some(range) = &query.range {
        rows.retain(|r| r.delivered_date.is_some_and(|d| range.contains(d)));
    }

    if rows.is_empty() {
        return Ok(ViewResult::NoDataInRange);
    }

    Ok(ViewResult::Rows(Scope::new(rows)))
}
