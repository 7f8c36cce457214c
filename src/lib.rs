/*!
# Service Dashboard

A web dashboard for a car-service franchise network, built in Rust.

## Overview

Franchise sources log in with credentials kept in the same spreadsheet as
their service records. Each source only ever sees its own rows; the owner
password of a source additionally unlocks the billing view. Records are read
from the spreadsheet once at start-up into an immutable snapshot and replaced
only on an explicit refresh.

## Architecture

### Store Layer
- **Technologies**: reqwest, csv
- Google Sheets v4 `values` API, a directory of CSV files, or memory
- Read a whole worksheet; append a single row (complaints)

### Core Layer
- Typed schema checked once at load; lenient dates and amounts
- Authentication against the `Password` / `owner_password` columns
- View filter: source scope, city selection, inclusive delivery-date range
- Aggregation: counts per city and service, repeat orders, billing sums

### Presentation Layer
- **Technologies**: axum, handlebars, plotters, rust_xlsxwriter
- Cookie sessions, server-rendered pages, SVG bar charts
- CSV and Excel exports of the filtered rows

## Modules

- **record**: service record and complaint types, sheet column names
- **table**: raw worksheet and the typed record table
- **loader**: raw worksheet to typed records, CSV reading
- **filter**: source scope, city and date filtering
- **aggregate**: group counts, repeat metric, billing and dashboard totals
- **login**: credential checks, sessions, login/logout handlers
- **store**: record store trait and its backends
- **config**: environment configuration
- **downloader**: CSV and XLSX export
- **graph**: bar charts
- **views**: handlebars pages
- **app**: routing, shared state and page handlers

## Routes

- `/login`, `/logout` - Session management
- `/` - Greeting and highlights
- `/dashboard` - Order totals and registration search
- `/analytics` - Charts by city and service, repeat percentage
- `/data` - Filtered records with `/data/export.csv` and `/data/export.xlsx`
- `/bill` - Billing summary (owner only)
- `/complaints` - Complaint form and register
- `/refresh` - Reload records from the store
*/

pub mod aggregate;
pub mod config;
pub mod downloader;
pub mod error;
pub mod filter;
pub mod loader;
pub mod login;
pub mod record;
pub mod store;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod views;

pub use error::{DashboardError, DashboardResult};
