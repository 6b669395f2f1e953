//! JSON query API over stored records, plus manual scrape triggers.
//!
//! Every body carries `success`, including malformed query strings and path
//! ids, which answer 400. Read endpoints never fail with a 500: a
//! missing or failing store answers 503 with empty data and zeroed
//! pagination.

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::dates;
use crate::model::RecordKind;
use crate::scheduler::RunGuard;
use crate::scrape::{ScrapePlan, Scraper};
use crate::sources::{JobsBoard, Source, TenderPortal};
use crate::store::{ListQuery, RecordStore};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
const DEFAULT_SEARCH_LIMIT: u32 = 10;
const MAX_SCRAPE_PAGES: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the database could not be reached at startup.
    pub store: Option<Arc<dyn RecordStore>>,
    /// Absent together with the store; scrape triggers then answer 503.
    pub scraper: Option<Scraper>,
    pub tenders: Arc<TenderPortal>,
    pub jobs: Arc<JobsBoard>,
    /// Shared with the scheduler so manual and scheduled runs never overlap.
    pub guard: RunGuard,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tenders", get(list_tenders))
        .route("/api/tenders/:id", get(get_tender))
        .route("/api/stats", get(tender_stats))
        .route("/api/search", get(search_tenders))
        .route("/api/scrape", post(scrape_tenders))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/stats", get(job_stats))
        .route("/api/jobs/scrape", post(scrape_jobs))
        .route("/api/jobs/:id", get(get_job))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    limit: u32,
    total: u64,
    total_pages: u64,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    organisation: Option<String>,
    company: Option<String>,
    location: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

impl ListParams {
    fn into_query(self, page: u32, limit: u32) -> Result<ListQuery, String> {
        let since = match self.start_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                parse_bound(raw, false).ok_or_else(|| format!("invalid startDate: {raw}"))?,
            ),
        };
        let until = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                parse_bound(raw, true).ok_or_else(|| format!("invalid endDate: {raw}"))?,
            ),
        };
        let descending = match self.sort_order.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(order) if order.eq_ignore_ascii_case("desc") => true,
            Some(order) if order.eq_ignore_ascii_case("asc") => false,
            Some(order) => return Err(format!("invalid sortOrder: {order} (expected asc or desc)")),
        };

        Ok(ListQuery {
            page,
            limit,
            search: self.search,
            organisation: self.organisation,
            company: self.company,
            location: self.location,
            since,
            until,
            sort_by: self.sort_by,
            descending,
        })
    }
}

/// Bare `YYYY-MM-DD` bounds cover the whole day; anything else goes
/// through the date normaliser.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?
        } else {
            NaiveTime::MIN
        };
        return Some(day.and_time(time).and_utc());
    }
    dates::normalize(raw)
}

fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    extracted
        .map(|Query(params)| params)
        .map_err(|rejection| failure(StatusCode::BAD_REQUEST, &rejection.body_text()))
}

fn path_id(extracted: Result<Path<i64>, PathRejection>) -> Result<i64, Response> {
    extracted
        .map(|Path(id)| id)
        .map_err(|rejection| failure(StatusCode::BAD_REQUEST, &rejection.body_text()))
}

fn unavailable_list(page: u32, limit: u32) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "success": false,
            "error": "service unavailable",
            "data": [],
            "pagination": Pagination::new(page, limit, 0),
        })),
    )
        .into_response()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "success": false, "error": "service unavailable", "data": null })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = match &state.store {
        Some(store) => match store.ping().await {
            Ok(()) => "connected",
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "database ping failed");
                "disconnected"
            }
        },
        None => "disconnected",
    };
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
    }))
}

async fn list_tenders(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    match query(params) {
        Ok(params) => list_records(&state, RecordKind::Tender, params).await,
        Err(response) => response,
    }
}

async fn list_jobs(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    match query(params) {
        Ok(params) => list_records(&state, RecordKind::Job, params).await,
        Err(response) => response,
    }
}

async fn list_records(state: &AppState, kind: RecordKind, params: ListParams) -> Response {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let query = match params.into_query(page, limit) {
        Ok(query) => query,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };

    let Some(store) = &state.store else {
        return unavailable_list(page, limit);
    };
    match store.list(kind, &query).await {
        Ok(listing) => Json(json!({
            "success": true,
            "data": listing.records,
            "pagination": Pagination::new(page, limit, listing.total),
        }))
        .into_response(),
        Err(err) => {
            tracing::error!(kind = kind.as_str(), error = %format!("{err:#}"), "list failed");
            unavailable_list(page, limit)
        }
    }
}

async fn get_tender(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    match path_id(id) {
        Ok(id) => get_record(&state, RecordKind::Tender, id).await,
        Err(response) => response,
    }
}

async fn get_job(State(state): State<AppState>, id: Result<Path<i64>, PathRejection>) -> Response {
    match path_id(id) {
        Ok(id) => get_record(&state, RecordKind::Job, id).await,
        Err(response) => response,
    }
}

async fn get_record(state: &AppState, kind: RecordKind, id: i64) -> Response {
    let Some(store) = &state.store else {
        return unavailable();
    };
    match store.get(kind, id).await {
        Ok(Some(record)) => Json(json!({ "success": true, "data": record })).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, &format!("{} not found", kind.as_str())),
        Err(err) => {
            tracing::error!(kind = kind.as_str(), id, error = %format!("{err:#}"), "get failed");
            unavailable()
        }
    }
}

async fn tender_stats(State(state): State<AppState>) -> Response {
    record_stats(&state, RecordKind::Tender).await
}

async fn job_stats(State(state): State<AppState>) -> Response {
    record_stats(&state, RecordKind::Job).await
}

async fn record_stats(state: &AppState, kind: RecordKind) -> Response {
    let Some(store) = &state.store else {
        return unavailable();
    };
    let stats = match store.stats(kind, Utc::now().date_naive()).await {
        Ok(stats) => stats,
        Err(err) => {
            tracing::error!(kind = kind.as_str(), error = %format!("{err:#}"), "stats failed");
            return unavailable();
        }
    };
    let data = match kind {
        RecordKind::Tender => json!({
            "totalTenders": stats.total,
            "todayTenders": stats.today,
            "topOrganisations": stats.top,
        }),
        RecordKind::Job => json!({
            "totalJobs": stats.total,
            "todayJobs": stats.today,
            "topCompanies": stats.top,
        }),
    };
    Json(json!({ "success": true, "data": data })).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<u32>,
}

async fn search_tenders(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    let params = match query(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "search query is required");
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_LIMIT);

    let Some(store) = &state.store else {
        return unavailable_list(1, limit);
    };
    let query = ListQuery {
        limit,
        search: Some(q),
        ..ListQuery::default()
    };
    match store.list(RecordKind::Tender, &query).await {
        Ok(listing) => Json(json!({
            "success": true,
            "count": listing.records.len(),
            "data": listing.records,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "search failed");
            unavailable_list(1, limit)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeParams {
    max_pages: Option<u32>,
    start_page: Option<u32>,
    location: Option<String>,
}

impl ScrapeParams {
    fn plan(&self, source: &dyn Source) -> Result<ScrapePlan, String> {
        let max_pages = self.max_pages.unwrap_or(source.default_max_pages());
        if !(1..=MAX_SCRAPE_PAGES).contains(&max_pages) {
            return Err(format!("maxPages must be between 1 and {MAX_SCRAPE_PAGES}"));
        }
        let start_page = self.start_page.unwrap_or(1);
        if !(1..=max_pages).contains(&start_page) {
            return Err("startPage must be between 1 and maxPages".to_string());
        }
        Ok(ScrapePlan {
            max_pages,
            start_page,
        })
    }
}

async fn scrape_tenders(
    State(state): State<AppState>,
    params: Result<Query<ScrapeParams>, QueryRejection>,
) -> Response {
    let params = match query(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    let plan = match params.plan(state.tenders.as_ref()) {
        Ok(plan) => plan,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    run_scrape(&state, state.tenders.as_ref(), plan).await
}

async fn scrape_jobs(
    State(state): State<AppState>,
    params: Result<Query<ScrapeParams>, QueryRejection>,
) -> Response {
    let params = match query(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    let board = match params.location.as_deref() {
        Some(location) => match state.jobs.with_location(location) {
            Ok(board) => board,
            Err(err) => return failure(StatusCode::BAD_REQUEST, &format!("{err:#}")),
        },
        None => state.jobs.as_ref().clone(),
    };
    // Jobs have no start page; the board is always read from its first page.
    let params = ScrapeParams {
        start_page: None,
        ..params
    };
    let plan = match params.plan(&board) {
        Ok(plan) => plan,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    tracing::info!(location = board.location(), "jobs board location");
    run_scrape(&state, &board, plan).await
}

async fn run_scrape(state: &AppState, source: &dyn Source, plan: ScrapePlan) -> Response {
    let Some(scraper) = &state.scraper else {
        return unavailable();
    };
    let Some(_permit) = state.guard.try_begin() else {
        tracing::warn!(
            source = source.kind().as_str(),
            "manual scrape rejected; a run is in flight"
        );
        return failure(StatusCode::CONFLICT, "a scrape is already running");
    };

    tracing::info!(source = source.kind().as_str(), ?plan, "manual scrape requested");
    match scraper.scrape(source, plan).await {
        Ok(result) => Json(json!({
            "success": true,
            "message": "Scraping completed",
            "data": result,
        }))
        .into_response(),
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(
                source = source.kind().as_str(),
                error = %message,
                "manual scrape failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "failed to scrape", "message": message })),
            )
                .into_response()
        }
    }
}

async fn not_found(method: Method, uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "route not found",
            "message": format!("cannot {method} {uri}"),
        })),
    )
        .into_response()
}
