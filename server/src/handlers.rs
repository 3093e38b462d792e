#![allow(clippy::unused_async)]
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::Requester;
use crate::error::ServeError;
use crate::file_reply::FileReply;
use crate::service::ReportRequest;
use crate::AppState;

const SEP: char = '/';

/// Path parameters of a report file request.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct ReportParams {
    /// Report kind: `html` or `coverage`
    kind: String,
    /// Project name
    project: String,
    /// Build number inside the project
    build: String,
    /// Report name
    report: String,
    /// File path inside the report directory
    path: Option<String>,
}

impl From<ReportParams> for ReportRequest {
    fn from(params: ReportParams) -> Self {
        let path = params
            .path
            .as_deref()
            .map(|p| p.strip_prefix(SEP).unwrap_or(p))
            .map(|p| p.split(SEP).map(str::to_owned).collect())
            .unwrap_or_default();
        Self {
            kind: params.kind,
            project: params.project,
            build: params.build,
            report: params.report,
            path,
        }
    }
}

/// Streams a single file of a build report
#[utoipa::path(
    get,
    path = "/api/reports/{kind}/{project}/{build}/{report}/{path}",
    responses(
        (status = 200, response = FileReply),
        (status = 400, description = "Missing or malformed parameter", body = String),
        (status = 401, description = "Report requires a bearer token", body = String),
        (status = 403, description = "Access to report denied", body = String),
        (status = 404, description = "Project, build or file not found", body = String),
        (status = 503, description = "Report is being rewritten by its producer", body = String),
    ),
    tag = "reports",
    params(ReportParams),
)]
pub async fn get_report_file(
    Path(params): Path<ReportParams>,
    State(service): State<AppState>,
    headers: HeaderMap,
) -> Result<FileReply, ServeError> {
    let requester = Requester::from_headers(&headers);
    service.open(requester, params.into()).await
}
