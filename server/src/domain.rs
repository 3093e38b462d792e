use std::fmt::{Debug, Display};
use std::path::PathBuf;

use axum::http::{header, HeaderMap};
use kernel::{Build, Project};

/// Project and build metadata lookup.
pub trait Catalog: Send + Sync + 'static {
    type Err: Debug + Display + Send;

    fn find_project(&self, name: &str) -> Result<Option<Project>, Self::Err>;

    fn find_build(&self, project: &Project, number: u64) -> Result<Option<Build>, Self::Err>;
}

/// Authorization oracle consulted before any report file is touched.
pub trait AccessGate: Send + Sync + 'static {
    type Err: Debug + Display + Send;

    fn can_access_report(
        &self,
        requester: &Requester,
        build: &Build,
        report: &str,
    ) -> Result<bool, Self::Err>;
}

/// Location of build output on durable storage.
pub trait BuildStorage: Send + Sync + 'static {
    fn build_dir(&self, project_id: i64, build_number: u64) -> PathBuf;
}

const BEARER: &str = "Bearer";

/// Who is asking for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    Anonymous,
    /// Bearer token presented in the `Authorization` header
    Token(String),
}

impl Requester {
    /// Reads the requester from an `Authorization: Bearer <token>` header.
    ///
    /// The scheme is matched case-insensitively. A missing header, another
    /// scheme or an empty token all count as anonymous.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim_start().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(BEARER))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map_or(Requester::Anonymous, |token| {
                Requester::Token(token.to_owned())
            })
    }
}

/// Builds laid out as `<root>/projects/<project id>/builds/<build number>`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl BuildStorage for LocalStorage {
    fn build_dir(&self, project_id: i64, build_number: u64) -> PathBuf {
        self.root
            .join("projects")
            .join(project_id.to_string())
            .join("builds")
            .join(build_number.to_string())
    }
}
