#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a project registered in the build catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Unique numeric identifier for the project
    pub id: i64,
    /// Unique human readable project name
    pub name: String,
}

/// Represents a single build of a project.
///
/// Build numbers are only unique within their project, whereas `id`
/// is unique across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Catalog-wide unique build identifier
    pub id: i64,
    /// Identifier of the project the build belongs to
    pub project_id: i64,
    /// Build number inside the project
    pub number: u64,
}

/// Category of build output.
///
/// Every kind lives in its own directory under the build storage root,
/// so producers of one kind never contend with readers of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Published HTML reports (test reports, documentation sites and so on)
    Html,
    /// Code coverage reports
    Coverage,
}

impl ReportKind {
    /// Token used for the kind in request URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ReportKind::Html => "html",
            ReportKind::Coverage => "coverage",
        }
    }

    /// Directory name of the kind under the build storage root.
    #[must_use]
    pub const fn dir(self) -> &'static str {
        match self {
            ReportKind::Html => "html-reports",
            ReportKind::Coverage => "coverage-reports",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownReportKind(pub String);

impl fmt::Display for UnknownReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown report kind: {}", self.0)
    }
}

impl std::error::Error for UnknownReportKind {}

impl FromStr for ReportKind {
    type Err = UnknownReportKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(ReportKind::Html),
            "coverage" => Ok(ReportKind::Coverage),
            other => Err(UnknownReportKind(other.to_owned())),
        }
    }
}

/// Identifies one report of one build.
///
/// Built once per request from validated parameters and catalog lookups
/// and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportId {
    pub project_id: i64,
    pub build_number: u64,
    pub report_name: String,
    pub kind: ReportKind,
}
