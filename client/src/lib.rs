use futures::StreamExt;
use kernel::ReportKind;
use reqwest::{Client, StatusCode};
use resource::Resource;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub mod resource;

const REPORTS_API: &str = "api/reports";
const SEP: char = '/';

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server uri '{0}'")]
    InvalidUri(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("server responded {0}: {1}")]
    Status(StatusCode, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coordinates of a single file inside a build report.
#[derive(Debug, Clone)]
pub struct ReportLocation {
    pub kind: ReportKind,
    pub project: String,
    pub build: u64,
    pub report: String,
    /// Slash separated path inside the report
    pub path: String,
}

impl ReportLocation {
    /// Address of the file on the server at `base`.
    #[must_use]
    pub fn url(&self, base: &str) -> Option<Resource> {
        report_url(
            base,
            self.kind,
            &self.project,
            self.build,
            &self.report,
            &self.path,
        )
    }
}

/// Builds the download address of a report file. Every part is encoded as a
/// separate path segment, so names with reserved characters survive.
#[must_use]
pub fn report_url(
    base: &str,
    kind: ReportKind,
    project: &str,
    build: u64,
    report: &str,
    path: &str,
) -> Option<Resource> {
    let mut resource = Resource::new(base)?;
    resource
        .append_path(REPORTS_API)
        .append_segment(kind.as_str())
        .append_segment(project)
        .append_segment(&build.to_string())
        .append_segment(report);
    for segment in path.split(SEP).filter(|s| !s.is_empty()) {
        resource.append_segment(segment);
    }
    Some(resource)
}

/// Downloads `resource` into `out` and returns the number of bytes written.
///
/// # Errors
///
/// Fails on transport errors, non success statuses (the server message is kept)
/// and write errors.
pub async fn download_file<W>(
    resource: &Resource,
    token: Option<&str>,
    out: &mut W,
) -> Result<u64, ClientError>
where
    W: AsyncWrite + Unpin,
{
    let client = Client::new();
    let mut request = client.get(resource.as_str());
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Status(status, message));
    }

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}
