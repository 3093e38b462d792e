//! Report file access: parameter validation, catalog lookup, authorization,
//! path resolution and locked streaming, in that order.

use std::sync::Arc;
use std::time::Duration;

use kernel::{Build, Project, ReportId, ReportKind};

use crate::domain::{AccessGate, BuildStorage, Catalog, Requester};
use crate::error::ServeError;
use crate::file_reply::FileReply;
use crate::lock::{LockCoordinator, LockKey};
use crate::resolver::{self, is_valid_report_name, relative_path};

/// Raw request parameters, exactly as they arrived.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub kind: String,
    pub project: String,
    pub build: String,
    pub report: String,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidRequest {
    kind: ReportKind,
    project: String,
    build_number: u64,
    report: String,
    relative: String,
}

impl ReportRequest {
    fn validate(self) -> Result<ValidRequest, ServeError> {
        let kind = self
            .kind
            .parse::<ReportKind>()
            .map_err(|e| ServeError::BadRequest(e.to_string()))?;

        if self.project.trim().is_empty() {
            return Err(bad_request("project name has to be specified"));
        }

        let build_number = self
            .build
            .trim()
            .parse::<u64>()
            .map_err(|_| {
                bad_request("build number has to be specified as a non negative integer")
            })?;

        if self.report.trim().is_empty() {
            return Err(bad_request("report name has to be specified"));
        }
        if !is_valid_report_name(&self.report) {
            return Err(bad_request("report name is invalid"));
        }

        let first_given = self.path.first().is_some_and(|s| !s.trim().is_empty());
        let relative = relative_path(&self.path)
            .filter(|_| first_given)
            .ok_or_else(|| bad_request("report path has to be specified"))?;

        Ok(ValidRequest {
            kind,
            project: self.project,
            build_number,
            report: self.report,
            relative,
        })
    }
}

fn bad_request(message: &str) -> ServeError {
    ServeError::BadRequest(message.to_owned())
}

/// Serves report files produced by CI builds.
pub struct ReportService<C, G, S> {
    catalog: Arc<C>,
    gate: Arc<G>,
    storage: S,
    locks: Arc<LockCoordinator>,
    lock_timeout: Option<Duration>,
}

impl<C, G, S> ReportService<C, G, S>
where
    C: Catalog,
    G: AccessGate,
    S: BuildStorage,
{
    /// `locks` is shared with whatever produces reports in this process.
    pub fn new(
        catalog: Arc<C>,
        gate: Arc<G>,
        storage: S,
        locks: Arc<LockCoordinator>,
        lock_timeout: Option<Duration>,
    ) -> Self {
        Self {
            catalog,
            gate,
            storage,
            locks,
            lock_timeout,
        }
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<LockCoordinator> {
        &self.locks
    }

    /// Opens a report file for streaming.
    ///
    /// Nothing is read from storage before the access gate said yes, and the
    /// returned reply keeps the report's shared lock until its body is done.
    ///
    /// # Errors
    ///
    /// See [`ServeError`] for the mapping of each failure.
    pub async fn open(
        &self,
        requester: Requester,
        request: ReportRequest,
    ) -> Result<FileReply, ServeError> {
        let request = request.validate()?;

        let (project, build) = self.authorize(requester, &request).await?;

        let id = ReportId {
            project_id: project.id,
            build_number: build.number,
            report_name: request.report,
            kind: request.kind,
        };
        let root = resolver::report_root(&self.storage, &id);
        let resolved = resolver::resolve(&root, &request.relative).await?;

        let key = LockKey::new(build.id, id.kind);
        let guard = self.locks.acquire_shared_within(key, self.lock_timeout).await?;
        tracing::info!(
            "serving {}/{}/{}/{} '{}'",
            id.kind,
            project.name,
            id.build_number,
            id.report_name,
            request.relative
        );
        FileReply::open(resolved, guard).await
    }

    async fn authorize(
        &self,
        requester: Requester,
        request: &ValidRequest,
    ) -> Result<(Project, Build), ServeError> {
        let catalog = Arc::clone(&self.catalog);
        let gate = Arc::clone(&self.gate);
        let project_name = request.project.clone();
        let build_number = request.build_number;
        let report = request.report.clone();

        tokio::task::spawn_blocking(move || {
            let project = catalog
                .find_project(&project_name)
                .map_err(ServeError::internal)?
                .ok_or_else(|| {
                    ServeError::NotFound(format!("unable to find project: {project_name}"))
                })?;

            let build = catalog
                .find_build(&project, build_number)
                .map_err(ServeError::internal)?
                .ok_or_else(|| {
                    ServeError::NotFound(format!(
                        "unable to find build (project: {}, build number: {build_number})",
                        project.name
                    ))
                })?;

            let allowed = gate
                .can_access_report(&requester, &build, &report)
                .map_err(ServeError::internal)?;
            if !allowed {
                let who = match requester {
                    Requester::Anonymous => "anonymous requester",
                    Requester::Token(_) => "token holder",
                };
                tracing::info!(
                    "access to report '{report}' of {}#{build_number} denied for {who}",
                    project.name
                );
                return Err(match requester {
                    Requester::Anonymous => ServeError::Unauthorized,
                    Requester::Token(_) => ServeError::Forbidden,
                });
            }
            Ok((project, build))
        })
        .await
        .map_err(ServeError::internal)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use rstest::rstest;
    use std::fmt;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Never;

    impl fmt::Display for Never {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("never")
        }
    }

    #[derive(Default)]
    struct StaticCatalog {
        lookups: AtomicUsize,
    }

    impl Catalog for StaticCatalog {
        type Err = Never;

        fn find_project(&self, name: &str) -> Result<Option<Project>, Never> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok((name == "demo").then(|| Project {
                id: 1,
                name: name.to_owned(),
            }))
        }

        fn find_build(&self, project: &Project, number: u64) -> Result<Option<Build>, Never> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok((number == 42).then(|| Build {
                id: 4200,
                project_id: project.id,
                number,
            }))
        }
    }

    struct Gate {
        allow: bool,
    }

    impl AccessGate for Gate {
        type Err = Never;

        fn can_access_report(&self, _: &Requester, _: &Build, _: &str) -> Result<bool, Never> {
            Ok(self.allow)
        }
    }

    /// Counts every time the service asks where a build lives.
    struct CountingStorage {
        root: PathBuf,
        calls: Arc<AtomicUsize>,
    }

    impl BuildStorage for CountingStorage {
        fn build_dir(&self, project_id: i64, build_number: u64) -> PathBuf {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.root
                .join(project_id.to_string())
                .join(build_number.to_string())
        }
    }

    struct Harness {
        dir: TempDir,
        service: ReportService<StaticCatalog, Gate, CountingStorage>,
        catalog: Arc<StaticCatalog>,
        storage_calls: Arc<AtomicUsize>,
        report_dir: PathBuf,
    }

    fn harness(allow: bool, lock_timeout: Option<Duration>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage_root = dir.path().join("storage");
        let report_dir = storage_root
            .join("1")
            .join("42")
            .join(ReportKind::Coverage.dir())
            .join("coverage");
        std::fs::create_dir_all(report_dir.join("css")).unwrap();
        std::fs::write(report_dir.join("index.html"), b"<html>42</html>").unwrap();
        std::fs::write(report_dir.join("css").join("site.css"), b"body {}").unwrap();
        std::fs::write(dir.path().join("passwd"), b"root:x:0:0").unwrap();

        let catalog = Arc::new(StaticCatalog::default());
        let storage_calls = Arc::new(AtomicUsize::new(0));
        let storage = CountingStorage {
            root: storage_root,
            calls: Arc::clone(&storage_calls),
        };
        let service = ReportService::new(
            Arc::clone(&catalog),
            Arc::new(Gate { allow }),
            storage,
            Arc::new(LockCoordinator::new()),
            lock_timeout,
        );
        Harness {
            dir,
            service,
            catalog,
            storage_calls,
            report_dir,
        }
    }

    fn request(report: &str, build: &str, path: &[&str]) -> ReportRequest {
        ReportRequest {
            kind: String::from("coverage"),
            project: String::from("demo"),
            build: build.to_owned(),
            report: report.to_owned(),
            path: path.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    async fn body_of(reply: FileReply) -> Vec<u8> {
        let res = reply.into_response();
        axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn serves_existing_file() {
        // Arrange
        let h = harness(true, None);

        // Act
        let reply = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", &["index.html"]))
            .await
            .unwrap();

        // Assert
        assert_eq!(body_of(reply).await, b"<html>42</html>");
    }

    #[tokio::test]
    async fn serves_nested_file_with_blank_segments() {
        // Arrange
        let h = harness(true, None);

        // Act
        let reply = h
            .service
            .open(
                Requester::Anonymous,
                request("coverage", "42", &["css", "", " ", "site.css"]),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(body_of(reply).await, b"body {}");
    }

    #[rstest]
    #[case("html", "demo", "42", "coverage", &["index.html"], true)]
    #[case("junit", "demo", "42", "coverage", &["index.html"], false)]
    #[case("coverage", " ", "42", "coverage", &["index.html"], false)]
    #[case("coverage", "demo", "", "coverage", &["index.html"], false)]
    #[case("coverage", "demo", "-1", "coverage", &["index.html"], false)]
    #[case("coverage", "demo", "forty-two", "coverage", &["index.html"], false)]
    #[case("coverage", "demo", "42", "", &["index.html"], false)]
    #[case("coverage", "demo", "42", "   ", &["index.html"], false)]
    #[case("coverage", "demo", "42", "..", &["index.html"], false)]
    #[case("coverage", "demo", "42", "a/b", &["index.html"], false)]
    #[case("coverage", "demo", "42", "coverage", &[], false)]
    #[case("coverage", "demo", "42", "coverage", &["", "index.html"], false)]
    #[trace]
    fn validation(
        #[case] kind: &str,
        #[case] project: &str,
        #[case] build: &str,
        #[case] report: &str,
        #[case] path: &[&str],
        #[case] valid: bool,
    ) {
        // Arrange
        let mut r = request(report, build, path);
        r.kind = kind.to_owned();
        r.project = project.to_owned();

        // Act
        let result = r.validate();

        // Assert
        assert_eq!(result.is_ok(), valid);
        if let Err(e) = result {
            assert!(matches!(e, ServeError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn blank_report_rejected_before_any_lookup() {
        // Arrange
        let h = harness(true, None);

        // Act
        let result = h
            .service
            .open(Requester::Anonymous, request(" ", "42", &["index.html"]))
            .await;

        // Assert
        assert!(matches!(result, Err(ServeError::BadRequest(_))));
        assert_eq!(h.catalog.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(h.storage_calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case("demo", "99")]
    #[case("nope", "42")]
    #[trace]
    #[tokio::test]
    async fn unknown_project_or_build(#[case] project: &str, #[case] build: &str) {
        // Arrange
        let h = harness(true, None);
        let mut r = request("coverage", build, &["index.html"]);
        r.project = project.to_owned();

        // Act
        let result = h.service.open(Requester::Anonymous, r).await;

        // Assert
        assert!(matches!(result, Err(ServeError::NotFound(_))));
        assert_eq!(h.storage_calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case(Requester::Anonymous, StatusCode::UNAUTHORIZED)]
    #[case(Requester::Token(String::from("t")), StatusCode::FORBIDDEN)]
    #[trace]
    #[tokio::test]
    async fn denied_gate_touches_no_storage(
        #[case] requester: Requester,
        #[case] expected: StatusCode,
    ) {
        // Arrange
        let h = harness(false, None);

        // Act
        let result = h
            .service
            .open(requester, request("coverage", "42", &["index.html"]))
            .await;

        // Assert
        let Err(e) = result else {
            panic!("access was granted");
        };
        assert_eq!(e.status(), expected);
        assert_eq!(h.storage_calls.load(Ordering::SeqCst), 0);
        assert!(h.service.locks().is_empty());
    }

    #[rstest]
    #[case(&["..", "..", "..", "..", "passwd"])]
    #[case(&["..", "..", "..", "etc", "passwd"])]
    #[case(&["../../../../passwd"])]
    #[case(&["css", "..", "..", "..", "..", "..", "passwd"])]
    #[trace]
    #[tokio::test]
    async fn traversal_is_rejected_without_locking(#[case] path: &[&str]) {
        // Arrange
        let h = harness(true, None);

        // Act
        let result = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", path))
            .await;

        // Assert
        assert!(matches!(result, Err(ServeError::NotFound(_))));
        assert!(h.service.locks().is_empty());
    }

    #[tokio::test]
    async fn directory_is_not_found() {
        // Arrange
        let h = harness(true, None);

        // Act
        let result = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", &["css"]))
            .await;

        // Assert
        assert!(matches!(result, Err(ServeError::NotFound(_))));
    }

    #[tokio::test]
    async fn reader_waits_for_writer_and_sees_final_content() {
        // Arrange
        let h = harness(true, None);
        let key = LockKey::new(4200, ReportKind::Coverage);
        let writer = h.service.locks().acquire_exclusive(key).await;
        std::fs::write(h.report_dir.join("index.html"), b"<html>partial").unwrap();

        // Act
        let pending = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", &["index.html"]));
        tokio::pin!(pending);
        let early = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        std::fs::write(h.report_dir.join("index.html"), b"<html>final</html>").unwrap();
        drop(writer);
        let reply = pending.await.unwrap();

        // Assert
        assert!(early.is_err());
        assert_eq!(body_of(reply).await, b"<html>final</html>");
    }

    #[tokio::test]
    async fn writer_deleting_file_yields_not_found() {
        // Arrange
        let h = harness(true, None);
        let key = LockKey::new(4200, ReportKind::Coverage);
        let writer = h.service.locks().acquire_exclusive(key).await;

        // Act
        let pending = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", &["index.html"]));
        tokio::pin!(pending);
        let early = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        std::fs::remove_file(h.report_dir.join("index.html")).unwrap();
        drop(writer);
        let result = pending.await;

        // Assert
        assert!(early.is_err());
        assert!(matches!(result, Err(ServeError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writer_swapping_directory_for_outside_symlink_yields_not_found() {
        // Arrange
        let h = harness(true, None);
        let outside = h.dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("site.css"), b"outside the report").unwrap();
        let key = LockKey::new(4200, ReportKind::Coverage);
        let writer = h.service.locks().acquire_exclusive(key).await;

        // Act
        let pending = h.service.open(
            Requester::Anonymous,
            request("coverage", "42", &["css", "site.css"]),
        );
        tokio::pin!(pending);
        let early = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        std::fs::remove_dir_all(h.report_dir.join("css")).unwrap();
        std::os::unix::fs::symlink(&outside, h.report_dir.join("css")).unwrap();
        drop(writer);
        let result = pending.await;

        // Assert
        assert!(early.is_err());
        assert!(matches!(result, Err(ServeError::NotFound(_))));
    }

    #[tokio::test]
    async fn lock_wait_times_out() {
        // Arrange
        let h = harness(true, Some(Duration::from_millis(20)));
        let key = LockKey::new(4200, ReportKind::Coverage);
        let _writer = h.service.locks().acquire_exclusive(key).await;

        // Act
        let result = h
            .service
            .open(Requester::Anonymous, request("coverage", "42", &["index.html"]))
            .await;

        // Assert
        assert!(matches!(result, Err(ServeError::LockTimeout)));
    }

    #[tokio::test]
    async fn other_kind_is_not_blocked() {
        // Arrange
        let h = harness(true, None);
        let build_dir = h.report_dir.parent().unwrap().parent().unwrap();
        let html_dir = build_dir.join(ReportKind::Html.dir()).join("site");
        std::fs::create_dir_all(&html_dir).unwrap();
        std::fs::write(html_dir.join("index.html"), b"site").unwrap();
        let _writer = h
            .service
            .locks()
            .acquire_exclusive(LockKey::new(4200, ReportKind::Coverage))
            .await;
        let mut r = request("site", "42", &["index.html"]);
        r.kind = String::from("html");

        // Act
        let reply = tokio::time::timeout(
            Duration::from_secs(5),
            h.service.open(Requester::Anonymous, r),
        )
        .await
        .unwrap()
        .unwrap();

        // Assert
        assert_eq!(body_of(reply).await, b"site");
    }
}
