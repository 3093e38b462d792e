use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use kernel::{Build, Project};
use rusqlite::{params, Connection, Error, OpenFlags, OptionalExtension};

use crate::domain::{AccessGate, Catalog, Requester};

const CACHE_SIZE: &str = "4096";

/// Subject used for grants that apply to requests without a token.
pub const ANONYMOUS: &str = "anonymous";

/// Report name of grants covering every report of a project.
pub const ALL_REPORTS: &str = "*";

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

/// Connection to the catalog database.
#[derive(Debug)]
pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        };
        Ok(Self { conn: c? })
    }

    pub fn new_database(&self) -> Result<(), Error> {
        self.pragma_update("encoding", "UTF-8")?;

        self.conn.execute(
            "CREATE TABLE project (
                  id    INTEGER PRIMARY KEY AUTOINCREMENT,
                  name  TEXT NOT NULL UNIQUE
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE build (
                  id          INTEGER PRIMARY KEY AUTOINCREMENT,
                  project_id  INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
                  number      INTEGER NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX unique_project_build_ix ON build(project_id, number)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE report_access (
                  project_id  INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
                  subject     TEXT NOT NULL,
                  report      TEXT NOT NULL,
                  PRIMARY KEY (project_id, subject, report)
                  )",
            [],
        )?;

        Ok(())
    }

    pub fn insert_project(&mut self, name: &str) -> Result<Project, Error> {
        self.enable_foreign_keys()?;
        self.conn
            .prepare_cached("INSERT INTO project (name) VALUES (?1)")?
            .execute(params![name])?;
        Ok(Project {
            id: self.conn.last_insert_rowid(),
            name: name.to_owned(),
        })
    }

    pub fn insert_build(&mut self, project: &Project, number: u64) -> Result<Build, Error> {
        self.enable_foreign_keys()?;
        let stored = to_sql_number(number)?;
        self.conn
            .prepare_cached("INSERT INTO build (project_id, number) VALUES (?1, ?2)")?
            .execute(params![project.id, stored])?;
        Ok(Build {
            id: self.conn.last_insert_rowid(),
            project_id: project.id,
            number,
        })
    }

    /// Allows `subject` to read `report` (or every report with [`ALL_REPORTS`])
    /// of the project.
    pub fn grant_access(
        &mut self,
        project: &Project,
        subject: &str,
        report: &str,
    ) -> Result<(), Error> {
        self.enable_foreign_keys()?;
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO report_access (project_id, subject, report)
                 VALUES (?1, ?2, ?3)",
            )?
            .execute(params![project.id, subject, report])?;
        Ok(())
    }

    pub fn find_project(&self, name: &str) -> Result<Option<Project>, Error> {
        self.assign_cache_size()?;
        self.conn
            .prepare_cached("SELECT id, name FROM project WHERE name = ?1")?
            .query_row(params![name], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()
    }

    pub fn find_build(&self, project: &Project, number: u64) -> Result<Option<Build>, Error> {
        let Ok(stored) = to_sql_number(number) else {
            return Ok(None);
        };
        self.conn
            .prepare_cached(
                "SELECT id, project_id FROM build WHERE project_id = ?1 AND number = ?2",
            )?
            .query_row(params![project.id, stored], |row| {
                Ok(Build {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    number,
                })
            })
            .optional()
    }

    pub fn has_access(&self, project_id: i64, subject: &str, report: &str) -> Result<bool, Error> {
        self.conn
            .prepare_cached(
                "SELECT 1 FROM report_access
                 WHERE project_id = ?1 AND subject = ?2 AND (report = ?3 OR report = ?4)",
            )?
            .exists(params![project_id, subject, report, ALL_REPORTS])
    }

    fn enable_foreign_keys(&self) -> Result<(), Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}

fn to_sql_number(number: u64) -> Result<i64, Error> {
    i64::try_from(number).map_err(|e| Error::ToSqlConversionFailure(Box::new(e)))
}

/// Read-only catalog and access gate over a SQLite file.
///
/// One connection is shared by every request task. Lookups run on blocking
/// threads and take turns on it.
#[derive(Debug)]
pub struct SqliteCatalog {
    db: Mutex<Sqlite>,
}

impl SqliteCatalog {
    /// Opens the catalog read-only.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or is not a database.
    pub fn open(db: &Path) -> Result<Self, Error> {
        let sqlite = Sqlite::open(db, Mode::ReadOnly)?;
        Ok(Self {
            db: Mutex::new(sqlite),
        })
    }

    fn execute<F, R>(&self, action: F) -> Result<R, Error>
    where
        F: FnOnce(&Sqlite) -> Result<R, Error>,
    {
        let start = Instant::now();
        // read-only connection, a panicked holder cannot leave it half-written
        let repository = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let res = action(&repository);
        tracing::debug!("DB query time: {:?}", start.elapsed());
        res
    }
}

impl Catalog for SqliteCatalog {
    type Err = Error;

    fn find_project(&self, name: &str) -> Result<Option<Project>, Self::Err> {
        self.execute(|repository| repository.find_project(name))
    }

    fn find_build(&self, project: &Project, number: u64) -> Result<Option<Build>, Self::Err> {
        self.execute(|repository| repository.find_build(project, number))
    }
}

impl AccessGate for SqliteCatalog {
    type Err = Error;

    fn can_access_report(
        &self,
        requester: &Requester,
        build: &Build,
        report: &str,
    ) -> Result<bool, Self::Err> {
        let subject = match requester {
            Requester::Anonymous => ANONYMOUS,
            Requester::Token(token) => token.as_str(),
        };
        self.execute(|repository| {
            if repository.has_access(build.project_id, subject, report)? {
                return Ok(true);
            }
            // whatever anonymous requesters may read, identified ones may read too
            if subject == ANONYMOUS {
                Ok(false)
            } else {
                repository.has_access(build.project_id, ANONYMOUS, report)
            }
        })
    }
}
