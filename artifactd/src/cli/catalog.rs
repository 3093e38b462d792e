use std::path::{Path, PathBuf};

use server::config::Config;
use server::error::StartupError;
use server::sqlite::{Mode, Sqlite};

/// Catalog file given on the command line or the configured one.
pub fn catalog_path(db: Option<&String>) -> PathBuf {
    db.map_or_else(|| Config::from_env().catalog, PathBuf::from)
}

pub fn init(db: &Path) -> Result<(), StartupError> {
    server::init_catalog(db)?;
    println!("catalog {} ready", db.display());
    Ok(())
}

pub fn build(db: &Path, project: &str, number: u64) -> Result<(), StartupError> {
    server::init_catalog(db)?;
    let mut sqlite = Sqlite::open(db, Mode::ReadWrite)?;
    let project = match sqlite.find_project(project)? {
        Some(p) => p,
        None => sqlite.insert_project(project)?,
    };
    if sqlite.find_build(&project, number)?.is_some() {
        println!("build {number} of {} already registered", project.name);
        return Ok(());
    }
    let build = sqlite.insert_build(&project, number)?;
    println!(
        "build {} of {} registered. Id: {}",
        build.number, project.name, build.id
    );
    Ok(())
}

pub fn grant(db: &Path, project: &str, subject: &str, report: &str) -> Result<bool, StartupError> {
    let mut sqlite = Sqlite::open(db, Mode::ReadWrite)?;
    let Some(project) = sqlite.find_project(project)? else {
        eprintln!("no such project {project}");
        return Ok(false);
    };
    sqlite.grant_access(&project, subject, report)?;
    println!("report {report} of {} granted", project.name);
    Ok(true)
}
