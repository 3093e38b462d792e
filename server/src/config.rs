use std::env;
use std::path::PathBuf;
use std::time::Duration;

const CATALOG_FILE: &str = "artifactd.db";
const CURRENT_DIR: &str = "./";
const STORAGE_DIR: &str = "./storage";
const PORT: u16 = 5000;
const LOCK_TIMEOUT_SECS: u64 = 60;

pub const CATALOG_VAR: &str = "ARTIFACTD_CATALOG";
pub const DATA_DIR_VAR: &str = "ARTIFACTD_DATA_DIR";
pub const STORAGE_DIR_VAR: &str = "ARTIFACTD_STORAGE_DIR";
pub const PORT_VAR: &str = "ARTIFACTD_PORT";
pub const LOCK_TIMEOUT_VAR: &str = "ARTIFACTD_LOCK_TIMEOUT_SECS";

/// Service settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Full path of the SQLite catalog file
    pub catalog: PathBuf,
    /// Root of the build storage tree
    pub storage_dir: PathBuf,
    pub port: u16,
    /// Longest wait for a report lock; `None` waits forever
    pub lock_timeout: Option<Duration>,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Unparsable values fall back to defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = lookup(CATALOG_VAR).unwrap_or_else(|| String::from(CATALOG_FILE));
        let dir = lookup(DATA_DIR_VAR).unwrap_or_else(|| String::from(CURRENT_DIR));
        let storage_dir = lookup(STORAGE_DIR_VAR).unwrap_or_else(|| String::from(STORAGE_DIR));

        let port = parse_or(&lookup, PORT_VAR, PORT);
        let lock_timeout = match parse_or(&lookup, LOCK_TIMEOUT_VAR, LOCK_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            catalog: PathBuf::from(dir).join(file),
            storage_dir: PathBuf::from(storage_dir),
            port,
            lock_timeout,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{name} has invalid value '{raw}', using {default}");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        // Act
        let config = Config::from_lookup(lookup_from(&[]));

        // Assert
        assert_eq!(config.catalog, PathBuf::from("./").join("artifactd.db"));
        assert_eq!(config.storage_dir, PathBuf::from("./storage"));
        assert_eq!(config.port, 5000);
        assert_eq!(config.lock_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn overrides() {
        // Arrange
        let lookup = lookup_from(&[
            (CATALOG_VAR, "ci.db"),
            (DATA_DIR_VAR, "/var/lib/artifactd"),
            (STORAGE_DIR_VAR, "/srv/builds"),
            (PORT_VAR, "8080"),
            (LOCK_TIMEOUT_VAR, "5"),
        ]);

        // Act
        let config = Config::from_lookup(lookup);

        // Assert
        assert_eq!(config.catalog, PathBuf::from("/var/lib/artifactd/ci.db"));
        assert_eq!(config.storage_dir, PathBuf::from("/srv/builds"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.lock_timeout, Some(Duration::from_secs(5)));
    }

    #[rstest]
    #[case("0", None)]
    #[case("30", Some(Duration::from_secs(30)))]
    #[case("soon", Some(Duration::from_secs(60)))]
    #[case("-1", Some(Duration::from_secs(60)))]
    #[trace]
    fn lock_timeout(#[case] raw: &str, #[case] expected: Option<Duration>) {
        // Act
        let config = Config::from_lookup(lookup_from(&[(LOCK_TIMEOUT_VAR, raw)]));

        // Assert
        assert_eq!(config.lock_timeout, expected);
    }

    #[test]
    fn invalid_port_falls_back() {
        // Act
        let config = Config::from_lookup(lookup_from(&[(PORT_VAR, "70000")]));

        // Assert
        assert_eq!(config.port, 5000);
    }
}
