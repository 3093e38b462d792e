pub mod bugreport;
pub mod catalog;
pub mod client;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the server";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str =
    "Collect information about the system and the environment to attach to a bug report";

pub const URL_SUBCOMMAND: &str = "url";
pub const URL_DESCRIPTION: &str = "Print the download address of a report file";

pub const GET_SUBCOMMAND: &str = "get";
pub const GET_DESCRIPTION: &str = "Download a report file";

pub const CATALOG_SUBCOMMAND: &str = "catalog";
pub const CATALOG_DESCRIPTION: &str = "Manage the projects, builds and access grants catalog";

pub const INIT_SUBCOMMAND: &str = "init";
pub const INIT_DESCRIPTION: &str = "Create an empty catalog unless it exists";

pub const BUILD_SUBCOMMAND: &str = "build";
pub const BUILD_DESCRIPTION: &str = "Register a build, creating its project when needed";

pub const GRANT_SUBCOMMAND: &str = "grant";
pub const GRANT_DESCRIPTION: &str =
    "Allow a bearer token (or anonymous) to read a project's report";

pub const REPORT_KINDS: [&str; 2] = ["html", "coverage"];
