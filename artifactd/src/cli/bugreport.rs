use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};
use server::config::{CATALOG_VAR, DATA_DIR_VAR, LOCK_TIMEOUT_VAR, PORT_VAR, STORAGE_DIR_VAR};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            CATALOG_VAR,
            DATA_DIR_VAR,
            STORAGE_DIR_VAR,
            PORT_VAR,
            LOCK_TIMEOUT_VAR,
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
