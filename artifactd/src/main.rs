use std::process::ExitCode;

use clap::{arg, command, crate_name, value_parser, ArgMatches, Command};
use client::ReportLocation;
use kernel::ReportKind;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(location_args(
            Command::new(cli::URL_SUBCOMMAND).about(cli::URL_DESCRIPTION),
        ))
        .subcommand(
            location_args(Command::new(cli::GET_SUBCOMMAND).about(cli::GET_DESCRIPTION))
                .arg(arg!(-t --token <TOKEN>).help("Bearer token granting access to the report"))
                .arg(
                    arg!(-o --output <FILE>)
                        .help("Where to save the file. The last path segment by default"),
                ),
        )
        .subcommand(
            Command::new(cli::CATALOG_SUBCOMMAND)
                .about(cli::CATALOG_DESCRIPTION)
                .arg(arg!(--db <FILE>).help("Catalog file. ARTIFACTD_CATALOG by default"))
                .subcommand_required(true)
                .subcommand(Command::new(cli::INIT_SUBCOMMAND).about(cli::INIT_DESCRIPTION))
                .subcommand(
                    Command::new(cli::BUILD_SUBCOMMAND)
                        .about(cli::BUILD_DESCRIPTION)
                        .arg(arg!(-p --project <PROJECT>).required(true).help("Project name"))
                        .arg(
                            arg!(-b --build <NUMBER>)
                                .required(true)
                                .value_parser(value_parser!(u64))
                                .help("Build number"),
                        ),
                )
                .subcommand(
                    Command::new(cli::GRANT_SUBCOMMAND)
                        .about(cli::GRANT_DESCRIPTION)
                        .arg(arg!(-p --project <PROJECT>).required(true).help("Project name"))
                        .arg(
                            arg!(-s --subject <SUBJECT>)
                                .required(true)
                                .help("Bearer token or 'anonymous'"),
                        )
                        .arg(
                            arg!(-r --report <REPORT>)
                                .required(true)
                                .help("Report name or '*' for every report"),
                        ),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => cli::version::run(),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, _)) => {
            if let Err(e) = cli::server::run().await {
                eprintln!("server error: {e}");
                return ExitCode::FAILURE;
            }
        }
        Some((cli::URL_SUBCOMMAND, matches)) => {
            let location = location_from(matches);
            if let Err(e) = cli::client::print_url(string(matches, "uri"), &location) {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
        Some((cli::GET_SUBCOMMAND, matches)) => {
            let location = location_from(matches);
            let result = cli::client::download(
                string(matches, "uri"),
                &location,
                matches.get_one::<String>("token"),
                matches.get_one::<String>("output"),
            )
            .await;
            if let Err(e) = result {
                eprintln!("download error: {e}");
                return ExitCode::FAILURE;
            }
        }
        Some((cli::CATALOG_SUBCOMMAND, matches)) => return catalog(matches),
        _ => {}
    }
    ExitCode::SUCCESS
}

fn catalog(matches: &ArgMatches) -> ExitCode {
    let db = cli::catalog::catalog_path(matches.get_one::<String>("db"));
    let result = match matches.subcommand() {
        Some((cli::INIT_SUBCOMMAND, _)) => cli::catalog::init(&db).map(|()| true),
        Some((cli::BUILD_SUBCOMMAND, m)) => cli::catalog::build(
            &db,
            string(m, "project"),
            m.get_one::<u64>("build").copied().unwrap_or_default(),
        )
        .map(|()| true),
        Some((cli::GRANT_SUBCOMMAND, m)) => cli::catalog::grant(
            &db,
            string(m, "project"),
            string(m, "subject"),
            string(m, "report"),
        ),
        _ => Ok(true),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("catalog error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn location_args(cmd: Command) -> Command {
    cmd.arg(arg!(-u --uri <URI>).required(true).help("Artifactd URI"))
        .arg(
            arg!(-k --kind <KIND>)
                .value_parser(cli::REPORT_KINDS)
                .default_value(ReportKind::Html.as_str())
                .help("Report kind"),
        )
        .arg(arg!(-p --project <PROJECT>).required(true).help("Project name"))
        .arg(
            arg!(-b --build <NUMBER>)
                .required(true)
                .value_parser(value_parser!(u64))
                .help("Build number"),
        )
        .arg(arg!(-r --report <REPORT>).required(true).help("Report name"))
        .arg(arg!(<PATH>).help("File path inside the report"))
}

fn location_from(matches: &ArgMatches) -> ReportLocation {
    ReportLocation {
        kind: string(matches, "kind").parse().unwrap_or(ReportKind::Html),
        project: string(matches, "project").to_owned(),
        build: matches.get_one::<u64>("build").copied().unwrap_or_default(),
        report: string(matches, "report").to_owned(),
        path: string(matches, "PATH").to_owned(),
    }
}

/// Value of a required or defaulted argument; clap rejects the command line
/// before we get here when it is missing.
fn string<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches.get_one::<String>(id).map_or("", String::as_str)
}
