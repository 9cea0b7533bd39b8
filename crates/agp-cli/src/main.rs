//! `agp` binary entry point

use agp_cli::logging::{self, LogFormat};
use agp_cli::{build_cli, run};
use agp_core::{Hooks, PipelineError};
use agp_workspace::GitCli;

const EXIT_ERROR: i32 = 2;

fn main() {
    let matches = build_cli().get_matches();
    let format = matches
        .subcommand()
        .and_then(|(_, args)| args.get_one::<String>("log-format"))
        .map_or(LogFormat::Text, |raw| LogFormat::parse(raw));
    logging::init(format);

    match run(&matches, &Hooks::new(), &GitCli::new()) {
        Ok(outcome) => {
            eprintln!(
                "{} {} decision={}",
                outcome.artifact_type, outcome.artifact_id, outcome.decision
            );
            std::process::exit(outcome.exit_code());
        }
        Err(err) => {
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or("CLI_ERROR", PipelineError::code);
            eprintln!("error[{code}]: {err:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}
