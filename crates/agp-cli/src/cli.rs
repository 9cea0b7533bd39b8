//! Command-line definition

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

fn root_arg() -> Arg {
    Arg::new("root")
        .long("root")
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Workspace root directory")
}

fn input_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn optional_input_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn capability_arg() -> Arg {
    Arg::new("capability")
        .long("capability")
        .action(ArgAction::Append)
        .help("Declared capability (repeatable), e.g. fs.write")
}

fn execute_arg() -> Arg {
    Arg::new("execute")
        .long("execute")
        .action(ArgAction::SetTrue)
        .help("Perform side effects when every gate passes (default: dry run)")
}

/// Build the `agp` command
pub fn build_cli() -> Command {
    Command::new("agp")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Autonomy governance pipeline: gated, content-addressed workspace changes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration TOML (default: agp.toml in the workspace root)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["text", "json"])
                .default_value("text")
                .help("Log line format on stderr"),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .short('o')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Write the artifact to this file instead of stdout"),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Capture a workspace snapshot")
                .arg(root_arg())
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .help("Lineage run id (generated when absent)"),
                ),
        )
        .subcommand(
            Command::new("map")
                .about("Map a free-text intent onto workspace targets")
                .arg(input_arg("snapshot", "Workspace snapshot artifact"))
                .arg(
                    Arg::new("intent")
                        .long("intent")
                        .required(true)
                        .help("Change intent in plain language"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Plan bounded edits from an intent mapping")
                .arg(input_arg("mapping", "Intent mapping artifact"))
                .arg(optional_input_arg(
                    "edits",
                    "JSON array of explicit edits replacing the synthesized one",
                )),
        )
        .subcommand(
            Command::new("patch")
                .about("Materialize a plan and evaluate verification evidence")
                .arg(input_arg("plan", "Safe diff plan artifact"))
                .arg(optional_input_arg(
                    "results",
                    "JSON array of verification results",
                )),
        )
        .subcommand(
            Command::new("bundle")
                .about("Assemble a review bundle for a patch run")
                .arg(input_arg("patch-run", "Patch run artifact"))
                .arg(optional_input_arg("plan", "Safe diff plan the patch run came from"))
                .arg(optional_input_arg("mapping", "Intent mapping the plan came from"))
                .arg(optional_input_arg("snapshot", "Workspace snapshot the mapping came from"))
                .arg(Arg::new("summary").long("summary").help("Reviewer-facing summary"))
                .arg(Arg::new("rationale").long("rationale").help("Why the change is needed"))
                .arg(
                    Arg::new("risk-note")
                        .long("risk-note")
                        .action(ArgAction::Append)
                        .help("Risk note (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("apply")
                .about("Gate and apply a review bundle")
                .arg(input_arg("bundle", "Review bundle artifact"))
                .arg(root_arg())
                .arg(capability_arg())
                .arg(execute_arg())
                .arg(
                    Arg::new("approval-ref")
                        .long("approval-ref")
                        .help("Approval evidence reference"),
                )
                .arg(
                    Arg::new("approver")
                        .long("approver")
                        .requires("approval-ref")
                        .help("Who approved"),
                )
                .arg(optional_input_arg(
                    "benchmark",
                    "JSON benchmark evidence {enforce, quality_floor_met, valid_gain}",
                ))
                .arg(
                    Arg::new("expected-pre-state")
                        .long("expected-pre-state")
                        .help("Required pre-state digest (sha256:<hex>)"),
                ),
        )
        .subcommand(
            Command::new("rollback")
                .about("Roll back a prior apply of a review bundle")
                .arg(input_arg("bundle", "Review bundle artifact"))
                .arg(input_arg("prior", "Apply record being undone"))
                .arg(root_arg())
                .arg(capability_arg())
                .arg(execute_arg()),
        )
        .subcommand(
            Command::new("verify")
                .about("Recompute an artifact's id and integrity digests")
                .arg(
                    Arg::new("artifact")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Artifact JSON file, or - for stdin"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["agp", "snapshot", "--root", "/tmp/ws", "--log-format", "json"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "snapshot");
        assert_eq!(args.get_one::<String>("log-format").map(String::as_str), Some("json"));
        assert_eq!(args.get_one::<PathBuf>("root"), Some(&PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn test_map_requires_intent() {
        let result = build_cli().try_get_matches_from(["agp", "map", "--snapshot", "s.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_repeatable_capabilities() {
        let matches = build_cli()
            .try_get_matches_from([
                "agp",
                "apply",
                "--bundle",
                "b.json",
                "--capability",
                "fs.write",
                "--capability",
                "net.none",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let caps: Vec<&String> = args.get_many::<String>("capability").unwrap().collect();
        assert_eq!(caps, ["fs.write", "net.none"]);
        assert!(!args.get_flag("execute"));
    }
}
