use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use std::path::PathBuf;

pub mod collections;
pub mod plan;
pub mod steps;

/// Splits a leading `--config <path>` off the argument list.
fn take_config_flag(mut args: Vec<String>) -> Result<(Option<PathBuf>, Vec<String>), String> {
    if args.first().map(String::as_str) != Some("--config") {
        return Ok((None, args));
    }
    if args.len() < 2 {
        return Err("usage: preingest --config <path> <command> ...".to_string());
    }
    let rest = args.split_off(2);
    Ok((Some(PathBuf::from(&args[1])), rest))
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let (config, args) = take_config_flag(args)?;
    if args.is_empty() {
        return Ok(help_text());
    }
    let config = config.as_deref();

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::SessionId => collections::cmd_session_id(&args[1..]),
        CliVerb::Collections => collections::cmd_collections(config, &args[1..]),
        CliVerb::Collection => collections::cmd_collection(config, &args[1..]),
        CliVerb::Plan => plan::cmd_plan(config, &args[1..]),
        CliVerb::Fixity => steps::cmd_fixity(config, &args[1..]),
        CliVerb::Checksum => steps::cmd_checksum(config, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
