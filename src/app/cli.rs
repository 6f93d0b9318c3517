#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    SessionId,
    Collections,
    Collection,
    Plan,
    Fixity,
    Checksum,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "session-id" => CliVerb::SessionId,
        "collections" => CliVerb::Collections,
        "collection" => CliVerb::Collection,
        "plan" => CliVerb::Plan,
        "fixity" => CliVerb::Fixity,
        "checksum" => CliVerb::Checksum,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Usage: preingest [--config <path>] <command> ...".to_string(),
        String::new(),
        "Commands:".to_string(),
        "  session-id <container>               Print the session id of a container file name"
            .to_string(),
        "  collections                          List containers with their overall status"
            .to_string(),
        "  collection <session_id>              Show one collection as JSON".to_string(),
        "  plan show <session_id>               Show the scheduled execution plan".to_string(),
        "  plan set <session_id> <step>[!] ...  Replace the plan; `!` marks start-on-error"
            .to_string(),
        "  plan status <session_id> <seq> <st>  Update one plan entry's status".to_string(),
        "  fixity <session_id>                  Checksum every file in the session folder"
            .to_string(),
        "  checksum <session_id> [expected]     Checksum the archive container".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
