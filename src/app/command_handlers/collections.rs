use crate::app::command_support::{parse_session_id, Services};
use crate::identity::is_container_name;
use crate::shared::ids::SessionId;
use std::path::Path;

pub fn cmd_session_id(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: session-id <container_file_name>".to_string());
    }
    let name = Path::new(&args[0])
        .file_name()
        .and_then(|value| value.to_str())
        .ok_or_else(|| format!("invalid container path `{}`", args[0]))?;
    if !is_container_name(name) {
        return Err(format!(
            "`{name}` is not an archive container (.tar, .tar.gz or .zip)"
        ));
    }
    Ok(SessionId::from_container_name(name).to_string())
}

pub fn cmd_collections(config: Option<&Path>, args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: collections".to_string());
    }
    let services = Services::load(config)?;
    let collections = services.registry.list().map_err(|e| e.to_string())?;
    if collections.is_empty() {
        return Ok("no collections".to_string());
    }
    Ok(collections
        .iter()
        .map(|collection| {
            format!(
                "session_id={} status={} actions={} name={}",
                collection.session_id,
                collection.overall_status,
                collection.process_actions.len(),
                collection.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn cmd_collection(config: Option<&Path>, args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: collection <session_id>".to_string());
    }
    let session_id = parse_session_id(&args[0])?;
    let services = Services::load(config)?;
    let collection = services
        .registry
        .get(session_id)
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&collection)
        .map_err(|e| format!("failed to encode collection: {e}"))
}
