use crate::app::command_support::{parse_session_id, Services};
use crate::lifecycle::StepKind;
use crate::shared::ids::SessionId;
use crate::store::{ExecutionPlanEntry, PlanStatus};
use std::path::Path;

pub fn cmd_plan(config: Option<&Path>, args: &[String]) -> Result<String, String> {
    if args.len() < 2 {
        return Err("usage: plan <show|set|status> <session_id> ...".to_string());
    }
    let session_id = parse_session_id(&args[1])?;

    match args[0].as_str() {
        "show" => {
            if args.len() != 2 {
                return Err("usage: plan show <session_id>".to_string());
            }
            let services = Services::load(config)?;
            let plan = services
                .store
                .plan_for_session(session_id)
                .map_err(|e| e.to_string())?;
            if plan.is_empty() {
                return Ok(format!("no plan for session {session_id}"));
            }
            Ok(plan
                .iter()
                .map(|entry| {
                    format!(
                        "sequence={} step={} status={} start_on_error={}",
                        entry.sequence,
                        entry.action_name,
                        entry.status.as_str(),
                        entry.start_on_error
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "set" => {
            if args.len() < 3 {
                return Err("usage: plan set <session_id> <step>[!] ...".to_string());
            }
            let entries = plan_entries(session_id, &args[2..])?;
            let services = Services::load(config)?;
            services
                .store
                .save_plan(session_id, &entries)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "plan saved\nsession_id={session_id}\nentries={}",
                entries.len()
            ))
        }
        "status" => {
            if args.len() != 4 {
                return Err("usage: plan status <session_id> <sequence> <status>".to_string());
            }
            let sequence = args[2]
                .parse::<u32>()
                .map_err(|_| format!("invalid sequence `{}`", args[2]))?;
            let status = PlanStatus::parse(&args[3])?;
            let services = Services::load(config)?;
            services
                .store
                .update_plan_status(session_id, sequence, status)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "plan entry updated\nsession_id={session_id}\nsequence={sequence}\nstatus={}",
                status.as_str()
            ))
        }
        other => Err(format!("unknown plan subcommand `{other}`")),
    }
}

/// Turns `<step>[!]` arguments into pending plan entries numbered from 1.
fn plan_entries(
    session_id: SessionId,
    steps: &[String],
) -> Result<Vec<ExecutionPlanEntry>, String> {
    steps
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let (name, start_on_error) = match raw.strip_suffix('!') {
                Some(name) => (name, true),
                None => (raw.as_str(), false),
            };
            let kind = StepKind::parse(name)?;
            let sequence = u32::try_from(index + 1)
                .map_err(|_| format!("too many plan entries: {}", index + 1))?;
            Ok(ExecutionPlanEntry {
                session_id,
                sequence,
                action_name: kind.type_name().to_string(),
                status: PlanStatus::Pending,
                start_on_error,
            })
        })
        .collect()
}
