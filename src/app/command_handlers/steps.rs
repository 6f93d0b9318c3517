use crate::app::command_support::Services;
use crate::lifecycle::{ExecutionOutcome, Step, StepHandler};
use crate::steps::{ContainerChecksumStep, FixityStep};
use std::path::Path;

pub fn cmd_fixity(config: Option<&Path>, args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: fixity <session_id>".to_string());
    }
    run_step(config, &args[0], FixityStep::new())
}

pub fn cmd_checksum(config: Option<&Path>, args: &[String]) -> Result<String, String> {
    if args.is_empty() || args.len() > 2 {
        return Err("usage: checksum <session_id> [expected_sha256]".to_string());
    }
    run_step(
        config,
        &args[0],
        ContainerChecksumStep::new(args.get(1).cloned()),
    )
}

fn run_step<S: Step>(config: Option<&Path>, raw_session: &str, step: S) -> Result<String, String> {
    let services = Services::load(config)?;
    let outbox = services.start_outbox()?;
    let controller = services.controller(outbox.clone());
    let mut handler = StepHandler::new(step, services.resolver.clone(), controller);
    handler
        .set_session_guid(raw_session)
        .map_err(|e| e.to_string())?;

    let executed = handler.execute();
    outbox.shutdown();
    let outcome = executed.map_err(|e| e.to_string())?;
    Ok(render_outcome(&outcome))
}

fn render_outcome(outcome: &ExecutionOutcome) -> String {
    let mut lines = vec![
        format!("process_id={}", outcome.process_id),
        format!("state={}", outcome.state),
        format!("result={}", outcome.result),
        format!(
            "processed={} accepted={} rejected={}",
            outcome.summary.processed, outcome.summary.accepted, outcome.summary.rejected
        ),
    ];
    if let Some(path) = &outcome.snapshot_path {
        lines.push(format!("snapshot={}", path.display()));
    }
    if let Some(failure) = &outcome.failure {
        lines.push(format!("error={}", failure.message));
    }
    lines.join("\n")
}
