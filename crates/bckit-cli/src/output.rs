use atty::Stream;
use bckit_core::{format_status_message, to_json_response, CommandGroup, CommandInfo, ExecutionOutcome};
use color_eyre::Result;
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(
    opts: &OutputOptions,
    info: CommandInfo,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }
    if opts.quiet {
        if code != 0 {
            eprintln!("{}", format_status_message(info, &outcome.message));
        }
        return Ok(code);
    }

    let message = format_status_message(info, &outcome.message);
    println!("{}", style.status(outcome.status, &message));
    if info.group == CommandGroup::Catalog {
        if let Some(table) = render_stack_table(&style, &outcome.details) {
            println!("{table}");
        }
    }
    for warning in string_list(&outcome.details, "warnings") {
        println!("{}", style.warning(&format!("  warning: {warning}")));
    }
    for failure in outcome
        .details
        .get("failed")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let hash = failure.get("hash").and_then(Value::as_str).unwrap_or("?");
        let reason = failure.get("reason").and_then(Value::as_str).unwrap_or("?");
        let detail = failure.get("message").and_then(Value::as_str).unwrap_or("");
        println!("  • {hash} ({reason}): {detail}");
    }
    if let Some(issues) = outcome.details.get("issues").and_then(Value::as_array) {
        println!();
        println!("Why:");
        for issue in issues.iter().filter_map(Value::as_str) {
            println!("  • {issue}");
        }
    }
    if let Some(hint) = outcome.details.get("hint").and_then(Value::as_str) {
        println!("{}", style.info(&format!("Tip: {hint}")));
    }
    Ok(code)
}

fn string_list<'a>(details: &'a Value, key: &str) -> Vec<&'a str> {
    details
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn render_stack_table(style: &Style, details: &Value) -> Option<String> {
    let root = details.get("root")?;
    let mut rows = vec![("(root)".to_string(), counts(root)?)];
    for stack in details.get("stacks")?.as_array()? {
        let name = stack.get("name")?.as_str()?.to_string();
        rows.push((name, counts(stack)?));
    }
    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0).max(5);
    let mut lines = vec![style.table_header(&format!(
        "{:<width$}  {:>8}  {:>10}",
        "STACK", "COMPLETE", "INCOMPLETE"
    ))];
    for (name, (complete, incomplete)) in rows {
        lines.push(format!("{name:<width$}  {complete:>8}  {incomplete:>10}"));
    }
    Some(lines.join("\n"))
}

fn counts(entry: &Value) -> Option<(u64, u64)> {
    Some((
        entry.get("complete")?.as_u64()?,
        entry.get("incomplete")?.as_u64()?,
    ))
}
