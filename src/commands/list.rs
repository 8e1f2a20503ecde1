use anyhow::Result;
use colored::Colorize;
use reconcile::{MatchMode, PatchReport, compose_regex, patch_statuses};
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::ListArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &ListArgs) -> Result<()> {
    let (_, repository) = super::open(ctx)?;
    let reports = select(
        patch_statuses(repository.targets(), repository.patches()),
        args,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        ui::info("No patches found");
        return Ok(());
    }

    let mut by_owner: BTreeMap<&str, Vec<&PatchReport>> = BTreeMap::new();
    for report in &reports {
        by_owner.entry(report.owner.as_str()).or_default().push(report);
    }

    for (owner, reports) in by_owner {
        ui::header(owner);
        for report in reports {
            let label = report
                .label
                .as_deref()
                .map(|l| format!("  {}", l.dimmed()))
                .unwrap_or_default();
            println!("  {} [{}]{label}", report.path, ui::status_label(report.status));
        }
    }

    Ok(())
}

/// Apply the `--filter` and `--status` selections
fn select(mut reports: Vec<PatchReport>, args: &ListArgs) -> Result<Vec<PatchReport>> {
    if let Some(matcher) = compose_regex(&args.filters, MatchMode::Substring)? {
        reports.retain(|report| matcher.is_match(&report.path));
    }
    if !args.status.is_empty() {
        reports.retain(|report| args.status.contains(&report.status));
    }
    Ok(reports)
}
