//! Console presentation of batch progress.

use decant_pipeline::item::Outcome;
use decant_pipeline::{BatchEvent, BatchReport, Plan, Progress, Summary};

/// Print one event as it arrives from the worker.
pub fn print(event: &BatchEvent, extension: &str) {
    match event {
        BatchEvent::Started => tracing::debug!("Batch started"),
        BatchEvent::Planned { found, to_convert, skipped } => {
            println!("Found {found} .{extension} file(s): {to_convert} to convert, {skipped} already converted");
        },
        BatchEvent::ItemStarted { index, total, name } => tracing::debug!(index, total, name = %name, "Converting"),
        BatchEvent::ItemFinished(progress) => println!("{}", describe_progress(progress)),
        BatchEvent::Complete(report) => println!("{}", describe_report(report, extension)),
    }
}

pub fn describe_progress(progress: &Progress) -> String {
    let Progress { index, total, name, outcome } = progress;
    match outcome {
        Outcome::Committed { name: committed } => format!("[{index}/{total}] {name} -> {committed}"),
        Outcome::Failed(reason) => format!("[{index}/{total}] {name} failed: {reason}"),
        Outcome::Skipped => format!("[{index}/{total}] {name} skipped"),
    }
}

pub fn describe_report(report: &BatchReport, extension: &str) -> String {
    let mut message = match report.summary() {
        Summary::NothingFound => format!("No .{extension} files found in the source directory."),
        Summary::AllConverted => "All files have already been converted.".to_string(),
        Summary::Converted { success, failed } => format!("Done: {success} converted, {failed} failed."),
    };
    if report.cancelled {
        message.push_str(" Cancelled before all files were processed.");
    }
    message
}

pub fn print_plan(plan: &Plan) {
    for item in &plan.to_convert {
        println!("convert  {}", item.name());
    }
    for item in &plan.skipped {
        println!("skip     {}", item.name());
    }
    println!("{} to convert, {} already converted", plan.to_convert.len(), plan.skipped.len());
}
