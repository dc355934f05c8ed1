//! CLI 格式化输出
//!
//! 构建结果、失败原因和工作区信息的命令行展示。

use hotbuild_orchestrator::report::console_summary;
use hotbuild_orchestrator::{BuildFailure, BuildReport, GroupOutcome, StopReason};

/// 打印构建结果；返回是否全部成功
pub fn print_report(report: &BuildReport) -> bool {
    for group in &report.groups {
        print_group(group);
    }
    if !report.skipped.is_empty() {
        println!("⚠️  {} file(s) skipped", report.skipped.len());
    }
    let ok = report.all_succeeded();
    let mark = if ok { "✅" } else { "❌" };
    println!("{} {}", mark, report.summary());
    ok
}

fn print_group(group: &GroupOutcome) {
    let label = match &group.plugin_name {
        Some(plugin) => format!("{} [{}]", group.key, plugin),
        None => group.key.clone(),
    };
    if group.succeeded() {
        let retries = group.attempts.saturating_sub(1);
        if retries > 0 {
            println!(
                "  ✅ {} ({} files, {} unresolved imports removed)",
                label,
                group.files.len(),
                group.removed_imports
            );
        } else {
            println!("  ✅ {} ({} files)", label, group.files.len());
        }
        for artifact in &group.outcome.artifact_paths {
            println!("       -> {}", artifact.display());
        }
        return;
    }

    eprintln!("  ❌ {} ({} attempts, {})", label, group.attempts, stop_label(group.stop_reason));
    if let Some(message) = &group.message {
        eprintln!("       {}", message);
    }
    if !group.outcome.diagnostics.is_empty() {
        for line in console_summary(&label, &group.outcome.diagnostics).lines() {
            eprintln!("       {}", line);
        }
    }
    if let Some(log) = &group.log_file {
        eprintln!("       log: {}", log.display());
    }
}

fn stop_label(reason: Option<StopReason>) -> &'static str {
    match reason {
        Some(StopReason::NotRetryable) => "not retryable",
        Some(StopReason::NothingToRemove) => "no import left to remove",
        Some(StopReason::RetriesExhausted) => "retry budget exhausted",
        Some(StopReason::ServiceFailure) => "compile service failure",
        Some(StopReason::ArtifactWriteFailed) => "artifact write failed",
        None => "failed",
    }
}

/// 打印构建失败及建议
pub fn print_failure(failure: &BuildFailure) {
    eprintln!("❌ {}", failure.kind);
    eprintln!("   {}", failure.message);
    for hint in &failure.hints {
        eprintln!("   - {}", hint);
    }
}
