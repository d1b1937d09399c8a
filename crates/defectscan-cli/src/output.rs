//! Human-readable rendering

use colored::Colorize;
use defectscan_core::{AnalysisSummary, DocumentAnalysis, Finding, Severity};
use defectscan_storage::{AnalysisRecord, StoreStats};

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::High => severity.as_str().red().bold(),
        Severity::Medium => severity.as_str().yellow().bold(),
        Severity::Low => severity.as_str().green(),
    }
}

/// Truncate to `max` chars, appending an ellipsis.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    }
}

pub fn print_findings(findings: &[Finding]) {
    if findings.is_empty() {
        println!("  {}", "no defects detected".dimmed());
        return;
    }
    for (i, f) in findings.iter().enumerate() {
        println!(
            "{:>3}. {} [{}] {:.2} ({})",
            i + 1,
            f.category.bold(),
            severity_label(f.severity),
            f.confidence,
            f.detection_method
        );
        if let Some(term) = &f.matched_term {
            println!("     {} {}", "term:".dimmed(), term.cyan());
        }
        println!("     {}", excerpt(&f.sentence, 100));
    }
}

pub fn print_summary(summary: &AnalysisSummary) {
    println!(
        "{} {} finding(s), method {}",
        "Summary:".bold(),
        summary.total_findings,
        summary.processing_method
    );
    if let Some(mean) = summary.mean_confidence {
        println!("  mean confidence {mean:.2}");
    }
    for (category, count) in &summary.by_category {
        println!("  {category:<12} {count}");
    }
    println!(
        "  {} high, {} medium, {} low",
        summary.count(Severity::High),
        summary.count(Severity::Medium),
        summary.count(Severity::Low)
    );
}

pub fn print_analysis(file: &str, analysis: &DocumentAnalysis) {
    println!("{} {}", "Analyzed".green().bold(), file.bold());
    print_findings(&analysis.findings);
    println!();
    print_summary(&AnalysisSummary::from_findings(&analysis.findings));
    if analysis.signal_degraded {
        println!(
            "{} secondary signal unavailable; results are rule-based",
            "warning:".yellow().bold()
        );
    }
    if analysis.verdicts_rejected > 0 {
        println!(
            "{} {} secondary verdict(s) discarded; those sentences are rule-based",
            "warning:".yellow().bold(),
            analysis.verdicts_rejected
        );
    }
    if analysis.aborted {
        println!("{} interrupted; partial results", "warning:".yellow().bold());
    }
}

pub fn print_history(records: &[AnalysisRecord]) {
    if records.is_empty() {
        println!("{}", "no stored analyses".dimmed());
        return;
    }
    for r in records {
        let top = r
            .summary
            .highest_severity
            .map(|s| severity_label(s).to_string())
            .unwrap_or_else(|| "-".dimmed().to_string());
        println!(
            "{}  {}  {:<30} {:>3} finding(s)  {}",
            r.id.to_string().cyan(),
            r.created_at.format("%Y-%m-%d %H:%M"),
            excerpt(&r.metadata.filename, 30),
            r.summary.total_findings,
            top
        );
    }
}

pub fn print_record(record: &AnalysisRecord) {
    println!("{} {}", "Analysis".bold(), record.id.to_string().cyan());
    println!("  file     {}", record.metadata.filename);
    if let Some(hash) = &record.metadata.file_hash {
        println!("  sha256   {hash}");
    }
    println!("  created  {}", record.created_at.to_rfc3339());
    println!();
    print_findings(&record.findings);
    println!();
    print_summary(&record.summary);
}

pub fn print_stats(stats: &StoreStats) {
    println!(
        "{} {} analyses, {} finding(s)",
        "Store:".bold(),
        stats.total_analyses,
        stats.total_findings
    );
    if let Some(latest) = stats.latest {
        println!("  latest   {}", latest.format("%Y-%m-%d %H:%M"));
    }
    for (method, count) in &stats.by_processing_method {
        match stats.mean_confidence_by_method.get(method) {
            Some(mean) => println!("  {method:<12} {count:>4}  mean confidence {mean:.2}"),
            None => println!("  {method:<12} {count:>4}"),
        }
    }
    if !stats.by_category.is_empty() {
        println!("{}", "By category:".bold());
        for (category, count) in &stats.by_category {
            println!("  {category:<12} {count:>4}");
        }
    }
}
