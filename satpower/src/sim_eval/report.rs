// src/sim_eval/report.rs
//
// Evaluation report output: JSON, Markdown and a console summary.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::evaluator::{EvaluationReport, PolicyAggregate};

pub const REPORT_JSON: &str = "evaluation_report.json";
pub const REPORT_MARKDOWN: &str = "evaluation_report.md";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn write_json_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create report: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn write_markdown_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create report: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Evaluation Report: {} vs {}", report.agent.policy, report.baseline.policy)?;
    writeln!(writer)?;
    writeln!(writer, "**Episodes:** {}", report.seeds.len())?;
    writeln!(writer, "**Config fingerprint:** `{}`", report.config_fingerprint)?;
    writeln!(writer)?;

    if report.improvement {
        writeln!(writer, "## ✓ Significant power reduction")?;
    } else {
        writeln!(writer, "## ✗ No significant power reduction")?;
    }
    writeln!(writer)?;

    writeln!(writer, "## Policies")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "| Policy | Episodes | Mean Power (dBm) | Std Power | Mean RSRP (dBm) | Violation Rate | Outage Rate | Mean Reward | Savings % |"
    )?;
    writeln!(
        writer,
        "|--------|----------|------------------|-----------|-----------------|----------------|-------------|-------------|-----------|"
    )?;
    for agg in [&report.agent, &report.baseline] {
        write_policy_row(&mut writer, agg)?;
    }
    writeln!(writer)?;

    let test = &report.power_test;
    writeln!(writer, "## Welch t-test (per-episode mean power)")?;
    writeln!(writer)?;
    writeln!(writer, "| Statistic | Value |")?;
    writeln!(writer, "|-----------|-------|")?;
    writeln!(writer, "| t | {} |", fmt_opt(test.statistic))?;
    writeln!(writer, "| df | {} |", fmt_opt(test.degrees_of_freedom))?;
    writeln!(writer, "| p-value | {:.4} |", test.p_value)?;
    writeln!(writer, "| alpha | {:.3} |", report.significance_level)?;
    writeln!(
        writer,
        "| Cohen's d | {} ({}) |",
        fmt_opt(test.effect_size),
        test.effect_label()
    )?;
    writeln!(writer, "| Δ power (dB) | {:.3} |", test.mean_difference)?;
    writeln!(writer)?;

    writeln!(writer, "## Episodes")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "| Seed | Agent Power | Baseline Power | Agent Reward | Baseline Reward | Agent Viol. | Baseline Viol. |"
    )?;
    writeln!(
        writer,
        "|------|-------------|----------------|--------------|-----------------|-------------|----------------|"
    )?;
    for ep in &report.matched_episodes {
        writeln!(
            writer,
            "| {} | {:.2} | {:.2} | {:.2} | {:.2} | {} | {} |",
            ep.seed,
            ep.agent_power_dbm,
            ep.baseline_power_dbm,
            ep.agent_reward,
            ep.baseline_reward,
            ep.agent_violations,
            ep.baseline_violations,
        )?;
    }

    writer.flush()?;
    Ok(())
}

fn write_policy_row<W: Write>(writer: &mut W, agg: &PolicyAggregate) -> std::io::Result<()> {
    writeln!(
        writer,
        "| {} | {} | {:.2} | {:.2} | {:.2} | {:.3} | {:.3} | {:.2} | {:.1} |",
        agg.policy,
        agg.episodes,
        agg.mean_power_dbm,
        agg.std_power_dbm,
        agg.mean_rsrp_dbm,
        agg.violation_rate,
        agg.outage_rate,
        agg.mean_episode_reward,
        agg.mean_power_savings_pct,
    )
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}

/// Write both report files into `dir`; returns (json, markdown) paths.
pub fn write_reports(report: &EvaluationReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let json = dir.join(REPORT_JSON);
    let md = dir.join(REPORT_MARKDOWN);
    write_json_report(report, &json)?;
    write_markdown_report(report, &md)?;
    Ok((json, md))
}

pub fn print_console_summary(report: &EvaluationReport) {
    println!("═══════════════════════════════════════════════════════════════");
    println!(
        "EVALUATION: {} vs {} ({} episodes)",
        report.agent.policy,
        report.baseline.policy,
        report.seeds.len()
    );
    println!("═══════════════════════════════════════════════════════════════");
    for agg in [&report.agent, &report.baseline] {
        println!(
            "  {:<9}| power={:.2}±{:.2} dBm rsrp={:.2} dBm viol={:.3} outage={:.3} reward={:.2}",
            agg.policy,
            agg.mean_power_dbm,
            agg.std_power_dbm,
            agg.mean_rsrp_dbm,
            agg.violation_rate,
            agg.outage_rate,
            agg.mean_episode_reward,
        );
    }
    println!();
    let test = &report.power_test;
    println!(
        "  Δpower={:.3} dB t={} p={:.4} d={} ({})",
        test.mean_difference,
        fmt_opt(test.statistic),
        test.p_value,
        fmt_opt(test.effect_size),
        test.effect_label()
    );
    if report.improvement {
        println!("✓ SIGNIFICANT POWER REDUCTION (p < {})", report.significance_level);
    } else {
        println!("✗ NO SIGNIFICANT POWER REDUCTION (alpha = {})", report.significance_level);
    }
}
