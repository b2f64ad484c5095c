// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console rendering of a finished run.

use colored::Colorize;
use widthswarm_swarm::RunReport;

/// The one-line summary: `True Width = .. | Estimated Width = .. | Difference = ..`.
pub fn summary_line(report: &RunReport) -> String {
    format!(
        "True Width = {} | Estimated Width = {} | Difference = {}",
        report.true_width, report.estimated_width, report.difference
    )
}

pub fn print_report(report: &RunReport) {
    let line = summary_line(report);
    if report.difference == 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.bold());
    }

    if !report.failed_agents.is_empty() {
        let ids: Vec<String> = report.failed_agents.iter().map(ToString::to_string).collect();
        println!(
            "{}",
            format!(
                "⚠ {} agent(s) exited unsuccessfully: {}",
                ids.len(),
                ids.join(", ")
            )
            .yellow()
        );
    }
    for error in &report.teardown_errors {
        println!("{}", format!("⚠ Teardown: {}", error).yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widthswarm_core::record::AgentId;

    #[test]
    fn test_summary_line() {
        let report = RunReport {
            true_width: 21,
            accumulator: 950,
            estimated_width: 19,
            difference: 2,
            failed_agents: vec![AgentId(4)],
            teardown_errors: vec![],
        };
        assert_eq!(
            summary_line(&report),
            "True Width = 21 | Estimated Width = 19 | Difference = 2"
        );
    }
}
