//! Table output formatting for CLI commands
//!
//! Renders runs, comparison matrices, fixes and workflow phases with
//! comfy-table. Colors are dropped when the terminal does not support them.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::cli::output::{percent, truncate};
use crate::domain::models::{
    ComparisonListEntry, ComparisonMatrix, ComparisonSummary, Environment, EnvironmentResult, Fix,
    FixStatus, PhaseStatus, ResultStatus, RunningTestInfo, TestResult, TestRun, WorkflowPhase,
    WorkflowRun,
};

pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    pub fn format_runs(&self, runs: &[TestRun]) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Run", "Status", "Total", "Passed", "Failed"]));
        for run in runs {
            table.add_row(vec![
                Cell::new(&run.run_id),
                Cell::new(run.status.as_str()),
                Cell::new(run.total),
                self.colored(run.passed.to_string(), Color::Green, run.passed > 0),
                self.colored(run.failed.to_string(), Color::Red, run.failed > 0),
            ]);
        }
        table.to_string()
    }

    pub fn format_results(&self, results: &[TestResult]) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Test", "Status", "Duration", "Error"]));
        for result in results {
            let status = Cell::new(result.status.as_str());
            let status = if self.use_colors {
                status.fg(result_color(result.status))
            } else {
                status
            };
            table.add_row(vec![
                Cell::new(&result.test_id),
                status,
                Cell::new(format!("{} ms", result.duration_ms)),
                Cell::new(truncate(result.error_message.as_deref().unwrap_or("-"), 60)),
            ]);
        }
        table.to_string()
    }

    pub fn format_running_tests(&self, running: &[RunningTestInfo]) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Worker", "Test", "Started"]));
        for info in running {
            let name = if info.test_name.is_empty() {
                info.test_id.clone()
            } else {
                format!("{} ({})", info.test_name, info.test_id)
            };
            table.add_row(vec![
                Cell::new(info.worker_id),
                Cell::new(truncate(&name, 50)),
                Cell::new(info.started_at.format("%H:%M:%S").to_string()),
            ]);
        }
        table.to_string()
    }

    /// One row per test, one column per environment.
    pub fn format_matrix(&self, matrix: &ComparisonMatrix) -> String {
        let mut table = self.base_table();
        let mut columns = vec!["Test"];
        columns.extend(Environment::ALL.iter().map(Environment::as_str));
        table.set_header(header(&columns));

        for row in &matrix.rows {
            let mut cells = vec![Cell::new(&row.test_id)];
            for env in Environment::ALL {
                cells.push(self.matrix_cell(row.cell(env)));
            }
            table.add_row(cells);
        }
        table.to_string()
    }

    pub fn format_summary(&self, summary: &ComparisonSummary) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Tests", "Production", "Sandbox A", "Sandbox B", "Improved", "Regressed"]));
        table.add_row(vec![
            Cell::new(summary.total_tests),
            Cell::new(percent(summary.production_pass_rate)),
            Cell::new(percent(summary.sandbox_a_pass_rate)),
            Cell::new(percent(summary.sandbox_b_pass_rate)),
            self.colored(
                summary.improvements.len().to_string(),
                Color::Green,
                !summary.improvements.is_empty(),
            ),
            self.colored(
                summary.regressions.len().to_string(),
                Color::Red,
                !summary.regressions.is_empty(),
            ),
        ]);
        table.to_string()
    }

    pub fn format_history(&self, entries: &[ComparisonListEntry]) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Comparison", "Status", "Started", "Tests", "Production", "Improved", "Regressed"]));
        for entry in entries {
            let (tests, production, improved, regressed) = match &entry.summary {
                Some(s) => (
                    s.total_tests.to_string(),
                    percent(s.production_pass_rate),
                    s.improvements.len().to_string(),
                    s.regressions.len().to_string(),
                ),
                None => ("-".into(), "-".into(), "-".into(), "-".into()),
            };
            table.add_row(vec![
                Cell::new(&entry.comparison_id),
                Cell::new(entry.status.as_str()),
                Cell::new(entry.started_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(tests),
                Cell::new(production),
                Cell::new(improved),
                Cell::new(regressed),
            ]);
        }
        table.to_string()
    }

    pub fn format_fixes(&self, fixes: &[Fix]) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Fix", "Type", "Status", "Target", "Description", "Error"]));
        for fix in fixes {
            let status = Cell::new(fix.status.as_str());
            let status = if self.use_colors {
                status.fg(fix_color(fix.status))
            } else {
                status
            };
            table.add_row(vec![
                Cell::new(&fix.fix_id),
                Cell::new(format!("{:?}", fix.fix_type).to_lowercase()),
                status,
                Cell::new(truncate(&fix.target_file, 30)),
                Cell::new(truncate(&fix.description, 50)),
                Cell::new(truncate(fix.error.as_deref().unwrap_or("-"), 40)),
            ]);
        }
        table.to_string()
    }

    pub fn format_phases(&self, run: &WorkflowRun) -> String {
        let mut table = self.base_table();
        table.set_header(header(&["Phase", "Status", "Error"]));
        for phase in WorkflowPhase::SEQUENCE {
            let Some(state) = run.phase(phase) else {
                continue;
            };
            let name = if phase == run.current_phase {
                Cell::new(format!("▶ {phase}")).add_attribute(Attribute::Bold)
            } else {
                Cell::new(phase.as_str())
            };
            let status = Cell::new(state.status.as_str());
            let status = if self.use_colors {
                status.fg(phase_color(state.status))
            } else {
                status
            };
            table.add_row(vec![
                name,
                status,
                Cell::new(truncate(state.error.as_deref().unwrap_or("-"), 60)),
            ]);
        }
        table.to_string()
    }

    fn matrix_cell(&self, result: Option<&EnvironmentResult>) -> Cell {
        match result {
            None => Cell::new("—"),
            Some(r) => {
                let text = format!(
                    "{} {}t {:.1}s",
                    if r.passed { "pass" } else { "FAIL" },
                    r.turn_count,
                    r.duration_ms as f64 / 1000.0
                );
                let color = if r.passed { Color::Green } else { Color::Red };
                self.colored(text, color, true)
            }
        }
    }

    fn colored(&self, text: String, color: Color, emphasize: bool) -> Cell {
        if self.use_colors && emphasize {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    fn base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

fn header(columns: &[&str]) -> Vec<Cell> {
    columns
        .iter()
        .map(|c| Cell::new(*c).add_attribute(Attribute::Bold))
        .collect()
}

fn result_color(status: ResultStatus) -> Color {
    match status {
        ResultStatus::Passed => Color::Green,
        ResultStatus::Failed | ResultStatus::Error => Color::Red,
        ResultStatus::Running => Color::Yellow,
        ResultStatus::Skipped => Color::DarkGrey,
    }
}

fn fix_color(status: FixStatus) -> Color {
    match status {
        FixStatus::Pending => Color::Yellow,
        FixStatus::Applied => Color::Cyan,
        FixStatus::Verified => Color::Green,
        FixStatus::Rejected => Color::DarkGrey,
    }
}

fn phase_color(status: PhaseStatus) -> Color {
    match status {
        PhaseStatus::Pending => Color::DarkGrey,
        PhaseStatus::InProgress => Color::Yellow,
        PhaseStatus::Completed => Color::Green,
        PhaseStatus::Error => Color::Red,
        PhaseStatus::Skipped => Color::Blue,
    }
}

fn supports_color() -> bool {
    env::var_os("NO_COLOR").is_none() && env::var("TERM").map(|t| t != "dumb").unwrap_or(true)
}
