//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::io;
use strap_types::{
    ApplyReport, ColorChoice, DetectReport, PackageResult, PackageState, PlanReport,
    RestartDisposition, Status,
};

/// Report of the last phase a command ran
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", content = "report", rename_all = "snake_case")]
pub enum RunReport {
    Detect(DetectReport),
    Plan(PlanReport),
    Apply(ApplyReport),
}

impl RunReport {
    /// Terminal status of the phase, which becomes the exit code
    pub fn status(&self) -> Status {
        match self {
            Self::Detect(report) => report.status,
            Self::Plan(report) => report.status,
            Self::Apply(report) => report.status,
        }
    }
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
        }
    }

    /// Render a phase report
    pub fn render_report(&self, report: &RunReport) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        match report {
            RunReport::Detect(report) => println!("{}", self.detect_table(report)),
            RunReport::Plan(report) => println!("{}", self.plan_table(report)),
            RunReport::Apply(report) => {
                println!("{}", self.apply_table(report));
                if let Some(failed) = &report.failed_package {
                    println!("Failed package: {failed}");
                }
                if let Some(note) = restart_note(report.restart) {
                    println!("{note}");
                }
            }
        }
        println!("Status: {}", report.status());
        Ok(())
    }

    fn detect_table(&self, report: &DetectReport) -> Table {
        let mut table = self.table(&["Package", "State", "Version", "Note"]);
        for package in &report.packages {
            let note = match (&package.failure, package.reconciled) {
                (Some(failure), _) => failure.clone(),
                (None, true) => "from interrupted run".to_string(),
                (None, false) => String::new(),
            };
            table.add_row(vec![
                Cell::new(&package.package_id),
                self.state_cell(package.state),
                Cell::new(
                    package
                        .version
                        .as_ref()
                        .map_or_else(|| "-".to_string(), ToString::to_string),
                ),
                Cell::new(note),
            ]);
        }
        table
    }

    fn plan_table(&self, report: &PlanReport) -> Table {
        let mut table = self.table(&["Package", "Current", "Request", "Execute", "Rollback"]);
        for entry in &report.entries {
            let execute = if let Some(failure) = &entry.failure {
                self.colored(Cell::new(failure), Color::Red)
            } else if entry.is_actionable() {
                self.colored(Cell::new(entry.execute), Color::Cyan)
            } else {
                Cell::new(entry.execute)
            };
            table.add_row(vec![
                Cell::new(&entry.package_id),
                self.state_cell(entry.current),
                Cell::new(entry.request),
                execute,
                Cell::new(entry.rollback),
            ]);
        }
        table
    }

    fn apply_table(&self, report: &ApplyReport) -> Table {
        let mut table = self.table(&["Package", "Action", "Result", "Attempts", "Restart"]);
        let forward = report.executed.iter().map(|o| (o, false));
        let backward = report.rolled_back.iter().map(|o| (o, true));
        for (outcome, rollback) in forward.chain(backward) {
            let action = if rollback {
                format!("{} (rollback)", outcome.action)
            } else {
                outcome.action.to_string()
            };
            let result = match outcome.result {
                PackageResult::Succeeded => self.colored(Cell::new("ok"), Color::Green),
                PackageResult::Ignored { status } => {
                    self.colored(Cell::new(format!("ignored ({status})")), Color::Yellow)
                }
                PackageResult::Failed { status } => {
                    self.colored(Cell::new(format!("failed ({status})")), Color::Red)
                }
            };
            table.add_row(vec![
                Cell::new(&outcome.package_id),
                Cell::new(action),
                result,
                Cell::new(outcome.attempts),
                Cell::new(if outcome.restart_required { "yes" } else { "" }),
            ]);
        }
        table
    }

    fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
        if self.color_choice == ColorChoice::Never {
            table.force_no_tty();
        } else if self.color_choice == ColorChoice::Always {
            table.enforce_styling();
        }
        table
    }

    fn state_cell(&self, state: PackageState) -> Cell {
        let color = match state {
            PackageState::Present => Color::Green,
            PackageState::Cached => Color::Blue,
            PackageState::Unknown => Color::Yellow,
            _ => return Cell::new(state),
        };
        self.colored(Cell::new(state), color)
    }

    fn colored(&self, cell: Cell, color: Color) -> Cell {
        if self.color_choice == ColorChoice::Never {
            cell
        } else {
            cell.fg(color)
        }
    }
}

fn restart_note(restart: RestartDisposition) -> Option<&'static str> {
    match restart {
        RestartDisposition::NotRequired => None,
        RestartDisposition::Suppressed => {
            Some("A restart is required to finish; restarts are disabled by policy.")
        }
        RestartDisposition::Deferred => Some("A restart is required to finish installation."),
        RestartDisposition::Initiated => Some("Restarting the system."),
    }
}
