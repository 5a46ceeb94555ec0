use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use buildnpm_core::DependencyNode;
use buildnpm_installer::{InstallOutcome, InstallReporter, NpmCommand};
use buildnpm_registry::EnrichSummary;
use indicatif::{HumanCount, ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    let colors_disabled = std::env::var_os("NO_COLOR").is_some();
    if std::io::stdout().is_terminal() && !colors_disabled {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub fn style(self) -> OutputStyle {
        self.style
    }

    pub fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub fn print_section(self, title: &str) {
        if self.style == OutputStyle::Plain {
            return;
        }
        println!();
        println!("{}", colorize(section_style(), &format!("== {title} ==")));
    }

    pub fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

/// Progress bar over checksum collection; one tick per dependency.
pub struct TerminalReporter {
    renderer: TerminalRenderer,
    progress: Mutex<Option<(ProgressBar, Instant)>>,
}

impl TerminalReporter {
    pub fn new(renderer: TerminalRenderer) -> Self {
        Self {
            renderer,
            progress: Mutex::new(None),
        }
    }

    fn take_progress(&self) -> Option<(ProgressBar, Instant)> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl InstallReporter for TerminalReporter {
    fn enrichment_started(&self, total: usize) {
        if self.renderer.style() == OutputStyle::Plain || total == 0 {
            return;
        }
        let progress_bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<10} [{bar:20.cyan/blue}] {pos:>4}/{len:4} {elapsed_precise}",
        ) {
            progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
        }
        progress_bar.set_message("checksums");
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        *self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((progress_bar, Instant::now()));
    }

    fn dependency_enriched(&self, _node: &DependencyNode) {
        let progress = self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((progress_bar, _)) = progress.as_ref() {
            progress_bar.inc(1);
        }
    }

    fn enrichment_finished(&self, summary: &EnrichSummary) {
        let Some((progress_bar, started_at)) = self.take_progress() else {
            return;
        };
        progress_bar.finish_and_clear();
        println!(
            "{} {} complete in {}",
            colorize(progress_label_style(), "checksums"),
            HumanCount(summary_total(summary) as u64),
            format_elapsed(started_at.elapsed())
        );
    }

    fn missing_dependencies(&self, lines: &[String]) {
        let Some((header, entries)) = lines.split_first() else {
            return;
        };
        self.renderer.print_status("warn", header);
        self.renderer.print_lines(entries);
    }
}

fn summary_total(summary: &EnrichSummary) -> usize {
    summary.from_previous_build + summary.from_registry + summary.not_found + summary.failed
}

pub fn format_outcome_lines(
    command: NpmCommand,
    outcome: &InstallOutcome,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!("npm {} finished successfully", command.as_str()),
    )];
    let Some(module_id) = &outcome.module_id else {
        return lines;
    };

    lines.push(render_status_line(
        style,
        "ok",
        &format!(
            "recorded {} dependencies for module {module_id}",
            HumanCount(outcome.manifest.resolved.len() as u64)
        ),
    ));
    if let Some(summary) = &outcome.summary {
        lines.push(render_status_line(
            style,
            "step",
            &format!(
                "checksums: {} from previous build, {} from registry, {} missing",
                summary.from_previous_build, summary.from_registry, summary.not_found
            ),
        ));
    }
    if let Some(path) = &outcome.record_path {
        lines.push(render_status_line(
            style,
            "step",
            &format!("build record: {}", path.display()),
        ));
    }
    lines
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
