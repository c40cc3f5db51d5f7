use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use firewatch::detect::DetectionStats;
use firewatch::error::Severity;
use firewatch::presenter::StatusLine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner() -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = Self::spinner();
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live status line for a detection session.
    pub fn status_bar(&self) -> StatusBar {
        let spinner = self.use_pretty().then(Self::spinner);
        StatusBar {
            spinner,
            severity: None,
            last_plain: String::new(),
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Status bar: colored spinner on a TTY, one stderr line per status change otherwise.
pub struct StatusBar {
    spinner: Option<ProgressBar>,
    severity: Option<Severity>,
    last_plain: String,
}

impl StatusBar {
    pub fn update(
        &mut self,
        status: &StatusLine,
        fps: f32,
        resolution: Option<(u32, u32)>,
        stats: Option<&DetectionStats>,
    ) {
        let message = status_message(status, fps, resolution, stats);
        match &self.spinner {
            Some(spinner) => {
                if self.severity != Some(status.severity) {
                    let template = format!("{{spinner:.{}}} {{msg}}", term_color(status.severity));
                    let style = ProgressStyle::with_template(&template)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner());
                    spinner.set_style(style);
                    self.severity = Some(status.severity);
                }
                spinner.set_message(message);
            }
            None => {
                if status.text != self.last_plain {
                    eprintln!("[{}] {}", status.color(), message);
                    self.last_plain = status.text.clone();
                }
            }
        }
    }

    pub fn finish(&self, status: &StatusLine) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(status.text.clone());
        } else {
            eprintln!("[{}] {}", status.color(), status.text);
        }
    }
}

fn status_message(
    status: &StatusLine,
    fps: f32,
    resolution: Option<(u32, u32)>,
    stats: Option<&DetectionStats>,
) -> String {
    let mut message = format!("{} | FPS: {}", status.text, fps as u32);
    if let Some((w, h)) = resolution {
        message.push_str(&format!(" | {}x{}", w, h));
    }
    if let Some(stats) = stats {
        let counts: Vec<String> = stats
            .rows()
            .map(|(name, count)| format!("{}: {}", name, count))
            .collect();
        if !counts.is_empty() {
            message.push_str(" | ");
            message.push_str(&counts.join(", "));
        }
    }
    message
}

fn term_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Idle => "white",
        Severity::Info => "blue",
        Severity::Warning => "yellow",
        Severity::Ok => "green",
        Severity::Error => "red",
    }
}

/// Two-column class/count table.
pub fn stats_table(stats: &DetectionStats) -> String {
    let width = stats
        .rows()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Class".len());
    let mut table = format!("{:<width$}  Count\n", "Class", width = width);
    for (name, count) in stats.rows() {
        table.push_str(&format!("{:<width$}  {:>5}\n", name, count, width = width));
    }
    table
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firewatch::detect::{BoundingBox, Detection};

    fn stats() -> DetectionStats {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        DetectionStats::from_detections(&[
            Detection::new(1, "fire", 0.9, bbox),
            Detection::new(0, "smoke", 0.8, bbox),
            Detection::new(1, "fire", 0.7, bbox),
        ])
    }

    #[test]
    fn status_message_lists_counts_in_class_order() {
        let status = StatusLine {
            text: "Detecting...".to_string(),
            severity: Severity::Ok,
        };
        let message = status_message(&status, 24.7, Some((640, 480)), Some(&stats()));
        assert_eq!(
            message,
            "Detecting... | FPS: 24 | 640x480 | fire: 2, smoke: 1"
        );
    }

    #[test]
    fn stats_table_has_header_and_rows() {
        let table = stats_table(&stats());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Class"));
        assert!(lines[1].starts_with("fire"));
        assert!(lines[1].ends_with('2'));
    }

    #[test]
    fn plain_mode_without_tty() {
        let ui = Ui::from_args(Some("pretty"), false, false);
        assert!(!ui.use_pretty());
        assert!(Ui::from_args(None, true, false).use_pretty());
        assert!(!Ui::from_args(Some("plain"), true, false).use_pretty());
    }
}
