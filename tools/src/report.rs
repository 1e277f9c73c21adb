use colored::{ColoredString, Colorize};
use pmexplain_common::diagnostics::{DiagnosticEvent, EventSink, Outcome, Severity};
use pmexplain_common::errors::*;
use std::io::{self, Write};

pub trait Fancy {
    fn fancy(&self, text: &str) -> ColoredString;
}

impl Fancy for Severity {
    fn fancy(&self, text: &str) -> ColoredString {
        match self {
            Severity::Critical => text.red().bold(),
            Severity::Error => text.red(),
            Severity::Warning => text.yellow().bold(),
            Severity::Info => text.normal(),
        }
    }
}

impl Fancy for Outcome {
    fn fancy(&self, text: &str) -> ColoredString {
        match self {
            Outcome::Pass => text.green(),
            Outcome::Fail => text.red(),
            Outcome::Info => text.blue(),
            Outcome::None => text.normal(),
        }
    }
}

fn marker(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "[+] ",
        Outcome::Fail => "[-] ",
        Outcome::Info => "[*] ",
        Outcome::None => "",
    }
}

pub fn render(event: &DiagnosticEvent) -> String {
    format!(
        "{:indent$}{}{}",
        "",
        event.outcome.fancy(marker(event.outcome)),
        event.severity.fancy(&event.text),
        indent = event.depth * 2
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Prints events as soon as they are emitted
pub struct ReportWriter<W: Write> {
    out: W,
    format: Format,
    closed: bool,
    fails: usize,
}

impl ReportWriter<io::Stdout> {
    pub fn stdout(format: Format) -> Self {
        ReportWriter::new(io::stdout(), format)
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: Format) -> Self {
        ReportWriter {
            out,
            format,
            closed: false,
            fails: 0,
        }
    }

    /// Number of problems that were reported
    pub fn fails(&self) -> usize {
        self.fails
    }

    fn write(&mut self, event: &DiagnosticEvent) -> Result<()> {
        match self.format {
            Format::Text => writeln!(self.out, "{}", render(event))?,
            Format::Json => {
                serde_json::to_writer(&mut self.out, event)?;
                self.out.write_all(b"\n")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for ReportWriter<W> {
    fn emit(&mut self, event: DiagnosticEvent) {
        trace!("Received event: {:?}", event);
        if event.is_fail() {
            self.fails += 1;
        }
        if self.closed {
            return;
        }
        if let Err(err) = self.write(&event) {
            // most likely a closed pipe, keep classifying but stop printing
            debug!("Failed to write report: {:#}", err);
            self.closed = true;
        }
    }
}
