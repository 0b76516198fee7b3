use chrono::{DateTime, Local};
use std::io::Write;
use tracing::warn;

use super::i18n::{self, Language};
use crate::models::Status;

/// Everything a status widget shows at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub status: Status,
    pub language: Language,
    pub badge: &'static str,
    pub message: &'static str,
    pub last_checked: Option<String>,
}

impl StatusView {
    pub fn new(status: Status, language: Language, last_checked: Option<DateTime<Local>>) -> Self {
        Self {
            status,
            language,
            badge: i18n::badge(language, status),
            message: i18n::status_message(language, status),
            last_checked: last_checked.map(|at| {
                format!("{}: {}", i18n::last_checked_label(language), at.format("%H:%M:%S"))
            }),
        }
    }

    pub fn disabled(language: Language) -> Self {
        Self {
            status: Status::Unknown,
            language,
            badge: i18n::badge(language, Status::Unknown),
            message: i18n::disabled_message(language),
            last_checked: None,
        }
    }
}

pub trait StatusDisplay: Send {
    fn render(&mut self, view: &StatusView);
}

/// Writes one line per render.
pub struct TerminalDisplay<W> {
    out: W,
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> StatusDisplay for TerminalDisplay<W> {
    fn render(&mut self, view: &StatusView) {
        let line = match &view.last_checked {
            Some(at) => format!("{} {} ({})", view.badge, view.message, at),
            None => format!("{} {}", view.badge, view.message),
        };
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            warn!("Failed to write status line: {}", e);
        }
    }
}
