//! Step diagnostics.
//!
//! Pipeline steps report progress as [`LogEntry`] values which are forwarded
//! to the `log` facade. The binary installs `env_logger`; library users get
//! whatever logger they install (or none).

/// Log level of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
}

/// A single diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level, rendered as leading spaces
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Text as it appears in the log, with indentation and level marker.
    pub fn render(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "⚠ ",
        };
        format!("{}{}{}", "   ".repeat(self.indent as usize), prefix, self.message)
    }

    /// Forward to the `log` facade.
    pub fn emit(&self) {
        let line = self.render();
        match self.level {
            LogLevel::Info | LogLevel::Success => log::info!(target: "flowmetrics", "{}", line),
            LogLevel::Warning => log::warn!(target: "flowmetrics", "{}", line),
        }
    }
}

pub fn log_info(msg: impl Into<String>) {
    LogEntry::info(msg).emit();
}

pub fn log_success(msg: impl Into<String>) {
    LogEntry::success(msg).emit();
}

pub fn log_warning(msg: impl Into<String>) {
    LogEntry::warning(msg).emit();
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LogEntry::info(msg).with_indent(indent).emit();
}

/// Short preview of a list for log lines: first `n` items, then a count.
pub fn preview<T: AsRef<str>>(items: &[T], n: usize) -> String {
    let shown: Vec<&str> = items.iter().take(n).map(|s| s.as_ref()).collect();
    if items.len() > n {
        format!("{} ... +{}", shown.join(", "), items.len() - n)
    } else {
        shown.join(", ")
    }
}
