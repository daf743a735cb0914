//! Structured, aligned rendering of decoded data.

/// Where rendered output goes.
#[derive(Debug, Clone)]
pub enum LogOutput {
    Log(log::Level),
    LogTarget(log::Level, String),
    StdOut,
    StdErr,
    #[cfg(feature = "log-to-file")]
    File(std::sync::Arc<parking_lot::Mutex<std::fs::File>>),
}

impl From<log::Level> for LogOutput {
    fn from(value: log::Level) -> Self {
        Self::Log(value)
    }
}

impl LogOutput {
    pub(crate) fn print(&self, msg: &str) {
        match self {
            LogOutput::Log(level) => log::log!(*level, "{msg}"),
            LogOutput::LogTarget(level, target) => log::log!(target: target, *level, "{msg}"),
            LogOutput::StdOut => println!("{msg}"),
            LogOutput::StdErr => eprintln!("{msg}"),
            #[cfg(feature = "log-to-file")]
            LogOutput::File(file) => {
                use std::io::Write;

                let mut file = file.lock();
                file.write_all(msg.as_bytes()).ok();
                file.write_all(b"\n").ok();
            }
        }
    }
}

/// A single line of structured output: an indent level, a title and an
/// optional value.
#[derive(Debug)]
pub struct LogItem {
    level: usize,
    title: String,
    value: Option<String>,
}

impl<T: ToString, V: ToString> From<(usize, T, V)> for LogItem {
    fn from((level, title, value): (usize, T, V)) -> Self {
        Self {
            level,
            title: title.to_string(),
            value: Some(value.to_string()),
        }
    }
}

impl<T: ToString> From<(usize, T)> for LogItem {
    fn from((level, title): (usize, T)) -> Self {
        Self {
            level,
            title: title.to_string(),
            value: None,
        }
    }
}

/// Anything that can be rendered as a block of [`LogItem`]s. The first item
/// is the block header.
pub trait Loggable {
    fn as_log(&self) -> Vec<LogItem>;
}

pub struct Logger;

impl Logger {
    pub fn log<T>(output: &LogOutput, loggable: &T)
    where
        T: Loggable,
    {
        let items = loggable.as_log();

        let mut lines = items.iter();
        if let Some(header) = lines.next() {
            output.print(&header.title);
        }

        // Right-align values against the widest title in the block.
        let title_width = items
            .iter()
            .skip(1)
            .map(|item| item.title.len())
            .max()
            .unwrap_or(0);

        for item in lines {
            let indent = "  ".repeat(item.level);
            match &item.value {
                Some(value) => {
                    let pad = " ".repeat(title_width - item.title.len());
                    output.print(&format!("{indent}{}: {pad}{value}", item.title));
                }
                None => output.print(&format!("{indent}{}", item.title)),
            }
        }
    }
}

/// Build a `Vec<LogItem>` from `(level, title)` and `(level, title, value)`
/// tuples.
#[macro_export]
macro_rules! log_vec {
    [$($item:expr),* $(,)?] => {
        vec![$($crate::LogItem::from($item)),*]
    };
}
