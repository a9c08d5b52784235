use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;

static LOGGER: Stderr = Stderr;

/// Writes log records to stderr, so they never mix with a report written to stdout.
struct Stderr;

impl Log for Stderr {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let stderr = std::io::stderr();
        let mut stderr = stderr.lock();
        let _ = match (record.level(), record.file(), record.line()) {
            (Level::Debug | Level::Trace, Some(file), Some(line)) => {
                writeln!(stderr, "[{}] {}:{}: {}", record.level(), file, line, record.args())
            }
            _ => writeln!(stderr, "[{}] {}", record.level(), record.args()),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbose: u8) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level_for(verbose));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(3), LevelFilter::Trace);
        assert_eq!(level_for(u8::MAX), LevelFilter::Trace);
    }
}
