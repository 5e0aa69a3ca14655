use core::fmt;
use core::fmt::Write;
use log::{Level, Log, Metadata, Record, SetLoggerError};

/// A [`Log`] implementation that forwards records to the SBI firmware console.
#[derive(Debug)]
pub struct KernelLogger {
    pub max_log_level: Level,
}

impl KernelLogger {
    pub const fn new(max_log_level: Level) -> KernelLogger {
        KernelLogger { max_log_level }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self).map(|_| log::set_max_level(self.max_log_level.to_level_filter()))
    }
}

/// Helper struct that turns [`fmt::Arguments`] into console output by
/// offloading the rendering to the [`Write`] trait.
struct SbiWriter {}

impl Write for SbiWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // hand each character to the sbi firmware console
        for &char in s.as_bytes() {
            sbi::legacy::console_putchar(char);
        }
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_log_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            SbiWriter {}
                .write_fmt(format_args!(
                    "{} - {}: {}\n",
                    record.level(),
                    record.target(),
                    record.args(),
                ))
                .expect("Could not write log message to Sbi")
        }
    }

    fn flush(&self) {}
}
