//! Terminal console
//!
//! Writes `[INFO]` / `[ERROR]` progress lines and reads the operator's answer
//! between cycles. Each line is written under a lock so lines from concurrent
//! callers never interleave.

use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

use contracts::{Console, ReportLevel};
use tracing::warn;

/// Answer that ends the session
const QUIT: &str = "q";

/// Console over a writer and a line reader
pub struct StdConsole<W, R> {
    writer: Mutex<W>,
    reader: Mutex<R>,
}

impl StdConsole<io::Stdout, io::BufReader<io::Stdin>> {
    /// Console over the process stdout / stdin
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::BufReader::new(io::stdin()))
    }
}

impl<W, R> StdConsole<W, R>
where
    W: Write + Send,
    R: BufRead + Send,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        }
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W, R> Console for StdConsole<W, R>
where
    W: Write + Send,
    R: BufRead + Send,
{
    fn report(&self, level: ReportLevel, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(writer, "{level} {line}").and_then(|()| writer.flush());
        if let Err(e) = written {
            warn!(error = %e, "console write failed");
        }
    }

    fn wait_for_user_continue(&self) -> bool {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut input = String::new();
        match reader.read_line(&mut input) {
            // end of input: nobody left to answer
            Ok(0) => true,
            Ok(_) => input.split_whitespace().next() == Some(QUIT),
            Err(e) => {
                warn!(error = %e, "console read failed, quitting");
                true
            }
        }
    }
}
