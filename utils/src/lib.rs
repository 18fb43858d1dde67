use std::io::BufWriter;
use std::io::Write;

/// All user visible output of the tools is routed through an emitter,
/// so tests and drivers can capture it by passing buffer-backed sinks.
pub struct DiagnosticEmitter {
    out: BufWriter<Box<dyn Write>>,
    err: BufWriter<Box<dyn Write>>,
}

impl DiagnosticEmitter {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            out: BufWriter::new(out),
            err: BufWriter::new(err),
        }
    }

    /// Emitter writing into in-memory buffers, for tests.
    pub fn log_to_buffer() -> Self {
        Self::new(Box::new(Vec::new()), Box::new(Vec::new()))
    }

    pub fn out(&mut self, msg: &str) {
        self.out
            .write_all(msg.as_bytes())
            .expect("Failed to write to output buffer.");
    }

    pub fn out_ln(&mut self, msg: &str) {
        self.out(msg);
        self.out("\n");
    }

    pub fn err(&mut self, msg: &str) {
        self.err
            .write_all(msg.as_bytes())
            .expect("Failed to write to error buffer.");
    }

    pub fn err_ln(&mut self, msg: &str) {
        self.err(msg);
        self.err("\n");
    }

    /// Report an error that is not attached to any particular item.
    pub fn error(&mut self, line: u32, message: &str) {
        self.report(line, "", message);
    }

    pub fn report(&mut self, line: u32, item: &str, message: &str) {
        self.err(&format!("[line {line}] Error {item}: {message}\n"));
    }

    pub fn out_buffer(&self) -> &str {
        core::str::from_utf8(self.out.buffer()).expect("Failed to create string from bytes.")
    }

    pub fn err_buffer(&self) -> &str {
        core::str::from_utf8(self.err.buffer()).expect("Failed to create string from bytes.")
    }

    pub fn flush(&mut self) {
        self.out.flush().expect("Failed to flush output buffer.");
        self.err.flush().expect("Failed to flush error buffer.");
    }
}

impl Drop for DiagnosticEmitter {
    fn drop(&mut self) {
        self.flush();
    }
}
