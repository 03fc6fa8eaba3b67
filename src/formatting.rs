use std::io::{self, Write};
use std::process::ExitCode;

use pms_lib::{PageResult, PmsError};

/// Exit code for a rendered or skipped page.
pub const EXIT_OK: u8 = 0;
/// Exit code when the page could not be found or loaded.
pub const EXIT_NOT_FOUND: u8 = 1;
/// Exit code for fatal errors (config, browser, I/O).
pub const EXIT_ERROR: u8 = 2;

/// Render an error to stderr and return the appropriate exit code.
pub fn render_error(err: PmsError) -> ExitCode {
    let payload = err.to_payload();
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "Error: {}", err);
    if let Some(remediation) = payload.remediation {
        let _ = writeln!(stderr, "Hint: {}", remediation);
    }

    // Reserve exit code 2 for fatal/errors; missing pages use 1.
    ExitCode::from(EXIT_ERROR)
}

/// Write a body to stdout without adding a trailing newline.
pub fn write_body(body: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(body.as_bytes())?;
    stdout.flush()
}

pub fn exit_code_for(result: &PageResult) -> u8 {
    match result {
        PageResult::Success(_) | PageResult::Skipped { .. } => EXIT_OK,
        PageResult::NotFound { .. } => EXIT_NOT_FOUND,
        PageResult::ServerError { .. } => EXIT_ERROR,
    }
}
