//! Terminal rendering of pairing codes.
//!
//! Two QR rows are packed into one terminal row with Unicode half blocks,
//! which keeps the code roughly square in a typical 2:1 terminal cell.

use std::io::{self, Write};
use std::sync::Arc;

use qrcodegen::{QrCode, QrCodeEcc};
use tracing::{info, warn};

const QUIET_ZONE: i32 = 2;

/// Shows a pairing code to the operator.
pub trait QrRenderer: Send + Sync {
    fn render(&self, code: &str);
}

pub type SharedQrRenderer = Arc<dyn QrRenderer>;

/// Prints pairing codes to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalQr;

impl QrRenderer for TerminalQr {
    fn render(&self, code: &str) {
        let Some(lines) = qr_lines(code) else {
            warn!(len = code.len(), "pairing code too long to render as QR");
            return;
        };
        match print_lines(&mut io::stdout().lock(), &lines) {
            Ok(()) => info!("QR code generated, scan it with WhatsApp to authenticate"),
            Err(err) => warn!(error = %err, "failed to write QR code to stdout"),
        }
    }
}

fn print_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Encodes `data` and returns the terminal rows, or `None` if it does not fit a QR code.
pub fn qr_lines(data: &str) -> Option<Vec<String>> {
    let code = QrCode::encode_text(data, QrCodeEcc::Low).ok()?;
    let total = code.size() + QUIET_ZONE * 2;
    // get_module is false outside the symbol, which yields the quiet zone for free
    let dark = |x: i32, y: i32| code.get_module(x - QUIET_ZONE, y - QUIET_ZONE);

    let lines = (0..total)
        .step_by(2)
        .map(|upper| {
            (0..total)
                .map(|x| match (dark(x, upper), upper + 1 < total && dark(x, upper + 1)) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                })
                .collect::<String>()
        })
        .collect();
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_square_block_with_quiet_zone() {
        let lines = qr_lines("2@Xk3pairing,ref,key==").expect("fits");
        let width = lines[0].chars().count();
        // version 2 at low ECC: 25 modules plus the quiet zone on both sides
        assert_eq!(width, 25 + 4);
        assert_eq!(lines.len(), (width + 1) / 2);
        assert!(lines.iter().all(|line| line.chars().count() == width));
        assert!(lines[0].chars().all(|c| c == ' '));
    }

    struct UnflushableWriter(Vec<u8>);

    impl Write for UnflushableWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    #[test]
    fn flush_failure_is_reported() {
        let lines = vec!["ab".to_string(), "cd".to_string()];
        let mut out = UnflushableWriter(Vec::new());

        let err = print_lines(&mut out, &lines).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(out.0, b"ab\ncd\n");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(qr_lines(&"x".repeat(8_000)).is_none());
    }
}
