use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[cfg(test)] use mockall::automock;
use tracing::debug;

use crate::messaging::envelope::Envelope;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Seam for inspecting or rewriting every envelope a service sends or receives. Returning
///  `None` drops the envelope before it reaches a handler (inbound) or the wire (outbound).
#[cfg_attr(test, automock)]
pub trait EnvelopeFilter: Send + Sync + 'static {
    fn apply(&self, direction: Direction, envelope: Envelope) -> Option<Envelope>;
}

/// Appends one log record per envelope to a file and passes everything through unchanged.
///  Useful for capturing a session for offline analysis.
pub struct FileDumpFilter {
    out: Mutex<File>,
}

impl FileDumpFilter {
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<FileDumpFilter> {
        let file = File::create(path.as_ref())?;
        debug!("dumping envelopes to {:?}", path.as_ref());
        Ok(FileDumpFilter {
            out: Mutex::new(file),
        })
    }
}

impl EnvelopeFilter for FileDumpFilter {
    fn apply(&self, direction: Direction, envelope: Envelope) -> Option<Envelope> {
        let tag = match direction {
            Direction::Inbound => "IN ",
            Direction::Outbound => "OUT",
        };

        let mut out = self.out.lock().unwrap();
        if let Err(e) = writeln!(out, "{} {:?} ts={} len={}", tag, envelope.kind, envelope.timestamp_micros, envelope.payload.len()) {
            debug!("error writing envelope dump: {}", e);
        }

        Some(envelope)
    }
}
