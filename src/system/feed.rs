//! Reader for the sampler's append-only output file.
//!
//! The sampler appends one plist document per interval. The file is read
//! whole on every tick and the most recently completed document is cut out;
//! a torn trailing write just fails the marker search until the next tick.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CollectorError, Result};

pub const START_MARKER: &[u8] = b"<?xml";
pub const END_MARKER: &[u8] = b"</plist>";

pub struct FeedReader {
    path: PathBuf,
}

impl FeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FeedReader { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate (or create) the feed file so stale records are not replayed.
    pub fn reset(&self) -> Result<()> {
        fs::write(&self.path, b"").map_err(|source| CollectorError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// The latest complete record, or `None` when the file is missing,
    /// empty or holds no complete document yet.
    pub fn read_next_record(&self) -> Option<Vec<u8>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("feed {} unreadable: {e}", self.path.display());
                return None;
            }
        };
        last_complete_record(&data).map(<[u8]>::to_vec)
    }
}

/// Slice out the last `<?xml ... </plist>` span, markers included.
pub fn last_complete_record(data: &[u8]) -> Option<&[u8]> {
    let end = rfind(data, END_MARKER)? + END_MARKER.len();
    let start = rfind(&data[..end - END_MARKER.len()], START_MARKER)?;
    Some(&data[start..end])
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
