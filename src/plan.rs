use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One contiguous byte range of the source resource plus the sidecar file
/// that holds it until the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub id: usize,
    /// Inclusive.
    pub start: u64,
    /// Inclusive. The last part ends at the file size itself, one byte past
    /// EOF; servers clip the range.
    pub end: u64,
    pub file_path: PathBuf,
}

impl Part {
    /// Value for the `Range` request header.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Length the progress display measures against (`end - start`, never 0).
    pub fn display_len(&self) -> u64 {
        (self.end - self.start).max(1)
    }
}

pub fn sidecar_path(output: &Path, id: usize) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(format!("-part-{}.tmp", id));
    PathBuf::from(name)
}

/// Splits `[0, file_size]` into `count` parts whose sidecars sit next to `output`.
pub fn plan_parts(file_size: u64, count: usize, output: &Path) -> Result<Vec<Part>> {
    if file_size == 0 || count == 0 || count as u64 > file_size {
        return Err(Error::InvalidPlan {
            file_size,
            parts: count,
        });
    }

    let part_size = file_size / count as u64;
    let parts = (0..count)
        .map(|i| {
            let start = i as u64 * part_size;
            let end = if i == count - 1 {
                file_size
            } else {
                start + part_size - 1
            };
            Part {
                id: i,
                start,
                end,
                file_path: sidecar_path(output, i),
            }
        })
        .collect();

    Ok(parts)
}
