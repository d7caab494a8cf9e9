use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::plan::Part;

const BUFFER_SIZE: usize = 64 * 1024;

/// Concatenates the sidecars in part order into `output`, returning the
/// number of bytes written. A failure leaves the partial output behind.
pub async fn merge_parts(parts: &[Part], output: &Path) -> Result<u64> {
    let write_error = |source| Error::MergeWrite {
        path: output.to_path_buf(),
        source,
    };

    let mut out = File::create(output)
        .await
        .map_err(|source| Error::MergeOpen {
            path: output.to_path_buf(),
            source,
        })?;

    let mut ordered: Vec<&Part> = parts.iter().collect();
    ordered.sort_by_key(|part| part.id);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    for part in ordered {
        let path = &part.file_path;
        let mut input = File::open(path).await.map_err(|source| Error::MergeOpen {
            path: path.clone(),
            source,
        })?;

        loop {
            let n = input
                .read(&mut buffer)
                .await
                .map_err(|source| Error::MergeRead {
                    path: path.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n]).await.map_err(write_error)?;
            total += n as u64;
        }
        debug!(part = part.id, "merged");
    }

    out.flush().await.map_err(write_error)?;
    Ok(total)
}
