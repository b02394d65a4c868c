//! Chunked file-to-file copy / 分块复制
//!
//! Chunk sizes follow the negotiated read limit so each chunk is a single
//! request on the wire.

use crate::storage::{BinaryFile, FsResult};

/// File to file copy, used when a move crosses shares / 文件间复制
pub async fn copy_file(
    src: &mut dyn BinaryFile,
    dst: &mut dyn BinaryFile,
    chunk_size: usize,
) -> FsResult<u64> {
    let mut total = 0u64;
    loop {
        let chunk = src.read(Some(chunk_size.max(1))).await?;
        if chunk.is_empty() {
            break;
        }
        dst.write_all(&chunk).await?;
        total += chunk.len() as u64;
        tracing::trace!("SMB: copied {} bytes", total);
    }
    Ok(total)
}
