use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::types::types::FetchError;

/// Highest `Copy {n}` index tried before giving up on a filename.
pub const MAX_COPY_INDEX: u32 = 9999;

/// Final path component of an item name, used as the local filename so a
/// name like `../x.fits` or `sub/x.fits` lands directly in the destination.
/// `None` when nothing usable is left.
pub fn local_filename(name: &str) -> Option<&str> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?;
    match last {
        "" | "." | ".." => None,
        s => Some(s),
    }
}

/// Splits a filename into stem and extension, the extension keeping its dot.
/// A leading dot does not start an extension (`.hidden` has none).
pub fn split_stem_ext(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 && filename[..idx].chars().any(|c| c != '.') => {
            (&filename[..idx], &filename[idx..])
        }
        _ => (filename, ""),
    }
}

/// Name of the `n`th copy: `"{stem} Copy {n}{ext}"`.
pub fn copy_name(filename: &str, n: u32) -> String {
    let (stem, ext) = split_stem_ext(filename);
    format!("{} Copy {}{}", stem, n, ext)
}

/// Returns `dir/filename` if nothing exists there, otherwise the first free
/// `dir/"{stem} Copy {n}{ext}"` for n = 1, 2, 3, …
///
/// Check only: another writer may claim the returned path before it is
/// created. [`create_destination`] walks the same sequence atomically.
pub fn resolve_destination(dir: &Path, filename: &str) -> PathBuf {
    let filename = local_filename(filename).unwrap_or(filename);
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(copy_name(filename, n));
        if !candidate.exists() {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

/// Claims the first free name of the [`resolve_destination`] sequence with
/// `create_new`, so two writers can never end up with the same path.
pub async fn create_destination(dir: &Path, filename: &str) -> Result<(PathBuf, File), FetchError> {
    let filename =
        local_filename(filename).ok_or_else(|| FetchError::InvalidFilename(filename.to_string()))?;
    let candidates = std::iter::once(filename.to_string())
        .chain((1..=MAX_COPY_INDEX).map(|n| copy_name(filename, n)));

    for name in candidates {
        let path = dir.join(&name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log::debug!("[writer] {:?} taken, trying next copy name", path);
                continue;
            }
            Err(e) => return Err(FetchError::Disk(e)),
        }
    }

    Err(FetchError::NameSpaceExhausted(filename.to_string()))
}

/// Copies `source` into `file` in `chunk_size` reads until the source is
/// exhausted. `on_chunk` gets the length of every chunk written.
pub async fn write_stream<R>(
    file: File,
    mut source: R,
    chunk_size: usize,
    mut on_chunk: impl FnMut(u64),
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        on_chunk(n as u64);
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(total)
}

/// Creates a collision-free destination for `filename` in `dir` and streams
/// `source` into it. A destination left half-written by a failed copy is
/// removed before the error is returned.
pub async fn save_stream<R>(
    dir: &Path,
    filename: &str,
    source: R,
    chunk_size: usize,
    on_chunk: impl FnMut(u64),
) -> Result<PathBuf, FetchError>
where
    R: AsyncRead + Unpin,
{
    let (path, file) = create_destination(dir, filename).await?;
    log::debug!("[writer] {} -> {:?}", filename, path);

    match write_stream(file, source, chunk_size, on_chunk).await {
        Ok(bytes) => {
            log::info!("[writer] wrote {} bytes to {:?}", bytes, path);
            Ok(path)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                log::warn!("[writer] could not remove partial file {:?}: {}", path, rm);
            }
            Err(FetchError::Disk(e))
        }
    }
}
