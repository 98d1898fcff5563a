//! Key-id rewrite for modern-codec streams
//!
//! Every `tenc` box in the file gets its default key id replaced by a
//! sequential identifier: the occurrence number as 32 zero-padded decimal
//! digits, read as hex. The first box gets all zeros (paired with the
//! catch-all default key), the second gets `…01` (paired with the content
//! key), matching the two `--key` arguments passed to mp4decrypt.

use crate::error::Result;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Box type marking a track encryption box
pub const TENC_MARKER: &[u8; 4] = b"tenc";

/// Default read size for the scan
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Offset of the default key id from the start of the marker
const KID_OFFSET: u64 = 12;

/// Length of a key id
const KID_LEN: u64 = 16;

/// Key id written into the `count`-th `tenc` box (0-based)
pub fn sequential_key_id(count: usize) -> io::Result<[u8; 16]> {
    let bytes = hex::decode(format!("{count:032}"))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    bytes
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "key id is not 16 bytes"))
}

/// Rewrite key ids in place, returning how many boxes were patched
///
/// Markers straddling chunk boundaries are found. After a match the scan
/// resumes past the marker's key-id offset. A marker too close to the end
/// of the file to hold a full key id is left alone.
pub fn rewrite_key_ids_in<F: Read + Write + Seek>(file: &mut F, chunk_size: usize) -> io::Result<usize> {
    let len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    let offsets = find_markers(file, chunk_size)?;

    let mut patched = 0;
    for offset in offsets {
        if offset + KID_OFFSET + KID_LEN > len {
            tracing::debug!(offset, "tenc box truncated, key id not rewritten");
            continue;
        }
        let kid = sequential_key_id(patched)?;
        file.seek(SeekFrom::Start(offset + KID_OFFSET))?;
        file.write_all(&kid)?;
        patched += 1;
    }

    file.flush()?;
    Ok(patched)
}

fn find_markers<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<Vec<u64>> {
    let marker_len = TENC_MARKER.len();
    let mut buf = vec![0u8; chunk_size.max(marker_len)];
    // unscanned tail of the previous chunk plus the current chunk
    let mut window: Vec<u8> = Vec::with_capacity(buf.len() + marker_len);
    let mut window_start: u64 = 0;
    let mut next_allowed: u64 = 0;
    let mut offsets = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        window.extend_from_slice(&buf[..n]);

        for (i, candidate) in window.windows(marker_len).enumerate() {
            let absolute = window_start + i as u64;
            if absolute >= next_allowed && candidate == TENC_MARKER {
                offsets.push(absolute);
                next_allowed = absolute + KID_OFFSET + 1;
            }
        }

        let keep = window.len().min(marker_len - 1);
        let consumed = window.len() - keep;
        window.drain(..consumed);
        window_start += consumed as u64;
    }

    Ok(offsets)
}

/// Rewrite key ids of a file on disk on the blocking pool
pub async fn rewrite_key_ids(path: &Path) -> Result<usize> {
    let path = path.to_path_buf();
    let patched = tokio::task::spawn_blocking(move || -> io::Result<usize> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)?;
        rewrite_key_ids_in(&mut file, DEFAULT_CHUNK_SIZE)
    })
    .await??;

    tracing::debug!(patched, "rewrote tenc key ids");
    Ok(patched)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// `tenc` followed by 8 filler bytes and a recognizable 16-byte key id
    fn tenc_box() -> Vec<u8> {
        let mut b = TENC_MARKER.to_vec();
        b.extend_from_slice(&[0xAA; 8]);
        b.extend_from_slice(&[0xEE; 16]);
        b
    }

    fn kid_at(data: &[u8], marker: usize) -> &[u8] {
        &data[marker + 12..marker + 28]
    }

    #[test]
    fn test_sequential_key_id_decimal_digits_as_hex() {
        assert_eq!(sequential_key_id(0).unwrap(), [0u8; 16]);

        let mut one = [0u8; 16];
        one[15] = 0x01;
        assert_eq!(sequential_key_id(1).unwrap(), one);

        // decimal 10 becomes the byte 0x10, not 0x0a
        let mut ten = [0u8; 16];
        ten[15] = 0x10;
        assert_eq!(sequential_key_id(10).unwrap(), ten);

        let mut big = [0u8; 16];
        big[14] = 0x01;
        big[15] = 0x23;
        assert_eq!(sequential_key_id(123).unwrap(), big);
    }

    #[test]
    fn test_rewrites_each_box_in_order() {
        let mut data = vec![0u8; 10];
        let first = data.len();
        data.extend(tenc_box());
        data.extend(vec![0u8; 100]);
        let second = data.len();
        data.extend(tenc_box());

        let mut cursor = Cursor::new(data);
        let patched = rewrite_key_ids_in(&mut cursor, 4096).unwrap();
        let data = cursor.into_inner();

        assert_eq!(patched, 2);
        assert_eq!(kid_at(&data, first), &sequential_key_id(0).unwrap());
        assert_eq!(kid_at(&data, second), &sequential_key_id(1).unwrap());
        // filler between marker and key id untouched
        assert_eq!(&data[first + 4..first + 12], &[0xAA; 8]);
    }

    #[test]
    fn test_marker_at_start_of_file() {
        let mut cursor = Cursor::new(tenc_box());
        assert_eq!(rewrite_key_ids_in(&mut cursor, 16).unwrap(), 1);
        assert_eq!(kid_at(cursor.get_ref(), 0), &[0u8; 16]);
    }

    #[test]
    fn test_marker_straddling_chunk_boundary() {
        for split in 1..4 {
            let chunk = 32;
            let mut data = vec![0u8; chunk - split];
            let marker = data.len();
            data.extend(tenc_box());
            data.extend(vec![0u8; 40]);

            let mut cursor = Cursor::new(data);
            let patched = rewrite_key_ids_in(&mut cursor, chunk).unwrap();
            assert_eq!(patched, 1, "split {split}");
            assert_eq!(kid_at(cursor.get_ref(), marker), &[0u8; 16]);
        }
    }

    #[test]
    fn test_truncated_box_left_alone() {
        let mut data = vec![1u8; 20];
        data.extend_from_slice(TENC_MARKER);
        data.extend_from_slice(&[0xEE; 10]);
        let original = data.clone();

        let mut cursor = Cursor::new(data);
        assert_eq!(rewrite_key_ids_in(&mut cursor, 8).unwrap(), 0);
        assert_eq!(cursor.into_inner(), original);
    }

    #[test]
    fn test_no_marker_no_change() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut cursor = Cursor::new(data.clone());
        assert_eq!(rewrite_key_ids_in(&mut cursor, 4096).unwrap(), 0);
        assert_eq!(cursor.into_inner(), data);
    }

    #[tokio::test]
    async fn test_rewrite_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_encrypted.m4a");
        let mut data = vec![0u8; 5000];
        data.extend(tenc_box());
        data.extend(vec![0u8; 5000]);
        std::fs::write(&path, &data).unwrap();

        assert_eq!(rewrite_key_ids(&path).await.unwrap(), 1);
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), data.len());
        assert_eq!(kid_at(&written, 5000), &[0u8; 16]);
    }

    #[tokio::test]
    async fn test_rewrite_missing_file_is_io_error() {
        let err = rewrite_key_ids(Path::new("/nonexistent/media-dl/x.m4a"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "io_error");
    }
}
