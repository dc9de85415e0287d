use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::XxHash64;

/// Cheap content signature used to recognise a file after it moved.
///
/// XxHash64 over the first `prefix_len` bytes, the byte size and the mtime.
/// Identical bytes with identical size/mtime always produce the same value;
/// distinct files can collide, so callers treat a match as a hint, not a proof.
pub fn compute_fingerprint(
    path: &Path,
    file_size: u64,
    last_modified: i64,
    prefix_len: usize,
) -> io::Result<String> {
    let prefix = read_portion(path, prefix_len)?;
    Ok(fingerprint_bytes(&prefix, file_size, last_modified))
}

pub fn fingerprint_bytes(prefix: &[u8], file_size: u64, last_modified: i64) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(prefix);
    hasher.write_u64(file_size);
    hasher.write_i64(last_modified);
    format!("{:016x}", hasher.finish())
}

fn read_portion(file: &Path, len: usize) -> io::Result<Vec<u8>> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(len.min(1 << 20));
    f.take(len as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}
