//! Size-adaptive content hashing.
//!
//! Every strategy produces the XXH3 value of the file's bytes, so the hash of
//! a file never depends on which strategy read it.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use memmap2::Mmap;
use tracing::debug;
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

use fsdelta_core::{EMPTY_HASH, format_hash};

/// Files below this size are read whole into a pooled buffer.
pub const SMALL_FILE_LIMIT: u64 = 64 * 1024;

/// Files above this size are memory-mapped.
pub const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Files above this size are dropped from the page cache after hashing.
pub const DROP_CACHE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Hashes file contents, choosing an I/O strategy by size.
///
/// Read buffers are recycled through a pool shared by all workers. Pooled
/// buffers never exceed the streaming chunk or small-file limit in capacity.
#[derive(Debug)]
pub struct ContentHasher {
    buffer_size: usize,
    pool: Mutex<Vec<Vec<u8>>>,
}

impl ContentHasher {
    /// Create a hasher whose streaming reads use `buffer_size` byte chunks.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Hash the file at `path`, whose size was reported as `size`.
    ///
    /// Zero-byte files get [`EMPTY_HASH`] without being opened.
    pub fn hash_file(&self, path: &Path, size: u64) -> io::Result<String> {
        if size == 0 {
            return Ok(EMPTY_HASH.to_string());
        }

        let file = File::open(path)?;
        let value = if size < SMALL_FILE_LIMIT {
            self.hash_whole(file)?
        } else if size <= MMAP_THRESHOLD {
            self.hash_streaming(&file)?
        } else {
            let value = match map_file(&file) {
                Ok(map) => xxh3_64(&map),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "mmap failed, streaming instead");
                    self.hash_streaming(&file)?
                }
            };
            if size > DROP_CACHE_THRESHOLD {
                drop_from_cache(&file);
            }
            value
        };

        Ok(format_hash(value))
    }

    /// One-shot hash of a small file. At most [`SMALL_FILE_LIMIT`] bytes are
    /// read at once; a file that grew past it since the stat is finished by
    /// streaming.
    fn hash_whole(&self, mut file: File) -> io::Result<u64> {
        let mut buf = self.take_buffer();
        buf.clear();
        let result = self.hash_capped(&mut file, &mut buf);
        self.return_buffer(buf);
        result
    }

    fn hash_capped(&self, file: &mut File, buf: &mut Vec<u8>) -> io::Result<u64> {
        let read = file.by_ref().take(SMALL_FILE_LIMIT).read_to_end(buf)?;
        if (read as u64) < SMALL_FILE_LIMIT {
            return Ok(xxh3_64(buf));
        }

        let mut hasher = Xxh3::new();
        hasher.update(buf);
        buf.resize(self.buffer_size, 0);
        stream_into(&mut hasher, file, buf)?;
        Ok(hasher.digest())
    }

    fn hash_streaming(&self, mut file: &File) -> io::Result<u64> {
        let mut buf = self.take_buffer();
        buf.resize(self.buffer_size, 0);

        let mut hasher = Xxh3::new();
        let result = stream_into(&mut hasher, &mut file, &mut buf).map(|()| hasher.digest());

        self.return_buffer(buf);
        result
    }

    fn take_buffer(&self) -> Vec<u8> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    /// Buffers that grew past the largest size any strategy asks for are dropped.
    fn return_buffer(&self, buf: Vec<u8>) {
        if buf.capacity() > self.max_pooled_capacity() {
            return;
        }
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }

    fn max_pooled_capacity(&self) -> usize {
        self.buffer_size.max(SMALL_FILE_LIMIT as usize)
    }

    /// Number of idle buffers currently pooled.
    pub fn pooled_buffers(&self) -> usize {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(fsdelta_core::DEFAULT_BUFFER_SIZE)
    }
}

fn stream_into(hasher: &mut Xxh3, reader: &mut impl Read, buf: &mut [u8]) -> io::Result<()> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(()),
            Ok(n) => hasher.update(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Hash an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format_hash(xxh3_64(bytes))
}

/// Hash the target of a symbolic link without following it.
pub fn hash_symlink(path: &Path) -> io::Result<String> {
    let target = std::fs::read_link(path)?;
    Ok(hash_bytes(target.as_os_str().as_encoded_bytes()))
}

/// Hash for a special file (fifo, socket, device), derived from its type tag.
pub fn hash_special(kind: &str) -> String {
    hash_bytes(kind.as_bytes())
}

fn map_file(file: &File) -> io::Result<Mmap> {
    // SAFETY: the map is read-only and dropped before the file handle; a file
    // truncated underneath us surfaces as SIGBUS, the accepted mmap risk.
    unsafe { Mmap::map(file) }
}

#[cfg(target_os = "linux")]
fn drop_from_cache(file: &File) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: plain advisory syscall on a valid descriptor.
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED);
    }
}

#[cfg(not(target_os = "linux"))]
fn drop_from_cache(_file: &File) {}
