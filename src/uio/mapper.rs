//! UIO Device Mapping.
//!
//! Opens a UIO character device and maps its register window into the
//! process. The open file and the mapping live and die together inside a
//! single move-only [`UioMapping`].

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use crate::common::constants::WORD_BYTES;
use crate::common::{Result, UioError};

/// An open UIO device file and its shared read/write mapping.
pub struct UioMapping {
    ptr: NonNull<u32>,
    size_words: usize,
    path: PathBuf,
    // Closed after the munmap in `drop`.
    _file: File,
}

// SAFETY: the mapping is process-wide memory owned exclusively by this value.
// All accesses go through `FaultGuard`, which serializes them.
unsafe impl Send for UioMapping {}
unsafe impl Sync for UioMapping {}

impl std::fmt::Debug for UioMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UioMapping")
            .field("path", &self.path)
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size_words", &self.size_words)
            .finish()
    }
}

impl UioMapping {
    /// Opens `<dev_dir>/<uio_name>` and maps `size_words` words of it.
    ///
    /// # Arguments
    ///
    /// * `dev_dir` - Directory holding the device files (normally `/dev`)
    /// * `uio_name` - Device file name, e.g. `uio3`
    /// * `size_words` - Mapping length in 32-bit words
    ///
    /// # Returns
    ///
    /// The mapping, `DeviceOpenFailed` if the file cannot be opened, or
    /// `DeviceMapFailed` if `mmap` fails (the file is closed before returning).
    pub fn open(dev_dir: &Path, uio_name: &str, size_words: usize) -> Result<Self> {
        let path = dev_dir.join(uio_name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&path)
            .map_err(|source| UioError::DeviceOpenFailed {
                path: path.clone(),
                source,
            })?;
        Self::map_file(file, path, size_words)
    }

    fn map_file(file: File, path: PathBuf, size_words: usize) -> Result<Self> {
        let len = match size_words.checked_mul(WORD_BYTES) {
            Some(len) if len > 0 => len,
            _ => {
                return Err(UioError::DeviceMapFailed {
                    path,
                    source: io::Error::from(io::ErrorKind::InvalidInput),
                })
            }
        };

        // SAFETY: a fresh shared mapping of an fd we own; the kernel picks the address.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            drop(file);
            return Err(UioError::DeviceMapFailed { path, source });
        }
        let Some(ptr) = NonNull::new(raw.cast::<u32>()) else {
            drop(file);
            return Err(UioError::DeviceMapFailed {
                path,
                source: io::Error::from(io::ErrorKind::AddrNotAvailable),
            });
        };

        tracing::debug!(
            "mapped {} at {:p} ({:#x} words)",
            path.display(),
            ptr,
            size_words
        );
        Ok(Self {
            ptr,
            size_words,
            path,
            _file: file,
        })
    }

    /// Mapping length in 32-bit words.
    pub fn size_words(&self) -> usize {
        self.size_words
    }

    /// Device file this mapping was created from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pointer to word `word`, or `None` past the end of the mapping.
    #[inline]
    pub fn word_ptr(&self, word: usize) -> Option<*mut u32> {
        if word >= self.size_words {
            return None;
        }
        // SAFETY: `word` is inside the mapped range.
        Some(unsafe { self.ptr.as_ptr().add(word) })
    }
}

impl Drop for UioMapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`size_words` describe the mapping created in `map_file`,
        // and this is the only place it is released.
        let rc = unsafe {
            libc::munmap(
                self.ptr.as_ptr().cast::<libc::c_void>(),
                self.size_words * WORD_BYTES,
            )
        };
        if rc != 0 {
            tracing::warn!(
                "munmap of {} failed: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
    }
}
