// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Memory-mapped windows.
//!
//! A [`MappedRegion`] is a `MAP_SHARED` mapping of either a window of
//! physical memory exposed through a device file (`/dev/mem` or a dedicated
//! driver), a regular file used to share state between processes, or an
//! anonymous mapping used by the simulated device.
//!
//! All accessors take `&self`: the contents of a mapping can change under the
//! process at any time (the DMA engine or another process writes to it), so
//! every 32-bit register access is volatile.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use crate::types::{DmaError, DmaResult};

/// An owned `MAP_SHARED` mapping. Unmapped on drop.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    path: PathBuf,
    offset: u64,
}

// The mapping is plain shared memory and all accesses go through raw
// pointers, so it can be moved and shared across threads.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

/// The system page size in bytes.
#[must_use]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

impl MappedRegion {
    /// Map `len` bytes of physical memory starting at `physical_offset`
    /// through a device file opened with `O_SYNC` (uncached).
    pub fn open_device(path: &Path, physical_offset: u64, len: usize) -> DmaResult<Self> {
        if physical_offset % page_size() as u64 != 0 {
            return Err(DmaError::OutOfWindow {
                what: "physical offset is not page aligned",
                offset: physical_offset,
                len: len as u64,
                size: page_size() as u64,
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|source| map_error(path, physical_offset, len, source))?;
        Self::map_fd(file.as_raw_fd(), path, physical_offset, len)
    }

    /// Create (or truncate) a file of `len` zero bytes and map it.
    pub fn create_shared(path: &Path, len: usize) -> DmaResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| map_error(path, 0, len, source))?;
        file.set_len(len as u64)?;
        Self::map_fd(file.as_raw_fd(), path, 0, len)
    }

    /// Map an existing file created by [`MappedRegion::create_shared`].
    ///
    /// The whole file is mapped.
    pub fn open_shared(path: &Path) -> DmaResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| map_error(path, 0, 0, source))?;
        let len = usize::try_from(file.metadata()?.len()).map_err(|_| DmaError::OutOfWindow {
            what: "shared file is too large to map",
            offset: 0,
            len: 0,
            size: usize::MAX as u64,
        })?;
        Self::map_fd(file.as_raw_fd(), path, 0, len)
    }

    /// Create an anonymous shared mapping of `len` zero bytes.
    pub fn anonymous(len: usize) -> DmaResult<Self> {
        Self::map_fd(-1, Path::new("[anonymous]"), 0, len)
    }

    fn map_fd(fd: libc::c_int, path: &Path, offset: u64, len: usize) -> DmaResult<Self> {
        if len == 0 {
            return Err(map_error(
                path,
                offset,
                len,
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            ));
        }
        let file_offset = libc::off_t::try_from(offset).map_err(|_| DmaError::OutOfWindow {
            what: "offset is not representable as off_t",
            offset,
            len: len as u64,
            size: libc::off_t::MAX as u64,
        })?;
        let flags = if fd < 0 {
            libc::MAP_SHARED | libc::MAP_ANONYMOUS
        } else {
            libc::MAP_SHARED
        };

        // SAFETY: a fresh mapping is requested (no fixed address) so no
        // existing memory is affected.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                fd,
                file_offset,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(map_error(
                path,
                offset,
                len,
                std::io::Error::last_os_error(),
            ));
        }
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or_else(|| {
            map_error(
                path,
                offset,
                len,
                std::io::Error::from(std::io::ErrorKind::AddrNotAvailable),
            )
        })?;

        Ok(Self {
            ptr,
            len,
            path: path.to_path_buf(),
            offset,
        })
    }

    /// Size of the mapping in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The file (or device) backing this mapping.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset within the backing file where the mapping starts.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Base pointer of the mapping.
    ///
    /// Used to lay out shared structures (e.g. atomics) over the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Check that `len` bytes at `offset` are inside the mapping.
    pub fn check(&self, what: &'static str, offset: usize, len: usize) -> DmaResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(DmaError::OutOfWindow {
                what,
                offset: offset as u64,
                len: len as u64,
                size: self.len as u64,
            }),
        }
    }

    /// Volatile little-endian read of the 32-bit word at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word is not 4-byte aligned or is outside the mapping.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let word = self.word_ptr(offset);
        // SAFETY: word_ptr checked bounds and alignment.
        u32::from_le(unsafe { ptr::read_volatile(word) })
    }

    /// Volatile little-endian write of the 32-bit word at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word is not 4-byte aligned or is outside the mapping.
    pub fn write_u32(&self, offset: usize, value: u32) {
        let word = self.word_ptr(offset);
        // SAFETY: word_ptr checked bounds and alignment.
        unsafe { ptr::write_volatile(word, value.to_le()) };
    }

    fn word_ptr(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.len,
            "32-bit access at {offset:#x} outside {:#x} byte window of {}",
            self.len,
            self.path.display()
        );
        // SAFETY: in bounds, checked above.
        unsafe { self.ptr.as_ptr().add(offset).cast::<u32>() }
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// The caller must make sure nothing writes these bytes while the slice
    /// is alive (for ring slots this is the ownership hand-over).
    pub fn bytes(&self, offset: usize, len: usize) -> DmaResult<&[u8]> {
        self.check("read", offset, len)?;
        // SAFETY: in bounds, checked above.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) })
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> DmaResult<()> {
        self.check("write", offset, data.len())?;
        // SAFETY: in bounds, checked above; `data` cannot overlap a mapping
        // that is only reachable through this raw pointer.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe a mapping created by map_fd.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len);
        }
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MappedRegion({} @ {:#x}, {:#x} bytes)",
            self.path.display(),
            self.offset,
            self.len
        )
    }
}

fn map_error(path: &Path, offset: u64, len: usize, source: std::io::Error) -> DmaError {
    DmaError::Map {
        path: path.to_path_buf(),
        offset,
        len,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_words_are_little_endian() {
        let region = MappedRegion::anonymous(4096).unwrap();
        region.write_u32(8, 0x1122_3344);
        assert_eq!(region.read_u32(8), 0x1122_3344);
        assert_eq!(region.bytes(8, 4).unwrap(), &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    #[should_panic]
    fn word_outside_window_panics() {
        let region = MappedRegion::anonymous(4096).unwrap();
        let _ = region.read_u32(4096);
    }

    #[test]
    fn byte_access_is_bounds_checked() {
        let region = MappedRegion::anonymous(64).unwrap();
        assert!(region.write_bytes(60, &[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            region.write_bytes(61, &[1, 2, 3, 4]),
            Err(DmaError::OutOfWindow { .. })
        ));
        assert!(region.bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn shared_file_is_seen_by_a_second_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring");
        let first = MappedRegion::create_shared(&path, 8192).unwrap();
        let second = MappedRegion::open_shared(&path).unwrap();
        assert_eq!(second.len(), 8192);

        first.write_u32(4, 0xdead_beef);
        assert_eq!(second.read_u32(4), 0xdead_beef);
    }

    #[test]
    fn unaligned_device_offset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();
        assert!(MappedRegion::open_device(&path, 0x10, 64).is_err());
        assert!(MappedRegion::open_device(&path, 0, 64).is_ok());
    }
}
