//! Fixed-layout file-change events.
//!
//! [`FileChangeEvent`] is the event ring's payload: exactly 128 bytes (two
//! 64-byte cache lines), byte-copyable, carrying the path inline so that
//! publishing never touches the heap. Paths longer than
//! [`MAX_EVENT_PATH_LEN`] bytes are rejected at registration time and never
//! reach a publish site; the constructor still refuses them as a guard.

/// File was created since the last poll.
pub const FLAG_CREATE: u8 = 1;
/// File was deleted since the last poll.
pub const FLAG_DELETE: u8 = 2;
/// File changed mtime or size since the last poll.
pub const FLAG_MODIFY: u8 = 4;

/// Inline path buffer length. Registration rejects longer paths.
pub const MAX_EVENT_PATH_LEN: usize = 110;

/// One file-change event, fixed 128-byte layout.
///
/// Layout invariant (checked by test): `size_of::<FileChangeEvent>() == 128`.
/// Events carry no pointers and are safe to copy byte-wise between threads.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FileChangeEvent {
    /// Modification time, nanoseconds since the Unix epoch; zero for deletes
    pub mod_time_nanos: i64,
    /// File size in bytes; zero for deletes
    pub size: i64,
    path: [u8; MAX_EVENT_PATH_LEN],
    path_len: u8,
    /// Bitfield of `FLAG_CREATE` / `FLAG_DELETE` / `FLAG_MODIFY`
    pub flags: u8,
}

impl FileChangeEvent {
    /// Build an event, copying the path into the inline buffer.
    ///
    /// Returns `None` when the path exceeds [`MAX_EVENT_PATH_LEN`] bytes;
    /// callers upstream reject such paths, so `None` here indicates a bug
    /// rather than a user error.
    pub fn new(path: &str, flags: u8, mod_time_nanos: i64, size: i64) -> Option<Self> {
        let bytes = path.as_bytes();
        if bytes.len() > MAX_EVENT_PATH_LEN {
            return None;
        }
        let mut buf = [0u8; MAX_EVENT_PATH_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            mod_time_nanos,
            size,
            path: buf,
            path_len: bytes.len() as u8,
            flags,
        })
    }

    /// All-zero event used to initialize ring slots.
    pub(crate) fn zeroed() -> Self {
        Self {
            mod_time_nanos: 0,
            size: 0,
            path: [0u8; MAX_EVENT_PATH_LEN],
            path_len: 0,
            flags: 0,
        }
    }

    /// The affected path.
    ///
    /// The buffer was copied from a valid `&str`, so decoding cannot fail;
    /// a corrupted buffer decodes as empty rather than panicking.
    pub fn path(&self) -> &str {
        let len = (self.path_len as usize).min(MAX_EVENT_PATH_LEN);
        std::str::from_utf8(&self.path[..len]).unwrap_or("")
    }

    pub fn is_create(&self) -> bool {
        self.flags & FLAG_CREATE != 0
    }

    pub fn is_delete(&self) -> bool {
        self.flags & FLAG_DELETE != 0
    }

    pub fn is_modify(&self) -> bool {
        self.flags & FLAG_MODIFY != 0
    }
}

impl std::fmt::Debug for FileChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChangeEvent")
            .field("path", &self.path())
            .field("flags", &self.flags)
            .field("mod_time_nanos", &self.mod_time_nanos)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Layout invariant: exactly two cache lines, no padding drift.
    #[test]
    fn test_event_is_exactly_128_bytes() {
        assert_eq!(std::mem::size_of::<FileChangeEvent>(), 128);
        assert_eq!(std::mem::align_of::<FileChangeEvent>(), 8);
    }

    #[test]
    fn test_round_trips_path_and_flags() {
        let event =
            FileChangeEvent::new("/tmp/app/config.json", FLAG_CREATE, 1_700_000_000, 42).unwrap();
        assert_eq!(event.path(), "/tmp/app/config.json");
        assert!(event.is_create());
        assert!(!event.is_delete());
        assert!(!event.is_modify());
        assert_eq!(event.size, 42);
    }

    #[test]
    fn test_rejects_overlong_path() {
        let long = "a".repeat(MAX_EVENT_PATH_LEN + 1);
        assert!(FileChangeEvent::new(&long, FLAG_MODIFY, 0, 0).is_none());

        let exact = "a".repeat(MAX_EVENT_PATH_LEN);
        assert!(FileChangeEvent::new(&exact, FLAG_MODIFY, 0, 0).is_some());
    }

    #[test]
    fn test_combined_flags() {
        let event = FileChangeEvent::new("x", FLAG_CREATE | FLAG_MODIFY, 0, 0).unwrap();
        assert!(event.is_create());
        assert!(event.is_modify());
        assert!(!event.is_delete());
    }
}
