//! Single-writer, single-reader snapshot slots for crossing from
//! non-real-time input handlers into the real-time control thread.
//!
//! A write publishes a complete new value and never blocks. A read returns
//! the most recently published value and never blocks. The slot holds an
//! `Arc` to an immutable value, so a reader can only ever observe a whole
//! value: the one before a concurrent write or the one after it.
//!
//! ```
//! use stance_core::snapshot_channel;
//!
//! let (mut writer, reader) = snapshot_channel([0.0_f64; 3]);
//! writer.write([1.0, 2.0, 3.0]);
//! let snap = reader.read();
//! assert_eq!(*snap, [1.0, 2.0, 3.0]);
//! assert_eq!(snap.version(), 1);
//! ```

use std::ops::Deref;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// A published value together with its write sequence number.
#[derive(Debug)]
struct Versioned<T> {
    version: u64,
    value: T,
}

/// Immutable snapshot handed to the reader.
///
/// Holding a snapshot keeps the value alive even if the writer publishes
/// newer values in the meantime.
#[derive(Debug)]
pub struct Snapshot<T>(Arc<Versioned<T>>);

impl<T> Snapshot<T> {
    /// Number of writes that preceded this value (0 for the initial value).
    pub fn version(&self) -> u64 {
        self.0.version
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.value
    }
}

/// Writing half. Not `Clone`: there is exactly one writer per slot.
#[derive(Debug)]
pub struct SnapshotWriter<T> {
    slot: Arc<ArcSwap<Versioned<T>>>,
    next_version: u64,
}

impl<T> SnapshotWriter<T> {
    /// Publish a new value, replacing the previous one.
    pub fn write(&mut self, value: T) {
        let versioned = Versioned {
            version: self.next_version,
            value,
        };
        self.next_version += 1;
        self.slot.store(Arc::new(versioned));
    }

    /// Number of values written so far.
    pub const fn writes(&self) -> u64 {
        self.next_version - 1
    }
}

/// Reading half. Not `Clone`: there is exactly one reader per slot.
#[derive(Debug)]
pub struct SnapshotReader<T> {
    slot: Arc<ArcSwap<Versioned<T>>>,
}

impl<T> SnapshotReader<T> {
    /// Latest complete value. Wait-free; may be stale if nothing new was written.
    pub fn read(&self) -> Snapshot<T> {
        Snapshot(self.slot.load_full())
    }
}

/// Create a slot holding `initial` (version 0).
pub fn snapshot_channel<T>(initial: T) -> (SnapshotWriter<T>, SnapshotReader<T>) {
    let slot = Arc::new(ArcSwap::from_pointee(Versioned {
        version: 0,
        value: initial,
    }));
    (
        SnapshotWriter {
            slot: Arc::clone(&slot),
            next_version: 1,
        },
        SnapshotReader { slot },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_initial_value() {
        let (writer, reader) = snapshot_channel(42_u32);
        assert_eq!(*reader.read(), 42);
        assert_eq!(reader.read().version(), 0);
        assert_eq!(writer.writes(), 0);
    }

    #[test]
    fn write_overwrites_previous_value() {
        let (mut writer, reader) = snapshot_channel(0_u32);
        writer.write(1);
        writer.write(2);
        writer.write(3);
        let snap = reader.read();
        assert_eq!(*snap, 3);
        assert_eq!(snap.version(), 3);
        assert_eq!(writer.writes(), 3);
    }

    #[test]
    fn held_snapshot_is_not_affected_by_later_writes() {
        let (mut writer, reader) = snapshot_channel(vec![1.0, 2.0]);
        let held = reader.read();
        writer.write(vec![9.0, 9.0, 9.0]);
        assert_eq!(*held, vec![1.0, 2.0]);
        assert_eq!(*reader.read(), vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn concurrent_reader_never_sees_torn_value() {
        const WIDTH: usize = 64;
        const WRITES: u64 = 20_000;

        let (mut writer, reader) = snapshot_channel([0_u64; WIDTH]);

        let producer = std::thread::spawn(move || {
            for k in 1..=WRITES {
                writer.write([k; WIDTH]);
            }
        });

        let mut last_version = 0;
        loop {
            let snap = reader.read();
            let first = snap[0];
            assert!(snap.iter().all(|&v| v == first), "torn snapshot: {:?}", &snap[..4]);
            assert_eq!(first, snap.version(), "value and version disagree");
            assert!(snap.version() >= last_version, "version went backwards");
            last_version = snap.version();
            if last_version == WRITES {
                break;
            }
        }

        producer.join().unwrap();
    }
}
