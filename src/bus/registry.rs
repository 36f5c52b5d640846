//! The bus registry: the runtime's sole arena owner for segments (§9),
//! refcounted by declared-consumer count (§4.E).
//!
//! Structurally grounded in `reserves::cache::ReserveCache`'s HashMap-keyed
//! store-with-counters idiom, generalized from a reserve-roll-forward cache
//! to a segment registry with publish/acquire/release bookkeeping.

use super::aligned::AlignedBuffer;
use super::segment::{BusName, SegmentHandle};
use crate::error::EngineError;
use log::{error, info};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Writable,
    Published,
}

struct Segment {
    version: u32,
    shape: Vec<usize>,
    buffer: AlignedBuffer,
    state: SegmentState,
    declared_consumers: u32,
    pending: u32,
    acquire_count: u32,
    crc: Option<u32>,
}

/// A named, versioned, 16-byte-aligned typed bus. Owns every segment's
/// storage; callers interact through handles and never hold a reference
/// into a segment across a lock boundary -- accessors take a closure
/// instead of returning a borrowed slice.
pub struct Bus {
    segments: Mutex<HashMap<String, Segment>>,
    /// Debug mode: compute and verify a CRC32 over published bytes (§4.E).
    check_integrity: bool,
    last_snapshot: Mutex<Option<(String, Vec<u8>)>>,
}

impl Bus {
    pub fn new(check_integrity: bool) -> Self {
        Self {
            segments: Mutex::new(HashMap::new()),
            check_integrity,
            last_snapshot: Mutex::new(None),
        }
    }

    /// Allocate a new writable segment sized for `shape.iter().product()`
    /// elements of `element_size` bytes each, owned by one producer until
    /// `publish`.
    pub fn allocate(
        &self,
        name: &str,
        shape: &[usize],
        element_size: usize,
        declared_consumers: u32,
    ) -> Result<SegmentHandle, EngineError> {
        let bus_name = BusName::parse(name)?;
        let element_count: usize = shape.iter().product();
        let byte_len = element_count * element_size;

        let mut segments = self.segments.lock().unwrap();
        let version = segments
            .get(bus_name.as_str())
            .map(|s| s.version + 1)
            .unwrap_or(0);

        segments.insert(
            bus_name.as_str().to_string(),
            Segment {
                version,
                shape: shape.to_vec(),
                buffer: AlignedBuffer::new(byte_len),
                state: SegmentState::Writable,
                declared_consumers,
                pending: 0,
                acquire_count: 0,
                crc: None,
            },
        );

        Ok(SegmentHandle {
            name: bus_name,
            version,
            shape: shape.to_vec(),
        })
    }

    /// Exclusive write access before publish. Fails if the segment has
    /// already been published (writable-by-exactly-one-producer, §4.E).
    pub fn write_region<T: Copy, R>(
        &self,
        handle: &SegmentHandle,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> Result<R, EngineError> {
        let mut segments = self.segments.lock().unwrap();
        let segment = self.lookup_mut(&mut segments, &handle.name)?;
        if segment.state != SegmentState::Writable {
            return Err(EngineError::Execution {
                node_id: "bus".to_string(),
                message: format!("segment {} is already published; not writable", handle.name),
            });
        }
        Ok(f(segment.buffer.typed_mut::<T>()))
    }

    /// Transition the segment to readable, set its consumer-pending count
    /// to `handle`'s declared-consumer count, and -- in debug mode --
    /// stamp it with a CRC32 over the published bytes.
    pub fn publish(&self, handle: &SegmentHandle) -> Result<(), EngineError> {
        let mut segments = self.segments.lock().unwrap();
        let segment = self.lookup_mut(&mut segments, &handle.name)?;
        segment.state = SegmentState::Published;
        segment.pending = segment.declared_consumers;
        if self.check_integrity {
            segment.crc = Some(crc32fast::hash(segment.buffer.as_bytes()));
        }
        info!("published bus segment {} (v{})", handle.name, handle.version);
        Ok(())
    }

    /// Read-only access to a published segment. Verifies the CRC32 in
    /// debug mode; a mismatch is always fatal and captures a snapshot.
    pub fn acquire_read<T: Copy, R>(
        &self,
        name: &str,
        f: impl FnOnce(&[T]) -> R,
    ) -> Result<R, EngineError> {
        let bus_name = BusName::parse(name)?;
        let mut segments = self.segments.lock().unwrap();
        let segment = self.lookup_mut(&mut segments, &bus_name)?;
        if segment.state != SegmentState::Published {
            return Err(EngineError::Execution {
                node_id: "bus".to_string(),
                message: format!("segment {name} has not been published yet"),
            });
        }

        if let Some(expected) = segment.crc {
            let actual = crc32fast::hash(segment.buffer.as_bytes());
            if actual != expected {
                let snapshot = segment.buffer.as_bytes().to_vec();
                *self.last_snapshot.lock().unwrap() = Some((name.to_string(), snapshot));
                error!("integrity mismatch on bus segment {name}: expected crc {expected}, got {actual}");
                return Err(EngineError::Integrity {
                    segment: name.to_string(),
                    message: format!("crc32 mismatch: expected {expected}, got {actual}"),
                });
            }
        }

        segment.acquire_count += 1;
        Ok(f(segment.buffer.typed::<T>()))
    }

    /// Raw-byte read-back of a published segment, for callers that don't
    /// know (or care about) its element type -- e.g. the pipeline runner
    /// draining a terminal output on the caller's behalf before releasing
    /// it. Same CRC/integrity semantics as `acquire_read`.
    pub fn acquire_read_bytes(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.acquire_read::<u8, _>(name, |slice| slice.to_vec())
    }

    /// Signal that one consumer is done with a published segment,
    /// decrementing its pending count. The segment is freed once pending
    /// reaches zero.
    pub fn release(&self, handle: &SegmentHandle) -> Result<(), EngineError> {
        let mut segments = self.segments.lock().unwrap();
        {
            let segment = self.lookup_mut(&mut segments, &handle.name)?;
            segment.pending = segment.pending.saturating_sub(1);
        }
        let should_free = segments
            .get(handle.name.as_str())
            .map(|s| s.pending == 0)
            .unwrap_or(false);
        if should_free {
            segments.remove(handle.name.as_str());
        }
        Ok(())
    }

    pub fn acquire_count(&self, name: &str) -> Option<u32> {
        self.segments.lock().unwrap().get(name).map(|s| s.acquire_count)
    }

    pub fn pending_count(&self, name: &str) -> Option<u32> {
        self.segments.lock().unwrap().get(name).map(|s| s.pending)
    }

    pub fn is_allocated(&self, name: &str) -> bool {
        self.segments.lock().unwrap().contains_key(name)
    }

    /// Reconstruct a handle for an already-allocated segment, so a caller
    /// that only has the name (e.g. the pipeline executor, which doesn't
    /// see an engine's internal `allocate` call) can still `release` it.
    pub fn handle_for(&self, name: &str) -> Option<SegmentHandle> {
        let segments = self.segments.lock().unwrap();
        let bus_name = BusName::parse(name).ok()?;
        segments.get(bus_name.as_str()).map(|s| SegmentHandle {
            name: bus_name,
            version: s.version,
            shape: s.shape.clone(),
        })
    }

    pub fn last_snapshot(&self) -> Option<(String, Vec<u8>)> {
        self.last_snapshot.lock().unwrap().clone()
    }

    fn lookup_mut<'a>(
        &self,
        segments: &'a mut HashMap<String, Segment>,
        name: &BusName,
    ) -> Result<&'a mut Segment, EngineError> {
        segments.get_mut(name.as_str()).ok_or_else(|| EngineError::Execution {
            node_id: "bus".to_string(),
            message: format!("no such bus segment: {name}"),
        })
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(false)
    }
}
