use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::AudioConfig;

/// Stereo sample, left then right.
pub type Frame = [i16; 2];

/// Ring of fixed size sample buffers shared by the emulator thread
/// (producer) and an audio thread (consumer).
///
/// Each buffer is either owned by the producer or handed over to the
/// consumer. The producer blocks when it wants to start a buffer the
/// consumer hasn't given back yet, so nothing is ever dropped once output
/// is running.
pub struct AudioProducer {
    inner: Arc<Inner>,
    /// Buffer being filled and its index in the ring
    current: Option<(usize, Vec<Frame>)>,
}

pub struct AudioConsumer {
    inner: Arc<Inner>,
    next: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Free,
    Filling,
    Ready,
    Draining,
}

struct SlotData {
    state: SlotState,
    frames: Vec<Frame>,
}

struct Slot {
    data: Mutex<SlotData>,
    cond: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Inner {
    slots: Box<[Slot]>,
    frames_per_buffer: usize,
}

pub fn audio_queue(config: &AudioConfig) -> (AudioProducer, AudioConsumer) {
    audio_queue_from(config, 0)
}

/// Same as [`audio_queue`] for a producer whose first buffer is `first`
/// rather than slot 0.
pub fn audio_queue_from(config: &AudioConfig, first: usize) -> (AudioProducer, AudioConsumer) {
    let count = config.buffer_count.max(1);
    let frames_per_buffer = config.buffer_frames.max(1);

    let slots = (0..count)
        .map(|_| Slot {
            data: Mutex::new(SlotData {
                state: SlotState::Free,
                frames: Vec::with_capacity(frames_per_buffer),
            }),
            cond: Condvar::new(),
        })
        .collect();

    let inner = Arc::new(Inner {
        slots,
        frames_per_buffer,
    });

    (
        AudioProducer {
            inner: Arc::clone(&inner),
            current: None,
        },
        AudioConsumer {
            inner,
            next: first % count,
        },
    )
}

impl AudioProducer {
    pub fn frames_per_buffer(&self) -> usize {
        self.inner.frames_per_buffer
    }

    pub fn buffer_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Wait until buffer `index` has been released by the consumer, then
    /// start filling it.
    pub fn acquire(&mut self, index: usize) {
        let index = index % self.inner.slots.len();
        let slot = &self.inner.slots[index];
        let mut data = slot.lock();
        while data.state != SlotState::Free {
            data = slot.cond.wait(data).unwrap_or_else(PoisonError::into_inner);
        }
        data.state = SlotState::Filling;
        let mut frames = std::mem::take(&mut data.frames);
        frames.clear();
        self.current = Some((index, frames));
    }

    /// Store one frame in the buffer being filled. Frames written while no
    /// buffer is acquired are discarded.
    pub fn write(&mut self, frame: Frame) {
        if let Some((_, frames)) = self.current.as_mut()
            && frames.len() < self.inner.frames_per_buffer
        {
            frames.push(frame);
        }
    }

    /// Hand the buffer being filled over to the consumer. Returns false if
    /// no buffer was acquired.
    pub fn post(&mut self) -> bool {
        let Some((index, frames)) = self.current.take() else {
            return false;
        };
        let slot = &self.inner.slots[index];
        let mut data = slot.lock();
        data.frames = frames;
        data.state = SlotState::Ready;
        slot.cond.notify_all();
        true
    }

    pub fn is_filling(&self) -> bool {
        self.current.is_some()
    }
}

impl AudioConsumer {
    pub fn frames_per_buffer(&self) -> usize {
        self.inner.frames_per_buffer
    }

    pub fn buffer_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Wait up to `timeout` for the next buffer in ring order.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ReadyBuffer<'_>> {
        let index = self.next;
        let slot = &self.inner.slots[index];
        let data = slot.lock();
        let (mut data, _) = slot
            .cond
            .wait_timeout_while(data, timeout, |d| d.state != SlotState::Ready)
            .unwrap_or_else(PoisonError::into_inner);
        if data.state != SlotState::Ready {
            return None;
        }
        data.state = SlotState::Draining;
        let frames = std::mem::take(&mut data.frames);
        drop(data);

        self.next = (index + 1) % self.inner.slots.len();
        Some(ReadyBuffer {
            inner: &self.inner,
            index,
            frames,
        })
    }

    /// Take the next buffer if it is already complete.
    pub fn try_recv(&mut self) -> Option<ReadyBuffer<'_>> {
        self.recv_timeout(Duration::ZERO)
    }
}

/// A completed buffer. Dropping it gives the storage back to the producer.
pub struct ReadyBuffer<'a> {
    inner: &'a Inner,
    index: usize,
    frames: Vec<Frame>,
}

impl ReadyBuffer<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for ReadyBuffer<'_> {
    type Target = [Frame];

    fn deref(&self) -> &[Frame] {
        &self.frames
    }
}

impl Drop for ReadyBuffer<'_> {
    fn drop(&mut self) {
        let slot = &self.inner.slots[self.index];
        let mut data = slot.lock();
        data.frames = std::mem::take(&mut self.frames);
        data.state = SlotState::Free;
        slot.cond.notify_all();
    }
}
