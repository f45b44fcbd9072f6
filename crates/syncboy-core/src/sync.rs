use log::warn;

/// Independent clock channels, one per lazily synchronized device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncToken {
    Ppu = 0,
    Apu = 1,
}

impl SyncToken {
    pub const COUNT: usize = 2;
    pub const ALL: [SyncToken; Self::COUNT] = [SyncToken::Ppu, SyncToken::Apu];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Delay used by a device that doesn't need to be woken up at all.
pub const NEVER: i32 = i32::MAX;

/// Cycle accounting contract used by the PPU and APU.
///
/// `resync` returns the number of cycles elapsed since the previous `resync`
/// of the same token; `schedule_next` asks to be synced again no later than
/// `cycles` from now.
pub trait Scheduler {
    fn resync(&mut self, token: SyncToken) -> u32;
    fn schedule_next(&mut self, token: SyncToken, cycles: i32);
}

/// Timestamp based scheduler.
///
/// `timestamp` counts CPU cycles since an arbitrary origin. Every token
/// remembers when it was last synced and when it next needs to run.
#[derive(Debug, Clone)]
pub struct SyncClock {
    timestamp: i32,
    last_sync: [i32; SyncToken::COUNT],
    next_event: [i32; SyncToken::COUNT],
    /// Earliest of `next_event`
    first_event: i32,
}

impl SyncClock {
    pub fn new() -> Self {
        Self {
            timestamp: 0,
            last_sync: [0; SyncToken::COUNT],
            next_event: [0; SyncToken::COUNT],
            first_event: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    /// Let `cycles` CPU cycles elapse.
    pub fn advance(&mut self, cycles: u32) {
        let cycles = i32::try_from(cycles).unwrap_or(i32::MAX);
        self.timestamp = self.timestamp.saturating_add(cycles);
    }

    pub fn next_event(&self, token: SyncToken) -> i32 {
        self.next_event[token.index()]
    }

    /// Returns true if `token` has reached its scheduled event.
    pub fn is_due(&self, token: SyncToken) -> bool {
        let next = self.next_event[token.index()];
        next != NEVER && self.timestamp >= next
    }

    /// Returns true if at least one token is due.
    pub fn pending(&self) -> bool {
        self.first_event != NEVER && self.timestamp >= self.first_event
    }

    /// Subtract the current timestamp from every stored date so the counters
    /// never overflow while keeping all relative distances intact.
    ///
    /// A suspended token may go unsynced indefinitely, its `last_sync`
    /// saturates instead of wrapping.
    pub fn rebase(&mut self) {
        let ts = self.timestamp;
        for (last, next) in self.last_sync.iter_mut().zip(self.next_event.iter_mut()) {
            *last = last.saturating_sub(ts);
            if *next != NEVER {
                *next = next.saturating_sub(ts);
            }
        }
        if self.first_event != NEVER {
            self.first_event = self.first_event.saturating_sub(ts);
        }
        self.timestamp = 0;
    }

    fn refresh_first_event(&mut self) {
        self.first_event = self.next_event.iter().copied().min().unwrap_or(NEVER);
    }
}

impl Scheduler for SyncClock {
    fn resync(&mut self, token: SyncToken) -> u32 {
        let idx = token.index();
        let elapsed = self.timestamp.saturating_sub(self.last_sync[idx]);
        self.last_sync[idx] = self.timestamp;

        if elapsed < 0 {
            warn!("Got negative sync {elapsed} for token {token:?}");
            return 0;
        }
        elapsed as u32
    }

    fn schedule_next(&mut self, token: SyncToken, cycles: i32) {
        self.next_event[token.index()] = if cycles == NEVER {
            NEVER
        } else {
            self.timestamp.saturating_add(cycles)
        };
        self.refresh_first_event();
    }
}

impl Default for SyncClock {
    fn default() -> Self {
        Self::new()
    }
}
