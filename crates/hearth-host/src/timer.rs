use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Length of one scheduler tick
pub const TICK: Duration = Duration::from_millis(50);

pub fn ticks(count: u64) -> Duration {
    TICK.saturating_mul(count.min(u32::MAX as u64) as u32)
}

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        TimerId(id)
    }
}

/// When a scheduled task runs, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// On the next tick
    Now,
    /// Once, after `delay` ticks
    Later { delay: u64 },
    /// After `delay` ticks, then every `period` ticks
    Repeating { delay: u64, period: u64 },
}

impl Timing {
    pub fn delay(&self) -> Duration {
        match self {
            Timing::Now => Duration::ZERO,
            Timing::Later { delay } | Timing::Repeating { delay, .. } => ticks(*delay),
        }
    }

    /// Repeat interval; a zero period still waits one tick between runs
    pub fn period(&self) -> Option<Duration> {
        match self {
            Timing::Repeating { period, .. } => Some(ticks((*period).max(1))),
            _ => None,
        }
    }

    pub fn is_repeating(&self) -> bool {
        matches!(self, Timing::Repeating { .. })
    }
}

/// Type of timer
#[derive(Debug, Clone)]
enum TimerType {
    /// One-shot timer that fires once and is removed
    OneShot { fire_at: Instant },
    /// Recurring timer that fires repeatedly at an interval
    Recurring {
        interval: Duration,
        next_fire: Instant,
    },
}

/// Fires scheduled tasks for the control thread
pub struct TimerManager {
    timers: HashMap<TimerId, TimerType>,
    next_id: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Allocate an id without arming a timer, for tasks timed elsewhere
    pub fn reserve(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn schedule(&mut self, timing: Timing, now: Instant) -> TimerId {
        let id = self.reserve();
        let fire_at = now + timing.delay();
        let timer = match timing.period() {
            Some(interval) => TimerType::Recurring {
                interval,
                next_fire: fire_at,
            },
            None => TimerType::OneShot { fire_at },
        };
        self.timers.insert(id, timer);
        id
    }

    /// Cancel a timer
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// Collect timers due at `now`, oldest first. One-shot timers are removed.
    pub fn tick(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired = Vec::new();
        let mut to_remove = Vec::new();

        for (id, timer) in self.timers.iter_mut() {
            match timer {
                TimerType::OneShot { fire_at } => {
                    if now >= *fire_at {
                        fired.push(*id);
                        to_remove.push(*id);
                    }
                }
                TimerType::Recurring {
                    interval,
                    next_fire,
                } => {
                    if now >= *next_fire {
                        fired.push(*id);
                        *next_fire = now + *interval;
                    }
                }
            }
        }

        for id in to_remove {
            self.timers.remove(&id);
        }

        fired.sort();
        fired
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Get the number of active timers
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_now_fires_on_next_tick() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule(Timing::Now, start);

        assert_eq!(manager.tick(start), vec![id]);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_one_shot_timer() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule(Timing::Later { delay: 2 }, start);

        // Not due after one tick
        assert!(manager.tick(start + ticks(1)).is_empty());

        let fired = manager.tick(start + ticks(2));
        assert_eq!(fired, vec![id]);

        // Should be removed after firing
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_recurring_timer() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule(Timing::Repeating { delay: 1, period: 3 }, start);

        assert!(manager.tick(start).is_empty());
        assert_eq!(manager.tick(start + ticks(1)), vec![id]);
        assert!(manager.tick(start + ticks(2)).is_empty());
        assert_eq!(manager.tick(start + ticks(4)), vec![id]);

        // Should still be active
        assert!(manager.is_active(id));
    }

    #[test]
    fn test_fired_in_schedule_order() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let first = manager.schedule(Timing::Later { delay: 1 }, start);
        let second = manager.schedule(Timing::Now, start);

        assert_eq!(manager.tick(start + ticks(1)), vec![first, second]);
    }

    #[test]
    fn test_cancel_timer() {
        let mut manager = TimerManager::new();
        let id = manager.schedule(Timing::Later { delay: 200 }, Instant::now());

        assert!(manager.cancel(id));
        assert_eq!(manager.active_count(), 0);
        assert!(!manager.cancel(id)); // Already removed
    }

    #[test]
    fn test_reserved_ids_are_unique() {
        let mut manager = TimerManager::new();
        let reserved = manager.reserve();
        let scheduled = manager.schedule(Timing::Now, Instant::now());

        assert_ne!(reserved, scheduled);
        assert!(!manager.is_active(reserved));
    }

    #[test]
    fn test_zero_period_waits_a_tick() {
        let timing = Timing::Repeating { delay: 0, period: 0 };
        assert_eq!(timing.period(), Some(TICK));
        assert_eq!(Timing::Later { delay: 4 }.delay(), Duration::from_millis(200));
    }
}
