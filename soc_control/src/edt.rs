use core::convert::TryFrom;

use no_std_compat::cell::{Cell, RefCell};
use no_std_compat::cmp::Ordering::Equal;

use log::error;

/// Button polling, tick and save are in flight at the same time, with room to spare
pub const QUEUE_SIZE: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq, Copy)]
pub struct Msg<T: Sized> {
    pub when: u64,
    /// lower runs first among messages due at the same instant
    pub priority: u8,
    pub order: u32,
    pub payload: T,
}

/// Event dispatch thread. Time only moves when the queue is polled, which makes the
/// cadence of periodic work testable without waiting for the wall clock.
///
/// Milliseconds since start are counted in `u64`, delays stay `u32`.
pub struct EDT<T> {
    now: Cell<u64>,
    queue: RefCell<[Option<Msg<T>>; QUEUE_SIZE]>,
}

impl<T: Copy> EDT<T> {
    pub fn create() -> EDT<T> {
        EDT {
            now: Cell::new(0),
            queue: RefCell::new([None; QUEUE_SIZE]),
        }
    }
}

pub enum Event<T> {
    Execute { msg: T },
    Wait { ms: u32 },
    Halt,
}

impl<T: Copy> EDT<T> {
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn poll(&self) -> Event<T> {
        let head_option = self.peek_head();

        if let Some((position, head)) = head_option {
            let to_wait = head.when.saturating_sub(self.now.get());
            if to_wait > 0 {
                // change new now
                self.now.set(head.when);
                // a message is never due further away than the longest delay
                Event::Wait {
                    ms: u32::try_from(to_wait).unwrap_or(u32::MAX),
                }
            } else {
                self.queue.borrow_mut()[position] = None;
                Event::Execute { msg: head.payload }
            }
        } else {
            Event::Halt
        }
    }

    /// Advances the time by the given value and feeds messages to the handler
    pub fn advance_time_by(&self, time: u32, handler: &dyn Fn(T)) {
        let target = self.now.get() + time as u64;
        loop {
            match self.peek_head() {
                Some((_, head)) if head.when <= target => {
                    if let Event::Execute { msg } = self.poll() {
                        handler(msg);
                    }
                }
                _ => {
                    self.now.set(target);
                    break;
                }
            }
        }
    }

    fn peek_head(&self) -> Option<(usize, Msg<T>)> {
        self.queue
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, it)| it.map(|msg| (i, msg)))
            .min_by(|(_, lhs), (_, rhs)| {
                let by_when = lhs.when.cmp(&rhs.when);
                match by_when {
                    Equal => match lhs.priority.cmp(&rhs.priority) {
                        Equal => lhs.order.cmp(&rhs.order),
                        by_priority => by_priority,
                    },
                    _ => by_when,
                }
            })
    }

    pub fn schedule(&self, delay: u32, payload: T) {
        self.schedule_with_priority(delay, 0, payload);
    }

    pub fn schedule_with_priority(&self, delay: u32, priority: u8, payload: T) {
        let when = self.now.get() + delay as u64;

        let mut queue = self.queue.borrow_mut();
        let order = queue
            .iter()
            .flatten()
            .filter(|message| message.when == when)
            .map(|it| it.order + 1)
            .max()
            .unwrap_or(0);

        match queue.iter_mut().find(|it| it.is_none()) {
            Some(slot) => {
                *slot = Some(Msg {
                    when,
                    priority,
                    order,
                    payload,
                })
            }
            None => error!("event queue is full, dropping event due at {}", when),
        }
    }

    pub fn remove<F>(&self, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        for slot in self.queue.borrow_mut().iter_mut() {
            if slot.map_or(false, |it| predicate(&it.payload)) {
                *slot = None;
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.borrow().iter().filter(|it| it.is_some()).count()
    }
}
