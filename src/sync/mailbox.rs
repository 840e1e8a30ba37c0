//! Fixed-capacity message mailboxes.
//!
//! A mailbox is a bounded FIFO of [`Message`] words with blocking post and
//! fetch. Transfers are completed by the running side: a poster finding a
//! parked fetcher hands its message over directly, and a fetcher draining a
//! full buffer pulls the longest-parked poster's message in behind it — the
//! undelivered message rides in the poster's wait state until then.

use crate::diag::trace;
use crate::kernel::Kernel;
use crate::record::thread::ThreadState;
use crate::types::{MailboxId, Message, Progress, Timeout, WakeReason};
use crate::wait::{QueueOrder, WaitQueue, WouldBlock};
use std::collections::VecDeque;

/// Internal state of one mailbox.
#[derive(Debug)]
pub(crate) struct MailboxRecord {
    /// Buffered messages, oldest first.
    pub(crate) buffer: VecDeque<Message>,
    /// Buffer capacity; posts beyond it block.
    pub(crate) capacity: usize,
    /// Posters blocked on a full buffer.
    pub(crate) post_queue: WaitQueue,
    /// Fetchers blocked on an empty buffer.
    pub(crate) fetch_queue: WaitQueue,
}

impl Kernel {
    /// Creates a mailbox buffering up to `capacity` messages (at least 1).
    pub fn mailbox_create(&mut self, capacity: usize) -> MailboxId {
        debug_assert!(capacity > 0, "zero-capacity mailbox");
        let capacity = capacity.max(1);
        self.lock();
        let id = MailboxId::from_arena(self.mailboxes.insert(MailboxRecord {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            post_queue: WaitQueue::new(QueueOrder::Fifo),
            fetch_queue: WaitQueue::new(QueueOrder::Fifo),
        }));
        self.unlock();
        id
    }

    /// Posts a message, blocking while the buffer is full.
    pub fn mailbox_post(
        &mut self,
        mailbox: MailboxId,
        message: Message,
        timeout: Timeout,
    ) -> Progress<()> {
        self.lock();
        match self.mailbox_post_locked(mailbox, message, true) {
            Ok(()) => {
                self.unlock();
                Progress::Immediate(())
            }
            Err(WouldBlock) => {
                let current = self.current;
                let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) else {
                    self.unlock();
                    return Progress::Immediate(());
                };
                mb.post_queue.insert(&self.threads, current);
                self.suspend_current_timed(
                    ThreadState::PostingMailbox { mailbox, message },
                    timeout,
                );
                self.unlock();
                Progress::Blocked
            }
        }
    }

    /// Posts a message only if buffer space (or a parked fetcher) is
    /// immediately available.
    ///
    /// # Errors
    ///
    /// [`WouldBlock`] if the buffer is full.
    pub fn mailbox_try_post(&mut self, mailbox: MailboxId, message: Message) -> Result<(), WouldBlock> {
        self.lock();
        let result = self.mailbox_post_locked(mailbox, message, true);
        self.unlock();
        result
    }

    /// ISR-context variant of [`Kernel::mailbox_try_post`].
    ///
    /// # Errors
    ///
    /// [`WouldBlock`] if the buffer is full.
    pub fn mailbox_try_post_from_isr(
        &mut self,
        mailbox: MailboxId,
        message: Message,
    ) -> Result<(), WouldBlock> {
        self.lock_from_isr();
        let result = self.mailbox_post_locked(mailbox, message, false);
        self.unlock_from_isr();
        result
    }

    fn mailbox_post_locked(
        &mut self,
        mailbox: MailboxId,
        message: Message,
        direct_switch: bool,
    ) -> Result<(), WouldBlock> {
        let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) else {
            debug_assert!(false, "post on a stale mailbox handle");
            return Ok(());
        };
        if let Some(fetcher) = mb.fetch_queue.pop_front() {
            debug_assert!(mb.buffer.is_empty(), "parked fetcher with buffered messages");
            if direct_switch {
                self.wakeup(fetcher, WakeReason::Signal(message));
            } else {
                self.ready_with_reason(fetcher, WakeReason::Signal(message));
            }
            return Ok(());
        }
        if mb.buffer.len() < mb.capacity {
            mb.buffer.push_back(message);
            Ok(())
        } else {
            Err(WouldBlock)
        }
    }

    /// Fetches the oldest message, blocking while the buffer is empty.
    ///
    /// On [`Progress::Blocked`], the message arrives as the thread's
    /// `Signal` wakeup payload.
    pub fn mailbox_fetch(&mut self, mailbox: MailboxId, timeout: Timeout) -> Progress<Message> {
        self.lock();
        match self.mailbox_fetch_locked(mailbox) {
            Ok(message) => {
                self.unlock();
                Progress::Immediate(message)
            }
            Err(WouldBlock) => {
                let current = self.current;
                let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) else {
                    self.unlock();
                    return Progress::Immediate(Message::NONE);
                };
                mb.fetch_queue.insert(&self.threads, current);
                self.suspend_current_timed(ThreadState::FetchingMailbox { mailbox }, timeout);
                self.unlock();
                Progress::Blocked
            }
        }
    }

    /// Fetches the oldest message only if one is buffered.
    ///
    /// # Errors
    ///
    /// [`WouldBlock`] if the mailbox is empty.
    pub fn mailbox_try_fetch(&mut self, mailbox: MailboxId) -> Result<Message, WouldBlock> {
        self.lock();
        let result = self.mailbox_fetch_locked(mailbox);
        self.unlock();
        result
    }

    fn mailbox_fetch_locked(&mut self, mailbox: MailboxId) -> Result<Message, WouldBlock> {
        let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) else {
            debug_assert!(false, "fetch on a stale mailbox handle");
            return Err(WouldBlock);
        };
        let Some(message) = mb.buffer.pop_front() else {
            debug_assert!(mb.post_queue.is_empty(), "parked poster with an empty buffer");
            return Err(WouldBlock);
        };
        if let Some(poster) = mb.post_queue.pop_front() {
            let parked = match self.threads.get(poster.arena_index()).map(|rec| rec.state) {
                Some(ThreadState::PostingMailbox { message, .. }) => Some(message),
                _ => {
                    debug_assert!(false, "post queue holds a non-posting thread");
                    None
                }
            };
            if let Some(parked) = parked {
                let mb = self
                    .mailboxes
                    .get_mut(mailbox.arena_index())
                    .expect("checked above");
                mb.buffer.push_back(parked);
                self.wakeup(poster, WakeReason::Signal(Message::NONE));
            }
        }
        Ok(message)
    }

    /// Empties the buffer and wakes every parked poster and fetcher with
    /// [`WakeReason::Reset`].
    pub fn mailbox_reset(&mut self, mailbox: MailboxId) {
        self.lock();
        let Some(mb) = self.mailboxes.get_mut(mailbox.arena_index()) else {
            debug_assert!(false, "reset on a stale mailbox handle");
            self.unlock();
            return;
        };
        mb.buffer.clear();
        let mut waiters = mb.post_queue.drain_all();
        waiters.extend(mb.fetch_queue.drain_all());
        trace!(mailbox = %mailbox, woken = waiters.len(), "mailbox reset");
        for thread in waiters {
            self.ready_with_reason(thread, WakeReason::Reset);
        }
        self.reschedule();
        self.unlock();
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn mailbox_len(&self, mailbox: MailboxId) -> Option<usize> {
        self.mailboxes
            .get(mailbox.arena_index())
            .map(|mb| mb.buffer.len())
    }

    /// Remaining buffer space.
    #[must_use]
    pub fn mailbox_free(&self, mailbox: MailboxId) -> Option<usize> {
        self.mailboxes
            .get(mailbox.arena_index())
            .map(|mb| mb.capacity - mb.buffer.len())
    }
}
