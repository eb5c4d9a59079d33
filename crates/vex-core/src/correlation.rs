//! Correlation table.
//!
//! Turns one duplex text stream into many concurrent request/response calls.
//! Every outbound request is registered under a fresh [`TransmissionId`]; the
//! first inbound frame echoing that id claims the entry and everything after
//! it is treated as unsolicited.
//!
//! # Invariants
//!
//! - At most one live entry per id. Registering a live id is rejected and the
//!   existing entry is untouched.
//! - An entry leaves the table exactly once: by [`claim`](CorrelationTable::claim),
//!   by [`expire`](CorrelationTable::expire), or by
//!   [`drain`](CorrelationTable::drain).

use std::{collections::HashMap, ops::Sub, time::Duration};

use vex_proto::TransmissionId;

use crate::error::CorrelationError;

#[derive(Debug)]
struct Entry<I, T> {
    transaction: T,
    issued_at: I,
    timeout: Option<Duration>,
}

/// An entry removed because its deadline passed.
#[derive(Debug)]
pub struct Expired<T> {
    /// Id the entry was registered under
    pub id: TransmissionId,
    /// The transaction itself
    pub transaction: T,
    /// Time between registration and expiry
    pub elapsed: Duration,
}

/// Outstanding transactions keyed by transmission id.
///
/// Generic over the stored transaction so the engine can keep caller waiters
/// (oneshot senders in production, plain values in tests) alongside the
/// bookkeeping it needs to resolve them.
#[derive(Debug)]
pub struct CorrelationTable<I, T> {
    entries: HashMap<TransmissionId, Entry<I, T>>,
}

impl<I, T> Default for CorrelationTable<I, T> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<I, T> CorrelationTable<I, T>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a transaction under `id`.
    ///
    /// `timeout` of `None` means the entry lives until claimed or drained.
    ///
    /// # Errors
    ///
    /// - `CorrelationError::DuplicateId` if `id` is live. The rejected
    ///   transaction is dropped; callers mint ids with
    ///   [`contains`](Self::contains) checks so this only fires on
    ///   server-chosen ids.
    pub fn register(
        &mut self,
        id: TransmissionId,
        transaction: T,
        now: I,
        timeout: Option<Duration>,
    ) -> Result<(), CorrelationError> {
        if self.entries.contains_key(&id) {
            return Err(CorrelationError::DuplicateId(id));
        }

        self.entries.insert(id, Entry { transaction, issued_at: now, timeout });
        Ok(())
    }

    /// Removes and returns the transaction for `id`, if live.
    pub fn claim(&mut self, id: &str) -> Option<T> {
        self.entries.remove(id).map(|entry| entry.transaction)
    }

    /// Removes and returns every transaction whose timeout has elapsed.
    ///
    /// An entry expires when `now - issued_at >= timeout`.
    pub fn expire(&mut self, now: I) -> Vec<Expired<T>> {
        let due: Vec<TransmissionId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.timeout.is_some_and(|t| now - entry.issued_at >= t))
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .filter_map(|id| {
                let entry = self.entries.remove(&id)?;
                Some(Expired { id, transaction: entry.transaction, elapsed: now - entry.issued_at })
            })
            .collect()
    }

    /// Removes and returns every live transaction.
    pub fn drain(&mut self) -> Vec<(TransmissionId, T)> {
        self.entries.drain().map(|(id, entry)| (id, entry.transaction)).collect()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn id(s: &str) -> TransmissionId {
        TransmissionId::new(s)
    }

    #[test]
    fn claim_is_exactly_once() {
        let t0 = Instant::now();
        let mut table = CorrelationTable::new();
        table.register(id("a"), 1, t0, None).unwrap();

        assert_eq!(table.claim("a"), Some(1));
        assert_eq!(table.claim("a"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_registration_keeps_original() {
        let t0 = Instant::now();
        let mut table = CorrelationTable::new();
        table.register(id("a"), 1, t0, None).unwrap();

        let result = table.register(id("a"), 2, t0, None);

        assert_eq!(result, Err(CorrelationError::DuplicateId(id("a"))));
        assert_eq!(table.claim("a"), Some(1));
    }

    #[test]
    fn expire_removes_only_due_entries() {
        let t0 = Instant::now();
        let mut table = CorrelationTable::new();
        table.register(id("short"), "s", t0, Some(Duration::from_secs(1))).unwrap();
        table.register(id("long"), "l", t0, Some(Duration::from_secs(10))).unwrap();
        table.register(id("forever"), "f", t0, None).unwrap();

        assert!(table.expire(t0 + Duration::from_millis(999)).is_empty());

        let expired = table.expire(t0 + Duration::from_secs(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, id("short"));
        assert_eq!(expired[0].elapsed, Duration::from_secs(1));

        let expired = table.expire(t0 + Duration::from_secs(3600));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].transaction, "l");

        assert!(table.contains("forever"));
    }

    #[test]
    fn expired_entries_cannot_be_claimed() {
        let t0 = Instant::now();
        let mut table = CorrelationTable::new();
        table.register(id("a"), 1, t0, Some(Duration::from_secs(1))).unwrap();

        table.expire(t0 + Duration::from_secs(2));

        assert_eq!(table.claim("a"), None);
    }

    #[test]
    fn drain_empties_table() {
        let t0 = Instant::now();
        let mut table = CorrelationTable::new();
        table.register(id("a"), 1, t0, None).unwrap();
        table.register(id("b"), 2, t0, Some(Duration::from_secs(1))).unwrap();

        let mut drained: Vec<_> = table.drain().into_iter().map(|(_, t)| t).collect();
        drained.sort_unstable();

        assert_eq!(drained, vec![1, 2]);
        assert!(table.is_empty());
    }
}
