//! Set-valued optimistic toggles (blocked days, enabled features).
//!
//! Membership flips locally before the server confirms. A failed commit
//! flips it back; a successful one keeps it. Server snapshots are ignored
//! while any toggle is outstanding so they cannot clobber an unconfirmed
//! flip.

use std::collections::BTreeSet;
use std::future::Future;

use parking_lot::Mutex;

use crate::error::ApiError;

struct SetState<K> {
    members: BTreeSet<K>,
    in_flight: usize,
}

pub struct OptimisticSet<K: Ord + Clone> {
    state: Mutex<SetState<K>>,
}

impl<K: Ord + Clone> Default for OptimisticSet<K> {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl<K: Ord + Clone> OptimisticSet<K> {
    pub fn new(members: impl IntoIterator<Item = K>) -> Self {
        Self {
            state: Mutex::new(SetState {
                members: members.into_iter().collect(),
                in_flight: 0,
            }),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().members.contains(key)
    }

    pub fn snapshot(&self) -> BTreeSet<K> {
        self.state.lock().members.clone()
    }

    pub fn is_mutating(&self) -> bool {
        self.state.lock().in_flight > 0
    }

    /// Flip `key` now, then run `commit` with the new membership.
    ///
    /// On error the flip is undone and the error returned. If the returned
    /// future is dropped before `commit` settles, the flip is kept and the
    /// next server snapshot reconciles it.
    pub async fn toggle<F, Fut, R>(&self, key: K, commit: F) -> Result<R, ApiError>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let now_member = {
            let mut state = self.state.lock();
            let now_member = !state.members.remove(&key);
            if now_member {
                state.members.insert(key.clone());
            }
            state.in_flight += 1;
            now_member
        };
        let _pending = Pending { set: self };

        let result = commit(now_member).await;
        if result.is_err() {
            let mut state = self.state.lock();
            if now_member {
                state.members.remove(&key);
            } else {
                state.members.insert(key);
            }
        }
        result
    }

    /// Force membership, e.g. when the server reports a different outcome.
    pub fn set_membership(&self, key: K, member: bool) {
        let mut state = self.state.lock();
        if member {
            state.members.insert(key);
        } else {
            state.members.remove(&key);
        }
    }

    /// Replace membership with a server snapshot.
    ///
    /// Returns false (and keeps local state) while a toggle is in flight.
    pub fn sync_from_server(&self, members: impl IntoIterator<Item = K>) -> bool {
        let mut state = self.state.lock();
        if state.in_flight > 0 {
            log::debug!(
                "OptimisticSet: skipping server snapshot, {} toggles in flight",
                state.in_flight
            );
            return false;
        }
        state.members = members.into_iter().collect();
        true
    }
}

struct Pending<'a, K: Ord + Clone> {
    set: &'a OptimisticSet<K>,
}

impl<K: Ord + Clone> Drop for Pending<'_, K> {
    fn drop(&mut self) {
        let mut state = self.set.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}
