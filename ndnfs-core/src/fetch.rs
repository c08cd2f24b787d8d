//! Fetch entry table: one record per outstanding request plus the retry
//! policy applied to it.
//!
//! Host-driven: no I/O and no clock. The host passes events together with the
//! current instant and performs the returned [`Action`]s. A single owner
//! mutates the table; timers and other tasks talk to that owner instead of
//! touching entries themselves.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::name::Name;
use crate::packet::{Data, Inbound, Interest, NackReason};

/// State of one outstanding request.
#[derive(Debug, Clone)]
pub struct FetchEntry {
    interest: Interest,
    sent_at: Instant,
    nack_congestion: u32,
    nack_duplicate: u32,
    timeouts: u32,
    /// A delayed resend is scheduled; the timeout sweep leaves it alone.
    backoff_pending: bool,
}

impl FetchEntry {
    fn new(interest: Interest, now: Instant) -> Self {
        Self {
            interest,
            sent_at: now,
            nack_congestion: 0,
            nack_duplicate: 0,
            timeouts: 0,
            backoff_pending: false,
        }
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }

    pub fn nack_congestion(&self) -> u32 {
        self.nack_congestion
    }

    pub fn nack_duplicate(&self) -> u32 {
        self.nack_duplicate
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    pub fn backoff_pending(&self) -> bool {
        self.backoff_pending
    }

    /// Fresh nonce, age clock restarted. Returns the packet to put on the wire.
    fn retransmit(&mut self, now: Instant) -> Interest {
        self.interest.renew_nonce();
        self.sent_at = now;
        self.backoff_pending = false;
        self.interest.clone()
    }
}

/// Outcome of admitting a request into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// New entry recorded; transmit this Interest.
    Sent(Interest),
    /// An entry for the same name is already in flight. Its outcome answers
    /// this request too; the window slot taken for it must be given back.
    Coalesced,
}

/// What the host must do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Put this Interest on the face now.
    Transmit(Interest),
    /// Call [`FetchTable::resend`] for `name` once `delay` has elapsed.
    ResendAfter { name: Name, delay: Duration },
    /// Request resolved with Data; release its window slot.
    Deliver(Data),
    /// Request resolved with a terminal error; release its window slot.
    Fail(FetchError),
    /// Protocol violation not tied to an outstanding request. No slot is held.
    Violation(FetchError),
}

pub struct FetchTable {
    entries: HashMap<Name, FetchEntry>,
    policy: RetryPolicy,
}

impl FetchTable {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a request about to be sent for the first time.
    pub fn begin(&mut self, mut interest: Interest, now: Instant) -> Admission {
        if self.entries.contains_key(&interest.name) {
            debug!(name = %interest.name, "request already in flight, coalescing");
            return Admission::Coalesced;
        }
        interest.renew_nonce();
        self.entries
            .insert(interest.name.clone(), FetchEntry::new(interest.clone(), now));
        Admission::Sent(interest)
    }

    /// Apply one classified inbound packet.
    pub fn on_inbound(&mut self, inbound: Inbound, now: Instant) -> Option<Action> {
        match inbound {
            Inbound::Data(data) => {
                if self.entries.remove(&data.name).is_none() {
                    // late answer to a request that was already resolved or abandoned
                    warn!(name = %data.name, "dropping Data for a name that is not pending");
                    return None;
                }
                Some(Action::Deliver(data))
            }
            Inbound::ApplicationError { name, code } => {
                if self.entries.remove(&name).is_none() {
                    warn!(%name, "dropping application-level nack for a name that is not pending");
                    return None;
                }
                Some(Action::Fail(match code {
                    Ok(code) => FetchError::Application { name, code },
                    Err(source) => FetchError::MalformedErrorCode { name, source },
                }))
            }
            Inbound::Nack { name, reason } => Some(self.on_nack(name, reason, now)),
        }
    }

    fn on_nack(&mut self, name: Name, reason: NackReason, now: Instant) -> Action {
        warn!(%reason, %name, "received nack");
        let policy = self.policy;
        let Some(entry) = self.entries.get_mut(&name) else {
            return Action::Violation(FetchError::UnknownName(name));
        };
        match reason {
            NackReason::Congestion => {
                entry.nack_congestion += 1;
                if entry.nack_congestion > policy.max_nack_congestion {
                    self.entries.remove(&name);
                    return Action::Fail(FetchError::CongestionRetries {
                        name,
                        max: policy.max_nack_congestion,
                    });
                }
                entry.backoff_pending = true;
                let delay = policy.congestion_backoff(entry.nack_congestion);
                Action::ResendAfter { name, delay }
            }
            NackReason::Duplicate => {
                entry.nack_duplicate += 1;
                if entry.nack_duplicate > policy.max_nack_duplicate {
                    self.entries.remove(&name);
                    return Action::Fail(FetchError::DuplicateRetries {
                        name,
                        max: policy.max_nack_duplicate,
                    });
                }
                Action::Transmit(entry.retransmit(now))
            }
            NackReason::NoRoute | NackReason::Unspecified => {
                self.entries.remove(&name);
                Action::Fail(FetchError::Nack { name, reason })
            }
        }
    }

    /// A congestion backoff elapsed. `None` if the request was resolved or
    /// abandoned in the meantime.
    pub fn resend(&mut self, name: &Name, now: Instant) -> Option<Interest> {
        self.entries.get_mut(name).map(|e| e.retransmit(now))
    }

    /// Retransmit or fail every entry whose age reached its lifetime.
    pub fn sweep(&mut self, now: Instant) -> Vec<Action> {
        let expired: Vec<Name> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                !e.backoff_pending && now.saturating_duration_since(e.sent_at) >= e.interest.lifetime
            })
            .map(|(n, _)| n.clone())
            .collect();

        let max = self.policy.max_timeouts;
        let mut actions = Vec::with_capacity(expired.len());
        for name in expired {
            let Some(entry) = self.entries.get_mut(&name) else {
                continue;
            };
            entry.timeouts += 1;
            if entry.timeouts > max {
                self.entries.remove(&name);
                actions.push(Action::Fail(FetchError::TimeoutRetries { name, max }));
            } else {
                warn!(%name, attempt = entry.timeouts, "timeout for interest");
                actions.push(Action::Transmit(entry.retransmit(now)));
            }
        }
        actions
    }

    /// Forget a request without resolving it. Returns true if it was pending.
    pub fn abandon(&mut self, name: &Name) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &Name) -> Option<&FetchEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::namespace::Namespace;
    use crate::packet::Data;

    const LIFETIME: Duration = Duration::from_secs(8);

    fn table() -> FetchTable {
        FetchTable::new(Config::default().retry_policy())
    }

    fn seg(off: u64) -> Name {
        Namespace::default().read("/store/f.root", off)
    }

    fn send(t: &mut FetchTable, name: Name, now: Instant) -> Interest {
        match t.begin(Interest::new(name, LIFETIME), now) {
            Admission::Sent(i) => i,
            Admission::Coalesced => panic!("unexpected coalesce"),
        }
    }

    fn nack(name: &Name, reason: NackReason) -> Inbound {
        Inbound::Nack {
            name: name.clone(),
            reason,
        }
    }

    #[test]
    fn begin_records_entry() {
        let mut t = table();
        let now = Instant::now();
        let i = send(&mut t, seg(0), now);
        assert_eq!(i.name, seg(0));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&seg(0)).map(FetchEntry::sent_at), Some(now));
    }

    #[test]
    fn second_request_for_same_name_coalesces() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        assert_eq!(
            t.begin(Interest::new(seg(0), LIFETIME), now),
            Admission::Coalesced
        );
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn data_resolves_entry() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        let data = Data::new(seg(0), vec![1; 10]);
        assert_eq!(
            t.on_inbound(Inbound::Data(data.clone()), now),
            Some(Action::Deliver(data.clone()))
        );
        assert!(t.is_empty());
        // a second copy is stray
        assert_eq!(t.on_inbound(Inbound::Data(data), now), None);
    }

    #[test]
    fn application_error_resolves_entry() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        let action = t.on_inbound(
            Inbound::ApplicationError {
                name: seg(0),
                code: Ok(2),
            },
            now,
        );
        assert_eq!(
            action,
            Some(Action::Fail(FetchError::Application {
                name: seg(0),
                code: 2
            }))
        );
        assert!(t.is_empty());
    }

    #[test]
    fn congestion_backoff_then_terminal_failure() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        let mut delays = Vec::new();
        for _ in 0..4 {
            match t.on_inbound(nack(&seg(0), NackReason::Congestion), now) {
                Some(Action::ResendAfter { name, delay }) => {
                    assert_eq!(name, seg(0));
                    delays.push(delay.as_secs());
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(t.resend(&seg(0), now).is_some());
        }
        assert_eq!(delays, vec![2, 4, 8, 8]);

        let fifth = t.on_inbound(nack(&seg(0), NackReason::Congestion), now);
        assert_eq!(
            fifth,
            Some(Action::Fail(FetchError::CongestionRetries {
                name: seg(0),
                max: 4
            }))
        );
        assert!(t.resend(&seg(0), now).is_none());
        assert!(matches!(
            t.on_inbound(nack(&seg(0), NackReason::Congestion), now),
            Some(Action::Violation(FetchError::UnknownName(_)))
        ));
    }

    #[test]
    fn duplicate_resends_immediately_until_bound() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        let later = now + Duration::from_secs(1);
        for _ in 0..4 {
            match t.on_inbound(nack(&seg(0), NackReason::Duplicate), later) {
                Some(Action::Transmit(i)) => assert_eq!(i.name, seg(0)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(t.get(&seg(0)).map(FetchEntry::sent_at), Some(later));
        assert!(matches!(
            t.on_inbound(nack(&seg(0), NackReason::Duplicate), later),
            Some(Action::Fail(FetchError::DuplicateRetries { max: 4, .. }))
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn duplicate_bound_is_configurable() {
        let policy = RetryPolicy {
            max_nack_duplicate: 0,
            ..RetryPolicy::default()
        };
        let mut t = FetchTable::new(policy);
        let now = Instant::now();
        send(&mut t, seg(0), now);
        assert!(matches!(
            t.on_inbound(nack(&seg(0), NackReason::Duplicate), now),
            Some(Action::Fail(FetchError::DuplicateRetries { max: 0, .. }))
        ));
    }

    #[test]
    fn no_route_is_terminal() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        assert_eq!(
            t.on_inbound(nack(&seg(0), NackReason::NoRoute), now),
            Some(Action::Fail(FetchError::Nack {
                name: seg(0),
                reason: NackReason::NoRoute
            }))
        );
        assert!(t.is_empty());
    }

    #[test]
    fn nack_for_unknown_name_is_violation() {
        let mut t = table();
        assert_eq!(
            t.on_inbound(nack(&seg(0), NackReason::Duplicate), Instant::now()),
            Some(Action::Violation(FetchError::UnknownName(seg(0))))
        );
    }

    #[test]
    fn sweep_ignores_young_entries() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        assert!(t.sweep(now + Duration::from_secs(2)).is_empty());
        assert_eq!(t.get(&seg(0)).map(FetchEntry::timeouts), Some(0));
    }

    #[test]
    fn timeout_retry_bound() {
        let mut t = table();
        let mut now = Instant::now();
        send(&mut t, seg(0), now);
        send(&mut t, seg(6144), now + LIFETIME);

        let mut transmits = 0;
        let mut failures = 0;
        for _ in 0..5 {
            now += LIFETIME;
            for action in t.sweep(now) {
                match action {
                    Action::Transmit(i) if i.name == seg(0) => transmits += 1,
                    Action::Fail(FetchError::TimeoutRetries { name, max }) => {
                        assert_eq!(name, seg(0));
                        assert_eq!(max, 4);
                        failures += 1;
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(transmits, 4);
        assert_eq!(failures, 1);
        assert!(!t.contains(&seg(0)));
        // the younger entry is one sweep behind and still pending
        assert!(t.contains(&seg(6144)));
    }

    #[test]
    fn sweep_skips_entries_in_backoff() {
        let mut t = table();
        let now = Instant::now();
        send(&mut t, seg(0), now);
        t.on_inbound(nack(&seg(0), NackReason::Congestion), now);
        assert!(t.sweep(now + LIFETIME * 2).is_empty());

        let resent_at = now + LIFETIME * 2;
        t.resend(&seg(0), resent_at);
        assert!(t.sweep(resent_at + Duration::from_secs(1)).is_empty());
        assert_eq!(t.sweep(resent_at + LIFETIME).len(), 1);
    }

    #[test]
    fn congestion_twice_then_data_sends_three_times() {
        let mut t = table();
        let now = Instant::now();
        let mut sent = 0;
        for off in [0, 6144, 12288] {
            send(&mut t, seg(off), now);
            if off == 6144 {
                sent += 1;
            }
        }
        for _ in 0..2 {
            let action = t.on_inbound(nack(&seg(6144), NackReason::Congestion), now);
            assert!(matches!(action, Some(Action::ResendAfter { .. })));
            if t.resend(&seg(6144), now).is_some() {
                sent += 1;
            }
        }
        let data = Data::new(seg(6144), vec![0; 6144]);
        assert!(matches!(
            t.on_inbound(Inbound::Data(data), now),
            Some(Action::Deliver(_))
        ));
        assert_eq!(sent, 3);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn abandon_removes_entry() {
        let mut t = table();
        send(&mut t, seg(0), Instant::now());
        assert!(t.abandon(&seg(0)));
        assert!(!t.abandon(&seg(0)));
        assert!(t.is_empty());
    }
}
