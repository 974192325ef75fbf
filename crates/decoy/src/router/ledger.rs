//! Call history ledger.

use crate::error::{Error, MockedError, Result};
use crate::http::{MockResponse, Request};
use crate::resolver::{claim_in_sequence, Resolved, SequenceCursor, SequenceItem};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::ops::Index;
use std::sync::Arc;

/// How a recorded call was answered.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Response(MockResponse),
    Error(MockedError),
    /// A route let the real call go through
    PassThrough,
    /// No route handled the request
    Unmocked,
}

impl CallOutcome {
    /// `None` for a non-match, which is never recorded.
    fn from_resolved(resolved: Resolved) -> Option<Self> {
        match resolved {
            Resolved::Mocked(response) => Some(CallOutcome::Response(response)),
            Resolved::Error(err) => Some(CallOutcome::Error(err)),
            Resolved::PassThrough => Some(CallOutcome::PassThrough),
            Resolved::NonMatch => None,
        }
    }
}

/// One dispatched request and its outcome.
#[derive(Debug, Clone)]
pub struct Call {
    /// Position in the router's history, starting at 0
    pub seq: u64,
    pub request: Request,
    pub outcome: CallOutcome,
    /// Route that handled the request, `None` when unmocked
    pub route_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl Call {
    pub fn response(&self) -> Option<&MockResponse> {
        match &self.outcome {
            CallOutcome::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&MockedError> {
        match &self.outcome {
            CallOutcome::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self.outcome, CallOutcome::PassThrough)
    }

    pub fn is_unmocked(&self) -> bool {
        matches!(self.outcome, CallOutcome::Unmocked)
    }
}

#[derive(Default)]
struct LedgerState {
    calls: Vec<Arc<Call>>,
    next_seq: u64,
}

/// Append-only call history shared by a router and its routes.
#[derive(Default)]
pub struct CallLedger {
    state: Mutex<LedgerState>,
}

impl CallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &self,
        route_id: Option<u64>,
        request: &Request,
        outcome: CallOutcome,
    ) -> Arc<Call> {
        let mut state = self.state.lock();
        Self::push(&mut state, route_id, request, outcome)
    }

    /// Resolve and record as one step; a non-match records nothing.
    pub(crate) fn record_with<F>(
        &self,
        route_id: Option<u64>,
        request: &Request,
        resolve: F,
    ) -> Option<Arc<Call>>
    where
        F: FnOnce() -> Resolved,
    {
        let outcome = CallOutcome::from_resolved(resolve())?;
        Some(self.record(route_id, request, outcome))
    }

    /// Claim the next item of a sequence and record its outcome.
    ///
    /// The cursor advance and the call's position in history are fixed under
    /// the lock, so concurrent calls consume items in history order. Error
    /// factories run after the lock is released and may read the history.
    pub(crate) fn record_sequence(
        &self,
        route_id: Option<u64>,
        request: &Request,
        items: &[SequenceItem],
        cursor: &SequenceCursor,
    ) -> Option<Arc<Call>> {
        let mut state = self.state.lock();
        let item = claim_in_sequence(items, cursor)?;
        if !item.builds_error() {
            let outcome = CallOutcome::from_resolved(item.resolve(request))?;
            return Some(Self::push(&mut state, route_id, request, outcome));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        drop(state);

        let outcome = CallOutcome::from_resolved(item.resolve(request))?;
        let mut state = self.state.lock();
        Some(Self::insert(&mut state, seq, route_id, request, outcome))
    }

    fn push(
        state: &mut LedgerState,
        route_id: Option<u64>,
        request: &Request,
        outcome: CallOutcome,
    ) -> Arc<Call> {
        let seq = state.next_seq;
        state.next_seq += 1;
        Self::insert(state, seq, route_id, request, outcome)
    }

    /// Place a call by its sequence number.
    fn insert(
        state: &mut LedgerState,
        seq: u64,
        route_id: Option<u64>,
        request: &Request,
        outcome: CallOutcome,
    ) -> Arc<Call> {
        let call = Arc::new(Call {
            seq,
            request: request.clone(),
            outcome,
            route_id,
            timestamp: Utc::now(),
        });
        let at = state.calls.partition_point(|c| c.seq < seq);
        state.calls.insert(at, Arc::clone(&call));
        call
    }

    pub fn all(&self) -> CallList {
        CallList::new(self.state.lock().calls.clone())
    }

    pub fn for_route(&self, route_id: u64) -> CallList {
        let state = self.state.lock();
        CallList::new(
            state
                .calls
                .iter()
                .filter(|call| call.route_id == Some(route_id))
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for_route(&self, route_id: u64) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.route_id == Some(route_id))
            .count()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.next_seq = 0;
    }

    /// Drop one route's calls, keeping everything else.
    pub fn clear_route(&self, route_id: u64) {
        self.state
            .lock()
            .calls
            .retain(|call| call.route_id != Some(route_id));
    }
}

/// Read-only view over recorded calls, oldest first.
#[derive(Debug, Clone, Default)]
pub struct CallList {
    calls: Vec<Arc<Call>>,
}

impl CallList {
    fn new(calls: Vec<Arc<Call>>) -> Self {
        Self { calls }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Call> {
        self.calls.get(index).map(Arc::as_ref)
    }

    pub fn last(&self) -> Option<&Call> {
        self.calls.last().map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter().map(Arc::as_ref)
    }

    pub fn called(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn assert_called(&self) -> Result<()> {
        if self.called() {
            Ok(())
        } else {
            Err(Error::CallAssertion("Expected to be called".to_string()))
        }
    }

    pub fn assert_not_called(&self) -> Result<()> {
        self.assert_call_count(0)
    }

    pub fn assert_called_once(&self) -> Result<()> {
        self.assert_call_count(1)
    }

    pub fn assert_call_count(&self, expected: usize) -> Result<()> {
        if self.call_count() == expected {
            Ok(())
        } else {
            Err(Error::CallAssertion(format!(
                "Expected {} call(s), got {}",
                expected,
                self.call_count()
            )))
        }
    }
}

impl Index<usize> for CallList {
    type Output = Call;

    fn index(&self, index: usize) -> &Call {
        &self.calls[index]
    }
}
