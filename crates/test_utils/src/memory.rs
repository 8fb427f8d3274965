//! In-memory storage gateway and collaborator doubles
//!
//! [`InMemoryClaimStore`] behaves like a transactional store: a unit of work
//! reads from a snapshot taken at `begin`, stages its writes, and applies them
//! to the shared state only on `commit`. Counters track how many units of
//! work were opened, committed, rolled back and released so tests can assert
//! the orchestrator's guarantees.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use core_kernel::{
    AdapterHealth, ClaimId, DomainPort, HealthCheckResult, HealthCheckable, HmoId, HospitalId,
    NotificationId, OutboxEventId, Pagination, PortError, UserId,
};

use domain_claims::claim::{Claim, Note};
use domain_claims::notification::{EmailMessage, Notification, OutboxEvent};
use domain_claims::payment::{ClaimPayment, PaymentRecord};
use domain_claims::ports::{
    Authorization, ClaimListing, ClaimQuery, ClaimStore, EligibilityResolver, EligibilityResult,
    EnrolleeData, Hmo, Hospital, IdentityResolver, Mailer, PaymentQuery, Role, UnitOfWork, User,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    hmos: HashMap<HmoId, Hmo>,
    hospitals: HashMap<HospitalId, Hospital>,
    authorizations: Vec<Authorization>,
    // stored without notes; notes are joined on read
    claims: HashMap<ClaimId, Claim>,
    notes: Vec<Note>,
    payments: Vec<ClaimPayment>,
    notifications: Vec<Notification>,
    outbox: Vec<OutboxEvent>,
    // lease expiry per claimed outbox event
    outbox_leases: HashMap<OutboxEventId, DateTime<Utc>>,
}

impl MemoryState {
    fn claim_with_notes(&self, id: ClaimId) -> Option<Claim> {
        let mut claim = self.claims.get(&id)?.clone();
        let mut notes: Vec<Note> = self.notes.iter().filter(|n| n.claim_id == id).cloned().collect();
        notes.sort_by_key(|n| (n.created_at, n.id));
        claim.notes = notes;
        Some(claim)
    }

    fn reference_taken(&self, reference: &str, except: Option<ClaimId>) -> bool {
        self.claims
            .values()
            .any(|c| c.claim_reference == reference && Some(c.id) != except)
    }

    fn current_payment(&self, claim_id: ClaimId) -> Option<ClaimPayment> {
        self.payments
            .iter()
            .filter(|p| p.claim_id == claim_id)
            .max_by_key(|p| p.recency_key())
            .cloned()
    }

    fn apply(&mut self, write: StagedWrite) {
        match write {
            StagedWrite::Claim(mut claim) => {
                claim.notes.clear();
                self.claims.insert(claim.id, claim);
            }
            StagedWrite::Note(note) => self.notes.push(note),
            StagedWrite::Payment(payment) => {
                match self.payments.iter_mut().find(|p| p.id == payment.id) {
                    Some(existing) => *existing = payment,
                    None => self.payments.push(payment),
                }
            }
            StagedWrite::Notification(notification) => self.notifications.push(notification),
            StagedWrite::Outbox(event) => self.outbox.push(event),
        }
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Claim(Claim),
    Note(Note),
    Payment(ClaimPayment),
    Notification(Notification),
    Outbox(OutboxEvent),
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    released: AtomicUsize,
}

/// Snapshot of unit-of-work counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOfWorkStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub released: usize,
}

#[derive(Debug, Default)]
struct Faults {
    fail_notification_insert: AtomicBool,
    nil_notification_ids: AtomicBool,
    fail_commit: AtomicBool,
    references_taken: AtomicBool,
}

/// Transactional in-memory storage gateway
#[derive(Debug, Default, Clone)]
pub struct InMemoryClaimStore {
    state: Arc<RwLock<MemoryState>>,
    counters: Arc<Counters>,
    faults: Arc<Faults>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_hmo(&self, hmo: Hmo) {
        self.state.write().await.hmos.insert(hmo.id, hmo);
    }

    pub async fn add_hospital(&self, hospital: Hospital) {
        self.state.write().await.hospitals.insert(hospital.id, hospital);
    }

    pub async fn add_authorization(&self, authorization: Authorization) {
        self.state.write().await.authorizations.push(authorization);
    }

    /// Stores a claim as-is, bypassing the services
    pub async fn seed_claim(&self, claim: Claim) {
        let mut state = self.state.write().await;
        for note in &claim.notes {
            state.notes.push(note.clone());
        }
        state.apply(StagedWrite::Claim(claim));
    }

    /// Stores a payment as-is; used for amounts the services never produce
    pub async fn seed_payment(&self, payment: ClaimPayment) {
        self.state.write().await.apply(StagedWrite::Payment(payment));
    }

    pub async fn claims(&self) -> Vec<Claim> {
        let state = self.state.read().await;
        state
            .claims
            .keys()
            .filter_map(|id| state.claim_with_notes(*id))
            .collect()
    }

    pub async fn notes(&self) -> Vec<Note> {
        self.state.read().await.notes.clone()
    }

    pub async fn payments(&self) -> Vec<ClaimPayment> {
        self.state.read().await.payments.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.read().await.outbox.clone()
    }

    pub fn stats(&self) -> UnitOfWorkStats {
        UnitOfWorkStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }

    /// Makes every notification insert fail
    pub fn fail_notification_inserts(&self, fail: bool) {
        self.faults.fail_notification_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes notification inserts report a nil identifier
    pub fn return_nil_notification_ids(&self, nil: bool) {
        self.faults.nil_notification_ids.store(nil, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.faults.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Reports every generated claim reference as already taken
    pub fn take_all_references(&self, taken: bool) {
        self.faults.references_taken.store(taken, Ordering::SeqCst);
    }

    fn payment_records(state: &MemoryState, query: &PaymentQuery) -> Vec<PaymentRecord> {
        let filter = &query.filter;
        let predicate = filter.status.map(|s| s.predicate());

        let mut records: Vec<PaymentRecord> = state
            .payments
            .iter()
            .filter_map(|payment| {
                let claim = state.claims.get(&payment.claim_id)?;
                if !claim.is_owned_by(query.hospital_id) {
                    return None;
                }
                let hmo_name = state.hmos.get(&claim.hmo_id)?.name.clone();
                Some(PaymentRecord {
                    payment: payment.clone(),
                    hmo_name,
                })
            })
            .filter(|r| filter.hmo_name.as_deref().map_or(true, |name| r.hmo_name == name))
            .filter(|r| filter.payment_dates.contains(r.payment.payment_date))
            .filter(|r| {
                predicate.map_or(true, |p| p.matches(r.payment.amount_paid, r.payment.amount_expected))
            })
            .collect();

        records.sort_by_key(|r| (r.payment.payment_date, r.payment.created_at, r.payment.id));

        match query.page {
            Some(page) => records
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect(),
            None => records,
        }
    }
}

impl DomainPort for InMemoryClaimStore {}

#[async_trait]
impl HealthCheckable for InMemoryClaimStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-claim-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let snapshot = self.state.read().await.clone();
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryUnitOfWork {
            shared: self.state.clone(),
            staged: snapshot,
            writes: Vec::new(),
            finished: false,
            counters: self.counters.clone(),
            faults: self.faults.clone(),
        }))
    }

    async fn find_claim(&self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        Ok(self.state.read().await.claim_with_notes(id))
    }

    async fn find_hmo(&self, id: HmoId) -> Result<Option<Hmo>, PortError> {
        Ok(self.state.read().await.hmos.get(&id).cloned())
    }

    async fn find_hospital(&self, id: HospitalId) -> Result<Option<Hospital>, PortError> {
        Ok(self.state.read().await.hospitals.get(&id).cloned())
    }

    async fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<ClaimListing>, PortError> {
        let state = self.state.read().await;
        let mut listings: Vec<ClaimListing> = state
            .claims
            .values()
            .filter(|claim| query.matches(claim))
            .filter_map(|claim| {
                let hmo_name = state.hmos.get(&claim.hmo_id)?.name.clone();
                let claim = state.claim_with_notes(claim.id)?;
                Some(ClaimListing { claim, hmo_name })
            })
            .collect();
        listings.sort_by(|a, b| {
            (b.claim.created_at, b.claim.id).cmp(&(a.claim.created_at, a.claim.id))
        });
        Ok(listings)
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<PaymentRecord>, PortError> {
        let state = self.state.read().await;
        Ok(Self::payment_records(&state, query))
    }

    async fn list_notifications(
        &self,
        hospital_id: HospitalId,
        page: Pagination,
    ) -> Result<(Vec<Notification>, u64), PortError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Notification> = state
            .notifications
            .iter()
            .filter(|n| n.is_for_hospital(hospital_id))
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn find_notification(&self, id: NotificationId) -> Result<Option<Notification>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn claim_outbox_events(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, PortError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let MemoryState { outbox, outbox_leases, .. } = &mut *state;

        let mut claimable: Vec<OutboxEvent> = outbox
            .iter()
            .filter(|e| !e.is_delivered() && e.attempts < max_attempts)
            .filter(|e| outbox_leases.get(&e.id).map_or(true, |until| *until <= now))
            .cloned()
            .collect();
        claimable.sort_by_key(|e| (e.created_at, e.id));
        claimable.truncate(limit as usize);

        for event in &claimable {
            outbox_leases.insert(event.id, now + lease);
        }
        Ok(claimable)
    }

    async fn mark_outbox_delivered(
        &self,
        id: OutboxEventId,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let MemoryState { outbox, outbox_leases, .. } = &mut *state;
        let event = outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PortError::not_found("OutboxEvent", id))?;
        if event.delivered_at.is_none() {
            event.attempts += 1;
            event.delivered_at = Some(delivered_at);
        }
        outbox_leases.remove(&id);
        Ok(())
    }

    async fn record_outbox_failure(&self, id: OutboxEventId, error: &str) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let MemoryState { outbox, outbox_leases, .. } = &mut *state;
        let event = outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PortError::not_found("OutboxEvent", id))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        outbox_leases.remove(&id);
        Ok(())
    }
}

/// Unit of work over [`InMemoryClaimStore`]
pub struct MemoryUnitOfWork {
    shared: Arc<RwLock<MemoryState>>,
    staged: MemoryState,
    writes: Vec<StagedWrite>,
    finished: bool,
    counters: Arc<Counters>,
    faults: Arc<Faults>,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> Result<(), PortError> {
        if self.finished {
            return Err(PortError::TransactionClosed);
        }
        Ok(())
    }

    fn stage(&mut self, write: StagedWrite) {
        self.staged.apply(write.clone());
        self.writes.push(write);
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        self.ensure_open()?;
        Ok(self.staged.claim_with_notes(id))
    }

    async fn find_hmo(&mut self, id: HmoId) -> Result<Option<Hmo>, PortError> {
        self.ensure_open()?;
        Ok(self.staged.hmos.get(&id).cloned())
    }

    async fn find_hospital(&mut self, id: HospitalId) -> Result<Option<Hospital>, PortError> {
        self.ensure_open()?;
        Ok(self.staged.hospitals.get(&id).cloned())
    }

    async fn find_authorization(
        &mut self,
        code: &str,
        hmo_id: HmoId,
    ) -> Result<Option<Authorization>, PortError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .authorizations
            .iter()
            .find(|a| a.code == code && a.hmo_id == hmo_id)
            .cloned())
    }

    async fn claim_reference_exists(&mut self, reference: &str) -> Result<bool, PortError> {
        self.ensure_open()?;
        if self.faults.references_taken.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(self.staged.reference_taken(reference, None))
    }

    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        self.ensure_open()?;
        if self.staged.reference_taken(&claim.claim_reference, None) {
            return Err(PortError::conflict(format!(
                "duplicate claim_reference {}",
                claim.claim_reference
            )));
        }
        self.stage(StagedWrite::Claim(claim.clone()));
        Ok(())
    }

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        self.ensure_open()?;
        if !self.staged.claims.contains_key(&claim.id) {
            return Err(PortError::not_found("Claim", claim.id));
        }
        self.stage(StagedWrite::Claim(claim.clone()));
        Ok(())
    }

    async fn insert_note(&mut self, note: &Note) -> Result<(), PortError> {
        self.ensure_open()?;
        self.stage(StagedWrite::Note(note.clone()));
        Ok(())
    }

    async fn current_payment(&mut self, claim_id: ClaimId) -> Result<Option<ClaimPayment>, PortError> {
        self.ensure_open()?;
        Ok(self.staged.current_payment(claim_id))
    }

    async fn insert_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError> {
        self.ensure_open()?;
        self.stage(StagedWrite::Payment(payment.clone()));
        Ok(())
    }

    async fn update_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError> {
        self.ensure_open()?;
        if !self.staged.payments.iter().any(|p| p.id == payment.id) {
            return Err(PortError::not_found("ClaimPayment", payment.id));
        }
        self.stage(StagedWrite::Payment(payment.clone()));
        Ok(())
    }

    async fn insert_notification(
        &mut self,
        notification: &Notification,
    ) -> Result<NotificationId, PortError> {
        self.ensure_open()?;
        if self.faults.fail_notification_insert.load(Ordering::SeqCst) {
            return Err(PortError::internal("notification insert failed"));
        }
        self.stage(StagedWrite::Notification(notification.clone()));
        if self.faults.nil_notification_ids.load(Ordering::SeqCst) {
            return Ok(NotificationId::nil());
        }
        Ok(notification.id)
    }

    async fn insert_outbox_event(&mut self, event: &OutboxEvent) -> Result<(), PortError> {
        self.ensure_open()?;
        self.stage(StagedWrite::Outbox(event.clone()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PortError> {
        self.ensure_open()?;
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(PortError::connection("connection lost during commit"));
        }

        let mut shared = self.shared.write().await;
        for write in &self.writes {
            if let StagedWrite::Claim(claim) = write {
                if shared.reference_taken(&claim.claim_reference, Some(claim.id)) {
                    return Err(PortError::conflict(format!(
                        "duplicate claim_reference {}",
                        claim.claim_reference
                    )));
                }
            }
        }
        for write in self.writes.drain(..) {
            shared.apply(write);
        }

        self.finished = true;
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PortError> {
        if self.finished {
            return Ok(());
        }
        self.writes.clear();
        self.finished = true;
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Eligibility resolver answering from a fixed enrollee list
#[derive(Debug, Default)]
pub struct StaticEligibilityResolver {
    enrollees: HashMap<String, EnrolleeData>,
    calls: AtomicUsize,
}

impl StaticEligibilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enrollee(mut self, enrollee: EnrolleeData) -> Self {
        self.enrollees.insert(enrollee.enrollee_no.clone(), enrollee);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DomainPort for StaticEligibilityResolver {}

#[async_trait]
impl EligibilityResolver for StaticEligibilityResolver {
    async fn check_eligibility(&self, enrollee_no: &str) -> Result<EligibilityResult, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.enrollees.get(enrollee_no) {
            Some(enrollee) => EligibilityResult::eligible(enrollee.clone()),
            None => EligibilityResult::not_found(),
        })
    }
}

/// Identity resolver answering from a fixed user list
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    users: HashMap<UserId, User>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id, user);
        self
    }
}

impl DomainPort for StaticIdentityResolver {}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, PortError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn find_user_by_role(&self, id: UserId, role: Role) -> Result<Option<User>, PortError> {
        Ok(self.users.get(&id).filter(|u| u.role == role).cloned())
    }
}

/// Mailer that keeps every message it was asked to send
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
    send_delay: Option<std::time::Duration>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every send for `delay` before recording it, like a slow SMTP hop
    pub fn with_send_delay(mut self, delay: std::time::Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// While set, every send fails and nothing is recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DomainPort for RecordingMailer {}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), PortError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::ServiceUnavailable {
                service: "mail".to_string(),
            });
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
