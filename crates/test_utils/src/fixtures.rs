//! Pre-built Test Fixtures
//!
//! Ready-made HMOs, hospitals, enrollees and users, plus [`ClaimsHarness`],
//! which wires the claims services over the in-memory store.

use std::sync::Arc;

use core_kernel::{HmoId, HospitalId, UserId};
use domain_claims::{
    Actor, Authorization, ClaimLifecycleManager, EnrolleeData, Hmo, Hospital,
    NotificationDispatcher, OutboxRelay, PaymentReconciliationEngine, Role, User,
};

use crate::memory::{
    InMemoryClaimStore, RecordingMailer, StaticEligibilityResolver, StaticIdentityResolver,
};

pub const ENROLLEE_NO: &str = "ENR-0001";
pub const OTHER_ENROLLEE_NO: &str = "ENR-0002";
pub const UNKNOWN_ENROLLEE_NO: &str = "ENR-9999";
pub const AUTHORIZATION_CODE: &str = "AUTH-0001";

/// Fixture for payers and providers
pub struct PartyFixtures;

impl PartyFixtures {
    pub fn hmo(name: &str) -> Hmo {
        Hmo {
            id: HmoId::new_v7(),
            name: name.to_string(),
            email: format!("claims@{}.example", slug(name)),
            phone_number: Some("+234 800 000 0000".to_string()),
        }
    }

    pub fn hospital(name: &str) -> Hospital {
        Hospital {
            id: HospitalId::new_v7(),
            name: name.to_string(),
            email: format!("billing@{}.example", slug(name)),
            phone_number: None,
        }
    }

    pub fn enrollee(enrollee_no: &str, hmo: &Hmo) -> EnrolleeData {
        EnrolleeData {
            enrollee_no: enrollee_no.to_string(),
            first_name: "Chidi".to_string(),
            last_name: "Okeke".to_string(),
            hmo_id: Some(hmo.id),
        }
    }

    pub fn authorization(code: &str, hmo: &Hmo, enrollee_no: &str) -> Authorization {
        Authorization {
            code: code.to_string(),
            hmo_id: hmo.id,
            enrollee_no: enrollee_no.to_string(),
        }
    }
}

/// Fixture for users and actors
pub struct UserFixtures;

impl UserFixtures {
    pub fn staff(hospital: &Hospital, first_name: &str, last_name: &str) -> User {
        User {
            id: UserId::new_v7(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{}.{}@staff.example", first_name.to_lowercase(), last_name.to_lowercase()),
            hospital_id: Some(hospital.id),
            hospital_email: Some(hospital.email.clone()),
            role: Role::HospitalStaff,
        }
    }

    /// Reviewer not attached to any hospital
    pub fn reviewer(first_name: &str, last_name: &str) -> User {
        User {
            id: UserId::new_v7(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{}@review.example", first_name.to_lowercase()),
            hospital_id: None,
            hospital_email: None,
            role: Role::ReviewAdmin,
        }
    }

    pub fn actor(user: &User, hospital: &Hospital) -> Actor {
        Actor::new(user.id, hospital.id, user.first_name.clone(), user.last_name.clone())
    }
}

/// Claims services wired over in-memory adapters, with a seeded world
///
/// Two hospitals, two HMOs, two enrollees (both with the first HMO), one
/// authorization and one reviewer.
pub struct ClaimsHarness {
    pub store: Arc<InMemoryClaimStore>,
    pub eligibility: Arc<StaticEligibilityResolver>,
    pub identity: Arc<StaticIdentityResolver>,
    pub mailer: Arc<RecordingMailer>,
    pub lifecycle: ClaimLifecycleManager,
    pub reconciliation: PaymentReconciliationEngine,
    pub notifications: NotificationDispatcher,
    pub relay: OutboxRelay,
    pub hospital: Hospital,
    pub other_hospital: Hospital,
    pub hmo: Hmo,
    pub other_hmo: Hmo,
    pub staff: User,
    pub actor: Actor,
    pub other_actor: Actor,
    pub reviewer: User,
}

impl ClaimsHarness {
    pub async fn new() -> Self {
        let hospital = PartyFixtures::hospital("St Nicholas Hospital");
        let other_hospital = PartyFixtures::hospital("Reddington Hospital");
        let hmo = PartyFixtures::hmo("Hygeia HMO");
        let other_hmo = PartyFixtures::hmo("Avon HMO");

        let store = Arc::new(InMemoryClaimStore::new());
        store.add_hospital(hospital.clone()).await;
        store.add_hospital(other_hospital.clone()).await;
        store.add_hmo(hmo.clone()).await;
        store.add_hmo(other_hmo.clone()).await;
        store
            .add_authorization(PartyFixtures::authorization(AUTHORIZATION_CODE, &hmo, ENROLLEE_NO))
            .await;

        let eligibility = Arc::new(
            StaticEligibilityResolver::new()
                .with_enrollee(PartyFixtures::enrollee(ENROLLEE_NO, &hmo))
                .with_enrollee(PartyFixtures::enrollee(OTHER_ENROLLEE_NO, &hmo)),
        );

        let staff = UserFixtures::staff(&hospital, "Ada", "Obi");
        let other_staff = UserFixtures::staff(&other_hospital, "Tunde", "Bello");
        let reviewer = UserFixtures::reviewer("Ngozi", "Eze");
        let identity = Arc::new(
            StaticIdentityResolver::new()
                .with_user(staff.clone())
                .with_user(other_staff.clone())
                .with_user(reviewer.clone()),
        );

        let mailer = Arc::new(RecordingMailer::new());
        let relay = OutboxRelay::new(store.clone(), mailer.clone());

        Self {
            lifecycle: ClaimLifecycleManager::new(store.clone(), eligibility.clone(), relay.clone()),
            reconciliation: PaymentReconciliationEngine::new(
                store.clone(),
                identity.clone(),
                relay.clone(),
            ),
            notifications: NotificationDispatcher::new(store.clone()),
            actor: UserFixtures::actor(&staff, &hospital),
            other_actor: UserFixtures::actor(&other_staff, &other_hospital),
            store,
            eligibility,
            identity,
            mailer,
            relay,
            hospital,
            other_hospital,
            hmo,
            other_hmo,
            staff,
            reviewer,
        }
    }
}

fn slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
