//! Notifications and their outbound email events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{HmoId, HospitalId, NotificationId, OutboxEventId, UserId};

use crate::ports::{Hmo, Hospital, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "Unread",
            NotificationStatus::Read => "Read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Unread" => Some(NotificationStatus::Unread),
            "Read" => Some(NotificationStatus::Read),
            _ => None,
        }
    }
}

/// The single party a notification row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NotificationRecipient {
    User(UserId),
    Hmo(HmoId),
    Hospital(HospitalId),
}

/// Who to notify, with the contact details needed to address the email
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    User {
        user_id: UserId,
        email: String,
        /// Email of the hospital the user belongs to, if any
        hospital_email: Option<String>,
    },
    Hmo {
        hmo_id: HmoId,
        email: String,
    },
    Hospital {
        hospital_id: HospitalId,
        email: String,
    },
}

impl NotificationTarget {
    pub fn recipient(&self) -> NotificationRecipient {
        match self {
            NotificationTarget::User { user_id, .. } => NotificationRecipient::User(*user_id),
            NotificationTarget::Hmo { hmo_id, .. } => NotificationRecipient::Hmo(*hmo_id),
            NotificationTarget::Hospital { hospital_id, .. } => {
                NotificationRecipient::Hospital(*hospital_id)
            }
        }
    }

    /// Resolves the email address; a user paired with a hospital is
    /// reached through the hospital's mailbox
    pub fn email_address(&self) -> Option<&str> {
        let address = match self {
            NotificationTarget::User { email, hospital_email, .. } => hospital_email
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or(email.as_str()),
            NotificationTarget::Hmo { email, .. } => email.as_str(),
            NotificationTarget::Hospital { email, .. } => email.as_str(),
        };
        let address = address.trim();
        (!address.is_empty()).then_some(address)
    }
}

impl From<&User> for NotificationTarget {
    fn from(user: &User) -> Self {
        NotificationTarget::User {
            user_id: user.id,
            email: user.email.clone(),
            hospital_email: user.hospital_email.clone(),
        }
    }
}

impl From<&Hmo> for NotificationTarget {
    fn from(hmo: &Hmo) -> Self {
        NotificationTarget::Hmo {
            hmo_id: hmo.id,
            email: hmo.email.clone(),
        }
    }
}

impl From<&Hospital> for NotificationTarget {
    fn from(hospital: &Hospital) -> Self {
        NotificationTarget::Hospital {
            hospital_id: hospital.id,
            email: hospital.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    pub status: NotificationStatus,
    pub recipient: NotificationRecipient,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn unread(
        recipient: NotificationRecipient,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::new_v7(),
            title: title.into(),
            message: message.into(),
            status: NotificationStatus::Unread,
            recipient,
            created_at: Utc::now(),
        }
    }

    pub fn is_for_hospital(&self, hospital_id: HospitalId) -> bool {
        self.recipient == NotificationRecipient::Hospital(hospital_id)
    }
}

/// An email waiting to leave through the mailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// HTML body
    pub body: String,
}

/// Email event written in the same unit of work as its notification
///
/// Delivered by the outbox relay only once the unit of work has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub notification_id: NotificationId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    pub fn email(notification: &Notification, recipient: impl Into<String>) -> Self {
        Self {
            id: OutboxEventId::new_v7(),
            notification_id: notification.id,
            recipient: recipient.into(),
            subject: notification.title.clone(),
            body: notification.message.clone(),
            created_at: Utc::now(),
            delivered_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    pub fn message(&self) -> EmailMessage {
        EmailMessage {
            to: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }
}
