//! Notification Dispatch Coordinator
//!
//! Notifications are written through the caller's unit of work so they share
//! its fate. The email is not sent here: an outbox event is recorded in the
//! same unit of work and the [`OutboxRelay`](crate::outbox::OutboxRelay)
//! delivers it after commit. A rolled-back operation never emails anyone.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use core_kernel::{NotificationId, Pagination};

use crate::error::ClaimError;
use crate::notification::{Notification, NotificationTarget, OutboxEvent};
use crate::ports::{ClaimStore, UnitOfWork};
use crate::response::{Actor, ServiceResponse};
use crate::views::NotificationPage;

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn ClaimStore>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self { store }
    }

    /// Persists a notification for `target` and queues its email
    ///
    /// The email event is only recorded when the insert produced a usable
    /// identifier and the target resolves to a non-empty address.
    #[instrument(skip(self, message, uow), fields(recipient = ?target.recipient()))]
    pub async fn send_notification(
        &self,
        target: &NotificationTarget,
        message: &str,
        title: &str,
        uow: &mut dyn UnitOfWork,
    ) -> Result<Notification, ClaimError> {
        let mut notification = Notification::unread(target.recipient(), title, message);
        let stored_id = uow.insert_notification(&notification).await?;

        if stored_id.is_nil() {
            warn!("notification stored without an identifier; email not queued");
            return Ok(notification);
        }
        notification.id = stored_id;

        match target.email_address() {
            Some(address) => {
                let event = OutboxEvent::email(&notification, address);
                uow.insert_outbox_event(&event).await?;
                debug!(notification_id = %notification.id, outbox_event_id = %event.id, "email queued");
            }
            None => warn!(notification_id = %notification.id, "no email address for recipient; email skipped"),
        }

        Ok(notification)
    }

    /// The actor's hospital notifications, newest first
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn get_notifications(
        &self,
        actor: &Actor,
        pagination: Pagination,
    ) -> Result<ServiceResponse<NotificationPage>, ClaimError> {
        let (notifications, total) = self
            .store
            .list_notifications(actor.hospital_id, pagination)
            .await?;

        if notifications.is_empty() {
            return Err(ClaimError::NotificationNotFound(format!(
                "no notifications on page {}",
                pagination.page()
            )));
        }

        info!(count = notifications.len(), total, "notifications retrieved");
        Ok(ServiceResponse::ok(
            "Notifications retrieved successfully",
            NotificationPage {
                notifications,
                page: pagination.page_info(total),
            },
        ))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn get_notification_by_id(
        &self,
        id: NotificationId,
        actor: &Actor,
    ) -> Result<ServiceResponse<Notification>, ClaimError> {
        let notification = self
            .store
            .find_notification(id)
            .await?
            .filter(|n| n.is_for_hospital(actor.hospital_id))
            .ok_or_else(|| ClaimError::NotificationNotFound(id.to_string()))?;

        Ok(ServiceResponse::ok("Notification retrieved successfully", notification))
    }
}
