//! Fire-and-forget notification queue
//!
//! Callers enqueue with [`NotificationDispatcher::notify`], which never waits on
//! delivery and never fails. A single worker task drains the queue, loads the
//! booking context and sends the messages. Every delivery error stops at the
//! worker and is logged.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::messenger::MessagingProvider;
use super::templates::{self, BookingContext};
use crate::error::ProviderError;
use crate::models::to_e164;
use crate::store::{BookingStore, StoreError};

/// What happened that someone should hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Payment confirmed, tell the customer
    CustomerConfirmation,
    /// Payment confirmed, tell the admins
    AdminNewBooking,
    /// Accessories changed, tell the admins
    AdminModification,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CustomerConfirmation => "customer_confirmation",
            NotificationKind::AdminNewBooking => "admin_new_booking",
            NotificationKind::AdminModification => "admin_modification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    /// Human-readable booking reference
    pub booking_id: String,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("booking {0} not found")]
    BookingMissing(String),

    #[error("no profile for the owner of booking {0}")]
    ProfileMissing(String),

    #[error("no admin numbers configured")]
    NoRecipients,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{failed} of {attempted} messages failed, last error: {last}")]
    Delivery {
        attempted: usize,
        failed: usize,
        last: ProviderError,
    },
}

/// Handle for enqueueing notifications; cheap to clone
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NotificationJob>,
}

impl NotificationDispatcher {
    /// Start the worker. The task ends once every dispatcher clone is dropped
    /// and the queue is drained.
    pub fn spawn(capacity: usize, worker: NotificationWorker) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(worker.run(receiver));
        (Self { sender }, handle)
    }

    /// Enqueue a notification without waiting; a full or closed queue drops it
    pub fn notify(&self, kind: NotificationKind, booking_id: &str) {
        let job = NotificationJob {
            kind,
            booking_id: booking_id.to_string(),
        };
        match self.sender.try_send(job) {
            Ok(()) => {
                tracing::debug!(kind = kind.as_str(), booking_id, "Notification queued");
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    kind = job.kind.as_str(),
                    booking_id = %job.booking_id,
                    "Notification queue full, dropping notification"
                );
            }
            Err(TrySendError::Closed(job)) => {
                tracing::error!(
                    kind = job.kind.as_str(),
                    booking_id = %job.booking_id,
                    "Notification worker stopped, dropping notification"
                );
            }
        }
    }
}

/// Drains the queue and delivers messages
pub struct NotificationWorker {
    store: Arc<dyn BookingStore>,
    messenger: Arc<dyn MessagingProvider>,
    admin_numbers: Vec<String>,
}

impl NotificationWorker {
    pub fn new(
        store: Arc<dyn BookingStore>,
        messenger: Arc<dyn MessagingProvider>,
        admin_numbers: Vec<String>,
    ) -> Self {
        Self {
            store,
            messenger,
            admin_numbers,
        }
    }

    async fn run(self, mut receiver: mpsc::Receiver<NotificationJob>) {
        tracing::info!("Notification worker started");

        while let Some(job) = receiver.recv().await {
            match self.deliver(&job).await {
                Ok(sent) => tracing::info!(
                    kind = job.kind.as_str(),
                    booking_id = %job.booking_id,
                    sent,
                    "Notification delivered"
                ),
                Err(e) => tracing::warn!(
                    kind = job.kind.as_str(),
                    booking_id = %job.booking_id,
                    error = %e,
                    "Notification failed"
                ),
            }
        }

        tracing::info!("Notification worker stopped");
    }

    /// Deliver one job, returning how many messages went out
    pub async fn deliver(&self, job: &NotificationJob) -> Result<usize, NotifyError> {
        let context = self.load_context(&job.booking_id).await?;

        match job.kind {
            NotificationKind::CustomerConfirmation => {
                let profile = context
                    .profile
                    .as_ref()
                    .ok_or_else(|| NotifyError::ProfileMissing(job.booking_id.clone()))?;
                let to = to_e164(&profile.phone_number);
                let body = templates::customer_confirmation(&context);
                self.send_all(std::slice::from_ref(&to), &body).await
            }
            NotificationKind::AdminNewBooking => {
                let body = templates::admin_new_booking(&context);
                self.send_all(&self.admin_numbers, &body).await
            }
            NotificationKind::AdminModification => {
                let body = templates::admin_modification(&context);
                self.send_all(&self.admin_numbers, &body).await
            }
        }
    }

    async fn load_context(&self, booking_id: &str) -> Result<BookingContext, NotifyError> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| NotifyError::BookingMissing(booking_id.to_string()))?;
        let profile = self.store.find_profile(booking.user_id).await?;
        let accessories = self.store.accessory_lines(booking.id).await?;

        Ok(BookingContext {
            booking,
            profile,
            accessories,
        })
    }

    /// Send to every recipient; one failure does not stop the rest
    async fn send_all(&self, recipients: &[String], body: &str) -> Result<usize, NotifyError> {
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut sent = 0;
        let mut last_error = None;
        for recipient in recipients {
            match self.messenger.send(recipient, body).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(recipient = %recipient, error = %e, "Message send failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(NotifyError::Delivery {
                attempted: recipients.len(),
                failed: recipients.len() - sent,
                last,
            }),
            None => Ok(sent),
        }
    }
}
