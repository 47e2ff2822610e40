//! Customer and admin notifications

mod dispatcher;
mod messenger;
mod templates;

pub use dispatcher::{
    NotificationDispatcher, NotificationJob, NotificationKind, NotificationWorker, NotifyError,
};
pub use messenger::{MessagingProvider, TwilioMessenger};
pub use templates::BookingContext;
