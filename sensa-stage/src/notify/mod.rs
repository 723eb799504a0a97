//! Outbound notification channels.
//!
//! A [`Notifier`] sends over push (app), SMS and email. Providers are wrapped
//! in a [`RateLimitedNotifier`] so that each channel keeps a minimum spacing
//! between sends across the whole process.

mod http;
mod logger;
mod rate_limit;

use async_trait::async_trait;
use sensa_core::{AlarmType, Org, User};
use sensa_store::StoreError;

pub use http::{HttpNotifier, Mailgun, Pushover, Twilio};
pub use logger::LogNotifier;
pub use rate_limit::{RateLimitedNotifier, Spacing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    App,
    Sms,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::App => "app",
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("unsupported alarm type {0}")]
    UnknownChannel(&'static str),
    #[error("user has no {0} recipient")]
    MissingRecipient(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("rate limiter: {0}")]
    RateLimit(#[from] StoreError),
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Push notification to a user key.
    async fn send_app(
        &self,
        user_key: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError>;

    async fn send_sms(&self, phone: &str, body: &str) -> Result<(), NotifyError>;

    /// Email from `sender_name` to `to`.
    async fn send_email(
        &self,
        sender_name: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError>;
}

fn recipient<'a>(address: &'a str, channel: Channel) -> Result<&'a str, NotifyError> {
    if address.is_empty() {
        Err(NotifyError::MissingRecipient(channel.as_str()))
    } else {
        Ok(address)
    }
}

/// Notify `user` over the channel of `alarm_type`.
pub async fn dispatch(
    notifier: &dyn Notifier,
    alarm_type: AlarmType,
    org: &Org,
    user: &User,
    subject: &str,
    body: &str,
) -> Result<(), NotifyError> {
    match alarm_type {
        AlarmType::App => {
            let key = recipient(&user.app_key, Channel::App)?;
            notifier.send_app(key, subject, body).await
        }
        AlarmType::Sms => {
            let phone = recipient(&user.phone, Channel::Sms)?;
            notifier.send_sms(phone, body).await
        }
        AlarmType::Email => {
            let to = recipient(&user.email, Channel::Email)?;
            notifier.send_email(&org.display_name, to, subject, body).await
        }
        AlarmType::Unspecified => Err(NotifyError::UnknownChannel(alarm_type.as_str())),
    }
}
