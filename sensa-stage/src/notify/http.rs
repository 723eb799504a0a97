use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use super::{LogNotifier, Notifier, NotifyError};
use crate::config::NotifyConfig;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const TWILIO_URL: &str = "https://api.twilio.com/2010-04-01/Accounts";
const MAILGUN_URL: &str = "https://api.mailgun.net/v3";

/// Push notifications.
#[derive(Debug, Clone)]
pub struct Pushover {
    pub token: String,
}

/// SMS.
#[derive(Debug, Clone)]
pub struct Twilio {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

/// Email.
#[derive(Debug, Clone)]
pub struct Mailgun {
    pub domain: String,
    pub api_key: String,
    /// Sender address; the org's display name is used as the sender name.
    pub from: String,
}

/// Sends through third-party HTTP APIs. Channels without a provider are
/// logged.
pub struct HttpNotifier {
    client: Client,
    pushover: Option<Pushover>,
    twilio: Option<Twilio>,
    mailgun: Option<Mailgun>,
}

impl HttpNotifier {
    pub fn new(
        client: Client,
        pushover: Option<Pushover>,
        twilio: Option<Twilio>,
        mailgun: Option<Mailgun>,
    ) -> Self {
        Self {
            client,
            pushover,
            twilio,
            mailgun,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let pushover = config.pushover_token.clone().map(|token| Pushover { token });
        let twilio = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from,
        ) {
            (Some(sid), Some(token), Some(from)) => Some(Twilio {
                account_sid: sid.clone(),
                auth_token: token.clone(),
                from: from.clone(),
            }),
            _ => None,
        };
        let mailgun = match (
            &config.mailgun_domain,
            &config.mailgun_api_key,
            &config.mailgun_from,
        ) {
            (Some(domain), Some(key), Some(from)) => Some(Mailgun {
                domain: domain.clone(),
                api_key: key.clone(),
                from: from.clone(),
            }),
            _ => None,
        };
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self::new(client, pushover, twilio, mailgun))
    }

    /// Whether any channel has a provider.
    pub fn is_configured(&self) -> bool {
        self.pushover.is_some() || self.twilio.is_some() || self.mailgun.is_some()
    }
}

async fn send(request: RequestBuilder) -> Result<(), NotifyError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Provider {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_app(
        &self,
        user_key: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let Some(pushover) = &self.pushover else {
            return LogNotifier.send_app(user_key, subject, body).await;
        };
        let form = [
            ("token", pushover.token.as_str()),
            ("user", user_key),
            ("title", subject),
            ("message", body),
        ];
        send(self.client.post(PUSHOVER_URL).form(&form)).await?;
        debug!(channel = "app", "notification sent");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, body: &str) -> Result<(), NotifyError> {
        let Some(twilio) = &self.twilio else {
            return LogNotifier.send_sms(phone, body).await;
        };
        let url = format!("{TWILIO_URL}/{}/Messages.json", twilio.account_sid);
        let form = [("To", phone), ("From", twilio.from.as_str()), ("Body", body)];
        let request = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&form);
        send(request).await?;
        debug!(channel = "sms", "notification sent");
        Ok(())
    }

    async fn send_email(
        &self,
        sender_name: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let Some(mailgun) = &self.mailgun else {
            return LogNotifier.send_email(sender_name, to, subject, body).await;
        };
        let url = format!("{MAILGUN_URL}/{}/messages", mailgun.domain);
        let from = format!("{sender_name} <{}>", mailgun.from);
        let form = [
            ("from", from.as_str()),
            ("to", to),
            ("subject", subject),
            ("text", body),
        ];
        let request = self
            .client
            .post(url)
            .basic_auth("api", Some(&mailgun.api_key))
            .form(&form);
        send(request).await?;
        debug!(channel = "email", "notification sent");
        Ok(())
    }
}
