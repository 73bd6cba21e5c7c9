//! SMTP email notifier via `lettre`.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    notify::{Notifier, NotifyError},
    template::render_email_html,
};

/// Sends alert mails through an SMTP relay.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP settings.
    ///
    /// Port 465 uses implicit TLS, otherwise `tls = true` selects STARTTLS
    /// and `tls = false` a plain connection. Credentials are attached only when both are given.
    pub fn from_config(
        smtp_host: &str,
        smtp_port: u16,
        tls: bool,
        from: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self, NotifyError> {
        let from: Mailbox = from.parse().map_err(|e: lettre::address::AddressError| {
            NotifyError::Config(format!("invalid sender '{}': {}", from, e))
        })?;

        let mut builder = if smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(smtp_port)
        };

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, address: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let to: Mailbox = address.parse().map_err(|e: lettre::address::AddressError| {
            NotifyError::Address {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        let html = render_email_html(subject, body, Utc::now().year())
            .map_err(|e| NotifyError::Template(e.to_string()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(body.to_string(), html))
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = self.build_message(address, subject, body)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(channel = "email", subject = %subject, "notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "email"
    }
}
