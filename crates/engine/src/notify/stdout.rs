use async_trait::async_trait;
use serde_json::json;
use std::str::FromStr;

use crate::notify::{Notifier, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutFormat {
    Json { pretty: bool },
    Text,
}

/// Prints alerts instead of mailing them. Used when no SMTP relay is set.
#[derive(Debug)]
pub struct StdoutNotifier {
    format: StdoutFormat,
}

impl StdoutNotifier {
    pub fn new(format: StdoutFormat) -> Self {
        Self { format }
    }

    fn render(&self, address: &str, subject: &str, body: &str) -> Result<String, NotifyError> {
        let rendered = match self.format {
            StdoutFormat::Json { pretty } => {
                let value = json!({
                    "channel": "stdout",
                    "to": address,
                    "subject": subject,
                    "body": body,
                });
                if pretty {
                    serde_json::to_string_pretty(&value)?
                } else {
                    serde_json::to_string(&value)?
                }
            }
            StdoutFormat::Text => format!("To: {}\nSubject: {}\n\n{}\n", address, subject, body),
        };
        Ok(rendered)
    }
}

impl Default for StdoutNotifier {
    fn default() -> Self {
        Self::new(StdoutFormat::Json { pretty: false })
    }
}

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        println!("{}", self.render(address, subject, body)?);
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "stdout"
    }
}

impl FromStr for StdoutFormat {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StdoutFormat::Json { pretty: false }),
            "pretty" | "json-pretty" => Ok(StdoutFormat::Json { pretty: true }),
            "text" => Ok(StdoutFormat::Text),
            other => Err(NotifyError::Config(format!(
                "Invalid stdout format: {}. Must be 'json', 'pretty' or 'text'",
                other
            ))),
        }
    }
}
