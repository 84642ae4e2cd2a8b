use crate::core::error::AlarmError;
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Good,
    Warning,
    Danger,
    Message,
}

impl Level {
    fn color(&self) -> Option<&'static str> {
        match self {
            Level::Good => Some("good"),
            Level::Warning => Some("warning"),
            Level::Danger => Some("danger"),
            Level::Message => None,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Level::Good => "RECOVERED",
            Level::Warning => "WARNING",
            Level::Danger => "CRITICAL",
            Level::Message => "NOTICE",
        }
    }
}

/// A sink for categorized messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, level: Level, text: &str) -> Result<(), AlarmError>;
}

#[derive(Serialize)]
struct SlackAttachment<'a> {
    color: &'a str,
    text: &'a str,
    fallback: &'a str,
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    channel: &'a str,
    username: &'a str,
    icon_url: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SlackAttachment<'a>>,
}

/// Posts messages to a Slack incoming webhook.
pub struct SlackAlarm {
    webhook_url: String,
    channel: String,
    username: String,
    icon_url: String,
    client: reqwest::Client,
}

impl SlackAlarm {
    pub fn new(webhook_url: String, channel: String, username: String, icon_url: String) -> SlackAlarm {
        SlackAlarm {
            webhook_url,
            channel,
            username,
            icon_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackAlarm {
    async fn send(&self, level: Level, text: &str) -> Result<(), AlarmError> {
        let payload = match level.color() {
            Some(color) => SlackPayload {
                text: None,
                channel: &self.channel,
                username: &self.username,
                icon_url: &self.icon_url,
                attachments: vec![SlackAttachment {
                    color,
                    text,
                    fallback: text,
                }],
            },
            None => SlackPayload {
                text: Some(text),
                channel: &self.channel,
                username: &self.username,
                icon_url: &self.icon_url,
                attachments: Vec::new(),
            },
        };

        let resp = self.client.post(&self.webhook_url).json(&payload).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlarmError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Sends messages by mail through an SMTP relay.
pub struct MailAlarm {
    from: String,
    to: String,
    mailer: SmtpTransport,
}

impl MailAlarm {
    pub fn new(
        from: String,
        to: String,
        smtp_username: String,
        smtp_password: String,
        relay: &str,
    ) -> Result<MailAlarm, AlarmError> {
        let creds = Credentials::new(smtp_username, smtp_password);
        Ok(MailAlarm {
            from,
            to,
            mailer: SmtpTransport::starttls_relay(relay)?
                .port(587)
                .credentials(creds)
                .build(),
        })
    }

    fn build(&self, level: Level, text: &str) -> Result<Message, AlarmError> {
        let body = format!("{}\n\n{}", Utc::now().to_rfc3339(), text);
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(format!("[{}] health watcher", level.title()))
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        Ok(email)
    }
}

#[async_trait]
impl Notifier for MailAlarm {
    async fn send(&self, level: Level, text: &str) -> Result<(), AlarmError> {
        let email = self.build(level, text)?;
        let mailer = self.mailer.clone();
        tokio::task::spawn_blocking(move || mailer.send(&email)).await??;
        tracing::debug!(to = %self.to, "mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn slack(server: &MockServer) -> SlackAlarm {
        SlackAlarm::new(
            format!("{}/hook", server.uri()),
            "#consul".to_string(),
            "Consul".to_string(),
            "https://example.com/icon.png".to_string(),
        )
    }

    #[tokio::test]
    async fn slack_colors_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({
                "channel": "#consul",
                "username": "Consul",
                "icon_url": "https://example.com/icon.png",
                "attachments": [{"color": "danger", "text": "down", "fallback": "down"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        slack(&server).send(Level::Danger, "down").await.unwrap();
    }

    #[tokio::test]
    async fn slack_plain_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({
                "text": "maintenance",
                "channel": "#consul",
                "username": "Consul",
                "icon_url": "https://example.com/icon.png"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        slack(&server).send(Level::Message, "maintenance").await.unwrap();
    }

    #[tokio::test]
    async fn slack_rejection_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let err = slack(&server).send(Level::Good, "up").await.unwrap_err();
        assert!(matches!(err, AlarmError::Rejected { status: 404, .. }));
    }

    #[test]
    fn mail_carries_level_in_subject() {
        let alarm = MailAlarm::new(
            "watcher@example.com".to_string(),
            "ops@example.com".to_string(),
            "user".to_string(),
            "pass".to_string(),
            "smtp.example.com",
        )
        .unwrap();
        let email = alarm.build(Level::Danger, "svc down").unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: [CRITICAL] health watcher"));
        assert!(raw.contains("svc down"));
    }

    #[test]
    fn mail_rejects_bad_address() {
        let alarm = MailAlarm::new(
            "not an address".to_string(),
            "ops@example.com".to_string(),
            "user".to_string(),
            "pass".to_string(),
            "smtp.example.com",
        )
        .unwrap();
        assert!(matches!(
            alarm.build(Level::Good, "x"),
            Err(AlarmError::Address(_))
        ));
    }
}
