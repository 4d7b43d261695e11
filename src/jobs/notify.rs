//! Fire-and-forget email and Slack delivery. Each message runs on its own
//! task and holds one permit of a shared semaphore while in flight.

use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::Error as BackoffError;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::NotifyConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn sponsor_thank_you(name: &str, to: &str, team_name: &str) -> Self {
        Email {
            to: to.to_string(),
            subject: format!("Thank you for supporting {team_name}!"),
            body: format!(
                "Hi {name},\n\n\
                 Thank you for your generous support of {team_name}!\n\
                 We appreciate your contribution and will keep you updated on our progress.\n\n\
                 Best regards,\n\
                 {team_name} Team"
            ),
        }
    }

    pub fn donation_thank_you(name: &str, to: &str, dollars: f64, team_name: &str) -> Self {
        Email {
            to: to.to_string(),
            subject: "Thank you for your donation!".to_string(),
            body: format!(
                "Hi {name},\n\nThank you for your generous donation of ${dollars:.2}.\n\nBest,\n{team_name} Team"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    config: NotifyConfig,
    permits: Arc<Semaphore>,
}

fn retry_notify_handler<E>(err: E, duration: Duration)
where
    E: std::fmt::Display,
{
    tracing::warn!(
        "Notification failed: {}. Retrying in {:.1}s...",
        err,
        duration.as_secs_f32()
    );
}

impl Notifier {
    pub fn new(client: Client, config: NotifyConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self { client, config, permits }
    }

    pub fn mail_enabled(&self) -> bool {
        self.config.mail_api_url.is_some()
    }

    pub fn slack_enabled(&self) -> bool {
        self.config.slack_webhook_url.is_some()
    }

    /// Queues an email. Returns `None` when no mail API is configured.
    pub fn send_email(&self, email: Email) -> Option<JoinHandle<()>> {
        let Some(url) = self.config.mail_api_url.clone() else {
            tracing::info!(to = %email.to, "mail API not configured; skipping email");
            return None;
        };
        let payload = json!({
            "from": self.config.mail_from,
            "to": email.to,
            "subject": email.subject,
            "text": email.body,
        });
        let key = self.config.mail_api_key.clone();
        Some(self.spawn("email", url, payload, key))
    }

    /// Posts a message to the Slack incoming webhook, if one is configured.
    pub fn slack(&self, text: impl Into<String>) -> Option<JoinHandle<()>> {
        let url = self.config.slack_webhook_url.clone()?;
        Some(self.spawn("slack", url, json!({ "text": text.into() }), None))
    }

    fn spawn(
        &self,
        kind: &'static str,
        url: String,
        payload: serde_json::Value,
        bearer: Option<String>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = post_with_retry(&client, &url, &payload, bearer.as_deref()).await {
                tracing::error!(kind, "notification dropped: {}", e);
            } else {
                tracing::info!(kind, "notification delivered");
            }
        })
    }
}

async fn post_with_retry(
    client: &Client,
    url: &str,
    payload: &serde_json::Value,
    bearer: Option<&str>,
) -> anyhow::Result<()> {
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..ExponentialBackoff::default()
    };

    retry_notify(
        backoff,
        || async move {
            let mut request = client.post(url).json(payload).timeout(Duration::from_secs(10));
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        Ok(())
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        Err(BackoffError::transient(anyhow::anyhow!("retryable status {}", status)))
                    } else {
                        Err(BackoffError::permanent(anyhow::anyhow!("rejected with status {}", status)))
                    }
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    Err(BackoffError::transient(anyhow::Error::new(err)))
                }
                Err(err) => Err(BackoffError::permanent(anyhow::Error::new(err))),
            }
        },
        retry_notify_handler,
    )
    .await
}
