use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A delivery that the background worker gave up on.
#[derive(Debug)]
pub struct MailFailure {
    pub email: OutgoingEmail,
    pub reason: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from_address.parse()?)
            .to(email.to.parse()?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Transport that discards everything. Used in tests and when SMTP is not set up.
pub struct NullTransport;

#[async_trait]
impl MailTransport for NullTransport {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        debug!(to = %email.to, subject = %email.subject, "null transport dropped email");
        Ok(())
    }
}

/// Handle to the background email worker.
///
/// Dispatch is fire-and-forget over a bounded queue: `enqueue` never blocks the
/// request and never reports delivery errors to the caller. Failed deliveries
/// are pushed onto the returned failure channel instead, which the binary
/// drains into the error log.
#[derive(Clone)]
pub struct Mailer {
    queue: mpsc::Sender<OutgoingEmail>,
}

impl Mailer {
    pub fn spawn(
        transport: Arc<dyn MailTransport>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<MailFailure>) {
        let (queue_tx, mut queue_rx) = mpsc::channel::<OutgoingEmail>(capacity);
        let (failure_tx, failure_rx) = mpsc::channel::<MailFailure>(capacity);

        tokio::spawn(async move {
            while let Some(email) = queue_rx.recv().await {
                match transport.deliver(&email).await {
                    Ok(()) => debug!(to = %email.to, subject = %email.subject, "email sent"),
                    Err(e) => {
                        let reason = e.to_string();
                        // Failure channel may itself be full or unread; the loss
                        // is still visible through the error log.
                        let _ = failure_tx.try_send(MailFailure { email, reason });
                    }
                }
            }
        });

        (Self { queue: queue_tx }, failure_rx)
    }

    /// Hand an email to the worker without waiting for delivery.
    pub fn enqueue(&self, email: OutgoingEmail) {
        if let Err(e) = self.queue.try_send(email) {
            warn!(error = %e, "mail queue full or closed, dropping email");
        }
    }

    pub fn log_failures(mut failures: mpsc::Receiver<MailFailure>) {
        tokio::spawn(async move {
            while let Some(failure) = failures.recv().await {
                error!(
                    to = %failure.email.to,
                    subject = %failure.email.subject,
                    reason = %failure.reason,
                    "email delivery failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn deliver(&self, _email: &OutgoingEmail) -> anyhow::Result<()> {
            anyhow::bail!("relay refused connection")
        }
    }

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "user@example.com".into(),
            subject: "Account activation".into(),
            body: "hello".into(),
        }
    }

    #[tokio::test]
    async fn worker_delivers_enqueued_email() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let (mailer, _failures) = Mailer::spawn(transport.clone(), 4);

        mailer.enqueue(email());

        // Give the worker a moment to drain the queue.
        for _ in 0..50 {
            if !transport.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
    }

    #[tokio::test]
    async fn delivery_failure_reaches_failure_channel_not_caller() {
        let (mailer, mut failures) = Mailer::spawn(Arc::new(FailingTransport), 4);

        // enqueue is infallible from the caller's point of view
        mailer.enqueue(email());

        let failure = tokio::time::timeout(Duration::from_secs(1), failures.recv())
            .await
            .expect("failure should arrive")
            .expect("channel open");
        assert_eq!(failure.email.to, "user@example.com");
        assert!(failure.reason.contains("relay refused"));
    }
}
