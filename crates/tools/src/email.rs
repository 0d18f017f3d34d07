use async_trait::async_trait;
use flightbot_core::config::EmailConfig;
use flightbot_core::{Error, Result};
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// A rendered report ready to be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEmail {
    pub subject: String,
    pub body_prefix: String,
    pub report: String,
}

impl ReportEmail {
    pub fn body(&self) -> String {
        format!("{}\n\n{}", self.body_prefix, self.report)
    }
}

/// Delivers the final report. Failures propagate to the caller.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    async fn deliver(&self, email: &ReportEmail) -> Result<()>;
}

/// Sends the report as one plain-text message through an SMTP relay.
/// Port 465 uses implicit TLS, any other port STARTTLS.
pub struct SmtpReportTransport {
    server: String,
    port: u16,
    sender: Mailbox,
    receiver: Mailbox,
    username: String,
    password: String,
}

impl SmtpReportTransport {
    pub fn new(config: &EmailConfig, receiver: &str) -> Result<Self> {
        if config.sender.trim().is_empty() {
            return Err(Error::Config("email.sender: must not be empty".into()));
        }
        if config.app_password.is_empty() {
            return Err(Error::Config(
                "email.appPassword: must not be empty (or set FLIGHTBOT_SMTP_PASSWORD)".into(),
            ));
        }
        let sender: Mailbox = config.sender.parse().map_err(|e| {
            Error::Validation(format!("Invalid sender address '{}': {}", config.sender, e))
        })?;
        let receiver: Mailbox = receiver.trim().parse().map_err(|e| {
            Error::Validation(format!("Invalid receiver address '{}': {}", receiver, e))
        })?;
        Ok(Self {
            server: config.server.clone(),
            port: config.port,
            sender,
            receiver,
            username: config.sender.clone(),
            password: config.app_password.clone(),
        })
    }

    fn build_message(&self, email: &ReportEmail) -> Result<Message> {
        Message::builder()
            .from(self.sender.clone())
            .to(self.receiver.clone())
            .subject(email.subject.clone())
            .header(header::ContentType::TEXT_PLAIN)
            .body(email.body())
            .map_err(|e| Error::Transport(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let builder = if self.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.server)
                .map_err(|e| Error::Transport(format!("SMTP relay error: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)
                .map_err(|e| Error::Transport(format!("SMTP STARTTLS error: {}", e)))?
        };
        Ok(builder.credentials(creds).port(self.port).build())
    }
}

#[async_trait]
impl ReportTransport for SmtpReportTransport {
    async fn deliver(&self, email: &ReportEmail) -> Result<()> {
        let message = self.build_message(email)?;
        info!(to = %self.receiver, server = %self.server, "sending results via email");
        self.mailer()?
            .send(message)
            .await
            .map_err(|e| Error::Transport(format!("Failed to send email: {}", e)))?;
        Ok(())
    }
}
