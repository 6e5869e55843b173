//! Mail delivery of a book to a Kindle address.
//!
//! [`Mailer`] sends one attachment and classifies failures into
//! [`DeliveryError`]. [`Deliverer`] wraps a mailer with the retry policy:
//!
//! - [`DeliveryError::Auth`]: ask for a new password, up to
//!   `max_auth_attempts` attempts in total
//! - [`DeliveryError::Transient`]: exponential backoff, up to
//!   `max_transient_attempts` attempts
//! - anything else: fail immediately

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

use crate::DeliveryError;

/// Default SMTP relay.
pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";

/// Default SMTP submission port.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Attempts allowed while the server keeps rejecting credentials.
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 3;

/// Attempts allowed for connection-level failures.
pub const DEFAULT_MAX_TRANSIENT_ATTEMPTS: u32 = 3;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// SMTP reply codes meaning the login was refused.
const AUTH_CODES: [&str; 3] = ["530", "534", "535"];

/// MIME type of an attachment in `format`.
pub fn content_type_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mobi" | "azw" | "azw3" => "application/x-mobipocket-ebook",
        "epub" => "application/epub+zip",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// One message carrying one book.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sender address, also the SMTP login.
    pub from: String,
    /// Kindle address.
    pub to: String,
    /// SMTP server host.
    pub server: String,
    /// SMTP server port.
    pub port: u16,
    /// File name shown for the attachment.
    pub attachment_name: String,
    /// Attachment content.
    pub data: Vec<u8>,
    /// Attachment MIME type.
    pub content_type: String,
}

impl Envelope {
    /// Builds an envelope for the default SMTP relay, deriving the
    /// content type from `format`.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        attachment_name: impl Into<String>,
        data: Vec<u8>,
        format: &str,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            server: DEFAULT_SMTP_SERVER.to_string(),
            port: DEFAULT_SMTP_PORT,
            attachment_name: attachment_name.into(),
            data,
            content_type: content_type_for(format).to_string(),
        }
    }

    /// Sets the SMTP server and port.
    pub fn with_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.server = server.into();
        self.port = port;
        self
    }
}

/// Sends an [`Envelope`] with the given password.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers the message once; no retries.
    async fn send(&self, envelope: &Envelope, password: &str) -> Result<(), DeliveryError>;
}

/// [`Mailer`] over SMTP with STARTTLS.
#[derive(Debug, Clone, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    /// Creates an SMTP mailer.
    pub fn new() -> Self {
        Self
    }

    /// Builds the MIME message: empty subject, one attachment, no body text.
    pub fn build_message(envelope: &Envelope) -> Result<Message, DeliveryError> {
        let from: Mailbox = envelope
            .from
            .parse()
            .map_err(|e| DeliveryError::Message(format!("bad sender {}: {e}", envelope.from)))?;
        let to: Mailbox = envelope
            .to
            .parse()
            .map_err(|e| DeliveryError::Message(format!("bad recipient {}: {e}", envelope.to)))?;
        let content_type = ContentType::parse(&envelope.content_type).map_err(|e| {
            DeliveryError::Message(format!("bad content type {}: {e}", envelope.content_type))
        })?;

        let attachment = Attachment::new(envelope.attachment_name.clone())
            .body(envelope.data.clone(), content_type);

        Message::builder()
            .from(from)
            .to(to)
            .subject("")
            .multipart(MultiPart::mixed().singlepart(attachment))
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, envelope: &Envelope, password: &str) -> Result<(), DeliveryError> {
        let message = Self::build_message(envelope)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&envelope.server)
            .map_err(|e| DeliveryError::Message(format!("bad SMTP server {}: {e}", envelope.server)))?
            .port(envelope.port)
            .credentials(Credentials::new(envelope.from.clone(), password.to_string()))
            .build();

        debug!(
            "Sending {} ({} bytes) to {} via {}:{}",
            envelope.attachment_name,
            envelope.data.len(),
            envelope.to,
            envelope.server,
            envelope.port
        );
        transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| classify_smtp_error(&e, envelope))
    }
}

fn classify_smtp_error(err: &lettre::transport::smtp::Error, envelope: &Envelope) -> DeliveryError {
    let code = err.status().map(|code| code.to_string());
    classify(code.as_deref(), err.is_permanent(), &err.to_string(), envelope)
}

/// Maps an SMTP reply code (if any) to a delivery failure class.
fn classify(code: Option<&str>, permanent: bool, reason: &str, envelope: &Envelope) -> DeliveryError {
    if code.is_some_and(|c| AUTH_CODES.contains(&c)) {
        return DeliveryError::Auth {
            user: envelope.from.clone(),
            reason: reason.to_string(),
        };
    }
    if permanent {
        return DeliveryError::Rejected(reason.to_string());
    }
    DeliveryError::Transient {
        server: envelope.server.clone(),
        reason: reason.to_string(),
    }
}

/// Source of replacement passwords after an authentication failure.
pub trait PasswordPrompt: Send + Sync {
    /// Asks for the password of `user`; `None` when the user gives up.
    fn prompt(&self, user: &str) -> Option<String>;
}

/// Reads the password from the terminal without echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self, user: &str) -> Option<String> {
        rpassword::prompt_password(format!("SMTP password for {user}: "))
            .ok()
            .filter(|p| !p.is_empty())
    }
}

/// Sends with bounded, classified retries.
pub struct Deliverer {
    mailer: Arc<dyn Mailer>,
    prompt: Box<dyn PasswordPrompt>,
    max_auth_attempts: u32,
    max_transient_attempts: u32,
    backoff_base: Duration,
}

impl Deliverer {
    /// Creates a deliverer with the default limits.
    pub fn new(mailer: Arc<dyn Mailer>, prompt: Box<dyn PasswordPrompt>) -> Self {
        Self {
            mailer,
            prompt,
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            max_transient_attempts: DEFAULT_MAX_TRANSIENT_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Sets the total attempts allowed while authentication fails.
    pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = attempts.max(1);
        self
    }

    /// Sets the attempts allowed for transient failures.
    pub fn with_max_transient_attempts(mut self, attempts: u32) -> Self {
        self.max_transient_attempts = attempts.max(1);
        self
    }

    /// Sets the first backoff delay; later delays double it.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay before retry number `attempt` (1 for the first retry).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Delivers `envelope`, starting with `password` or a prompted one.
    ///
    /// Passwords entered at the prompt are used for this delivery only.
    pub async fn deliver(
        &self,
        envelope: &Envelope,
        password: Option<String>,
    ) -> Result<(), DeliveryError> {
        let mut password = match password {
            Some(p) => p,
            None => self.ask_password(&envelope.from)?,
        };
        let mut auth_failures = 0;
        let mut transient_failures = 0;

        loop {
            match self.mailer.send(envelope, &password).await {
                Ok(()) => {
                    info!("Sent {} to {}", envelope.attachment_name, envelope.to);
                    return Ok(());
                }
                Err(err @ DeliveryError::Auth { .. }) => {
                    auth_failures += 1;
                    if auth_failures >= self.max_auth_attempts {
                        return Err(err);
                    }
                    warn!("{err}");
                    password = self.ask_password(&envelope.from)?;
                }
                Err(err @ DeliveryError::Transient { .. }) => {
                    transient_failures += 1;
                    if transient_failures >= self.max_transient_attempts {
                        return Err(err);
                    }
                    let delay = self.backoff_delay(transient_failures);
                    warn!("{err}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn ask_password(&self, user: &str) -> Result<String, DeliveryError> {
        self.prompt.prompt(user).ok_or_else(|| DeliveryError::Auth {
            user: user.to_string(),
            reason: "no password given".to_string(),
        })
    }
}
