//! Email notifications carrying reset/activation tokens.
//!
//! [`EmailService`] renders a minijinja template with the user and token, builds the message
//! with lettre, and hands the formatted bytes to a [`MailTransport`]. The transport is a trait
//! so tests can capture outgoing mail; [`LettreTransport`] is the SMTP/file implementation.

use std::{path::Path, sync::Arc};

use lettre::{
    Address, AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    address::Envelope,
    message::{Mailbox, header::ContentType},
    transport::smtp::{authentication::Credentials, extension::ClientId},
};
use minijinja::{Environment, UndefinedBehavior, context};
use thiserror::Error as ThisError;
use tracing::instrument;

use crate::{
    auth::tokens::ResetToken,
    config::{EmailConfig, EmailTransportConfig},
    db::models::users::User,
    errors::Error,
    types::abbrev_uuid,
};

/// Name under which the configured notification template is registered.
pub const NOTIFICATION_TEMPLATE: &str = "notification";

/// Sender used when neither `from_email` nor an SMTP username address is configured.
pub const FALLBACK_SENDER: &str = "no-reply@localhost";

#[derive(ThisError, Debug)]
pub enum MailError {
    #[error("render notification template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("invalid email address {address:?}: {message}")]
    Address { address: String, message: String },

    #[error("build email message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("send email: {0}")]
    Transport(String),
}

/// Delivers an already formatted message.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), MailError>;
}

enum LettreInner {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// SMTP, or `.eml` files in a directory for development.
pub struct LettreTransport {
    inner: LettreInner,
}

impl LettreTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let inner = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let mut builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Configuration {
                    message: format!("create SMTP transport: {e}"),
                })?
                .port(*port);

                if let (Some(username), Some(password)) = (username, password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }
                if let Some(greeting) = &config.greeting {
                    builder = builder.hello_name(ClientId::Domain(greeting.clone()));
                }

                LettreInner::Smtp(builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Configuration {
                        message: format!("create emails directory: {e}"),
                    })?;
                }
                LettreInner::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self { inner })
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address.parse::<Address>().map_err(|e| MailError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[async_trait::async_trait]
impl MailTransport for LettreTransport {
    async fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), MailError> {
        let envelope = Envelope::new(Some(parse_address(from)?), vec![parse_address(to)?])?;

        match &self.inner {
            LettreInner::Smtp(smtp) => {
                smtp.send_raw(&envelope, message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
            LettreInner::File(file) => {
                file.send_raw(&envelope, message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
        }

        Ok(())
    }
}

/// Sender address resolution: `from_email`, then an address-shaped SMTP username, then
/// [`FALLBACK_SENDER`].
pub fn sender_address(config: &EmailConfig) -> String {
    if let Some(from) = &config.from_email {
        return from.clone();
    }
    if let EmailTransportConfig::Smtp {
        username: Some(username),
        ..
    } = &config.transport
        && username.contains('@')
    {
        return username.clone();
    }
    FALLBACK_SENDER.to_string()
}

/// Renders and sends token notifications.
pub struct EmailService {
    transport: Arc<dyn MailTransport>,
    templates: Environment<'static>,
    sender: Mailbox,
    subject: String,
}

impl EmailService {
    /// Compile the configured template and resolve the sender. Either failing is a
    /// configuration error.
    pub fn new(config: &EmailConfig, transport: Arc<dyn MailTransport>) -> Result<Self, Error> {
        let sender_email = sender_address(config);
        let address = sender_email.parse::<Address>().map_err(|e| Error::Configuration {
            message: format!("invalid sender address {sender_email:?}: {e}"),
        })?;

        let mut templates = Environment::new();
        templates.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut service = Self {
            transport,
            templates,
            sender: Mailbox::new(config.from_name.clone(), address),
            subject: config.subject.clone(),
        };
        service.add_template(NOTIFICATION_TEMPLATE, &config.template)?;

        Ok(service)
    }

    /// Build the service with a lettre transport from `config`.
    pub fn from_config(config: &EmailConfig) -> Result<Self, Error> {
        let transport = LettreTransport::new(config)?;
        Self::new(config, Arc::new(transport))
    }

    /// Register an additional template, compiling it now.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        self.templates
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| Error::Configuration {
                message: format!("compile email template {name:?}: {e}"),
            })
    }

    /// Render `template` with the fixed `User` and `Token` variables.
    pub fn render(&self, user: &User, token: &ResetToken, template: &str) -> Result<String, MailError> {
        let template = self.templates.get_template(template)?;
        Ok(template.render(context! {
            User => &user.username,
            Token => &token.value,
        })?)
    }

    /// Render `template` for `user` and deliver it to the user's address.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)), err)]
    pub async fn send(&self, user: &User, token: &ResetToken, template: &str) -> Result<(), MailError> {
        let body = self.render(user, token, template)?;

        let recipient = user.email.parse::<Mailbox>().map_err(|e| MailError::Address {
            address: user.email.clone(),
            message: e.to_string(),
        })?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.transport
            .send(&self.sender.email.to_string(), &user.email, &message.formatted())
            .await?;

        tracing::info!("Sent token notification");
        Ok(())
    }

    /// Send the configured notification template.
    pub async fn notify(&self, user: &User, token: &ResetToken) -> Result<(), MailError> {
        self.send(user, token, NOTIFICATION_TEMPLATE).await
    }
}
