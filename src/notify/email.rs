use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Message, Tokio1Executor};

use super::{html_body, plain_body, subject_line, Notifier, NotifyError};
use crate::config::SmtpSettings;
use crate::scan::Posting;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let creds = Credentials::new(settings.user.clone(), settings.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .context("invalid SMTP host")?
            .credentials(creds)
            .build();
        let from = settings.from.parse().context("invalid sender address")?;
        let to = settings.to.parse().context("invalid recipient address")?;
        Ok(Self { mailer, from, to })
    }

    fn build_message(&self, posting: &Posting) -> Result<Message> {
        // Multipart alternative: plain text plus an HTML rendition, the way
        // mail clients expect it.
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject_line(posting))
            .multipart(MultiPart::alternative_plain_html(
                plain_body(posting),
                html_body(posting),
            ))
            .context("build email")
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, posting: &Posting) -> Result<(), NotifyError> {
        let msg = self.build_message(posting)?;
        self.mailer
            .send(msg)
            .await
            .context("send email")
            .map_err(NotifyError::TransportFailure)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
