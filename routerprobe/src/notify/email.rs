//! Email notifier: the session log as an SMTP attachment.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;

use super::Notifier;
use crate::error::NotifyError;

/// Sends the session log as a mail attachment through an SMTP relay.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build a notifier for `server` (`host:port`), authenticating with
    /// `user`/`password`, sending from `from` to the comma-separated
    /// `to` list.
    pub fn new(
        server: &str,
        user: &str,
        password: &str,
        from: &str,
        to: &str,
    ) -> Result<Self, NotifyError> {
        let (host, port) = server
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            .ok_or_else(|| NotifyError::ServerAddress(server.to_string()))?;

        let to: Vec<Mailbox> = to
            .split(',')
            .filter(|addr| !addr.trim().is_empty())
            .map(|addr| addr.trim().parse())
            .collect::<Result<_, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build();

        info!("email notifier instantiated for {server}");

        Ok(Self {
            transport,
            from: from.parse()?,
            to,
        })
    }
}

impl Notifier for EmailNotifier {
    async fn notify(&self, file_name: &str, content: &[u8]) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("routerprobe log {file_name}"));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let body = SinglePart::plain(format!("see attached log: {file_name}"));
        let attachment = Attachment::new(file_name.to_string())
            .body(content.to_vec(), ContentType::TEXT_PLAIN);

        let message = builder.multipart(MultiPart::mixed().singlepart(body).singlepart(attachment))?;

        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_requires_port() {
        let err = EmailNotifier::new("mail.example.com", "u", "p", "a@b.c", "d@e.f").unwrap_err();
        assert!(matches!(err, NotifyError::ServerAddress(_)));
    }

    #[test]
    fn test_recipient_list_must_be_non_empty() {
        let err = EmailNotifier::new("mail.example.com:25", "u", "p", "a@b.c", " ").unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[test]
    fn test_recipient_list_parses_multiple_addresses() {
        let notifier =
            EmailNotifier::new("mail.example.com:25", "u", "p", "a@b.c", "d@e.f, g@h.i").unwrap();
        assert_eq!(notifier.to.len(), 2);
    }
}
