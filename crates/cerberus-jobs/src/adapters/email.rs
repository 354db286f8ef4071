//! Email extractor for RFC 822 messages.

use async_trait::async_trait;
use mail_parser::{Address, Message, MessageParser, MimeHeaders};

use cerberus_core::{Error, Extractor, Result};

const EMAIL_TYPES: &[&str] = &["message/rfc822", "message/x-emlx", "application/vnd.ms-outlook"];

/// Renders the addressing headers, the body, and an attachment list.
///
/// The plain-text body is preferred; HTML-only messages are converted to
/// text. Attachments are listed by name and type, never extracted.
pub struct EmailExtractor;

fn format_address<'x>(address: &'x Address<'x>) -> String {
    address
        .iter()
        .map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_message<'x>(message: &'x Message<'x>) -> String {
    let mut out = String::from("Email message\n\n");

    let addresses = [
        ("From", message.from()),
        ("To", message.to()),
        ("Cc", message.cc()),
    ];
    for (label, address) in addresses {
        if let Some(rendered) = address.map(format_address).filter(|s| !s.is_empty()) {
            out.push_str(&format!("{}: {}\n", label, rendered));
        }
    }
    if let Some(subject) = message.subject() {
        out.push_str(&format!("Subject: {}\n", subject));
    }
    if let Some(date) = message.date() {
        out.push_str(&format!("Date: {}\n", date.to_rfc3339()));
    }

    out.push('\n');
    if let Some(body) = message.body_text(0) {
        out.push_str(body.trim());
        out.push('\n');
    }

    let attachments: Vec<String> = message
        .attachments()
        .map(|part| {
            let name = part.attachment_name().unwrap_or("unnamed");
            let media_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            format!("- {} ({}, {} bytes)", name, media_type, part.contents().len())
        })
        .collect();
    if !attachments.is_empty() {
        out.push_str("\nAttachments:\n");
        out.push_str(&attachments.join("\n"));
        out.push('\n');
    }

    out
}

#[async_trait]
impl Extractor for EmailExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        EMAIL_TYPES.iter().any(|t| mime_type.starts_with(t))
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        let message = MessageParser::default()
            .parse(data)
            .filter(|m| m.headers().iter().next().is_some())
            .ok_or_else(|| Error::InvalidInput("failed to parse email message".to_string()))?;

        let has_body = message
            .body_text(0)
            .is_some_and(|body| !body.trim().is_empty());
        let has_subject = message.subject().is_some_and(|s| !s.trim().is_empty());
        if !has_body && !has_subject && message.attachment_count() == 0 {
            return Err(Error::EmptyContent(
                "email has no subject, body, or attachments".to_string(),
            ));
        }

        Ok(render_message(&message))
    }

    fn name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Dana Ortiz <dana@example.com>\r\n\
To: ops@example.com, Lee <lee@example.com>\r\n\
Subject: Q3 vendor renewal\r\n\
Date: Tue, 1 Oct 2024 09:30:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Please approve the renewal by Friday.\r\n";

    const MULTIPART: &str = "From: billing@example.com\r\n\
To: finance@example.com\r\n\
Subject: Invoice attached\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Invoice <b>#4</b> is due.</p>\r\n\
--XYZ\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"invoice-4.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ--\r\n";

    #[test]
    fn test_accepts_email_types() {
        let e = EmailExtractor;
        assert!(e.can_handle("message/rfc822"));
        assert!(e.can_handle("application/vnd.ms-outlook"));
        assert!(!e.can_handle("text/plain"));
    }

    #[tokio::test]
    async fn test_plain_message_headers_and_body() {
        let text = EmailExtractor.extract(PLAIN.as_bytes()).await.unwrap();
        assert!(text.contains("From: Dana Ortiz <dana@example.com>"));
        assert!(text.contains("To: ops@example.com, Lee <lee@example.com>"));
        assert!(text.contains("Subject: Q3 vendor renewal"));
        assert!(text.contains("Date: 2024-10-01T09:30:00"));
        assert!(text.contains("Please approve the renewal by Friday."));
        assert!(!text.contains("Attachments:"));
    }

    #[tokio::test]
    async fn test_html_body_and_attachment_list() {
        let text = EmailExtractor.extract(MULTIPART.as_bytes()).await.unwrap();
        assert!(text.contains("Subject: Invoice attached"));
        assert!(text.contains("Invoice #4 is due."));
        assert!(!text.contains("<p>"));
        assert!(text.contains("Attachments:\n- invoice-4.pdf (application/pdf"));
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let err = EmailExtractor.extract(b"").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
