//! Builders for raw RFC 5322 test messages.

#![allow(dead_code)]

/// Builds a raw message with CRLF line endings.
pub struct MessageBuilder {
    message_id: Option<String>,
    subject: String,
    from: String,
    to: String,
    date: String,
    body: String,
    attachment: Option<(String, String)>,
}

impl MessageBuilder {
    /// A plain text message whose Message-ID and subject derive from `uid`.
    pub fn new(uid: u32) -> Self {
        Self {
            message_id: Some(format!("<msg-{}@example.com>", uid)),
            subject: format!("Message {}", uid),
            from: "Alice Sender <alice@example.com>".to_string(),
            to: "Bob <bob@example.com>".to_string(),
            date: "Mon, 05 Feb 2024 10:00:00 +0000".to_string(),
            body: format!("Body of message {}", uid),
            attachment: None,
        }
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_string());
        self
    }

    pub fn without_message_id(mut self) -> Self {
        self.message_id = None;
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn sender(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn recipient(mut self, to: &str) -> Self {
        self.to = to.to_string();
        self
    }

    /// Adds a base64 attachment; `content_b64` must already be encoded.
    pub fn attachment(mut self, filename: &str, content_b64: &str) -> Self {
        self.attachment = Some((filename.to_string(), content_b64.to_string()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut lines = vec![
            format!("From: {}", self.from),
            format!("To: {}", self.to),
            format!("Subject: {}", self.subject),
            format!("Date: {}", self.date),
        ];
        if let Some(id) = &self.message_id {
            lines.push(format!("Message-ID: {}", id));
        }
        lines.push("MIME-Version: 1.0".to_string());

        match &self.attachment {
            None => {
                lines.push("Content-Type: text/plain; charset=utf-8".to_string());
                lines.push(String::new());
                lines.push(self.body.clone());
            }
            Some((filename, content)) => {
                lines.push("Content-Type: multipart/mixed; boundary=\"XXBOUNDARYXX\"".to_string());
                lines.push(String::new());
                lines.push("--XXBOUNDARYXX".to_string());
                lines.push("Content-Type: text/plain; charset=utf-8".to_string());
                lines.push(String::new());
                lines.push(self.body.clone());
                lines.push("--XXBOUNDARYXX".to_string());
                lines.push(format!("Content-Type: application/pdf; name=\"{}\"", filename));
                lines.push(format!(
                    "Content-Disposition: attachment; filename=\"{}\"",
                    filename
                ));
                lines.push("Content-Transfer-Encoding: base64".to_string());
                lines.push(String::new());
                lines.push(content.clone());
                lines.push("--XXBOUNDARYXX--".to_string());
            }
        }
        lines.push(String::new());
        lines.join("\r\n").into_bytes()
    }
}
