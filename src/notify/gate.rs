use crate::config::{ActiveHours, AppConfig};
use crate::models::ListingRecord;
use crate::notify::buffer::NotificationBuffer;
use crate::notify::traits::{Clock, Email, Notifier};
use chrono::Timelike;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What happened to one `notify` call
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Nothing to send
    Empty,
    /// Outside the active window; written to the buffer
    Buffered,
    /// Inside the window but nobody to send to; the buffer is left alone
    NoRecipients,
    Delivered(DeliveryReport),
}

/// Per-recipient results of one delivery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

/// Decides between sending now and buffering for later
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    buffer: NotificationBuffer,
    active_hours: ActiveHours,
    recipients: Vec<String>,
    from: String,
    /// Attach an HTML part built from enrichment data
    rich: bool,
}

impl NotificationGate {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        buffer: NotificationBuffer,
        config: &AppConfig,
    ) -> Self {
        Self {
            notifier,
            clock,
            buffer,
            active_hours: config.active_hours,
            recipients: config.recipients.clone(),
            from: config.mail.from.clone(),
            rich: config.fetch_listing_details,
        }
    }

    pub async fn notify(&self, term: &str, items: &[ListingRecord]) -> GateOutcome {
        if items.is_empty() {
            return GateOutcome::Empty;
        }

        let now = self.clock.now();
        let hour = now.hour();

        if !self.active_hours.contains(hour) {
            let stamp = now.format(TIMESTAMP_FORMAT).to_string();
            self.buffer.append(&buffer_block(term, items, &stamp)).await;
            info!(
                "🌙 {} result(s) for '{}' buffered (hour {} outside {}-{})",
                items.len(),
                term,
                hour,
                self.active_hours.start,
                self.active_hours.end
            );
            return GateOutcome::Buffered;
        }

        if self.recipients.is_empty() {
            warn!("No recipients configured, dropping '{}'", result_count(items.len(), term));
            return GateOutcome::NoRecipients;
        }

        let previous = self.buffer.take().await;
        let email = self.compose(term, items, &previous);
        GateOutcome::Delivered(self.deliver(email).await)
    }

    fn compose(&self, term: &str, items: &[ListingRecord], previous: &str) -> Email {
        let mut text = String::new();
        if !previous.is_empty() {
            text.push_str("Previous notifications (outside active hours):\n\n");
            text.push_str(previous);
            text.push_str("\n----------------------------------------\n\n");
        }
        text.push_str(&format!("{}:\n\n", result_count(items.len(), term)));
        for item in items {
            text.push_str(&item_lines(item));
        }

        let html = self.rich.then(|| html_body(term, items, previous));

        Email {
            from: self.from.clone(),
            to: String::new(),
            subject: result_count(items.len(), term),
            text,
            html,
        }
    }

    /// Send to every recipient concurrently; one failure never blocks the rest
    async fn deliver(&self, email: Email) -> DeliveryReport {
        let sends = self.recipients.iter().map(|to| {
            let message = Email { to: to.clone(), ..email.clone() };
            async move {
                let result = self.notifier.send(&message).await;
                (message.to, result)
            }
        });

        let mut report = DeliveryReport::default();
        for (to, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    debug!("Sent '{}' to {} via {}", email.subject, to, self.notifier.name());
                    report.delivered.push(to);
                }
                Err(e) => {
                    warn!("Failed to send '{}' to {}: {:#}", email.subject, to, e);
                    report.failed.push(to);
                }
            }
        }

        info!(
            "📧 '{}' delivered to {}/{} recipient(s)",
            email.subject,
            report.delivered.len(),
            self.recipients.len()
        );
        report
    }
}

/// `1 new result for "x"` / `3 new results for "x"`
pub fn result_count(count: usize, term: &str) -> String {
    let plural = if count > 1 { "s" } else { "" };
    format!("{} new result{} for \"{}\"", count, plural, term)
}

fn item_lines(item: &ListingRecord) -> String {
    let mut line = format!("- {} | {} | {}", item.title, item.price_text, item.link);
    if let Some(estimate) = &item.estimate {
        line.push_str(&format!(" | est. resale {}", estimate));
    }
    line.push('\n');
    if !item.description.is_empty() {
        line.push_str(&format!("    {}\n", item.description.replace('\n', " ")));
    }
    line
}

fn buffer_block(term: &str, items: &[ListingRecord], stamp: &str) -> String {
    let mut block = format!("=== {} at {} ===\n", result_count(items.len(), term), stamp);
    for item in items {
        block.push_str(&item_lines(item));
    }
    block.push('\n');
    block
}

fn html_body(term: &str, items: &[ListingRecord], previous: &str) -> String {
    let mut html = String::new();
    if !previous.is_empty() {
        html.push_str("<h3>Previous notifications (outside active hours)</h3>");
        html.push_str(&format!("<pre>{}</pre><hr>", escape_html(previous)));
    }
    html.push_str(&format!("<h2>{}</h2>", escape_html(&result_count(items.len(), term))));

    for item in items {
        html.push_str("<div style=\"margin-bottom:16px\">");
        if !item.image.is_empty() {
            html.push_str(&format!(
                "<img src=\"{}\" alt=\"\" style=\"max-width:240px\"><br>",
                escape_html(&item.image)
            ));
        }
        html.push_str(&format!(
            "<a href=\"{}\"><strong>{}</strong></a><br>",
            escape_html(&item.link),
            escape_html(&item.title)
        ));
        html.push_str(&format!("Price: {}", escape_html(&item.price_text)));
        if let Some(estimate) = &item.estimate {
            html.push_str(&format!(" &middot; Est. resale: {}", escape_html(estimate)));
        }
        if !item.description.is_empty() {
            html.push_str(&format!("<p>{}</p>", escape_html(&item.description)));
        }
        html.push_str("</div>");
    }
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
