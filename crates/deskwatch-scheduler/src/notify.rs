//! Notification text: turns a ticket into the Slack message body.
//! Pure formatting, no I/O.

use deskwatch_core::types::{NotificationKind, Ticket};

/// Icon, headline verb and the party being waited on, per kind.
fn presentation(kind: NotificationKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        NotificationKind::OpenNoAgentResponse => ("🚨", "needs attention", "agent response"),
        NotificationKind::PendingNoCustomerResponse => ("⏳", "waiting for customer", "customer response"),
    }
}

/// Deep link to a ticket in the help desk web UI.
pub fn ticket_url(base_url: &str, number: i64) -> String {
    format!("{}/conversation/{number}", base_url.trim_end_matches('/'))
}

/// Render the Slack mrkdwn message for a ticket.
pub fn format_message(ticket: &Ticket, base_url: &str) -> String {
    let (emoji, action, waiting_for) = presentation(ticket.kind);

    let mut text = format!("{emoji} Ticket #{} {action}\n", ticket.number);
    text.push_str(&format!("*Subject:* {}\n", ticket.subject));
    text.push_str(&format!("*Customer:* {}\n", ticket.customer_name));
    text.push_str(&format!(
        "*Waiting for:* {waiting_for} for {}\n",
        format_wait(ticket.minutes_since_reply)
    ));
    text.push_str(&format!("*Assigned to:* {}\n", ticket.assignee().unwrap_or("Unassigned")));
    text.push_str(&format!(
        "*View ticket:* <{}|Open in FreeScout>",
        ticket_url(base_url, ticket.number)
    ));
    text
}

/// Human wait time: `"45 minutes"`, `"1 hour"`, `"2 hours 5 minutes"`.
pub fn format_wait(minutes: i64) -> String {
    let minutes = minutes.max(0);
    if minutes < 60 {
        return format!("{minutes} minutes");
    }

    let hours = minutes / 60;
    let rest = minutes % 60;
    let hours_text = if hours == 1 { "1 hour".to_string() } else { format!("{hours} hours") };

    if rest == 0 {
        hours_text
    } else {
        format!("{hours_text} {rest} minutes")
    }
}
