// src/services/templates.rs
//
// HTML bodies for outbound mail. Placeholders are `{name}` tokens filled in
// one pass, so braces inside a value are never read as placeholders; caller
// values are HTML-escaped first.

use crate::mailer::QR_CONTENT_ID;
use crate::models::AppointmentStatus;

const STATUS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body { font-family: Arial, sans-serif; }
        .container { padding: 20px; max-width: 600px; margin: 0 auto; }
        .header { background-color: {color}; color: white; padding: 10px; text-align: center; }
        .details { margin: 20px 0; }
        .qr-code { text-align: center; margin: 20px 0; }
        .status-badge { display: inline-block; padding: 5px 10px; border-radius: 4px; background-color: {color}; color: white; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header"><h2>Appointment {status}</h2></div>
        <div class="details">
            <span class="status-badge">{status}</span>
            <h3>Appointment Details:</h3>
            <p><strong>Doctor:</strong> {doctor_name}</p>
            <p><strong>Date:</strong> {date}</p>
            <p><strong>Time:</strong> {time} (Time in 24-hour format)</p>
            <p><strong>Appointment ID:</strong> {appointment_id}</p>
        </div>
        {qr_block}
        <div class="footer">{footer}</div>
    </div>
</body>
</html>
"#;

const QR_BLOCK: &str = r#"<div class="qr-code">
            <h3>Verification QR Code</h3>
            <img src="cid:{cid}" alt="Verification QR Code">
            <p>Please present this QR code during your visit for verification</p>
        </div>"#;

const REVIEW_TEMPLATE: &str = r#"<h2>Rate Your Doctor</h2>
<p>Thank you for your appointment with Dr. {doctor_name}</p>
<p>Please take a moment to rate your experience:</p>
<a href="{review_link}">Submit Review</a>
"#;

pub struct StatusEmailView<'a> {
    pub status: AppointmentStatus,
    pub doctor_name: &'a str,
    pub date: &'a str,
    pub time: &'a str,
    pub appointment_id: &'a str,
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Replaces every `{key}` that names a var. Unknown braces (CSS rules) are
/// copied through and substituted values are not scanned again.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match hit {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// "confirmed" -> "Confirmed"
pub fn status_title(status: AppointmentStatus) -> String {
    let s = status.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub fn status_subject(status: AppointmentStatus) -> String {
    format!("Appointment {}", status_title(status))
}

pub fn render_status_email(view: &StatusEmailView<'_>) -> String {
    let confirmed = view.status == AppointmentStatus::Confirmed;
    let (color, qr_block, footer) = if confirmed {
        (
            "#4CAF50",
            fill(QR_BLOCK, &[("cid", QR_CONTENT_ID)]),
            "<p>Please keep this confirmation for your records.</p>\
             <p>Present the QR code when you arrive for your appointment.</p>",
        )
    } else {
        (
            "#f44336",
            String::new(),
            "<p>Your appointment has been cancelled. Please contact us if you need to reschedule.</p>",
        )
    };

    fill(
        STATUS_TEMPLATE,
        &[
            ("color", color),
            ("qr_block", qr_block.as_str()),
            ("footer", footer),
            ("status", status_title(view.status).as_str()),
            ("doctor_name", escape(view.doctor_name).as_str()),
            ("date", escape(view.date).as_str()),
            ("time", escape(view.time).as_str()),
            ("appointment_id", escape(view.appointment_id).as_str()),
        ],
    )
}

pub fn render_review_email(doctor_name: &str, review_link: &str) -> String {
    fill(
        REVIEW_TEMPLATE,
        &[
            ("doctor_name", escape(doctor_name).as_str()),
            ("review_link", escape(review_link).as_str()),
        ],
    )
}
