//! Fixed message templates, used for meeting messages and whenever no LLM is configured.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use followup_core::{JobKind, MeetingContext, TriggerContext};

fn greeting(first_name: Option<&str>) -> String {
    match first_name {
        Some(name) if !name.trim().is_empty() => format!("Hi {},", name.trim()),
        _ => "Hi,".to_owned(),
    }
}

fn local_datetime(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%A, %B %-d at %H:%M (%Z)").to_string()
}

fn local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%H:%M (%Z)").to_string()
}

fn nurture_line(attempt: u32) -> &'static str {
    match attempt {
        0 | 1 => "following up on our conversation. Would a quick call this week help you decide?",
        2 => "are you still interested? I can hold a slot for you if you'd like to talk.",
        _ => {
            "I don't want to flood your inbox. If now isn't the right time, just let me know and I'll reach out later."
        },
    }
}

fn meeting_text(kind: JobKind, greet: &str, meeting: &MeetingContext, tz: Tz) -> String {
    let mut text = match kind {
        JobKind::MeetingConfirmation => format!(
            "{greet} your meeting is confirmed for {}. See you then!",
            local_datetime(meeting.starts_at, tz)
        ),
        JobKind::MeetingReminder24h => format!(
            "{greet} a reminder that our meeting is tomorrow, {}.",
            local_datetime(meeting.starts_at, tz)
        ),
        _ => format!(
            "{greet} our meeting starts in about 2 hours, at {}. See you soon!",
            local_time(meeting.starts_at, tz)
        ),
    };
    if let Some(location) = meeting.location.as_deref().filter(|l| !l.trim().is_empty()) {
        text.push_str(&format!(" Location: {}", location.trim()));
    }
    text
}

/// Renders the fixed message for a job.
///
/// Meeting times are shown in `tz`. A CUSTOM job with literal text returns that text.
#[must_use]
pub fn render_template(
    kind: JobKind,
    attempt: u32,
    context: &TriggerContext,
    first_name: Option<&str>,
    tz: Tz,
) -> String {
    let greet = greeting(first_name);
    match (kind, context) {
        (JobKind::ReengagementImmediate, _) => format!(
            "{greet} just checking in: did you get a chance to look at my last message? Happy to answer any questions."
        ),
        (JobKind::DailyNurture, _) => format!("{greet} {}", nurture_line(attempt)),
        (JobKind::AbandonmentCheck, _) => {
            format!("{greet} it looks like we got cut off. Shall we pick up where we left off?")
        },
        (
            JobKind::MeetingConfirmation | JobKind::MeetingReminder24h | JobKind::MeetingReminder2h,
            TriggerContext::Meeting(meeting),
        ) => meeting_text(kind, &greet, meeting, tz),
        (JobKind::Custom, TriggerContext::Custom(custom)) if custom.text.is_some() => {
            custom.text.clone().unwrap_or_default()
        },
        _ => format!("{greet} just following up. Let me know if there's anything I can help with."),
    }
}
