//! View layer for bot UI components
//!
//! Message texts, the option keyboard and status rendering. Everything here
//! produces Telegram HTML; user-controlled text is escaped.

use clip_relay_core::session::Choice;
use clip_relay_core::{JobError, JobStatus, MediaKind, Selector, SessionId};
use html_escape::encode_text;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Reply to `/start`
pub const WELCOME_TEXT: &str = "👋 <b>Welcome to Clip Relay!</b>\n\n\
📥 Send a link to a video page and I'll let you choose:\n\
🎬 Video quality (as offered by the source)\n\
🎧 MP3 audio download\n\n\
Let's go! 🚀";

/// Reply to text that is not an HTTP(S) link
pub const INVALID_LINK_TEXT: &str = "❌ Please send a valid link (http:// or https://).";

/// Shown when a button references a consumed or evicted session
pub const SESSION_EXPIRED_TEXT: &str = "⚠️ Session expired. Please send the link again.";

/// Final status of a delivered job
pub const COMPLETED_TEXT: &str = "✅ Download complete!";

/// Callback answer when a job starts
pub const STARTING_ANSWER: &str = "Starting download...";

/// Callback alert for payloads that do not parse
pub const INVALID_BUTTON_ANSWER: &str = "This button is no longer valid.";

/// Body of the `/help` reply, placed above the command list
pub const HELP_TEXT: &str = "Send a link, pick a quality or MP3, and the file \
comes back to this chat. Buttons expire after a while; just send the link again.";

/// Button label of one option
#[must_use]
pub fn option_label(selector: Selector) -> String {
    match selector {
        Selector::Video { .. } => format!("📺 {}", selector.label()),
        Selector::AudioOnly => "🎵 MP3 (Audio)".to_string(),
    }
}

/// One button per row, each carrying the callback token of its option
#[must_use]
pub fn options_keyboard(session_id: &SessionId, options: &[Selector]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .map(|selector| {
            let token = Choice::new(session_id.clone(), *selector).encode();
            vec![InlineKeyboardButton::callback(option_label(*selector), token)]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Prompt shown above the option keyboard
#[must_use]
pub fn choice_prompt(title: Option<&str>) -> String {
    match title {
        Some(title) => format!("🎬 <b>{}</b>\n\n📽 Choose your quality:", encode_text(title)),
        None => "📽 Choose your quality:".to_string(),
    }
}

/// Reply when a link cannot be resolved
#[must_use]
pub fn resolve_failed_text(error: &JobError) -> String {
    match error {
        JobError::BackendTimeout { .. } => {
            "⚠️ Failed to process link: the source took too long to answer.".to_string()
        }
        _ => format!(
            "⚠️ Failed to process link:\n<code>{}</code>",
            encode_text(&error.to_string())
        ),
    }
}

/// Status text of a failed job
#[must_use]
pub fn render_error(error: &JobError) -> String {
    match error {
        JobError::QualityUnavailable { label } => {
            format!("⚠️ {} not available.", encode_text(label))
        }
        JobError::ExpiredSession => SESSION_EXPIRED_TEXT.to_string(),
        JobError::BackendTimeout { phase } => format!("❌ Timed out during {phase}."),
        _ => format!(
            "❌ Error during download:\n<code>{}</code>",
            encode_text(&error.to_string())
        ),
    }
}

/// How a press on an expired session is reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiredNotice {
    /// Replace the prompt text
    Edit(String),
    /// Callback alert only; the message already tracks a running job
    Alert(String),
}

/// Notice for a press whose session is gone. `job_owns_message` is set when
/// an earlier press turned the prompt into a job status message.
#[must_use]
pub fn expired_notice(job_owns_message: bool) -> ExpiredNotice {
    let text = render_error(&JobError::ExpiredSession);
    if job_owns_message {
        ExpiredNotice::Alert(text)
    } else {
        ExpiredNotice::Edit(text)
    }
}

/// Status message text for `status`
#[must_use]
pub fn render_status(status: &JobStatus) -> String {
    match status {
        JobStatus::Queued => "⏳ Queued...".to_string(),
        JobStatus::Starting => "🚀 Starting download...".to_string(),
        JobStatus::Downloading { percent } => format!("⬇️ Downloading... {percent}%"),
        JobStatus::Processing => "⚙️ Processing...".to_string(),
        JobStatus::Uploading { kind, percent } => {
            let what = match kind {
                MediaKind::Video => "video",
                MediaKind::Audio => "audio",
            };
            format!("⬆️ Uploading {what}... {percent}%")
        }
        JobStatus::Completed { .. } => COMPLETED_TEXT.to_string(),
        JobStatus::Failed(error) => render_error(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn expired_press_on_status_message_only_alerts() {
        assert_eq!(
            expired_notice(true),
            ExpiredNotice::Alert(SESSION_EXPIRED_TEXT.to_string())
        );
        assert_eq!(
            expired_notice(false),
            ExpiredNotice::Edit(SESSION_EXPIRED_TEXT.to_string())
        );
    }

    #[test]
    fn keyboard_carries_tokens() {
        let id = SessionId::from_message(77, 5);
        let options = [Selector::Video { height: 720 }, Selector::AudioOnly];
        let keyboard = options_keyboard(&id, &options);

        assert_eq!(keyboard.inline_keyboard.len(), 2);
        let first = &keyboard.inline_keyboard[0][0];
        assert_eq!(first.text, "📺 720p");
        assert!(matches!(
            &first.kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "720p|77:5"
        ));
        assert_eq!(keyboard.inline_keyboard[1][0].text, "🎵 MP3 (Audio)");
    }

    #[test]
    fn titles_are_escaped() {
        assert_eq!(
            choice_prompt(Some("<b>Tom & Jerry</b>")),
            "🎬 <b>&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;</b>\n\n📽 Choose your quality:"
        );
    }

    #[test]
    fn statuses_render() {
        assert_eq!(
            render_status(&JobStatus::Downloading { percent: 42 }),
            "⬇️ Downloading... 42%"
        );
        assert_eq!(
            render_status(&JobStatus::Uploading {
                kind: MediaKind::Video,
                percent: 7
            }),
            "⬆️ Uploading video... 7%"
        );
        assert_eq!(
            render_status(&JobStatus::Completed {
                kind: MediaKind::Audio
            }),
            COMPLETED_TEXT
        );
        assert_eq!(
            render_status(&JobStatus::Failed(JobError::QualityUnavailable {
                label: "1080p".to_string()
            })),
            "⚠️ 1080p not available."
        );
    }

    #[test]
    fn backend_errors_are_escaped() {
        let text = render_error(&JobError::BackendFailure("<script>".to_string()));
        assert!(text.contains("&lt;script&gt;"));
        assert!(text.starts_with("❌ Error during download:"));
    }
}
