//! Telegram implementations of the job-facing capabilities: a status sink that
//! edits one status message, and an uploader that streams the produced file
//! with upload progress.

use super::resilient::edit_message_safe_resilient;
use super::views::render_status;
use anyhow::Result;
use async_trait::async_trait;
use clip_relay_core::job::MediaFile;
use clip_relay_core::utils::truncate_str;
use clip_relay_core::{JobError, JobStatus, MediaKind, MediaUploader, ProgressReporter, StatusSink};
use std::pin::Pin;
use std::task::{Context, Poll};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, info};

/// Telegram caption limit
const MAX_CAPTION_CHARS: usize = 1024;

/// Longest title fragment used in an uploaded file name
const MAX_FILE_STEM_CHARS: usize = 60;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Rejection text for a file above the upload limit. The file size is
/// rounded up so it never reads as equal to the limit.
fn size_limit_message(size: u64, limit: u64) -> String {
    format!(
        "file is {} MB, the upload limit is {} MB",
        size.div_ceil(BYTES_PER_MB),
        limit / BYTES_PER_MB
    )
}

/// Status sink bound to one status message.
pub struct TelegramStatusSink {
    bot: Bot,
    chat_id: ChatId,
    status_msg_id: MessageId,
}

impl TelegramStatusSink {
    /// Create a sink editing `status_msg_id` in `chat_id`.
    #[must_use]
    pub const fn new(bot: Bot, chat_id: ChatId, status_msg_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            status_msg_id,
        }
    }
}

#[async_trait]
impl StatusSink for TelegramStatusSink {
    async fn update_status(&self, status: &JobStatus) -> Result<()> {
        let text = render_status(status);
        if edit_message_safe_resilient(&self.bot, self.chat_id, self.status_msg_id, &text).await {
            Ok(())
        } else {
            anyhow::bail!("status message {} was not updated", self.status_msg_id.0)
        }
    }
}

/// An `AsyncRead` wrapper reporting how much of the file has been read.
pub struct ProgressReader<R> {
    inner: R,
    progress: ProgressReporter,
    read: u64,
    total: u64,
}

impl<R> ProgressReader<R> {
    /// Wrap `inner`, a reader over `total` bytes.
    pub const fn new(inner: R, progress: ProgressReporter, total: u64) -> Self {
        Self {
            inner,
            progress,
            read: 0,
            total,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let added = buf.filled().len().saturating_sub(before);
            if added > 0 {
                self.read = self.read.saturating_add(added as u64);
                self.progress.on_upload_progress(self.read, self.total);
            }
        }
        poll
    }
}

/// File name shown in the chat: the title, reduced to safe characters.
#[must_use]
pub fn upload_file_name(title: Option<&str>, kind: MediaKind) -> String {
    let stem: String = title
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = truncate_str(stem.trim().trim_matches('.'), MAX_FILE_STEM_CHARS);
    let stem = if stem.trim().is_empty() {
        "media".to_string()
    } else {
        stem.trim().to_string()
    };
    format!("{stem}.{}", kind.extension())
}

/// Uploads produced files to one chat.
pub struct TelegramUploader {
    bot: Bot,
    chat_id: ChatId,
    max_upload_bytes: u64,
}

impl TelegramUploader {
    /// Create an uploader for `chat_id` refusing files above `max_upload_bytes`.
    #[must_use]
    pub const fn new(bot: Bot, chat_id: ChatId, max_upload_bytes: u64) -> Self {
        Self {
            bot,
            chat_id,
            max_upload_bytes,
        }
    }
}

#[async_trait]
impl MediaUploader for TelegramUploader {
    async fn upload(&self, media: &MediaFile, progress: &ProgressReporter) -> Result<(), JobError> {
        if media.size > self.max_upload_bytes {
            return Err(JobError::TransportFailure(size_limit_message(
                media.size,
                self.max_upload_bytes,
            )));
        }

        let file = tokio::fs::File::open(&media.path)
            .await
            .map_err(|e| JobError::TransportFailure(format!("cannot open result: {e}")))?;
        let reader = ProgressReader::new(file, progress.clone(), media.size);
        let input = InputFile::read(reader)
            .file_name(upload_file_name(media.title.as_deref(), media.kind));
        let caption = truncate_str(&media.caption, MAX_CAPTION_CHARS);

        debug!(chat_id = self.chat_id.0, size = media.size, kind = ?media.kind, "Uploading media");

        let sent = match media.kind {
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(self.chat_id, input).caption(caption);
                if let Some(title) = &media.title {
                    req = req.title(title.clone());
                }
                req.await
            }
            MediaKind::Video => {
                self.bot
                    .send_video(self.chat_id, input)
                    .caption(caption)
                    .supports_streaming(true)
                    .await
            }
        };

        match sent {
            Ok(msg) => {
                info!(chat_id = self.chat_id.0, msg_id = msg.id.0, size = media.size, "Media uploaded");
                Ok(())
            }
            Err(e) => Err(JobError::TransportFailure(e.to_string())),
        }
    }
}
