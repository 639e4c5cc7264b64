use super::resilient::{clear_keyboard, edit_message_safe_resilient, send_message_resilient};
use super::transport::{TelegramStatusSink, TelegramUploader};
use super::views::{
    choice_prompt, expired_notice, options_keyboard, resolve_failed_text, ExpiredNotice,
    HELP_TEXT, INVALID_BUTTON_ANSWER, INVALID_LINK_TEXT, STARTING_ANSWER, WELCOME_TEXT,
};
use anyhow::Result;
use clip_relay_core::media::FormatResolver;
use clip_relay_core::session::Choice;
use clip_relay_core::{
    JobRequest, JobRunner, Selector, Session, SessionId, SessionStore, SourceUrl, StatusSink,
};
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{CallbackQuery, ChatAction, ChatId, MessageId},
    utils::command::BotCommands,
};
use tracing::{debug, info, warn};

/// Shared state of the relay handlers.
pub struct RelayContext {
    /// Pending choices
    pub sessions: SessionStore,
    /// Option discovery strategy
    pub resolver: Arc<dyn FormatResolver>,
    /// Job executor
    pub runner: Arc<JobRunner>,
    /// Largest file the Bot API accepts
    pub max_upload_bytes: u64,
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show usage help
    #[command(description = "Show usage help.")]
    Help,
}

/// Reply to `/start`.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    send_message_resilient(&bot, msg.chat.id, WELCOME_TEXT, None).await?;
    Ok(())
}

/// Reply to `/help`.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    let text = format!(
        "{HELP_TEXT}\n\n{}",
        html_escape::encode_text(&Command::descriptions().to_string())
    );
    send_message_resilient(&bot, msg.chat.id, text, None).await?;
    Ok(())
}

/// Validate a link, resolve its options and offer them as a keyboard.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_link(bot: Bot, msg: Message, ctx: Arc<RelayContext>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let user_id = get_user_id_safe(&msg);

    let source = match SourceUrl::parse(text) {
        Ok(source) => source,
        Err(e) => {
            debug!(chat_id = chat_id.0, user_id, error = %e, "Message is not a link");
            send_message_resilient(&bot, chat_id, INVALID_LINK_TEXT, None).await?;
            return Ok(());
        }
    };

    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!(error = %e, "Chat action skipped");
    }

    let resolved = match ctx.resolver.resolve(&source).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(chat_id = chat_id.0, host = %source.host(), error = %e, "Link could not be resolved");
            send_message_resilient(&bot, chat_id, resolve_failed_text(&e), None).await?;
            return Ok(());
        }
    };

    let session_id = SessionId::from_message(chat_id.0, msg.id.0);
    let keyboard = options_keyboard(&session_id, &resolved.options);
    let prompt = choice_prompt(resolved.title.as_deref());
    let option_count = resolved.options.len();

    // Stored before the keyboard exists so an immediate press finds it
    ctx.sessions
        .create(Session::new(
            session_id.clone(),
            source,
            resolved.title,
            resolved.options,
        ))
        .await;

    send_message_resilient(&bot, chat_id, prompt, Some(keyboard)).await?;
    info!(
        session_id = %session_id,
        user_id,
        options = option_count,
        resolver = ctx.resolver.name(),
        "Options offered"
    );
    Ok(())
}

/// Handle an option button press.
///
/// # Errors
///
/// Returns an error if the callback cannot be answered.
pub async fn handle_choice(bot: Bot, q: CallbackQuery, ctx: Arc<RelayContext>) -> Result<()> {
    let Some(message) = q.message.as_ref() else {
        bot.answer_callback_query(q.id.clone())
            .text(INVALID_BUTTON_ANSWER)
            .show_alert(true)
            .await?;
        return Ok(());
    };
    let chat_id = message.chat().id;
    let status_msg_id = message.id();

    let Some(choice) = q.data.as_deref().and_then(Choice::parse) else {
        warn!(chat_id = chat_id.0, data = ?q.data, "Malformed callback payload");
        bot.answer_callback_query(q.id.clone())
            .text(INVALID_BUTTON_ANSWER)
            .show_alert(true)
            .await?;
        return Ok(());
    };

    let Some(session) = ctx.sessions.consume(&choice.session_id).await else {
        info!(session_id = %choice.session_id, "Button pressed for expired session");
        let keyboard_gone = message
            .regular_message()
            .and_then(Message::reply_markup)
            .is_none_or(|markup| markup.inline_keyboard.is_empty());
        let job_owns_message = ctx.sessions.was_claimed(&choice.session_id) || keyboard_gone;
        match expired_notice(job_owns_message) {
            ExpiredNotice::Edit(text) => {
                bot.answer_callback_query(q.id.clone()).await?;
                edit_message_safe_resilient(&bot, chat_id, status_msg_id, &text).await;
            }
            ExpiredNotice::Alert(text) => {
                bot.answer_callback_query(q.id.clone())
                    .text(text)
                    .show_alert(true)
                    .await?;
            }
        }
        return Ok(());
    };

    if !session.offers(choice.selector) {
        warn!(session_id = %session.id, selector = %choice.selector, "Selector was not offered");
        ctx.sessions.create(session).await;
        bot.answer_callback_query(q.id.clone())
            .text(INVALID_BUTTON_ANSWER)
            .show_alert(true)
            .await?;
        return Ok(());
    }

    if let Err(e) = bot
        .answer_callback_query(q.id.clone())
        .text(STARTING_ANSWER)
        .await
    {
        debug!(error = %e, "Callback answer failed");
    }
    clear_keyboard(&bot, chat_id, status_msg_id).await;

    spawn_job(bot, chat_id, status_msg_id, session, choice.selector, ctx);
    Ok(())
}

fn spawn_job(
    bot: Bot,
    chat_id: ChatId,
    status_msg_id: MessageId,
    session: Session,
    selector: Selector,
    ctx: Arc<RelayContext>,
) {
    let session_id = session.id;
    let request = JobRequest {
        source: session.source,
        selector,
        title: session.title,
    };
    let sink: Arc<dyn StatusSink> =
        Arc::new(TelegramStatusSink::new(bot.clone(), chat_id, status_msg_id));
    let uploader = TelegramUploader::new(bot, chat_id, ctx.max_upload_bytes);

    tokio::spawn(async move {
        match ctx.runner.run(request, &uploader, sink).await {
            Ok(outcome) => info!(
                session_id = %session_id,
                job_id = %outcome.job_id,
                "Choice delivered"
            ),
            Err(e) => debug!(session_id = %session_id, error = %e, "Choice ended with an error"),
        }
    });
}
