use crate::admin_handlers::{handle_admin_command, handle_document, AdminCommand};
use crate::feedback::ReportOutcome;
use crate::keyboard::{self, callback};
use crate::AppContext;
use std::sync::Arc;
use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::payloads::{AnswerCallbackQuerySetters, EditMessageReplyMarkupSetters};
use teloxide::prelude::{CallbackQuery, Message, Requester, ResponseResult, Update};
use teloxide::types::{ChatId, MessageId};
use teloxide::utils::command::BotCommands;
use teloxide::{respond, Bot};

/// Route incoming messages: admin commands first, then document uploads.
pub async fn message_handler(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if let Ok(cmd) = AdminCommand::parse(text, "ConfigCourierBot") {
            let chat_id = msg.chat.id;
            if let Err(e) = handle_admin_command(bot.clone(), msg, cmd, ctx).await {
                log::error!("admin command failed: {e:#}");
                bot.send_message(chat_id, "⚠️ That did not work, check the logs.")
                    .await?;
            }
        }
    } else if msg.document().is_some() {
        let chat_id = msg.chat.id;
        if let Err(e) = handle_document(bot.clone(), msg, ctx).await {
            log::error!("archive upload failed: {e:#}");
            bot.send_message(chat_id, "⚠️ Could not process that file.")
                .await?;
        }
    }
    respond(())
}

/// Route inline-button taps: the copy counter and the two-phase bad-report
/// flow. End users only ever see the outcome of their own action.
pub async fn callback_handler(
    bot: Bot,
    query: CallbackQuery,
    ctx: Arc<AppContext>,
) -> ResponseResult<()> {
    let Some(data) = query.data.clone() else {
        return respond(());
    };
    let coords = query
        .message
        .as_ref()
        .map(|m| (m.chat().id, m.id()));

    if let Some(fp) = data.strip_prefix(callback::COPY) {
        if let Err(e) = ctx.feedback.report_copy(fp) {
            log::error!("copy count for {fp} failed: {e:#}");
        }
        bot.answer_callback_query(query.id)
            .text("📋 Copy the link from the post, enjoy!")
            .await?;
    } else if let Some(fp) = data.strip_prefix(callback::BAD) {
        if let Some((chat_id, message_id)) = coords {
            swap_markup(&bot, chat_id, message_id, keyboard::confirm_bad_report(fp)).await;
        }
        bot.answer_callback_query(query.id)
            .text("Is this config really dead? Confirm below.")
            .await?;
    } else if let Some(fp) = data.strip_prefix(callback::BAD_CONFIRM) {
        match ctx.feedback.report_bad(fp).await {
            Ok(ReportOutcome { retracted: true, .. }) => {
                bot.answer_callback_query(query.id)
                    .text("🗑️ Config removed. Thanks for the report!")
                    .await?;
            }
            Ok(ReportOutcome { retracted: false, .. }) => {
                if let Some((chat_id, message_id)) = coords {
                    swap_markup(&bot, chat_id, message_id, keyboard::feedback_buttons(fp)).await;
                }
                bot.answer_callback_query(query.id)
                    .text("✅ Report logged, thanks.")
                    .await?;
            }
            Err(e) => {
                log::error!("bad report for {fp} failed: {e:#}");
                bot.answer_callback_query(query.id)
                    .text("Something went wrong, try again later.")
                    .await?;
            }
        }
    } else if let Some(fp) = data.strip_prefix(callback::BAD_CANCEL) {
        if let Some((chat_id, message_id)) = coords {
            swap_markup(&bot, chat_id, message_id, keyboard::feedback_buttons(fp)).await;
        }
        bot.answer_callback_query(query.id).await?;
    }
    respond(())
}

/// Swapping a post's keyboard is cosmetic; a failure only gets logged.
async fn swap_markup(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    markup: teloxide::types::InlineKeyboardMarkup,
) {
    if let Err(e) = bot
        .edit_message_reply_markup(chat_id, message_id)
        .reply_markup(markup)
        .await
    {
        log::warn!("keyboard swap on {chat_id}/{} failed: {e}", message_id.0);
    }
}

/// Combines the message and callback handlers into one dispatcher.
pub async fn run_dispatcher(bot: Bot, ctx: Arc<AppContext>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .build()
        .dispatch()
        .await;
}
