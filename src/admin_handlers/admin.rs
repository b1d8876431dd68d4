use crate::admin_handlers::AdminCommand;
use crate::config::{setting, MAX_UPLOAD_BYTES};
use crate::delivery::recipient;
use crate::formatter;
use crate::keyboard;
use crate::scheduler::{DrainOutcome, DrainReport, DrainTrigger};
use crate::AppContext;
use anyhow::Result;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// Settings the admin may change, split by value shape.
const NUMERIC_SETTINGS: &[&str] = &[
    setting::BATCH_SIZE,
    setting::INTERVAL,
    setting::DELAY,
    setting::DAILY_LIMIT,
];
const BOOLEAN_SETTINGS: &[&str] = &[
    setting::STOP_SENDING,
    setting::REMINDER_ENABLED,
    setting::SEND_CLIENTS,
];

/// The single configured administrator is the only accepted identity.
pub fn is_admin(ctx: &AppContext, msg: &Message) -> bool {
    msg.from.as_ref().map(|u| u.id.0) == Some(ctx.config.admin_id)
}

fn drain_summary(report: &DrainReport) -> String {
    let outcome = match report.outcome {
        DrainOutcome::Completed => "completed",
        DrainOutcome::DailyLimitReached => "stopped at the daily limit",
        DrainOutcome::Stopped => "paused by settings",
    };
    format!(
        "📤 Drain {outcome}: {} delivered, {} failed, {} deferred",
        report.delivered, report.failed, report.deferred
    )
}

pub async fn handle_admin_command(
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
    ctx: Arc<AppContext>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    if !is_admin(&ctx, &msg) {
        bot.send_message(chat_id, "⛔ You are not the admin.").await?;
        return Ok(());
    }
    match cmd {
        AdminCommand::Help => {
            bot.send_message(chat_id, AdminCommand::descriptions().to_string())
                .await?;
        }
        AdminCommand::Stats => {
            let total = ctx.repo.total_configs()?;
            let today = ctx.repo.get_daily_stats(None)?;
            let queue = ctx.repo.count_pending()?;
            bot.send_message(chat_id, formatter::admin_stats(total, &today, queue))
                .await?;
        }
        AdminCommand::Queue => {
            let queue = ctx.repo.count_pending()?;
            let get = |name: &str, default: u64| -> Result<u64> {
                Ok(ctx
                    .repo
                    .get_setting(name, &default.to_string())?
                    .parse()
                    .unwrap_or(default))
            };
            let text = formatter::queue_status(
                queue,
                get(setting::BATCH_SIZE, 5)?,
                get(setting::INTERVAL, 120)?,
                get(setting::DELAY, 0)?,
            );
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::Settings => {
            bot.send_message(chat_id, formatter::settings_text(&ctx.repo.all_settings()?))
                .await?;
        }
        AdminCommand::Set { name, value } => {
            let valid = if NUMERIC_SETTINGS.contains(&name.as_str()) {
                value.parse::<u64>().is_ok()
            } else if BOOLEAN_SETTINGS.contains(&name.as_str()) {
                value == "true" || value == "false"
            } else {
                false
            };
            if !valid {
                bot.send_message(
                    chat_id,
                    "Usage: /set <batch_size|interval|delay|daily_limit|\
                     stop_sending|reminder_enabled|send_clients> <value>",
                )
                .await?;
                return Ok(());
            }
            ctx.repo.set_setting(&name, &value)?;
            let text = format!(
                "✅ {name} set to {value}.\n\n{}",
                formatter::settings_text(&ctx.repo.all_settings()?)
            );
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::Toggle { name } => {
            if !BOOLEAN_SETTINGS.contains(&name.as_str()) {
                bot.send_message(
                    chat_id,
                    "Usage: /toggle <stop_sending|reminder_enabled|send_clients>",
                )
                .await?;
                return Ok(());
            }
            let now = ctx.repo.toggle_setting(&name)?;
            bot.send_message(chat_id, format!("✅ {name} is now {now}."))
                .await?;
        }
        AdminCommand::Channels => {
            let channels = ctx.repo.list_channels()?;
            if channels.is_empty() {
                bot.send_message(chat_id, "No destination channels registered.")
                    .await?;
            } else {
                let list = channels
                    .iter()
                    .map(|ch| format!("• {ch}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                bot.send_message(chat_id, format!("📢 Destination channels:\n{list}"))
                    .reply_markup(keyboard::channel_links(&channels))
                    .await?;
            }
        }
        AdminCommand::AddChannel { channel } => {
            if channel.is_empty() {
                bot.send_message(chat_id, "Usage: /addchannel <@name or id>")
                    .await?;
                return Ok(());
            }
            let added = ctx.repo.add_channel(&channel)?;
            let text = if added {
                format!("✅ {channel} registered.")
            } else {
                format!("{channel} was already registered.")
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::RemoveChannel { channel } => {
            let removed = ctx.repo.remove_channel(&channel)?;
            let text = if removed {
                format!("✅ {channel} removed.")
            } else {
                format!("{channel} was not registered.")
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::SendNow { count } => {
            let limit = count.trim().parse::<usize>().ok();
            let report = ctx.scheduler.drain(DrainTrigger::Manual, limit).await?;
            bot.send_message(chat_id, drain_summary(&report)).await?;
        }
        AdminCommand::Stop => {
            ctx.repo.set_setting(setting::STOP_SENDING, "true")?;
            bot.send_message(chat_id, "⏸️ Sending paused.").await?;
        }
        AdminCommand::Resume => {
            ctx.repo.set_setting(setting::STOP_SENDING, "false")?;
            bot.send_message(chat_id, "▶️ Sending resumed.").await?;
        }
        AdminCommand::Cleanup { days } => {
            let days = days.trim().parse::<u32>().unwrap_or(30);
            let deleted = ctx.repo.cleanup_older_than(days)?;
            bot.send_message(
                chat_id,
                format!("🧹 Removed {deleted} records older than {days} days."),
            )
            .await?;
        }
        AdminCommand::Collapse => {
            let deleted = ctx.repo.collapse_duplicates()?;
            bot.send_message(chat_id, format!("🧹 Collapsed {deleted} duplicate records."))
                .await?;
        }
        AdminCommand::Clients => {
            let text = formatter::clients_post(&ctx.config.brand_channel);
            if ctx.repo.get_setting(setting::SEND_CLIENTS, "true")? == "true" {
                for channel in ctx.repo.list_channels()? {
                    if let Err(e) = bot.send_message(recipient(&channel), text.clone()).await {
                        log::warn!("client list post to {channel} failed: {e}");
                    }
                }
                bot.send_message(chat_id, "📱 Client list posted to all channels.")
                    .await?;
            } else {
                bot.send_message(chat_id, text).await?;
            }
        }
    }
    Ok(())
}

/// Admin-only upload path: an exported chat archive arrives as a document,
/// gets downloaded, decoded as text and pushed through extract → ingest.
pub async fn handle_document(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let chat_id = msg.chat.id;
    if !is_admin(&ctx, &msg) {
        return Ok(());
    }
    let Some(doc) = msg.document() else {
        return Ok(());
    };
    if doc.file.size > MAX_UPLOAD_BYTES {
        bot.send_message(
            chat_id,
            format!(
                "⚠️ File too large: {:.1} MiB (max 10 MiB).",
                f64::from(doc.file.size) / 1024.0 / 1024.0
            ),
        )
        .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "📥 File received, extracting...")
        .await?;
    let file = bot.get_file(doc.file.id.clone()).await?;
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf).await?;
    let text = String::from_utf8_lossy(&buf);

    let candidates = ctx.extractor.extract(&text);
    let extracted = candidates.len();
    let inserted = ctx.repo.ingest(&candidates)?;
    let queue = ctx.repo.count_pending()?;

    bot.send_message(
        chat_id,
        format!(
            "✅ Extracted {extracted} configs: {inserted} new, {} duplicates.\n\
             📋 {queue} now in queue.",
            extracted as u64 - inserted
        ),
    )
    .await?;
    Ok(())
}
