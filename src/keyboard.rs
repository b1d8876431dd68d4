//! Inline keyboards attached to posts and admin replies.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Callback-data prefixes routed by the dispatcher.
pub mod callback {
    /// Copy-count action under a delivered post.
    pub const COPY: &str = "copy:";
    /// First tap of the bad-report flow; only shows the confirm keyboard.
    pub const BAD: &str = "bad:";
    /// Confirmed bad report.
    pub const BAD_CONFIRM: &str = "badok:";
    /// Abandoned bad report.
    pub const BAD_CANCEL: &str = "badcancel:";
}

/// Buttons under every delivered config post.
pub fn feedback_buttons(fingerprint: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📋 Copied", format!("{}{}", callback::COPY, fingerprint)),
        InlineKeyboardButton::callback(
            "⚠️ Not working",
            format!("{}{}", callback::BAD, fingerprint),
        ),
    ]])
}

/// Confirm/cancel affordance shown after the first bad-report tap.
pub fn confirm_bad_report(fingerprint: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "✅ Yes, it is dead",
            format!("{}{}", callback::BAD_CONFIRM, fingerprint),
        ),
        InlineKeyboardButton::callback(
            "❌ Cancel",
            format!("{}{}", callback::BAD_CANCEL, fingerprint),
        ),
    ]])
}

/// One link button per destination channel.
pub fn channel_links(channels: &[String]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .filter_map(|ch| {
            let handle = ch.strip_prefix('@')?;
            let url = format!("https://t.me/{handle}").parse().ok()?;
            Some(vec![InlineKeyboardButton::url(format!("📢 {ch}"), url)])
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}
