pub mod admin_handlers;
pub mod config;
pub mod delivery;
pub mod extractor;
pub mod feedback;
pub mod formatter;
pub mod identity;
pub mod keyboard;
pub mod record;
pub mod repository;
pub mod scheduler;

use crate::config::AppConfig;
use crate::delivery::{ConfigDelivery, TelegramDelivery};
use crate::extractor::LinkExtractor;
use crate::feedback::FeedbackLoop;
use crate::repository::ConfigRepository;
use crate::scheduler::Scheduler;
use anyhow::Result;
use std::sync::Arc;
use teloxide::Bot;

/// Everything the handlers and the background loop share, wired once at
/// startup and injected through the dispatcher.
pub struct AppContext {
    pub config: AppConfig,
    pub repo: ConfigRepository,
    pub extractor: LinkExtractor,
    pub scheduler: Arc<Scheduler>,
    pub feedback: FeedbackLoop,
}

impl AppContext {
    /// Open the store, write missing defaults, seed the channel registry and
    /// wire the pipeline around the Telegram delivery implementation.
    pub fn new(config: AppConfig, bot: Bot) -> Result<Arc<Self>> {
        let repo = ConfigRepository::new(&config.redis_url)?;
        repo.init(&config.channels)?;
        let delivery: Arc<dyn ConfigDelivery> =
            Arc::new(TelegramDelivery::new(bot, config.clone()));
        let scheduler = Arc::new(Scheduler::new(repo.clone(), delivery.clone()));
        let feedback = FeedbackLoop::new(repo.clone(), delivery);
        let extractor = LinkExtractor::new(config.branding_remark.clone());
        Ok(Arc::new(AppContext {
            config,
            repo,
            extractor,
            scheduler,
            feedback,
        }))
    }
}
