use config_courier_bot::admin_handlers;
use config_courier_bot::config::AppConfig;
use config_courier_bot::AppContext;
use dotenv::dotenv;
use teloxide::prelude::*;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    dotenv().ok();
    log::info!("Starting the config courier bot...");

    let config = AppConfig::from_env().expect("configuration must be valid");

    let bot = Bot::new(config.bot_token.clone());
    let ctx = AppContext::new(config, bot.clone()).expect("startup must succeed");

    tokio::spawn(ctx.scheduler.clone().run_periodic());

    admin_handlers::run_dispatcher(bot, ctx).await;
}
