use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Admin commands:")]
pub enum AdminCommand {
    #[command(description = "show help.")]
    Help,
    #[command(description = "show delivery stats.")]
    Stats,
    #[command(description = "show queue status.")]
    Queue,
    #[command(description = "show current settings.")]
    Settings,
    #[command(description = "change a setting: /set <name> <value>.", parse_with = "split")]
    Set { name: String, value: String },
    #[command(description = "flip a boolean setting.")]
    Toggle { name: String },
    #[command(description = "list destination channels.")]
    Channels,
    #[command(description = "register a destination channel.")]
    AddChannel { channel: String },
    #[command(description = "remove a destination channel.")]
    RemoveChannel { channel: String },
    #[command(description = "drain the queue now: /sendnow [count].")]
    SendNow { count: String },
    #[command(description = "pause sending.")]
    Stop,
    #[command(description = "resume sending.")]
    Resume,
    #[command(description = "delete records older than n days: /cleanup [days].")]
    Cleanup { days: String },
    #[command(description = "collapse duplicate records.")]
    Collapse,
    #[command(description = "post the recommended client list.")]
    Clients,
}
