use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use farmlink_messaging::{
    ClientConfig, MessageOrigin, MessagingClient, MessagingError, PresenceStatus,
    ReconnectSupervisor,
};
use log::{error, info, warn};
use tokio::time::timeout;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Follow conversations on a FarmLink messaging server and log what happens.
#[derive(Parser, Debug)]
#[command(name = "farmlink-tail")]
struct Args {
    /// Credential sent when connecting.
    #[arg(long, env = "FARMLINK_TOKEN")]
    token: String,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local user id, used to tell echoes from received messages.
    #[arg(long)]
    user: Option<String>,

    /// Status to broadcast once connected.
    #[arg(long, default_value = "online")]
    status: PresenceStatus,

    /// Keep reconnecting after the connection drops.
    #[arg(long)]
    reconnect: bool,

    /// Conversations to join.
    conversations: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), MessagingError> {
    let config = ClientConfig::load(args.config.as_deref())?;
    let reconnect_policy = config.reconnect.clone();
    let client = MessagingClient::new(config);

    let local_user = args.user.clone().unwrap_or_default();
    let _messages = client.on_message(move |message| {
        let text = message.content.text.as_deref().unwrap_or("<media>");
        match message.origin(&local_user) {
            MessageOrigin::Echo => info!("[{}] sent: {}", message.conversation_id, text),
            MessageOrigin::Received => info!(
                "[{}] {}: {}",
                message.conversation_id, message.sender.name, text
            ),
        }
    });

    let _typing = client.on_typing(|event| {
        let verb = if event.is_typing { "is typing" } else { "stopped typing" };
        info!(
            "[{}] {} {}",
            event.indicator.conversation_id, event.indicator.user_name, verb
        );
    });

    let _statuses = client.on_message_status(|status| {
        info!("[{}] read at {}", status.message_id, status.timestamp);
    });

    let joiner = client.clone();
    let conversations = args.conversations.clone();
    let status = args.status;
    let _connection = client.on_connection_change(move |connected| {
        if *connected {
            info!("Connected");
            for conversation_id in &conversations {
                joiner.join_conversation(conversation_id);
            }
            joiner.update_status(status);
        } else {
            info!("Connection lost");
        }
    });

    let supervisor = args
        .reconnect
        .then(|| ReconnectSupervisor::spawn(client.clone(), args.token.clone(), reconnect_policy));

    client.connect(&args.token);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    if let Some(supervisor) = supervisor {
        supervisor.stop();
    }
    client.update_status(PresenceStatus::Offline);
    if timeout(SHUTDOWN_GRACE, client.disconnect_and_flush())
        .await
        .is_err()
    {
        warn!("Socket did not close within {:?}", SHUTDOWN_GRACE);
    }
    Ok(())
}
