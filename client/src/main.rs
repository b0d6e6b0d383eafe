use std::io::Write;
use std::sync::Arc;

use assistant_client::{ChatClient, ClientConfig, HttpDirectory, Role, TranscriptEvent, WsConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands: /chat <id> to switch chat, /history to reprint it, /quit to leave.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with streamed replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    let client = ChatClient::new(
        config.clone(),
        Arc::new(HttpDirectory::new(&config)),
        Arc::new(WsConnector::new(config.clone())),
    );
    client.subscribe(render);

    println!("Connected to {}. {HELP}", config.api_url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => continue,
            ("/quit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/history", _) => print_history(&client),
            ("/chat", id) if !id.trim().is_empty() => {
                if client.switch_chat(id.trim()).await.is_ok() {
                    print_history(&client);
                }
            }
            ("/chat", _) => println!("usage: /chat <id>"),
            _ => {
                if let Err(e) = client.send_message(None, line).await {
                    println!("(not delivered: {e})");
                }
            }
        }
    }

    client.disconnect();
    Ok(())
}

fn render(event: &TranscriptEvent) {
    let mut out = std::io::stdout();
    match event {
        TranscriptEvent::Appended(message) if message.role == Role::Assistant => {
            let _ = write!(out, "assistant> ");
        }
        TranscriptEvent::Appended(_) => return,
        TranscriptEvent::Chunk { fragment, .. } => {
            let _ = write!(out, "{fragment}");
        }
        TranscriptEvent::Finalized(_) => {
            let _ = writeln!(out);
        }
    }
    let _ = out.flush();
}

fn print_history(client: &ChatClient) {
    println!("── chat {} ──", client.active_chat().unwrap_or_default());
    for message in client.transcript() {
        println!("{}> {}", message.role, message.content);
    }
}
