//! chat-sync - terminal chat client
//!
//! Line-oriented front end over the session, store and send pipeline.
//! Lines starting with `/` are commands; anything else is sent to the open
//! conversation.

use chat_sync::auth::ProviderGrant;
use chat_sync::session::SignedInSession;
use chat_sync::{ChatClient, ClientConfig, DeliveryStatus, Message, SessionError, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_TITLE: &str = "New conversation";

const HELP: &str = "\
Commands:
  /signup <email> <password>   create an account and sign in
  /signin <email> <password>   sign in
  /google <id_token>           sign in with a Google id token
  /signout                     sign out and forget everything
  /list                        reload the conversation list
  /new [title]                 create a conversation and open it
  /open <id>                   open a conversation
  /close                       close the open conversation
  /retry <message_id>          resend a failed message
  /discard <message_id>        drop a failed message
  /quit                        exit
Anything else is sent to the open conversation.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env();
    init_logging(config.json_logs);

    let client = ChatClient::from_config(&config)?;
    let _watcher = client.session.watch_credential_loss();

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        handle(&client, line).await;
    }

    client.session.sign_out().await;
    Ok(())
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chat_sync=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn handle(client: &ChatClient, line: &str) {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let store = client.store();

    match command {
        "/signup" | "/signin" => {
            let Some((email, password)) = rest.split_once(' ') else {
                println!("usage: {command} <email> <password>");
                return;
            };
            let result = if command == "/signup" {
                client.session.sign_up(email, password.trim()).await
            } else {
                client.session.sign_in(email, password.trim()).await
            };
            report_sign_in(client, result);
        }
        "/google" => {
            if rest.is_empty() {
                println!("usage: /google <id_token>");
                return;
            }
            let result = client
                .session
                .sign_in_with_provider(&ProviderGrant::google(rest))
                .await;
            report_sign_in(client, result);
        }
        "/signout" => {
            client.session.sign_out().await;
            println!("Signed out");
        }
        _ if !client.session.state().is_authenticated() => {
            match client.session.state() {
                SessionState::Error { reason } => println!("Not signed in (last attempt: {reason})"),
                _ => println!("Not signed in. Try /signin or /signup."),
            }
        }
        "/list" => match store.load_conversations().await {
            Ok(_) => print_conversations(client),
            Err(err) => println!("Could not load conversations: {err}"),
        },
        "/new" => {
            let title = if rest.is_empty() { DEFAULT_TITLE } else { rest };
            match store.create_conversation(title).await {
                Ok(conversation) => {
                    println!("Created {} ({})", conversation.title, conversation.id);
                    open(client, &conversation.id).await;
                }
                Err(err) => println!("Could not create conversation: {err}"),
            }
        }
        "/open" => {
            if rest.is_empty() {
                println!("usage: /open <id>");
            } else {
                open(client, rest).await;
            }
        }
        "/close" => store.close_conversation(),
        "/retry" => {
            let active = store.active_conversation_id();
            match client.pipeline.retry(active.as_deref().unwrap_or_default(), rest).await {
                Ok(receipt) => print_reply(receipt.reply.as_ref()),
                Err(err) => println!("Retry failed: {err}"),
            }
        }
        "/discard" => {
            let active = store.active_conversation_id();
            if let Err(err) = client
                .pipeline
                .discard_failed(active.as_deref().unwrap_or_default(), rest)
            {
                println!("Discard failed: {err}");
            }
        }
        "/help" => println!("{HELP}"),
        _ if command.starts_with('/') => println!("Unknown command {command}. Try /help."),
        _ => {
            let active = store.active_conversation_id();
            match client.pipeline.send(active.as_deref(), line).await {
                Ok(receipt) => print_reply(receipt.reply.as_ref()),
                Err(err) => {
                    println!("Send failed: {err}");
                    let messages = store.messages();
                    if let Some(failed) = messages
                        .iter()
                        .rev()
                        .find(|m| m.status == DeliveryStatus::Failed)
                    {
                        print_message(failed);
                    }
                }
            }
        }
    }
}

async fn open(client: &ChatClient, conversation_id: &str) {
    match client.store().load_messages(conversation_id).await {
        Ok(_) => {
            for message in client.store().messages() {
                print_message(&message);
            }
        }
        Err(err) => println!("Could not open conversation: {err}"),
    }
}

fn report_sign_in(client: &ChatClient, result: Result<SignedInSession, SessionError>) {
    let signed_in = result.is_ok();
    println!("{}", describe_sign_in(result));
    if signed_in {
        print_conversations(client);
    }
}

fn describe_sign_in(result: Result<SignedInSession, SessionError>) -> String {
    match result {
        Ok(session) => {
            let account = &session.account;
            let mut text = format!(
                "Signed in as {}",
                account.email.as_deref().unwrap_or(&account.uid)
            );
            if let Err(err) = session.initial_load {
                text.push_str(&format!("\nCould not load conversations: {err}"));
            }
            text
        }
        Err(err) => format!("Sign-in failed: {err}"),
    }
}

fn print_conversations(client: &ChatClient) {
    let conversations = client.store().conversations();
    if conversations.is_empty() {
        println!("No conversations yet. Try /new.");
    }
    for conversation in conversations {
        println!(
            "  {}  {}  {}",
            conversation.id,
            conversation.created_at.format("%Y-%m-%d %H:%M"),
            conversation.title
        );
    }
}

fn print_message(message: &Message) {
    let marker = match message.status {
        DeliveryStatus::Pending => " (sending)",
        DeliveryStatus::Failed => " (failed)",
        DeliveryStatus::Confirmed => "",
    };
    println!("[{}]{marker} {}", message.role.as_str(), message.content);
    if message.status == DeliveryStatus::Failed {
        println!("  /retry {0} or /discard {0}", message.id);
    }
}

fn print_reply(reply: Option<&Message>) {
    if let Some(reply) = reply {
        print_message(reply);
    }
}
