//! Echo Bot Demo
//!
//! A console bot built on weft. Updates are read from stdin, one per line,
//! and every outbound call is printed to stdout instead of being sent.
//!
//! # Input
//!
//! Each line is either a full update in JSON or plain text, which is
//! wrapped into a private message from `--chat-id`. Lines are dispatched
//! one at a time, in order:
//!
//! ```text
//! /start
//! {"update_id": 9, "message": {"message_id": 9, "chat": {"id": 1, "type": "private"}, "text": "hi"}}
//! ```
//!
//! # Commands
//!
//! - `/start` - greeting and message count
//! - `/echo <text>` - echo text
//! - `/parrot` - enter the parrot scene, `/leave` to get out
//! - `/signup` - a three step wizard, `/back` to redo a step
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --state-dir ./sessions
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use futures::Stream;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use weft::prelude::*;
use weft::session::FileStore;

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "A console echo bot for the weft framework")]
struct Args {
    /// Configuration file (weft.toml by default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep sessions as JSON files in this directory instead of in memory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Chat that plain text lines are sent from
    #[arg(long, default_value_t = 1)]
    chat_id: i64,
}

// ============================================================================
// Outbound
// ============================================================================

/// Prints every call instead of sending it.
#[derive(Debug, Default)]
struct ConsoleOutbound;

#[async_trait]
impl Outbound for ConsoleOutbound {
    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> {
        println!("→ {method} {params}");
        Ok(json!(true))
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn message_text(ctx: &Context) -> String {
    ctx.message()
        .and_then(|message| message.text.clone())
        .unwrap_or_default()
}

/// Counts messages per chat in the session.
async fn count_messages(ctx: Arc<Context>, next: Next) -> MiddlewareResult {
    if let Ok(session) = ctx.session() {
        let seen = session.get("messages").and_then(|v| v.as_u64()).unwrap_or(0);
        session.set("messages", json!(seen + 1));
    }
    next.run(ctx).await
}

async fn start(ctx: Arc<Context>) -> MiddlewareResult {
    let seen = ctx
        .session()?
        .get("messages")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    ctx.reply(&format!(
        "Hi! I've seen {seen} messages from this chat. Try /echo, /parrot or /signup."
    ))
    .await?;
    Ok(())
}

async fn echo(ctx: Arc<Context>) -> MiddlewareResult {
    let args = ctx
        .matched()
        .and_then(|m| m.get(1).map(str::to_string))
        .unwrap_or_default();
    if args.is_empty() {
        ctx.reply("Usage: /echo <text>").await?;
    } else {
        ctx.reply(&args).await?;
    }
    Ok(())
}

async fn parrot(ctx: Arc<Context>) -> MiddlewareResult {
    let text = message_text(&ctx);
    ctx.reply(&format!("🦜 {text}")).await?;
    Ok(())
}

// ─── Signup wizard ───

async fn ask_name(ctx: Arc<Context>) -> MiddlewareResult {
    ctx.reply("What's your name?").await?;
    ctx.wizard()?.next();
    Ok(())
}

async fn ask_age(ctx: Arc<Context>) -> MiddlewareResult {
    let name = message_text(&ctx);
    let wizard = ctx.wizard()?;
    wizard
        .scene()
        .with_state(|state| state.insert("name".into(), json!(name)));
    ctx.reply(&format!("Nice to meet you, {name}. How old are you?"))
        .await?;
    wizard.next();
    Ok(())
}

async fn confirm(ctx: Arc<Context>) -> MiddlewareResult {
    let wizard = ctx.wizard()?;
    let Ok(age) = message_text(&ctx).trim().parse::<u32>() else {
        ctx.reply("That's not a number, try again.").await?;
        return Ok(());
    };
    let name = wizard.state().get("name").cloned().unwrap_or(Value::Null);
    ctx.session()?
        .set("profile", json!({ "name": name, "age": age }));
    ctx.reply("All set!").await?;
    wizard.scene().leave().await
}

async fn back(ctx: Arc<Context>) -> MiddlewareResult {
    let wizard = ctx.wizard()?;
    let step = wizard.back().cursor();
    ctx.reply(&format!("Back to step {}.", step + 1)).await?;
    if let Some(step) = wizard.step() {
        step.call(ctx, Next::noop()).await?;
    }
    Ok(())
}

fn build_stage(options: StageOptions) -> Result<Stage> {
    let mut parrot_scene = Scene::new("parrot");
    parrot_scene
        .on_enter(reply("Parrot mode. I repeat everything, /leave to stop."))
        .on_leave(reply("Bye from the parrot."))
        .push(command("leave", leave()))
        .push(handler_fn(parrot));

    let mut signup = WizardScene::new(
        "signup",
        [handler_fn(ask_name), handler_fn(ask_age), handler_fn(confirm)],
    );
    signup
        .on_leave(reply("Signup finished."))
        .push(command("back", handler_fn(back)));

    let mut stage = Stage::with_options(options);
    stage.register(parrot_scene)?.register(signup)?;
    Ok(stage)
}

fn build_bot() -> Composer {
    let mut bot = Composer::new();
    bot.command("start", handler_fn(start))
        .command("echo", handler_fn(echo))
        .command("parrot", enter("parrot"))
        .command("signup", enter("signup"));
    bot
}

async fn report(err: BoxError, ctx: Arc<Context>) {
    error!(update = ctx.update().update_id, error = %err, "Unhandled error");
    if let Err(e) = ctx.reply("Something went wrong.").await {
        warn!(error = %e, "Failed to report error to chat");
    }
}

// ============================================================================
// Input
// ============================================================================

fn text_update(update_id: i64, chat_id: i64, text: &str) -> Option<Update> {
    let mut message = json!({
        "message_id": update_id,
        "from": { "id": chat_id, "first_name": "console" },
        "chat": { "id": chat_id, "type": "private" },
        "text": text,
    });
    if text.starts_with('/') {
        let length = text
            .split_whitespace()
            .next()
            .map(|cmd| cmd.encode_utf16().count())
            .unwrap_or(0);
        message["entities"] = json!([{ "type": "bot_command", "offset": 0, "length": length }]);
    }
    serde_json::from_value(json!({ "update_id": update_id, "message": message })).ok()
}

fn parse_line(line: &str, update_id: i64, chat_id: i64) -> Option<Update> {
    if !line.starts_with('{') {
        return text_update(update_id, chat_id, line);
    }
    match serde_json::from_str(line) {
        Ok(update) => Some(update),
        Err(e) => {
            warn!(error = %e, "Skipping malformed update");
            None
        }
    }
}

fn read_updates(chat_id: i64) -> impl Stream<Item = Update> + Send {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    futures::stream::unfold((lines, 0i64), move |(mut lines, mut next_id)| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    next_id += 1;
                    if let Some(update) = parse_line(line, next_id, chat_id) {
                        return Some((update, (lines, next_id)));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    return None;
                }
            }
        }
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = weft::runtime::ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    // Every stdin line shares one session key; concurrent dispatches would
    // race on it.
    config.dispatch.concurrency = 1;

    let session = match &args.state_dir {
        Some(dir) => config
            .session
            .apply(SessionMiddleware::with_store(FileStore::new(dir))),
        None => config.session.middleware(),
    };
    let stage = build_stage(config.scenes.stage_options(&config.session.property))?;

    let runtime = Runtime::builder()
        .config(config)
        .outbound(ConsoleOutbound)
        .error_handler(report)
        .push(session)
        .push(middleware_fn(count_messages))
        .push(stage)
        .push(build_bot())
        .build()?;

    info!("Reading updates from stdin, Ctrl+D to stop");
    let stats = runtime.run_until_signal(read_updates(args.chat_id)).await;
    info!(
        dispatched = stats.dispatched,
        failed = stats.failed,
        "Echo bot stopped"
    );

    Ok(())
}
