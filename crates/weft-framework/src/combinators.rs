//! Standalone combinators.
//!
//! Every combinator returns a [`BoxedMiddleware`] and can be used without a
//! [`Composer`](crate::Composer). They fall into a few groups:
//!
//! - **Gating**: [`optional`], [`filter`], [`drop`], [`branch`]
//! - **Lookup**: [`dispatch`], [`lazy`]
//! - **Concurrency**: [`fork`], [`tap`]
//! - **Classification**: [`mount`], [`on`], [`chat_type`], [`acl`]
//! - **Entities**: [`entity`], [`entity_type`], [`entity_text`] and the
//!   shorthands [`mention`], [`hashtag`], [`cashtag`], [`url`], [`email`],
//!   [`phone`], [`text_link`], [`text_mention`]
//! - **Text**: [`match_text`], [`hears`], [`command`], [`action`],
//!   [`inline_query`]
//! - **Recovery**: [`catch`]
//! - **Leaves**: [`reply`], [`noop`], [`pass_thru`]
//!
//! Matchers that succeed store a [`Match`] on the context before running
//! their unit; [`Context::matched`] reads it back.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use tracing::error;
use weft_core::{
    BoxFuture, BoxedMiddleware, Context, DispatchError, ErrorHandler, IntoMiddleware, Match,
    Message, MessageEntity, MiddlewareResult, Next, UpdateType, handler_fn, middleware_fn,
};

use crate::predicate::Predicate;
use crate::trigger::{IntoTriggers, Trigger, first_match};

// =============================================================================
// Names
// =============================================================================

/// Conversion into a list of names (update types, entity types, commands).
pub trait IntoNames {
    fn into_names(self) -> Vec<String>;
}

impl IntoNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoNames for UpdateType {
    fn into_names(self) -> Vec<String> {
        vec![self.as_str().to_string()]
    }
}

impl<S: Into<String>> IntoNames for Vec<S> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<S: Into<String>, const N: usize> IntoNames for [S; N] {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

// =============================================================================
// Leaves
// =============================================================================

/// Continues unconditionally.
pub fn pass_thru() -> BoxedMiddleware {
    middleware_fn(|ctx, next| next.run(ctx))
}

/// Does nothing and stops the chain.
pub fn noop() -> BoxedMiddleware {
    middleware_fn(|_ctx, _next| async { Ok(()) })
}

/// Replies with `text` and stops the chain.
pub fn reply(text: impl Into<String>) -> BoxedMiddleware {
    let text: Arc<str> = Arc::from(text.into());
    handler_fn(move |ctx| {
        let text = Arc::clone(&text);
        async move {
            ctx.reply(&text).await?;
            Ok(())
        }
    })
}

// =============================================================================
// Gating
// =============================================================================

/// Dispatches exactly one of `on_true` and `on_false`.
///
/// A constant predicate selects its side once, at build time.
pub fn branch(
    predicate: impl Into<Predicate>,
    on_true: impl IntoMiddleware,
    on_false: impl IntoMiddleware,
) -> BoxedMiddleware {
    let predicate = predicate.into();
    let on_true = on_true.into_middleware();
    let on_false = on_false.into_middleware();

    if let Some(value) = predicate.as_const() {
        return if value { on_true } else { on_false };
    }

    middleware_fn(move |ctx, next| {
        let predicate = predicate.clone();
        let on_true = on_true.clone();
        let on_false = on_false.clone();
        async move {
            let side = if predicate.test(&ctx).await {
                on_true
            } else {
                on_false
            };
            side.call(ctx, next).await
        }
    })
}

/// Runs `unit` when `predicate` holds, otherwise passes through.
pub fn optional(predicate: impl Into<Predicate>, unit: impl IntoMiddleware) -> BoxedMiddleware {
    branch(predicate, unit, pass_thru())
}

/// Continues only when `predicate` holds.
pub fn filter(predicate: impl Into<Predicate>) -> BoxedMiddleware {
    branch(predicate, pass_thru(), noop())
}

/// Stops the chain when `predicate` holds.
pub fn drop(predicate: impl Into<Predicate>) -> BoxedMiddleware {
    filter(predicate.into().negate())
}

// =============================================================================
// Lookup
// =============================================================================

/// Resolves a middleware per dispatch and runs it.
///
/// A factory returning `None` fails the dispatch with
/// [`DispatchError::HandlerUndefined`].
pub fn lazy<F>(factory: F) -> BoxedMiddleware
where
    F: Fn(&Context) -> Option<BoxedMiddleware> + Send + Sync + 'static,
{
    middleware_fn(move |ctx, next| {
        let resolved = factory(&ctx);
        async move {
            match resolved {
                Some(unit) => unit.call(ctx, next).await,
                None => Err(DispatchError::HandlerUndefined.into()),
            }
        }
    })
}

/// Runs `table[classify(ctx)]`.
///
/// A key missing from the table fails the dispatch with
/// [`DispatchError::HandlerUndefined`].
pub fn dispatch<K, F>(
    classify: F,
    table: impl IntoIterator<Item = (K, BoxedMiddleware)>,
) -> BoxedMiddleware
where
    K: Eq + Hash + Send + Sync + 'static,
    F: Fn(&Context) -> K + Send + Sync + 'static,
{
    let table: HashMap<K, BoxedMiddleware> = table.into_iter().collect();
    lazy(move |ctx| table.get(&classify(ctx)).cloned())
}

// =============================================================================
// Concurrency
// =============================================================================

/// Spawns `unit` on the tokio runtime and continues immediately.
///
/// The payload gets an inert continuation; its errors are logged and never
/// reach the chain.
pub fn fork(unit: impl IntoMiddleware) -> BoxedMiddleware {
    let unit = unit.into_middleware();
    middleware_fn(move |ctx, next| {
        let payload = unit.clone();
        let forked = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(err) = payload.call(forked, Next::noop()).await {
                error!(error = %err, "forked middleware failed");
            }
        });
        next.run(ctx)
    })
}

/// Runs `unit` to completion with an inert continuation, then continues.
///
/// Errors raised by `unit` propagate.
pub fn tap(unit: impl IntoMiddleware) -> BoxedMiddleware {
    let unit = unit.into_middleware();
    middleware_fn(move |ctx, next| {
        let unit = unit.clone();
        async move {
            unit.call(Arc::clone(&ctx), Next::noop()).await?;
            next.run(ctx).await
        }
    })
}

// =============================================================================
// Recovery
// =============================================================================

/// Runs `unit` (and everything it continues into), handing any error to
/// `handler`. The dispatch always settles successfully.
pub fn catch(handler: impl ErrorHandler, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let handler = Arc::new(handler);
    let unit = unit.into_middleware();
    middleware_fn(move |ctx, next| {
        let handler = Arc::clone(&handler);
        let unit = unit.clone();
        async move {
            if let Err(err) = unit.call(Arc::clone(&ctx), next).await {
                handler.handle(err, ctx).await;
            }
            Ok(())
        }
    })
}

// =============================================================================
// Classification
// =============================================================================

/// Runs `unit` for updates whose type or message sub type is in `types`.
pub fn mount(types: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let types = types.into_names();
    optional(
        Predicate::new(move |ctx| types.iter().any(|name| ctx.is_classified_as(name))),
        unit,
    )
}

/// Alias of [`mount`].
pub fn on(types: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    mount(types, unit)
}

/// Runs `unit` for updates from chats of one of `kinds`.
pub fn chat_type(kinds: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let kinds = kinds.into_names();
    optional(
        Predicate::new(move |ctx| ctx.chat().is_some_and(|chat| kinds.contains(&chat.kind))),
        unit,
    )
}

pub fn private_chat(unit: impl IntoMiddleware) -> BoxedMiddleware {
    chat_type("private", unit)
}

pub fn group_chat(unit: impl IntoMiddleware) -> BoxedMiddleware {
    chat_type(["group", "supergroup"], unit)
}

/// Runs `unit` only for updates sent by one of `user_ids`.
pub fn acl(user_ids: impl IntoIterator<Item = i64>, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let allowed: HashSet<i64> = user_ids.into_iter().collect();
    optional(
        Predicate::new(move |ctx| ctx.sender().is_some_and(|user| allowed.contains(&user.id))),
        unit,
    )
}

// =============================================================================
// Matching
// =============================================================================

/// Stores `matched` and runs `unit`, or continues when nothing matched.
fn run_matched(
    unit: BoxedMiddleware,
    matched: Option<Match>,
    ctx: Arc<Context>,
    next: Next,
) -> BoxFuture<'static, MiddlewareResult> {
    match matched {
        Some(matched) => {
            ctx.set_match(Some(matched));
            unit.call(ctx, next)
        }
        None => next.run(ctx),
    }
}

/// The message whose entities the entity matchers inspect.
fn entity_source(ctx: &Context) -> Option<&Message> {
    let update = ctx.update();
    update.message.as_ref().or(update.channel_post.as_ref())
}

fn entity_match<F>(matcher: F, unit: impl IntoMiddleware) -> BoxedMiddleware
where
    F: Fn(&MessageEntity, &str, &Context) -> Option<Match> + Send + Sync + 'static,
{
    let unit = unit.into_middleware();
    middleware_fn(move |ctx, next| {
        let matched = entity_source(&ctx).and_then(|message| {
            let text = message.text_or_caption()?;
            message
                .entities_or_caption_entities()
                .iter()
                .find_map(|entity| matcher(entity, &entity.slice(text), &ctx))
        });
        run_matched(unit.clone(), matched, ctx, next)
    })
}

/// Runs `unit` when any entity satisfies `predicate`.
///
/// The predicate receives the entity and the text it covers; the covered
/// text of the first satisfying entity becomes the match.
pub fn entity<F>(predicate: F, unit: impl IntoMiddleware) -> BoxedMiddleware
where
    F: Fn(&MessageEntity, &str, &Context) -> bool + Send + Sync + 'static,
{
    entity_match(
        move |entity, value, ctx| predicate(entity, value, ctx).then(|| Match::whole(value)),
        unit,
    )
}

/// Runs `unit` when the message carries an entity of one of `types`.
pub fn entity_type(types: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let types = types.into_names();
    entity(move |entity, _value, _ctx| types.contains(&entity.kind), unit)
}

/// Runs `unit` when an entity of `kind` covers text matching `triggers`.
pub fn entity_text(
    kind: impl Into<String>,
    triggers: impl IntoTriggers,
    unit: impl IntoMiddleware,
) -> BoxedMiddleware {
    let kind = kind.into();
    let triggers = triggers.into_triggers();
    entity_match(
        move |entity, value, ctx| {
            if entity.kind != kind {
                return None;
            }
            first_match(&triggers, value, ctx)
        },
        unit,
    )
}

fn prefixed(names: impl IntoNames, prefix: char) -> Vec<Trigger> {
    names
        .into_names()
        .into_iter()
        .map(|name| {
            if name.starts_with(prefix) {
                name
            } else {
                format!("{prefix}{name}")
            }
        })
        .map(Trigger::literal)
        .collect()
}

/// Matches `@username` mentions.
pub fn mention(usernames: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("mention", prefixed(usernames, '@'), unit)
}

/// Matches `#tag` hashtags.
pub fn hashtag(tags: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("hashtag", prefixed(tags, '#'), unit)
}

/// Matches `$TAG` cashtags.
pub fn cashtag(tags: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("cashtag", prefixed(tags, '$'), unit)
}

pub fn url(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("url", triggers, unit)
}

pub fn email(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("email", triggers, unit)
}

pub fn phone(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("phone_number", triggers, unit)
}

pub fn text_link(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("text_link", triggers, unit)
}

pub fn text_mention(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    entity_text("text_mention", triggers, unit)
}

/// Runs `unit` when the update's trigger text matches `triggers`.
///
/// The trigger text is the message text or caption, the callback data, or
/// the inline query, whichever the update carries.
pub fn match_text(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let triggers = triggers.into_triggers();
    let unit = unit.into_middleware();
    middleware_fn(move |ctx, next| {
        let matched = ctx
            .trigger_text()
            .and_then(|value| first_match(&triggers, value, &ctx));
        run_matched(unit.clone(), matched, ctx, next)
    })
}

/// Runs `unit` for text messages matching `triggers`.
pub fn hears(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    mount("text", match_text(triggers, unit))
}

/// Runs `unit` for callback queries whose data matches `triggers`.
pub fn action(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    mount("callback_query", match_text(triggers, unit))
}

/// Runs `unit` for inline queries matching `triggers`.
pub fn inline_query(triggers: impl IntoTriggers, unit: impl IntoMiddleware) -> BoxedMiddleware {
    mount("inline_query", match_text(triggers, unit))
}

/// A leading `/name[@bot] args` command.
struct ParsedCommand<'a> {
    whole: String,
    name: String,
    target: Option<String>,
    args: &'a str,
}

fn parse_command(message: &Message) -> Option<ParsedCommand<'_>> {
    let text = message.text.as_deref()?;
    let entity = message.entities.first()?;
    if entity.kind != "bot_command" || entity.offset != 0 {
        return None;
    }
    let whole = entity.slice(text);
    let command = whole.strip_prefix('/')?;
    let (name, target) = match command.split_once('@') {
        Some((name, target)) => (name.to_string(), Some(target.to_string())),
        None => (command.to_string(), None),
    };
    let args = text.get(whole.len()..).unwrap_or_default().trim();
    Some(ParsedCommand {
        whole,
        name,
        target,
        args,
    })
}

/// Runs `unit` for messages starting with one of the bot commands `names`.
///
/// Both `/name` and `/name@bot` are accepted; the latter only when the
/// context knows the bot's username and it matches. The match holds the
/// command as group 0 and its arguments as group 1.
pub fn command(names: impl IntoNames, unit: impl IntoMiddleware) -> BoxedMiddleware {
    let names: Vec<String> = names
        .into_names()
        .into_iter()
        .map(|name| name.trim_start_matches('/').to_string())
        .collect();
    let unit = unit.into_middleware();
    mount(
        "text",
        middleware_fn(move |ctx, next| {
            let matched = entity_source(&ctx)
                .and_then(parse_command)
                .filter(|parsed| names.contains(&parsed.name))
                .filter(|parsed| match (&parsed.target, ctx.bot_username()) {
                    (None, _) => true,
                    (Some(target), Some(me)) => target.eq_ignore_ascii_case(me),
                    (Some(_), None) => false,
                })
                .map(|parsed| {
                    Match::new(vec![Some(parsed.whole), Some(parsed.args.to_string())])
                });
            run_matched(unit.clone(), matched, ctx, next)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::compose;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_core::Update;

    fn context(update: Value) -> Arc<Context> {
        let update: Update = serde_json::from_value(update).unwrap();
        Arc::new(Context::detached(update).with_bot_username("weft_bot"))
    }

    fn text_ctx(text: &str, entities: Value) -> Arc<Context> {
        context(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": { "id": 7, "first_name": "Ada" },
                "chat": { "id": 7, "type": "private" },
                "text": text,
                "entities": entities
            }
        }))
    }

    /// Counts calls and records the match seen by the handler.
    fn recorder() -> (BoxedMiddleware, Arc<AtomicUsize>, Arc<Mutex<Option<Match>>>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let (h, s) = (Arc::clone(&hits), Arc::clone(&seen));
        let unit = handler_fn(move |ctx| {
            let (h, s) = (Arc::clone(&h), Arc::clone(&s));
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                *s.lock() = ctx.matched();
                Ok(())
            }
        });
        (unit, hits, seen)
    }

    fn counting_next(counter: &Arc<AtomicUsize>) -> Next {
        let counter = Arc::clone(counter);
        Next::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_branch_constant_selects_side() {
        let (a, a_hits, _) = recorder();
        let (b, b_hits, _) = recorder();
        let ctx = text_ctx("x", json!([]));

        branch(true, a.clone(), b.clone()).call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        branch(false, a, b).call(ctx, Next::noop()).await.unwrap();
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_branch_resolves_predicates() {
        let (a, a_hits, _) = recorder();
        let (b, b_hits, _) = recorder();
        let sync = branch(
            Predicate::new(|ctx| ctx.trigger_text() == Some("yes")),
            a.clone(),
            b.clone(),
        );
        let deferred = branch(
            Predicate::from_future(|ctx: Arc<Context>| async move {
                tokio::task::yield_now().await;
                ctx.trigger_text() == Some("yes")
            }),
            a,
            b,
        );

        sync.call(text_ctx("yes", json!([])), Next::noop()).await.unwrap();
        deferred.call(text_ctx("no", json!([])), Next::noop()).await.unwrap();
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_filter_and_drop() {
        let reached = Arc::new(AtomicUsize::new(0));
        let ctx = text_ctx("x", json!([]));
        filter(true).call(Arc::clone(&ctx), counting_next(&reached)).await.unwrap();
        filter(false).call(Arc::clone(&ctx), counting_next(&reached)).await.unwrap();
        drop(true).call(Arc::clone(&ctx), counting_next(&reached)).await.unwrap();
        drop(false).call(Arc::clone(&ctx), counting_next(&reached)).await.unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 2);

        let has_text = Predicate::from_future(|ctx: Arc<Context>| async move {
            ctx.message().is_some_and(|m| m.text.is_some())
        });
        drop(has_text).call(Arc::clone(&ctx), counting_next(&reached)).await.unwrap();
        drop(Predicate::new(|ctx| ctx.message().is_none()))
            .call(ctx, counting_next(&reached))
            .await
            .unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_by_key() {
        let (a, a_hits, _) = recorder();
        let table = vec![("message", a)];
        let unit = dispatch(|ctx: &Context| ctx.update_type().as_str(), table);
        unit.call(text_ctx("x", json!([])), Next::noop()).await.unwrap();
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);

        let err = unit
            .call(context(json!({ "update_id": 2, "poll": {} })), Next::noop())
            .await
            .unwrap_err();
        assert_eq!(DispatchError::find(&err), Some(&DispatchError::HandlerUndefined));
    }

    #[tokio::test]
    async fn test_lazy_without_handler_fails() {
        let unit = lazy(|_ctx| None);
        let err = unit.call(text_ctx("x", json!([])), Next::noop()).await.unwrap_err();
        assert_eq!(err.to_string(), "handler is undefined");
    }

    #[tokio::test]
    async fn test_fork_continues_before_payload_runs() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let payload_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&payload_hits);
        let payload = middleware_fn(move |ctx, next| {
            let tx = Arc::clone(&tx);
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                next.run(ctx).await?;
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });

        let reached = Arc::new(AtomicUsize::new(0));
        let chain = compose(vec![fork(payload), pass_thru()]);
        chain
            .call(text_ctx("x", json!([])), counting_next(&reached))
            .await
            .unwrap();

        // Nothing has yielded to the scheduler yet.
        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(payload_hits.load(Ordering::SeqCst), 0);

        rx.await.unwrap();
        assert_eq!(payload_hits.load(Ordering::SeqCst), 1);
        // The payload's own continuation did not reach the outer one.
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tap_always_continues_and_propagates_errors() {
        let reached = Arc::new(AtomicUsize::new(0));
        let silent = tap(handler_fn(|_ctx| async { Ok(()) }));
        silent.call(text_ctx("x", json!([])), counting_next(&reached)).await.unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 1);

        let failing = tap(handler_fn(|_ctx| async { Err("tap failed".into()) }));
        let err = failing
            .call(text_ctx("x", json!([])), counting_next(&reached))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "tap failed");
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_catch_settles_downstream_errors() {
        let caught = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&caught);
        let guarded = catch(
            move |err: weft_core::BoxError, _ctx: Arc<Context>| {
                let sink = Arc::clone(&sink);
                async move { sink.lock().push(err.to_string()) }
            },
            pass_thru(),
        );
        let failing_next = Next::new(|_ctx| async { Err("downstream".into()) });
        guarded.call(text_ctx("x", json!([])), failing_next).await.unwrap();
        assert_eq!(*caught.lock(), vec!["downstream".to_string()]);
    }

    #[tokio::test]
    async fn test_hashtag_entity_matches_once() {
        let (unit, hits, seen) = recorder();
        let handler = entity_type("hashtag", unit);
        let ctx = text_ctx("#foo", json!([{ "type": "hashtag", "offset": 0, "length": 4 }]));
        handler.call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_ref().map(|m| m.as_str().to_string()), Some("#foo".into()));

        let ctx = text_ctx("#foo", json!([{ "type": "mention", "offset": 0, "length": 4 }]));
        handler.call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entity_with_out_of_range_offset_does_not_panic() {
        let (unit, _hits, _seen) = recorder();
        let entity = json!([{ "type": "hashtag", "offset": u64::MAX, "length": 4 }]);
        entity_type("hashtag", unit)
            .call(text_ctx("#foo", entity.clone()), Next::noop())
            .await
            .unwrap();

        let (unit, hits, _seen) = recorder();
        command("foo", unit)
            .call(text_ctx("#foo", entity), Next::noop())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shorthands_add_prefix() {
        let (unit, hits, _) = recorder();
        let tagged = hashtag("rust", unit.clone());
        let mentioned = mention("ada", unit);
        let ctx = text_ctx(
            "hi @ada #rust",
            json!([
                { "type": "mention", "offset": 3, "length": 4 },
                { "type": "hashtag", "offset": 8, "length": 5 }
            ]),
        );
        tagged.call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        mentioned.call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hears_with_regex_captures() {
        let (unit, hits, seen) = recorder();
        let handler = hears(regex::Regex::new(r"^echo (.+)$").unwrap(), unit);
        let reached = Arc::new(AtomicUsize::new(0));

        handler.call(text_ctx("echo hello", json!([])), counting_next(&reached)).await.unwrap();
        handler.call(text_ctx("nothing", json!([])), counting_next(&reached)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_ref().and_then(|m| m.get(1).map(str::to_string)), Some("hello".into()));
    }

    #[tokio::test]
    async fn test_command_forms() {
        let (unit, hits, seen) = recorder();
        let handler = command("start", unit);
        let entity = |len: usize| json!([{ "type": "bot_command", "offset": 0, "length": len }]);

        handler.call(text_ctx("/start now", entity(6)), Next::noop()).await.unwrap();
        assert_eq!(seen.lock().as_ref().and_then(|m| m.get(1).map(str::to_string)), Some("now".into()));
        handler.call(text_ctx("/start@weft_bot", entity(15)), Next::noop()).await.unwrap();
        handler.call(text_ctx("/start@other_bot", entity(16)), Next::noop()).await.unwrap();
        handler.call(text_ctx("/stop", entity(5)), Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_action_matches_callback_data() {
        let (unit, hits, _) = recorder();
        let handler = action("like", unit);
        let ctx = context(json!({
            "update_id": 3,
            "callback_query": { "id": "q", "from": { "id": 7, "first_name": "Ada" }, "data": "like" }
        }));
        handler.call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acl_and_chat_type() {
        let (unit, hits, _) = recorder();
        let ctx = text_ctx("x", json!([]));
        acl([1, 2], unit.clone()).call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        acl([7], unit.clone()).call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        group_chat(unit.clone()).call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        private_chat(unit).call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mount_on_sub_type() {
        let (unit, hits, _) = recorder();
        let photo = mount("photo", unit.clone());
        let text = on(UpdateType::Message, unit);
        let ctx = text_ctx("x", json!([]));
        photo.call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        text.call(ctx, Next::noop()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
