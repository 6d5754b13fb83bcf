//! Trigger normalisation.
//!
//! Text matchers accept literal strings, regular expressions, or functions.
//! All three are normalised into a single [`Trigger`] with the signature
//! `(value, ctx) -> Option<Match>`:
//!
//! | Input | Behavior |
//! |-------|----------|
//! | `&str` / `String` | exact match, the whole value is the match |
//! | [`Regex`] | first match, with capture groups |
//! | [`Trigger::new`] | arbitrary test |
//!
//! ```rust,ignore
//! hears(["hi", "hello"], reply("hey"));
//! hears(Regex::new(r"^/echo (.+)$")?, echo);
//! ```

use std::sync::Arc;

use regex::Regex;
use weft_core::{Context, Match};

type TriggerFn = dyn Fn(&str, &Context) -> Option<Match> + Send + Sync;

/// A normalised text test.
#[derive(Clone)]
pub struct Trigger(Arc<TriggerFn>);

impl Trigger {
    /// Creates a trigger from an arbitrary test function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &Context) -> Option<Match> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Matches `value` exactly.
    pub fn literal(literal: impl Into<String>) -> Self {
        let literal = literal.into();
        Self::new(move |value, _ctx| (value == literal).then(|| Match::whole(value)))
    }

    /// Matches the first occurrence of `pattern`, keeping capture groups.
    pub fn regex(pattern: Regex) -> Self {
        Self::new(move |value, _ctx| {
            pattern.captures(value).map(|caps| {
                Match::new(
                    caps.iter()
                        .map(|group| group.map(|g| g.as_str().to_string()))
                        .collect(),
                )
            })
        })
    }

    /// Tests `value`, returning the match on success.
    pub fn test(&self, value: &str, ctx: &Context) -> Option<Match> {
        (self.0)(value, ctx)
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger").finish_non_exhaustive()
    }
}

impl From<&str> for Trigger {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for Trigger {
    fn from(value: String) -> Self {
        Self::literal(value)
    }
}

impl From<Regex> for Trigger {
    fn from(value: Regex) -> Self {
        Self::regex(value)
    }
}

/// Conversion into a list of triggers.
pub trait IntoTriggers {
    fn into_triggers(self) -> Vec<Trigger>;
}

impl IntoTriggers for Trigger {
    fn into_triggers(self) -> Vec<Trigger> {
        vec![self]
    }
}

impl IntoTriggers for &str {
    fn into_triggers(self) -> Vec<Trigger> {
        vec![Trigger::literal(self)]
    }
}

impl IntoTriggers for String {
    fn into_triggers(self) -> Vec<Trigger> {
        vec![Trigger::literal(self)]
    }
}

impl IntoTriggers for Regex {
    fn into_triggers(self) -> Vec<Trigger> {
        vec![Trigger::regex(self)]
    }
}

impl<T: Into<Trigger>> IntoTriggers for Vec<T> {
    fn into_triggers(self) -> Vec<Trigger> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Trigger>, const N: usize> IntoTriggers for [T; N] {
    fn into_triggers(self) -> Vec<Trigger> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Returns the first match of any trigger against `value`.
pub(crate) fn first_match(triggers: &[Trigger], value: &str, ctx: &Context) -> Option<Match> {
    triggers.iter().find_map(|trigger| trigger.test(value, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Update;

    fn ctx() -> Context {
        let update: Update = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        Context::detached(update)
    }

    #[test]
    fn test_literal_requires_exact_match() {
        let trigger = Trigger::from("hello");
        let ctx = ctx();
        assert_eq!(trigger.test("hello", &ctx).unwrap().as_str(), "hello");
        assert!(trigger.test("hello there", &ctx).is_none());
    }

    #[test]
    fn test_regex_keeps_groups() {
        let trigger = Trigger::from(Regex::new(r"^/echo (\w+)( now)?$").unwrap());
        let ctx = ctx();
        let matched = trigger.test("/echo hi", &ctx).unwrap();
        assert_eq!(matched.as_str(), "/echo hi");
        assert_eq!(matched.get(1), Some("hi"));
        assert_eq!(matched.get(2), None);
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn test_first_match_over_list() {
        let triggers = ["a", "b"].into_triggers();
        let ctx = ctx();
        assert_eq!(first_match(&triggers, "b", &ctx).unwrap().as_str(), "b");
        assert!(first_match(&triggers, "c", &ctx).is_none());
    }
}
