//! Namespace templates and resolution.
//!
//! Templates are parsed once into typed segments. Writing resolves a
//! template against the writer's context; reading either re-resolves with the
//! reader's context (`matches`) or, when no context is at hand, matches a
//! stored namespace against the template's shape (`matches_shape`).

use serde::{Deserialize, Serialize};

use crate::domain::{ResolutionError, Strategy};

/// One piece of a namespace template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    ActorId,
    SessionId,
    StrategyId,
}

/// A parsed namespace template such as `/users/{actor_id}/preferences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceTemplate {
    raw: String,
    segments: Vec<TemplateSegment>,
}

impl NamespaceTemplate {
    /// Parse a template. Accepted placeholders: `{actor_id}`, `{session_id}`,
    /// `{strategy_id}`. At least one is required and two may not be adjacent.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("namespace template must not be empty".into());
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(format!("nested '{{' in template {raw}")),
                            other => name.push(other),
                        }
                    }
                    if !closed {
                        return Err(format!("unterminated placeholder in template {raw}"));
                    }
                    let segment = match name.as_str() {
                        "actor_id" => TemplateSegment::ActorId,
                        "session_id" => TemplateSegment::SessionId,
                        "strategy_id" => TemplateSegment::StrategyId,
                        other => {
                            return Err(format!("unknown placeholder {{{other}}} in template {raw}"))
                        }
                    };
                    if literal.is_empty()
                        && matches!(segments.last(), Some(s) if !matches!(s, TemplateSegment::Literal(_)))
                    {
                        return Err(format!("adjacent placeholders in template {raw}"));
                    }
                    if !literal.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => return Err(format!("unbalanced '}}' in template {raw}")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(TemplateSegment::Literal(literal));
        }

        if !segments
            .iter()
            .any(|s| !matches!(s, TemplateSegment::Literal(_)))
        {
            return Err(format!("template {raw} has no placeholder"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[TemplateSegment] {
        &self.segments
    }

    pub fn requires_session(&self) -> bool {
        self.segments.contains(&TemplateSegment::SessionId)
    }

    /// Shared templates resolve to the same namespace for every actor.
    pub fn is_shared(&self) -> bool {
        !self
            .segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::ActorId | TemplateSegment::SessionId))
    }

    /// Context-free structural match: does `namespace` have the shape this
    /// template produces for `strategy_id`? Variable placeholders match one
    /// non-empty run of characters without `/`.
    pub fn matches_shape(&self, strategy_id: &str, namespace: &str) -> bool {
        match_segments(&self.segments, strategy_id, namespace)
    }
}

fn match_segments(segments: &[TemplateSegment], strategy_id: &str, rest: &str) -> bool {
    match segments.split_first() {
        None => rest.is_empty(),
        Some((TemplateSegment::Literal(lit), tail)) => rest
            .strip_prefix(lit.as_str())
            .is_some_and(|r| match_segments(tail, strategy_id, r)),
        Some((TemplateSegment::StrategyId, tail)) => rest
            .strip_prefix(strategy_id)
            .is_some_and(|r| match_segments(tail, strategy_id, r)),
        Some((_, tail)) => {
            let max = rest.find('/').unwrap_or(rest.len());
            (1..=max)
                .filter(|n| rest.is_char_boundary(*n))
                .any(|n| match_segments(tail, strategy_id, &rest[n..]))
        }
    }
}

impl TryFrom<String> for NamespaceTemplate {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        NamespaceTemplate::parse(&raw)
    }
}

impl From<NamespaceTemplate> for String {
    fn from(t: NamespaceTemplate) -> Self {
        t.raw
    }
}

impl std::fmt::Display for NamespaceTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A resolved partition key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity a template is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionContext<'a> {
    pub actor_id: &'a str,
    pub session_id: Option<&'a str>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(actor_id: &'a str, session_id: Option<&'a str>) -> Self {
        Self {
            actor_id,
            session_id,
        }
    }
}

fn check_value(
    strategy: &Strategy,
    variable: &'static str,
    value: &str,
) -> Result<(), ResolutionError> {
    let reason = if value.is_empty() {
        Some("value is empty".to_string())
    } else if value.contains(['/', '{', '}']) {
        Some(format!("value {value:?} contains a reserved character"))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ResolutionError::InvalidValue {
            strategy_id: strategy.strategy_id.clone(),
            variable,
            reason,
        }),
        None => Ok(()),
    }
}

/// Instantiate a strategy's template for a context. Pure and deterministic.
pub fn resolve(
    strategy: &Strategy,
    ctx: &ResolutionContext<'_>,
) -> Result<Namespace, ResolutionError> {
    let mut out = String::new();
    for segment in strategy.template.segments() {
        match segment {
            TemplateSegment::Literal(lit) => out.push_str(lit),
            TemplateSegment::StrategyId => out.push_str(&strategy.strategy_id),
            TemplateSegment::ActorId => {
                check_value(strategy, "actor_id", ctx.actor_id)?;
                out.push_str(ctx.actor_id);
            }
            TemplateSegment::SessionId => {
                let session = ctx
                    .session_id
                    .ok_or_else(|| ResolutionError::MissingVariable {
                        strategy_id: strategy.strategy_id.clone(),
                        variable: "session_id",
                    })?;
                check_value(strategy, "session_id", session)?;
                out.push_str(session);
            }
        }
    }
    Ok(Namespace(out))
}

/// Does this strategy, instantiated with the reader's context, name `namespace`?
pub fn matches(strategy: &Strategy, ctx: &ResolutionContext<'_>, namespace: &str) -> bool {
    resolve(strategy, ctx)
        .map(|ns| ns.as_str() == namespace)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StrategyKind;
    use chrono::Duration;

    fn strategy(id: &str, template: &str) -> Strategy {
        Strategy::new(id, StrategyKind::Preference, template, Duration::days(1), 0.0).unwrap()
    }

    #[test]
    fn parses_placeholders_and_literals() {
        let t = NamespaceTemplate::parse("/users/{actor_id}/sessions/{session_id}").unwrap();
        assert_eq!(
            t.segments(),
            &[
                TemplateSegment::Literal("/users/".into()),
                TemplateSegment::ActorId,
                TemplateSegment::Literal("/sessions/".into()),
                TemplateSegment::SessionId,
            ]
        );
        assert!(t.requires_session());
        assert!(!t.is_shared());
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in [
            "",
            "/static/path",
            "/users/{actorId}",
            "/users/{actor_id",
            "/users/actor_id}",
            "/a/{actor_id}{session_id}",
            "/a/{{actor_id}}",
        ] {
            assert!(NamespaceTemplate::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn resolve_substitutes_context() {
        let s = strategy("prefs", "/users/{actor_id}/preferences");
        let ns = resolve(&s, &ResolutionContext::new("alice", None)).unwrap();
        assert_eq!(ns.as_str(), "/users/alice/preferences");
    }

    #[test]
    fn resolve_is_deterministic() {
        let s = strategy("sum", "/summaries/{actor_id}/{session_id}");
        let ctx = ResolutionContext::new("alice", Some("s1"));
        assert_eq!(resolve(&s, &ctx).unwrap(), resolve(&s, &ctx).unwrap());
    }

    #[test]
    fn resolve_fails_without_session() {
        let s = strategy("sum", "/summaries/{actor_id}/{session_id}");
        let err = resolve(&s, &ResolutionContext::new("alice", None)).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingVariable {
                strategy_id: "sum".into(),
                variable: "session_id"
            }
        );
    }

    #[test]
    fn resolve_rejects_reserved_characters() {
        let s = strategy("prefs", "/users/{actor_id}/preferences");
        assert!(matches!(
            resolve(&s, &ResolutionContext::new("../bob", None)),
            Err(ResolutionError::InvalidValue { .. })
        ));
        assert!(resolve(&s, &ResolutionContext::new("", None)).is_err());
    }

    #[test]
    fn strategy_id_placeholder_makes_shared_namespace() {
        let s = strategy("infra", "/infrastructure/{strategy_id}");
        assert!(s.template.is_shared());
        let a = resolve(&s, &ResolutionContext::new("alice", None)).unwrap();
        let b = resolve(&s, &ResolutionContext::new("bob", Some("s9"))).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/infrastructure/infra");
    }

    #[test]
    fn matches_compares_with_reader_context() {
        let s = strategy("prefs", "/users/{actor_id}/preferences");
        let alice = ResolutionContext::new("alice", None);
        let bob = ResolutionContext::new("bob", None);
        assert!(matches(&s, &alice, "/users/alice/preferences"));
        assert!(!matches(&s, &bob, "/users/alice/preferences"));
    }

    #[test]
    fn matches_shape_without_context() {
        let s = strategy("sum", "/summaries/{actor_id}/{session_id}");
        assert!(s.template.matches_shape("sum", "/summaries/alice/s1"));
        assert!(!s.template.matches_shape("sum", "/summaries/alice"));
        assert!(!s.template.matches_shape("sum", "/summaries/alice/s1/extra"));
        assert!(!s.template.matches_shape("sum", "/summaries//s1"));

        let shared = strategy("infra", "/infrastructure/{strategy_id}");
        assert!(shared.template.matches_shape("infra", "/infrastructure/infra"));
        assert!(!shared.template.matches_shape("infra", "/infrastructure/other"));
    }

    #[test]
    fn template_serde_round_trip_validates() {
        let t: NamespaceTemplate = serde_json::from_str("\"/users/{actor_id}\"").unwrap();
        assert_eq!(t.as_str(), "/users/{actor_id}");
        assert!(serde_json::from_str::<NamespaceTemplate>("\"/users/{nope}\"").is_err());
    }
}
