use std::sync::Arc;

/// What kind of artifact a body is being filtered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyledAs {
    Email,
    Chat,
}

/// Persona style post-filter hook.
///
/// A pure function over `(body, persona_id, kind)` applied by the gateway
/// adapters right before a send. Messages without a persona id (the
/// simulation manager's own traffic) bypass it.
pub type StyleFilter = Arc<dyn Fn(&str, i64, StyledAs) -> String + Send + Sync>;

/// Default no-op filter.
pub fn identity_filter() -> StyleFilter {
    Arc::new(|body, _persona_id, _kind| body.to_string())
}
