use std::collections::BTreeMap;

/// A named prompt template whose body carries `{token}` placeholders.
///
/// Rendering substitutes every placeholder from a [`TemplateContext`]; a
/// token with no context value is a defect surfaced as
/// [`TemplateError::UnresolvedPlaceholder`], never silently passed through
/// to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("unresolved placeholder '{{{0}}}'")]
    UnresolvedPlaceholder(String),
}

impl PromptTemplate {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Placeholder tokens referenced by the body, in order of first use.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out = Vec::new();
        scan_tokens(&self.body, |token| {
            if !out.iter().any(|existing| existing == token) {
                out.push(token.to_string());
            }
        });
        out
    }

    pub fn render(&self, ctx: &TemplateContext) -> Result<String, TemplateError> {
        render_body(&self.body, ctx)
    }

    /// Render with a decorrelation suffix appended.
    ///
    /// Repeated calls against the same template otherwise produce
    /// near-identical provider output; the seed marker keeps a batch of
    /// variants diverse without changing the semantic content.
    pub fn render_variant(&self, ctx: &TemplateContext, seed: u64) -> Result<String, TemplateError> {
        Ok(format!("{} --v {seed}", self.render(ctx)?))
    }
}

/// Substitute `{token}` placeholders in `body` from `ctx`.
///
/// A token is one or more `[A-Za-z0-9_]` characters between braces. Brace
/// pairs that do not form a token (spaces, punctuation, nesting) are copied
/// verbatim so templates may contain literal JSON-ish text.
pub fn render_body(body: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_token(&after[..close]) => {
                let token = &after[..close];
                match ctx.get(token) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::UnresolvedPlaceholder(token.to_string())),
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn scan_tokens(body: &str, mut visit: impl FnMut(&str)) {
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_token(&after[..close]) => {
                visit(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }
}

fn is_token(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
