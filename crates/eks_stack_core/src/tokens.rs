//! String tokens for late-bound values.
//!
//! A token is a marker string such as `${Token[RepositoryUri.0]}` that can
//! travel through any string-typed field (a container image, a serialized
//! manifest) and is turned back into an intrinsic expression at synthesis.

use crate::template::Expr;

const MARKER_OPEN: &str = "${Token[";
const MARKER_CLOSE: &str = "]}";

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    entries: Vec<(String, Expr)>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `expr` and returns the marker that stands for it.
    pub fn encode(&mut self, name: &str, expr: Expr) -> String {
        let key = format!("{}.{}", sanitize(name), self.entries.len());
        let marker = format!("{MARKER_OPEN}{key}{MARKER_CLOSE}");
        self.entries.push((key, expr));
        marker
    }

    fn lookup(&self, key: &str) -> Option<&Expr> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, expr)| expr)
    }

    /// Resolves every marker inside `text`.
    ///
    /// Unknown markers are kept as literal text.
    pub fn resolve(&self, text: &str) -> Expr {
        let mut parts: Vec<Expr> = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find(MARKER_OPEN) {
            let after_open = &rest[start + MARKER_OPEN.len()..];
            let Some(close) = after_open.find(MARKER_CLOSE) else {
                break;
            };
            let key = &after_open[..close];
            let consumed = start + MARKER_OPEN.len() + close + MARKER_CLOSE.len();

            match self.lookup(key) {
                Some(expr) => {
                    push_literal(&mut parts, &rest[..start]);
                    parts.push(expr.clone());
                }
                None => push_literal(&mut parts, &rest[..consumed]),
            }
            rest = &rest[consumed..];
        }
        push_literal(&mut parts, rest);

        match parts.len() {
            0 => Expr::literal(""),
            1 => parts.remove(0),
            _ => Expr::join(parts),
        }
    }

    /// Replaces known markers with a readable `<Name>` form, for files
    /// meant for people rather than the provisioning engine.
    pub fn describe(&self, text: &str) -> String {
        self.entries.iter().fold(text.to_string(), |acc, (key, _)| {
            let name = key.split('.').next().unwrap_or(key);
            acc.replace(&format!("{MARKER_OPEN}{key}{MARKER_CLOSE}"), &format!("<{name}>"))
        })
    }
}

fn push_literal(parts: &mut Vec<Expr>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Expr::Literal(previous)) = parts.last_mut() {
        previous.push_str(text);
    } else {
        parts.push(Expr::literal(text));
    }
}

fn sanitize(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_resolves_to_literal() {
        let registry = TokenRegistry::new();
        assert_eq!(registry.resolve("nginx:latest"), Expr::literal("nginx:latest"));
    }

    #[test]
    fn lone_marker_resolves_to_its_expression() {
        let mut registry = TokenRegistry::new();
        let marker = registry.encode("ClusterName", Expr::reference("Cluster"));
        assert_eq!(registry.resolve(&marker), Expr::reference("Cluster"));
    }

    #[test]
    fn embedded_marker_becomes_join() {
        let mut registry = TokenRegistry::new();
        let marker = registry.encode("RepositoryUri", Expr::reference("Repo"));
        let text = format!("{{\"image\":\"{marker}:latest\"}}");

        assert_eq!(
            registry.resolve(&text),
            Expr::join(vec![
                Expr::literal("{\"image\":\""),
                Expr::reference("Repo"),
                Expr::literal(":latest\"}"),
            ])
        );
    }

    #[test]
    fn describe_swaps_markers_for_names() {
        let mut registry = TokenRegistry::new();
        let marker = registry.encode("RepositoryUri", Expr::reference("Repo"));
        assert_eq!(
            registry.describe(&format!("image: {marker}:latest")),
            "image: <RepositoryUri>:latest"
        );
    }

    #[test]
    fn unknown_marker_is_merged_into_surrounding_literal() {
        let registry = TokenRegistry::new();
        let text = "a${Token[Missing.9]}b";
        assert_eq!(registry.resolve(text), Expr::literal(text));
    }
}
