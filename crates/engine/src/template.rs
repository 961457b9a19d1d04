//! Prompt template engine.
//!
//! A small handlebars-style language, parsed once into an AST and rendered
//! against a JSON data map:
//!
//! ```text
//! {{name}}                         substitution (dotted paths allowed)
//! {{#if name}} … {{else}} … {{/if}}
//! {{#unless name}} … {{/unless}}
//! {{#each list}} {{this}} {{@index}} {{field}} {{/each}}
//! {{! comment }}
//! ```
//!
//! Truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are false.
//! Rendering is deterministic; no escaping is applied.

use lorekeeper_core::capability::TemplateRenderer;
use lorekeeper_core::error::TemplateError;
use serde_json::Value;
use std::collections::HashMap;

/// Section order used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = concat!(
    "{{#if jailbreak}}{{jailbreak}}{{separator}}{{/if}}",
    "{{#if system_prompt}}{{system_prompt}}{{separator}}{{/if}}",
    "{{#if wi_before_char}}{{wi_before_char}}{{separator}}{{/if}}",
    "{{#if description}}{{description}}{{separator}}{{/if}}",
    "{{#if personality}}{{char}}'s personality: {{personality}}{{separator}}{{/if}}",
    "{{#if scenario}}Scenario: {{scenario}}{{separator}}{{/if}}",
    "{{#if wi_after_char}}{{wi_after_char}}{{separator}}{{/if}}",
    "{{#if wi_before_examples}}{{wi_before_examples}}{{separator}}{{/if}}",
    "{{#if examples}}{{examples}}{{separator}}{{/if}}",
    "{{#if wi_after_examples}}{{wi_after_examples}}{{separator}}{{/if}}",
    "{{#if chat_start}}{{chat_start}}{{separator}}{{/if}}",
    "{{#if history}}{{history}}{{separator}}{{/if}}",
    "{{#if wi_after_history}}{{wi_after_history}}{{separator}}{{/if}}",
    "{{#if wi_authors_note}}{{wi_authors_note}}{{separator}}{{/if}}",
    "{{#if authors_note}}[Author's note: {{authors_note}}]{{separator}}{{/if}}",
    "{{#if post_history_instructions}}{{post_history_instructions}}{{/if}}",
);

/// Single-block layout listing world info as bullets.
pub const COMPACT_TEMPLATE: &str = concat!(
    "{{#if system_prompt}}{{system_prompt}}\n{{/if}}",
    "{{char}}: {{description}}\n",
    "{{#if has_world_info}}World info:\n{{#each world_info}}- {{this}}\n{{/each}}{{/if}}",
    "{{#if history}}{{history}}\n{{/if}}",
    "{{#if post_history_instructions}}{{post_history_instructions}}{{/if}}",
);

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    If {
        path: String,
        negate: bool,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Each {
        path: String,
        body: Vec<Node>,
    },
}

/// How a nested block ended.
#[derive(Debug, PartialEq)]
enum Terminator {
    Eof,
    Else,
    Close(String),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(src: &'a str) -> Result<Vec<Node>, TemplateError> {
        let mut parser = Parser { src, pos: 0 };
        let (nodes, end) = parser.parse_nodes()?;
        match end {
            Terminator::Eof => Ok(nodes),
            Terminator::Else => Err(parser.error("{{else}} outside of a block")),
            Terminator::Close(name) => Err(parser.error(&format!("unexpected {{{{/{name}}}}}"))),
        }
    }

    fn error(&self, reason: &str) -> TemplateError {
        TemplateError::Parse {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.src[self.pos..];
            let Some(open) = rest.find("{{") else {
                if !rest.is_empty() {
                    nodes.push(Node::Text(rest.to_string()));
                }
                self.pos = self.src.len();
                return Ok((nodes, Terminator::Eof));
            };
            if open > 0 {
                nodes.push(Node::Text(rest[..open].to_string()));
            }
            let tag_start = self.pos + open;
            let Some(close) = self.src[tag_start + 2..].find("}}") else {
                self.pos = tag_start;
                return Err(self.error("unterminated tag"));
            };
            let tag = self.src[tag_start + 2..tag_start + 2 + close].trim();
            self.pos = tag_start + 2 + close + 2;

            if tag.starts_with('!') {
                continue;
            }
            if tag == "else" {
                return Ok((nodes, Terminator::Else));
            }
            if let Some(name) = tag.strip_prefix('/') {
                return Ok((nodes, Terminator::Close(name.trim().to_string())));
            }
            if let Some(block) = tag.strip_prefix('#') {
                let (keyword, arg) = block.split_once(char::is_whitespace).unwrap_or((block, ""));
                let arg = arg.trim();
                if arg.is_empty() {
                    self.pos = tag_start;
                    return Err(self.error(&format!("{{{{#{keyword}}}}} needs an argument")));
                }
                nodes.push(self.parse_block(keyword, arg, tag_start)?);
                continue;
            }
            if tag.is_empty() {
                self.pos = tag_start;
                return Err(self.error("empty tag"));
            }
            nodes.push(Node::Var(tag.to_string()));
        }
    }

    fn parse_block(&mut self, keyword: &str, arg: &str, start: usize) -> Result<Node, TemplateError> {
        let (body, end) = self.parse_nodes()?;
        let (otherwise, end) = match end {
            Terminator::Else if keyword != "each" => self.parse_nodes()?,
            other => (Vec::new(), other),
        };
        match end {
            Terminator::Close(name) if name == keyword => {}
            Terminator::Close(name) => {
                return Err(self.error(&format!(
                    "{{{{#{keyword}}}}} closed by {{{{/{name}}}}}"
                )));
            }
            Terminator::Else => return Err(self.error("{{else}} is not allowed here")),
            Terminator::Eof => {
                self.pos = start;
                return Err(self.error(&format!("unclosed {{{{#{keyword}}}}}")));
            }
        }

        match keyword {
            "if" | "unless" => Ok(Node::If {
                path: arg.to_string(),
                negate: keyword == "unless",
                then: body,
                otherwise,
            }),
            "each" => Ok(Node::Each {
                path: arg.to_string(),
                body,
            }),
            other => {
                self.pos = start;
                Err(self.error(&format!("unknown block helper #{other}")))
            }
        }
    }
}

/// One level of `{{#each}}` nesting.
struct Scope<'v> {
    value: &'v Value,
    index: Option<usize>,
}

fn lookup<'v>(scopes: &[Scope<'v>], path: &str) -> Option<&'v Value> {
    let top = scopes.last()?;
    match path {
        "this" | "." => return Some(top.value),
        "@index" => return None,
        _ => {}
    }
    let path = path.strip_prefix("this.").unwrap_or(path);
    scopes.iter().rev().find_map(|scope| {
        path.split('.')
            .try_fold(scope.value, |value, key| value.get(key))
    })
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write_value(out, item);
            }
        }
        Value::Object(_) => out.push_str(&value.to_string()),
    }
}

fn render_nodes<'v>(nodes: &[Node], scopes: &mut Vec<Scope<'v>>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(path) if path == "@index" => {
                if let Some(index) = scopes.iter().rev().find_map(|s| s.index) {
                    out.push_str(&index.to_string());
                }
            }
            Node::Var(path) => {
                if let Some(value) = lookup(scopes, path) {
                    write_value(out, value);
                }
            }
            Node::If {
                path,
                negate,
                then,
                otherwise,
            } => {
                let truthy = is_truthy(lookup(scopes, path)) != *negate;
                render_nodes(if truthy { then } else { otherwise }, scopes, out);
            }
            Node::Each { path, body } => {
                let Some(Value::Array(items)) = lookup(scopes, path) else {
                    continue;
                };
                for (index, item) in items.iter().enumerate() {
                    scopes.push(Scope {
                        value: item,
                        index: Some(index),
                    });
                    render_nodes(body, scopes, out);
                    scopes.pop();
                }
            }
        }
    }
}

/// Registry of parsed templates.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: HashMap<String, Vec<Node>>,
}

impl TemplateEngine {
    /// An engine with the builtin `default` and `compact` templates.
    pub fn new() -> Self {
        let mut engine = Self {
            templates: HashMap::new(),
        };
        for (name, src) in [("default", DEFAULT_TEMPLATE), ("compact", COMPACT_TEMPLATE)] {
            if let Ok(nodes) = Parser::parse(src) {
                engine.templates.insert(name.to_string(), nodes);
            }
        }
        engine
    }

    /// Builtins plus every template in `extra` (which may override builtins).
    pub fn with_templates(extra: &HashMap<String, String>) -> Result<Self, TemplateError> {
        let mut engine = Self::new();
        for (name, src) in extra {
            engine.register(name, src)?;
        }
        Ok(engine)
    }

    /// Parse and register a template under `name`.
    pub fn register(&mut self, name: &str, src: &str) -> Result<(), TemplateError> {
        let nodes = Parser::parse(src)?;
        self.templates.insert(name.to_string(), nodes);
        Ok(())
    }

    /// Render template source directly, without registering it.
    pub fn render_source(src: &str, data: &Value) -> Result<String, TemplateError> {
        let nodes = Parser::parse(src)?;
        Ok(Self::render_nodes(&nodes, data))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn render_nodes(nodes: &[Node], data: &Value) -> String {
        let mut out = String::new();
        let mut scopes = vec![Scope {
            value: data,
            index: None,
        }];
        render_nodes(nodes, &mut scopes, &mut out);
        out
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, template: &str, data: &Value) -> Result<String, TemplateError> {
        let nodes = self
            .templates
            .get(template)
            .ok_or_else(|| TemplateError::UnknownTemplate(template.to_string()))?;
        Ok(Self::render_nodes(nodes, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(src: &str, data: Value) -> String {
        TemplateEngine::render_source(src, &data).unwrap()
    }

    #[test]
    fn builtins_parse() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.names(), vec!["compact", "default"]);
    }

    #[test]
    fn substitutes_variables_and_paths() {
        let out = render(
            "{{char}} greets {{user}} at {{place.name}}.",
            json!({"char": "Mara", "user": "Tom", "place": {"name": "the inn"}}),
        );
        assert_eq!(out, "Mara greets Tom at the inn.");
    }

    #[test]
    fn missing_variables_render_empty() {
        assert_eq!(render("[{{nothing}}]", json!({})), "[]");
    }

    #[test]
    fn if_else_branches() {
        let src = "{{#if lore}}has lore{{else}}no lore{{/if}}";
        assert_eq!(render(src, json!({"lore": "x"})), "has lore");
        assert_eq!(render(src, json!({"lore": ""})), "no lore");
        assert_eq!(render(src, json!({})), "no lore");
    }

    #[test]
    fn unless_negates() {
        let src = "{{#unless quiet}}loud{{/unless}}";
        assert_eq!(render(src, json!({"quiet": false})), "loud");
        assert_eq!(render(src, json!({"quiet": true})), "");
    }

    #[test]
    fn each_iterates_with_index_and_fields() {
        let src = "{{#each pairs}}{{@index}}:{{user}}/{{assistant}};{{/each}}";
        let out = render(
            src,
            json!({"pairs": [{"user": "hi", "assistant": "hello"}, {"user": "bye", "assistant": "farewell"}]}),
        );
        assert_eq!(out, "0:hi/hello;1:bye/farewell;");
    }

    #[test]
    fn each_falls_back_to_outer_scope() {
        let src = "{{#each items}}{{this}}-{{sep}}{{/each}}";
        assert_eq!(render(src, json!({"items": ["a", "b"], "sep": "|"})), "a-|b-|");
    }

    #[test]
    fn nested_blocks() {
        let src = "{{#if show}}{{#each xs}}{{#if this}}[{{this}}]{{/if}}{{/each}}{{/if}}";
        assert_eq!(render(src, json!({"show": true, "xs": ["a", "", "c"]})), "[a][c]");
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(render("a{{! note }}b", json!({})), "ab");
    }

    #[test]
    fn unclosed_block_is_error() {
        let err = TemplateEngine::render_source("{{#if x}}open", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn mismatched_close_is_error() {
        assert!(TemplateEngine::render_source("{{#if x}}a{{/each}}", &json!({})).is_err());
    }

    #[test]
    fn stray_else_is_error() {
        assert!(TemplateEngine::render_source("a{{else}}b", &json!({})).is_err());
    }

    #[test]
    fn unknown_template_is_error() {
        let err = TemplateEngine::new().render("nope", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTemplate(_)));
    }

    #[test]
    fn registered_template_overrides_builtin() {
        let mut extra = HashMap::new();
        extra.insert("default".to_string(), "only {{description}}".to_string());
        let engine = TemplateEngine::with_templates(&extra).unwrap();
        let out = engine.render("default", &json!({"description": "d"})).unwrap();
        assert_eq!(out, "only d");
    }

    #[test]
    fn default_template_orders_sections() {
        let engine = TemplateEngine::new();
        let data = json!({
            "separator": "\n",
            "jailbreak": "JB",
            "system_prompt": "SYS",
            "wi_before_char": "WI1",
            "description": "DESC",
            "chat_start": "START",
            "history": "HIST",
            "wi_after_history": "WI2",
            "authors_note": "AN",
            "post_history_instructions": "PHI",
        });
        let out = engine.render("default", &data).unwrap();
        assert_eq!(
            out,
            "JB\nSYS\nWI1\nDESC\nSTART\nHIST\nWI2\n[Author's note: AN]\nPHI"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let engine = TemplateEngine::new();
        let data = json!({"description": "d", "history": "h", "separator": "\n\n"});
        assert_eq!(
            engine.render("default", &data).unwrap(),
            engine.render("default", &data).unwrap()
        );
    }
}
