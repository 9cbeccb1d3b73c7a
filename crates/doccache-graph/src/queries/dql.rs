//! DQL request trees and their text rendering.
//!
//! Requests are built as plain data and only turned into DQL text at the
//! store boundary. Rendering is pure, so query shapes can be asserted
//! without a running Dgraph.

use std::collections::BTreeMap;
use std::fmt::Write;

/// Predicate carrying the graph type of a node.
pub const TYPE_PREDICATE: &str = "dgraph.type";

/// One entry in a projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A scalar predicate, `uid` or `dgraph.type`.
    Predicate(String),
    /// `expand(_all_)`: every scalar predicate of the node's type.
    ExpandAll,
    /// A nested projection over a uid predicate.
    Edge(Edge),
}

/// A nested projection over a uid predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub predicate: String,
    pub order_asc: Option<String>,
    pub selection: Selection,
}

impl Edge {
    pub fn new(predicate: impl Into<String>, selection: Selection) -> Self {
        Self {
            predicate: predicate.into(),
            order_asc: None,
            selection,
        }
    }

    /// Order the expanded nodes ascending by `predicate`.
    pub fn order_asc(mut self, predicate: impl Into<String>) -> Self {
        self.order_asc = Some(predicate.into());
        self
    }
}

/// An ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub fields: Vec<Field>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicate(mut self, name: impl Into<String>) -> Self {
        self.fields.push(Field::Predicate(name.into()));
        self
    }

    pub fn predicates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .extend(names.into_iter().map(|n| Field::Predicate(n.into())));
        self
    }

    pub fn expand_all(mut self) -> Self {
        self.fields.push(Field::ExpandAll);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.fields.push(Field::Edge(edge));
        self
    }

    /// The nested projection for `predicate`, if selected.
    pub fn find_edge(&self, predicate: &str) -> Option<&Edge> {
        self.fields.iter().find_map(|f| match f {
            Field::Edge(e) if e.predicate == predicate => Some(e),
            _ => None,
        })
    }
}

/// Root function selecting the starting nodes of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum RootFunc {
    /// `eq(predicate, $var)` with the value bound as a string variable.
    Eq { predicate: String, var: String },
    /// `eq(predicate, [..])` over a literal list of JSON-escaped strings.
    EqAny { predicate: String, values: Vec<String> },
}

/// A named query block.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlock {
    pub name: String,
    pub func: RootFunc,
    pub selection: Selection,
}

/// A read request against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// A query block plus bound variables, keyed without the `$` sigil.
    Block {
        block: QueryBlock,
        variables: BTreeMap<String, String>,
    },
    /// Schema introspection for the named types.
    Schema { types: Vec<String> },
}

/// DQL text plus its variables, keyed with the `$` sigil as Dgraph expects.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub text: String,
    pub variables: BTreeMap<String, String>,
}

impl Request {
    /// Render to DQL.
    pub fn render(&self) -> RenderedQuery {
        match self {
            Request::Block { block, variables } => render_block(block, variables),
            Request::Schema { types } => RenderedQuery {
                text: format!("schema(type: [{}]) {{}}", types.join(", ")),
                variables: BTreeMap::new(),
            },
        }
    }
}

fn render_block(block: &QueryBlock, variables: &BTreeMap<String, String>) -> RenderedQuery {
    let mut text = String::new();

    if variables.is_empty() {
        text.push_str("{\n");
    } else {
        let decls: Vec<String> = variables
            .keys()
            .map(|name| format!("${}: string", name))
            .collect();
        let _ = writeln!(text, "query {}({}) {{", block.name, decls.join(", "));
    }

    let func = match &block.func {
        RootFunc::Eq { predicate, var } => format!("eq({}, ${})", predicate, var),
        RootFunc::EqAny { predicate, values } => {
            let quoted: Vec<String> = values
                .iter()
                .map(|v| serde_json::Value::String(v.clone()).to_string())
                .collect();
            format!("eq({}, [{}])", predicate, quoted.join(", "))
        }
    };

    let _ = writeln!(text, "  {}(func: {}) {{", block.name, func);
    render_selection(&block.selection, 2, &mut text);
    text.push_str("  }\n}\n");

    RenderedQuery {
        text,
        variables: variables
            .iter()
            .map(|(k, v)| (format!("${}", k), v.clone()))
            .collect(),
    }
}

fn render_selection(selection: &Selection, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for field in &selection.fields {
        match field {
            Field::Predicate(name) => {
                let _ = writeln!(out, "{}{}", indent, name);
            }
            Field::ExpandAll => {
                let _ = writeln!(out, "{}expand(_all_)", indent);
            }
            Field::Edge(edge) => {
                match &edge.order_asc {
                    Some(order) => {
                        let _ = writeln!(out, "{}{} (orderasc: {}) {{", indent, edge.predicate, order);
                    }
                    None => {
                        let _ = writeln!(out, "{}{} {{", indent, edge.predicate);
                    }
                }
                render_selection(&edge.selection, depth + 1, out);
                let _ = writeln!(out, "{}}}", indent);
            }
        }
    }
}

/// Whether `name` can be used as a relationship predicate.
///
/// Names end up in schema and query text, so only a conservative character
/// set is accepted and the reserved `dgraph.` namespace is refused.
pub fn is_valid_predicate(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("dgraph.")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '~' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bound_variable() {
        let request = Request::Block {
            block: QueryBlock {
                name: "docs".to_string(),
                func: RootFunc::Eq {
                    predicate: "hash".to_string(),
                    var: "hash".to_string(),
                },
                selection: Selection::new().predicates(["uid", "hash"]),
            },
            variables: BTreeMap::from([("hash".to_string(), "abc".to_string())]),
        };

        let rendered = request.render();
        assert_eq!(
            rendered.text,
            "query docs($hash: string) {\n  docs(func: eq(hash, $hash)) {\n    uid\n    hash\n  }\n}\n"
        );
        assert_eq!(rendered.variables.get("$hash"), Some(&"abc".to_string()));
    }

    #[test]
    fn test_render_nested_edge_with_order() {
        let request = Request::Block {
            block: QueryBlock {
                name: "docs".to_string(),
                func: RootFunc::EqAny {
                    predicate: "hash".to_string(),
                    values: vec!["a".to_string()],
                },
                selection: Selection::new().edge(
                    Edge::new("certificates", Selection::new().predicate("uid").expand_all())
                        .order_asc("certification_sequence"),
                ),
            },
            variables: BTreeMap::new(),
        };

        let text = request.render().text;
        assert!(text.starts_with("{\n  docs(func: eq(hash, [\"a\"])) {\n"));
        assert!(text.contains("    certificates (orderasc: certification_sequence) {\n      uid\n      expand(_all_)\n    }\n"));
    }

    #[test]
    fn test_literal_list_escapes_quotes() {
        let request = Request::Block {
            block: QueryBlock {
                name: "docs".to_string(),
                func: RootFunc::EqAny {
                    predicate: "hash".to_string(),
                    values: vec!["x\"]) { evil }".to_string()],
                },
                selection: Selection::new().predicate("uid"),
            },
            variables: BTreeMap::new(),
        };

        let text = request.render().text;
        assert!(text.contains(r#"eq(hash, ["x\"]) { evil }"])"#));
    }

    #[test]
    fn test_render_schema_request() {
        let request = Request::Schema {
            types: vec!["Document".to_string(), "Content".to_string()],
        };
        assert_eq!(request.render().text, "schema(type: [Document, Content]) {}");
    }

    #[test]
    fn test_predicate_names() {
        assert!(is_valid_predicate("runs"));
        assert!(is_valid_predicate("assigned.to_role-2"));
        assert!(!is_valid_predicate(""));
        assert!(!is_valid_predicate("dgraph.type"));
        assert!(!is_valid_predicate("runs: string ."));
        assert!(!is_valid_predicate("a{b}"));
    }
}
