//! Canonical predicate text
//!
//! Renders a simplified [`FilterNode`] tree as deterministic SQL-like text for
//! use inside cache keys. Two filters produce the same key only if they
//! simplify to the same text; logical equivalence is not detected.
//!
//! # Simplification
//!
//! ```text
//! (a AND (b AND c))        → (a AND b AND c)     flatten same operator
//! NOT (AND(x))             → NOT x               unwrap single child
//! (a OR a OR b)            → (a OR b)            drop duplicate siblings
//! ```
//!
//! # Rendering
//!
//! ```text
//! name = 'O''Brien'            -- text literal, quotes doubled
//! "order date" >= 20240101     -- non-identifier field names are quoted
//! (a = 1 OR b IS NULL)         -- composites parenthesized
//! NOT (c IN (1, 2))            -- negation prefix
//! ```

use super::node::{Condition, FilterNode, Literal, Operator};

/// Canonical WHERE text, or `None` when there is no effective predicate
pub fn canonical_where(filter: Option<&FilterNode>) -> Option<String> {
    let simplified = simplify(filter?);
    if simplified.condition.is_none() && simplified.children.is_empty() {
        return None;
    }
    Some(render(&simplified))
}

/// Boolean simplification used before rendering
pub fn simplify(node: &FilterNode) -> FilterNode {
    if node.is_leaf() {
        return node.clone();
    }

    let operator = match node.operator {
        Operator::None => Operator::And,
        op => op,
    };

    let mut children: Vec<FilterNode> = Vec::with_capacity(node.children.len());
    for child in &node.children {
        let child = simplify(child);
        if !child.negated && !child.is_leaf() && child.operator == operator {
            for grandchild in child.children {
                push_unique(&mut children, grandchild);
            }
        } else {
            push_unique(&mut children, child);
        }
    }

    if children.len() == 1 {
        let mut only = children.remove(0);
        only.negated ^= node.negated;
        return only;
    }

    FilterNode {
        operator,
        negated: node.negated,
        children,
        condition: None,
    }
}

fn push_unique(children: &mut Vec<FilterNode>, node: FilterNode) {
    if !children.contains(&node) {
        children.push(node);
    }
}

/// Render a (simplified) tree as text
pub fn render(node: &FilterNode) -> String {
    let body = match &node.condition {
        Some(condition) => render_condition(condition),
        None => {
            let joiner = match node.operator {
                Operator::Or => " OR ",
                Operator::And | Operator::None => " AND ",
            };
            let parts: Vec<String> = node.children.iter().map(render).collect();
            format!("({})", parts.join(joiner))
        }
    };

    if !node.negated {
        body
    } else if body.starts_with('(') {
        format!("NOT {}", body)
    } else {
        format!("NOT ({})", body)
    }
}

fn render_condition(condition: &Condition) -> String {
    let field = render_field(&condition.field);
    if condition.comparator.is_unary() {
        format!("{} {}", field, condition.comparator.as_sql())
    } else {
        format!(
            "{} {} {}",
            field,
            condition.comparator.as_sql(),
            render_literal(&condition.value)
        )
    }
}

fn render_field(field: &str) -> String {
    let mut chars = field.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        field.to_string()
    } else {
        format!("\"{}\"", field.replace('"', "\"\""))
    }
}

fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Literal::Integer(n) => n.to_string(),
        Literal::Number(n) => n.to_string(),
        Literal::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Literal::List(items) => {
            let parts: Vec<String> = items.iter().map(render_literal).collect();
            format!("({})", parts.join(", "))
        }
    }
}
