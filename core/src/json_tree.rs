//! Visitor over generic JSON trees.

use serde_json::{Map, Value};

/// Keys carrying producer documentation end with this suffix.
pub const DOC_SUFFIX: &str = ".doc";

pub trait JsonVisitor {
    fn visit_map(&mut self, map: &mut Map<String, Value>) {
        for v in map.values_mut() {
            walk(self, v);
        }
    }

    fn visit_seq(&mut self, seq: &mut Vec<Value>) {
        for v in seq.iter_mut() {
            walk(self, v);
        }
    }

    fn visit_scalar(&mut self, _node: &mut Value) {}
}

pub fn walk<V: JsonVisitor + ?Sized>(visitor: &mut V, node: &mut Value) {
    match node {
        Value::Object(map) => visitor.visit_map(map),
        Value::Array(seq) => visitor.visit_seq(seq),
        _ => visitor.visit_scalar(node),
    }
}

/// Removes every `*.doc` key, at any depth.
#[derive(Debug, Default)]
pub struct DocStripper {
    pub removed: usize,
}

impl JsonVisitor for DocStripper {
    fn visit_map(&mut self, map: &mut Map<String, Value>) {
        let before = map.len();
        map.retain(|k, _| !k.ends_with(DOC_SUFFIX));
        self.removed += before - map.len();
        for v in map.values_mut() {
            walk(self, v);
        }
    }
}

pub fn strip_doc_entries(node: &mut Value) -> usize {
    let mut stripper = DocStripper::default();
    walk(&mut stripper, node);
    stripper.removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nested_doc_keys() {
        let mut v = json!({
            "ab.doc": "top-level doc",
            "ab": {
                "abs_insns": [
                    {"features.doc": "x", "features": {"mnemonic": "add", "mnemonic.doc": "y"}},
                    [{"deep.doc": 1, "keep": 2}]
                ]
            },
            "doc": "not a suffix match"
        });
        assert_eq!(strip_doc_entries(&mut v), 4);
        assert_eq!(
            v,
            json!({
                "ab": {"abs_insns": [{"features": {"mnemonic": "add"}}, [{"keep": 2}]]},
                "doc": "not a suffix match"
            })
        );
    }

    #[test]
    fn scalars_are_left_alone() {
        let mut v = json!("x.doc");
        assert_eq!(strip_doc_entries(&mut v), 0);
        assert_eq!(v, json!("x.doc"));
    }
}
