//! Discovery remarks: plain strings or `[template, args...]` sequences.

use crate::DomainError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum Remark {
    Plain(String),
    Templated { template: String, args: Vec<Value> },
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([0-9]*)(?::([^{}]*))?\}").expect("static pattern"))
}

impl Remark {
    pub fn from_json(v: &Value) -> Result<Self, DomainError> {
        match v {
            Value::String(s) => Ok(Remark::Plain(s.clone())),
            Value::Array(items) if items.len() >= 2 => match &items[0] {
                Value::String(t) => Ok(Remark::Templated { template: t.clone(), args: items[1..].to_vec() }),
                other => Err(DomainError::MalformedRemark(format!("template must be a string, got {other}"))),
            },
            other => Err(DomainError::MalformedRemark(other.to_string())),
        }
    }

    pub fn render(&self) -> Result<String, DomainError> {
        match self {
            Remark::Plain(s) => Ok(s.clone()),
            Remark::Templated { template, args } => format_template(template, args),
        }
    }
}

fn format_arg(arg: &Value, spec: Option<&str>) -> String {
    let precision = spec
        .and_then(|s| s.strip_prefix('.'))
        .and_then(|s| s.strip_suffix('f'))
        .and_then(|s| s.parse::<usize>().ok());
    match (arg, precision) {
        (Value::Number(n), Some(p)) => n.as_f64().map(|x| format!("{x:.p$}")).unwrap_or_else(|| n.to_string()),
        (Value::String(s), _) => s.clone(),
        (other, _) => other.to_string(),
    }
}

/// `{}` takes the next argument, `{n}` argument `n`; `{{` and `}}` are escapes.
pub fn format_template(template: &str, args: &[Value]) -> Result<String, DomainError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next_auto = 0;
    for caps in placeholder_re().captures_iter(template) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&template[last..m.start()]);
        last = m.end();
        match m.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            _ => {
                let idx = match caps.get(1).map(|g| g.as_str()).filter(|s| !s.is_empty()) {
                    Some(n) => n.parse::<usize>().map_err(|e| DomainError::MalformedRemark(e.to_string()))?,
                    None => {
                        next_auto += 1;
                        next_auto - 1
                    }
                };
                let arg = args
                    .get(idx)
                    .ok_or_else(|| DomainError::MalformedRemark(format!("'{template}' needs argument {idx}, got {}", args.len())))?;
                out.push_str(&format_arg(arg, caps.get(2).map(|g| g.as_str())));
            }
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Render the optional `remarks` list of a discovery into stored text, one `<li>` line per remark.
pub fn render_remarks(remarks: Option<&Value>) -> Result<Option<String>, DomainError> {
    let items = match remarks {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(DomainError::MalformedRemark(format!("remarks must be a list, got {other}"))),
    };
    let lines = items
        .iter()
        .map(|r| Remark::from_json(r)?.render().map(|s| format!("<li>{s}</li>")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_and_templated() {
        let text = render_remarks(Some(&json!(["plain", ["{} of {}", 3, "x"], ["{1}-{0}", "a", "b"]]))).unwrap();
        assert_eq!(text.as_deref(), Some("<li>plain</li>\n<li>3 of x</li>\n<li>b-a</li>"));
    }

    #[test]
    fn absent_remarks_render_to_none() {
        assert_eq!(render_remarks(None).unwrap(), None);
        assert_eq!(render_remarks(Some(&Value::Null)).unwrap(), None);
        assert_eq!(render_remarks(Some(&json!([]))).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn precision_and_escapes() {
        assert_eq!(format_template("{{x}} = {:.2f}", &[json!(1.23456)]).unwrap(), "{x} = 1.23");
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(matches!(render_remarks(Some(&json!([42]))), Err(DomainError::MalformedRemark(_))));
        assert!(matches!(render_remarks(Some(&json!([["lonely"]]))), Err(DomainError::MalformedRemark(_))));
        assert!(matches!(render_remarks(Some(&json!([[1, 2]]))), Err(DomainError::MalformedRemark(_))));
        assert!(matches!(render_remarks(Some(&json!([["{} {}", 1]]))), Err(DomainError::MalformedRemark(_))));
    }
}
