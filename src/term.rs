//! Rendering of Prolog terms in the Pengines `json` answer format.
//!
//! Atoms and strings arrive as JSON strings, numbers as numbers, lists as
//! arrays and compounds as `{"functor": F, "args": [...]}`.

use serde_json::Value;

const INFIX: &[&str] = &[
    ",", "-", "+", "*", "/", "=", ":", "-->", ":-", "->", ";", "|", "==", "\\=", "=..", "is",
    "<", ">", "=<", ">=",
];

pub fn render(term: &Value) -> String {
    let mut out = String::new();
    write_term(&mut out, term);
    out
}

fn write_term(out: &mut String, term: &Value) {
    match term {
        Value::Null => out.push('_'),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            write_args(out, items);
            out.push(']');
        }
        Value::Object(map) => {
            let functor = map.get("functor").and_then(Value::as_str);
            let args = map.get("args").and_then(Value::as_array);
            match (functor, args) {
                (Some(f), Some(args)) if args.len() == 2 && INFIX.contains(&f) => {
                    write_term(out, &args[0]);
                    if f.chars().all(|c| c.is_alphabetic()) {
                        out.push(' ');
                        out.push_str(f);
                        out.push(' ');
                    } else {
                        out.push_str(f);
                    }
                    write_term(out, &args[1]);
                }
                (Some(f), Some(args)) => {
                    out.push_str(f);
                    out.push('(');
                    write_args(out, args);
                    out.push(')');
                }
                // Dicts and anything else fall back to compact JSON.
                _ => out.push_str(&term.to_string()),
            }
        }
    }
}

fn write_args(out: &mut String, items: &[Value]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_term(out, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_atomic_terms() {
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!(1.5)), "1.5");
        assert_eq!(render(&json!("foo")), "foo");
        assert_eq!(render(&json!(null)), "_");
    }

    #[test]
    fn renders_lists_and_compounds() {
        assert_eq!(render(&json!([1, 2, 3])), "[1,2,3]");
        assert_eq!(
            render(&json!({"functor": "point", "args": [1, {"functor": "f", "args": ["a"]}]})),
            "point(1,f(a))"
        );
    }

    #[test]
    fn renders_binary_operators_infix() {
        assert_eq!(render(&json!({"functor": "-", "args": ["a", 1]})), "a-1");
        assert_eq!(render(&json!({"functor": "is", "args": ["X", 3]})), "X is 3");
    }

    #[test]
    fn unknown_objects_fall_back_to_json() {
        assert_eq!(render(&json!({"tag": "point"})), r#"{"tag":"point"}"#);
    }
}
