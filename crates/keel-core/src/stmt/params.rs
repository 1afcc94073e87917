use super::{Record, Value};
use crate::{
    driver::{PlaceholderStyle, QuoteStyle},
    Error, Result,
};

use indexmap::IndexMap;
use std::{collections::HashMap, fmt::Write};

/// Accumulates named parameters for one statement.
///
/// Emitters write `:name` tokens into the SQL text as they bind values (and
/// `:...name` for lists). [`Params::export`] then rewrites the tokens into
/// the dialect's placeholders and produces the bound values in the order the
/// placeholders appear in the final text.
#[derive(Debug, Default, Clone)]
pub struct Params {
    values: IndexMap<String, Value>,
}

/// SQL text plus its bound parameters, ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Sql {
    pub text: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name. Positional dialects ignore it.
    pub name: String,
    pub value: Value,
}

impl Params {
    pub fn new() -> Params {
        Params::default()
    }

    /// A registry seeded with caller-bound parameters.
    pub fn with_parameters(parameters: &Record) -> Params {
        Params {
            values: parameters
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    /// Registers `value` under a name derived from `name` and returns the
    /// name actually used. A name already taken is suffixed `_1`, `_2`, ...
    pub fn bind(&mut self, name: &str, value: Value) -> String {
        let base = sanitize(name);
        let mut candidate = base.clone();
        let mut suffix = 0;

        while self.values.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }

        self.values.insert(candidate.clone(), value);
        candidate
    }

    /// Binds `value` and returns the `:name` token to write into SQL text.
    pub fn placeholder(&mut self, name: &str, value: Value) -> String {
        format!(":{}", self.bind(name, value))
    }

    /// Binds a list and returns the `:...name` token that expands to one
    /// placeholder per element.
    pub fn list_placeholder(&mut self, name: &str, values: Vec<Value>) -> String {
        format!(":...{}", self.bind(name, Value::List(values)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rewrites `:name` tokens in `sql` into `style` placeholders.
    ///
    /// Tokens inside string literals and identifiers quoted per `quote` are
    /// left alone, as are `::` casts. Positional styles number placeholders by first
    /// appearance in the text, so the exported values line up with the
    /// placeholders regardless of the order they were bound in.
    pub fn export(&self, sql: &str, style: PlaceholderStyle, quote: QuoteStyle) -> Result<Sql> {
        let mut out = Exporter {
            style,
            text: String::with_capacity(sql.len()),
            params: vec![],
            indices: HashMap::new(),
        };

        let chars: Vec<char> = sql.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if let Some(end) = quote.quoted_end(&chars, i) {
                out.text.extend(&chars[i..end]);
                i = end;
                continue;
            }

            let c = chars[i];

            match c {
                ':' if chars.get(i + 1) == Some(&':') => {
                    out.text.push_str("::");
                    i += 2;
                }
                ':' => {
                    let spread = chars[i + 1..].starts_with(&['.', '.', '.']);
                    let start = if spread { i + 4 } else { i + 1 };
                    let end = scan_ident(&chars, start);

                    if end == start {
                        out.text.push(c);
                        i += 1;
                        continue;
                    }

                    let name: String = chars[start..end].iter().collect();
                    let value = self
                        .values
                        .get(&name)
                        .ok_or_else(|| Error::parameter_missing(&name))?;

                    match value {
                        Value::List(items) if spread => out.push_list(&name, items),
                        value => out.push(&name, value),
                    }

                    i = end;
                }
                c => {
                    out.text.push(c);
                    i += 1;
                }
            }
        }

        Ok(Sql {
            text: out.text,
            params: out.params,
        })
    }
}

struct Exporter {
    style: PlaceholderStyle,
    text: String,
    params: Vec<Param>,

    /// Index of the placeholder already assigned to a name, for styles that
    /// can reference a parameter more than once.
    indices: HashMap<String, usize>,
}

impl Exporter {
    fn push(&mut self, name: &str, value: &Value) {
        self.push_keyed(name, name, value);
    }

    /// Pushes a placeholder. `key` identifies the value for reuse; `name` is
    /// the preferred parameter name, suffixed when already taken by another
    /// value.
    fn push_keyed(&mut self, key: &str, name: &str, value: &Value) {
        if self.style == PlaceholderStyle::Question {
            self.params.push(Param {
                name: name.to_string(),
                value: value.clone(),
            });
            self.text.push('?');
            return;
        }

        let index = match self.indices.get(key) {
            Some(index) => *index,
            None => {
                let name = self.unique_name(name);
                self.params.push(Param {
                    name,
                    value: value.clone(),
                });
                let index = self.params.len() - 1;
                self.indices.insert(key.to_string(), index);
                index
            }
        };

        let _ = match self.style {
            PlaceholderStyle::Dollar => write!(self.text, "${}", index + 1),
            PlaceholderStyle::At => write!(self.text, "@{index}"),
            _ => write!(self.text, ":{}", self.params[index].name),
        };
    }

    fn push_list(&mut self, name: &str, items: &[Value]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.text.push_str(", ");
            }
            self.push_keyed(&format!("{name}[{i}]"), &format!("{name}_{i}"), item);
        }
    }

    fn unique_name(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 0;

        while self.params.iter().any(|param| param.name == candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }

        candidate
    }
}

fn scan_ident(chars: &[char], start: usize) -> usize {
    let mut end = start;

    if chars.get(start).is_some_and(|c| c.is_ascii_digit()) {
        return start;
    }

    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
        end += 1;
    }

    end
}

/// Parameter names are restricted to identifier characters.
fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'p');
    }

    out
}

impl Sql {
    /// The bound values in placeholder order.
    pub fn values(&self) -> Vec<&Value> {
        self.params.iter().map(|param| &param.value).collect()
    }
}
