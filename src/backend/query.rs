use serde::Serialize;
use serde_json::Value;

use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Case-insensitive SQL pattern, `%` and `_` wildcards.
    ILike(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    /// Array column holds every element of the given array.
    Contains(String, Value),
    /// Any of the nested filters matches.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::ILike(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c)
            | Filter::Contains(c, _) => vec![c.as_str()],
            Filter::Or(inner) => inner.iter().flat_map(|f| f.columns()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub limit: u64,
}

impl Range {
    /// Window for a one-based page number.
    pub fn page(page: u32, page_size: u32) -> Self {
        let page_size = page_size.max(1) as u64;
        Self {
            offset: page.saturating_sub(1) as u64 * page_size,
            limit: page_size,
        }
    }
}

/// A read against one table: filters, ordering, window and optional exact count.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub range: Option<Range>,
    pub count: bool,
    /// Only the count is wanted.
    pub head: bool,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
            count: false,
            head: false,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Eq(column.to_string(), to_value(value)))
    }

    pub fn neq(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Neq(column.to_string(), to_value(value)))
    }

    pub fn gt(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Gt(column.to_string(), to_value(value)))
    }

    pub fn gte(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Gte(column.to_string(), to_value(value)))
    }

    pub fn lt(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Lt(column.to_string(), to_value(value)))
    }

    pub fn lte(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Lte(column.to_string(), to_value(value)))
    }

    pub fn ilike(self, column: &str, pattern: impl Into<String>) -> Self {
        self.filter(Filter::ILike(column.to_string(), pattern.into()))
    }

    pub fn in_list<T: Serialize>(self, column: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter().map(to_value).collect();
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull(column.to_string()))
    }

    pub fn contains(self, column: &str, value: impl Serialize) -> Self {
        self.filter(Filter::Contains(column.to_string(), to_value(value)))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn limit(self, limit: u64) -> Self {
        self.range(Range { offset: 0, limit })
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn count_only(mut self) -> Self {
        self.count = true;
        self.head = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

/// Returned by every mutation, in the order the backend reports them.
pub type Written = Vec<Value>;

pub fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Accepts lowercase SQL identifiers only; everything interpolated into SQL goes through here.
pub fn check_ident(name: &str) -> Result<&str, BackendError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63;
    if valid {
        Ok(name)
    } else {
        Err(BackendError::validation(format!("invalid identifier: {:?}", name)))
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside an ILIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `%term%` with the term escaped.
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window() {
        assert_eq!(Range::page(1, 20), Range { offset: 0, limit: 20 });
        assert_eq!(Range::page(3, 10), Range { offset: 20, limit: 10 });
        assert_eq!(Range::page(0, 0), Range { offset: 0, limit: 1 });
    }

    #[test]
    fn identifiers() {
        assert!(check_ident("lodge_memberships").is_ok());
        assert!(check_ident("_x1").is_ok());
        assert!(check_ident("1abc").is_err());
        assert!(check_ident("name; drop table").is_err());
        assert!(check_ident("Name").is_err());
        assert!(check_ident("").is_err());
    }

    #[test]
    fn like_escaping() {
        assert_eq!(contains_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
