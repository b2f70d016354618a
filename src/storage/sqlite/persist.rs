//! Reflective row insertion.
//!
//! A record exposes its fields through [`Persistable`]; every field carrying a
//! non-empty column tag becomes one column and one bind parameter of the
//! generated `INSERT`, in declaration order. The [`persistable!`] macro derives
//! the trait from a field list.
//!
//! ```rust,ignore
//! struct Answer { id: i64, mark: String, text: String, scratch: i64 }
//!
//! nova::persistable!(Answer { mark: "answer_mark", text: "answer_text", scratch });
//! ```

use crate::{Error, Result};
use rusqlite::types::Value;

/// One field of a persistable record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Rust field name.
    pub name: &'static str,
    /// Column name; `None` or empty means the field is not persisted.
    pub tag: Option<&'static str>,
    /// Bind value.
    pub value: Value,
}

impl Field {
    /// The column this field maps to, if it is persisted.
    #[must_use]
    pub fn column(&self) -> Option<&'static str> {
        self.tag.filter(|tag| !tag.is_empty())
    }
}

/// A record that can be inserted with
/// [`Database::insert_struct`](super::Database::insert_struct).
pub trait Persistable {
    /// Field descriptors in declaration order.
    fn fields(&self) -> Vec<Field>;
}

/// SQL text plus bind values produced by [`build_insert`].
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// `INSERT INTO <table> (c1,...,cn) VALUES (?,...,?)`.
    pub sql: String,
    /// One value per placeholder, in column order.
    pub params: Vec<Value>,
}

/// Builds the `INSERT` for `record`.
///
/// The table name is used as given.
///
/// # Errors
///
/// Returns [`Error::Usage`] if the record has no tagged fields.
pub fn build_insert<P: Persistable + ?Sized>(table: &str, record: &P) -> Result<InsertStatement> {
    let (columns, params): (Vec<&str>, Vec<Value>) = record
        .fields()
        .into_iter()
        .filter_map(|field| field.column().map(|column| (column, field.value)))
        .unzip();

    if columns.is_empty() {
        return Err(Error::Usage("no persistable fields".to_string()));
    }

    let placeholders = vec!["?"; columns.len()].join(",");
    Ok(InsertStatement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(",")
        ),
        params,
    })
}

/// Implements [`Persistable`] for a struct from a list of its fields.
///
/// Each entry is `field: "column"` to persist the field under that column, or
/// a bare `field` to skip it. Field types must convert into
/// [`rusqlite::types::Value`].
#[macro_export]
macro_rules! persistable {
    (@tag $tag:literal) => {
        ::std::option::Option::Some($tag)
    };
    (@tag) => {
        ::std::option::Option::None
    };
    ($ty:ty { $($field:ident $(: $tag:literal)?),* $(,)? }) => {
        impl $crate::storage::sqlite::Persistable for $ty {
            fn fields(&self) -> ::std::vec::Vec<$crate::storage::sqlite::Field> {
                ::std::vec![$(
                    $crate::storage::sqlite::Field {
                        name: ::std::stringify!($field),
                        tag: $crate::persistable!(@tag $($tag)?),
                        value: $crate::storage::sqlite::Value::from(
                            ::std::clone::Clone::clone(&self.$field),
                        ),
                    }
                ),*]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Abc {
        a: i64,
        b: String,
        c: Option<f64>,
    }

    crate::persistable!(Abc { a: "a", b: "b", c: "c" });

    struct Partial {
        id: i64,
        name: String,
        scratch: i64,
        blank: String,
    }

    crate::persistable!(Partial {
        id,
        name: "name",
        scratch,
        blank: "",
    });

    struct Nothing {
        skipped: i64,
    }

    crate::persistable!(Nothing { skipped });

    #[test]
    fn test_insert_keeps_declaration_order() {
        let record = Abc {
            a: 1,
            b: "two".to_string(),
            c: Some(3.5),
        };
        let insert = build_insert("tbl", &record).unwrap();
        assert_eq!(insert.sql, "INSERT INTO tbl (a,b,c) VALUES (?,?,?)");
        assert_eq!(
            insert.params,
            vec![
                Value::Integer(1),
                Value::Text("two".to_string()),
                Value::Real(3.5)
            ]
        );
    }

    #[test]
    fn test_untagged_and_empty_tags_are_skipped() {
        let record = Partial {
            id: 9,
            name: "kept".to_string(),
            scratch: 4,
            blank: "dropped".to_string(),
        };
        let insert = build_insert("people", &record).unwrap();
        assert_eq!(insert.sql, "INSERT INTO people (name) VALUES (?)");
        assert_eq!(insert.params, vec![Value::Text("kept".to_string())]);

        let fields = record.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[0].column(), None);
        assert_eq!(fields[3].column(), None);
    }

    #[test]
    fn test_no_persistable_fields() {
        let err = build_insert("tbl", &Nothing { skipped: 1 }).unwrap_err();
        assert!(matches!(err, Error::Usage(ref msg) if msg == "no persistable fields"));
    }

    #[test]
    fn test_null_option_binds_null() {
        let record = Abc {
            a: 0,
            b: String::new(),
            c: None,
        };
        let insert = build_insert("tbl", &record).unwrap();
        assert_eq!(insert.params[2], Value::Null);
    }
}
