//! Row value model for user on-chain tables.
//!
//! User tables are declared externally by the schema module; the indexing
//! store receives their shape as a [`TableSchema`]. Rows are stored in
//! decoded domain form ([`Value`]) and encoded to storage form only at the
//! database boundary. `BigInt` and `Hex` scalars round-trip bit-exactly.
//!
//! This module also owns row normalization (defaults, `on_update`
//! computations, NOT NULL checks), canonical primary-key encoding, and the
//! approximate byte accounting used by the row cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Bytes, I256};
use serde_json::Value as JsonValue;

use crate::error::StoreError;

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE
// ═══════════════════════════════════════════════════════════════════════════════

/// A scalar or list value in a user row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// 256-bit signed integer.
    BigInt(I256),
    /// UTF-8 text.
    String(String),
    /// Raw bytes, canonically lowercase `0x`-hex.
    Hex(Bytes),
    /// Homogeneous list of scalars.
    List(Vec<Value>),
}

impl Value {
    /// Human-readable kind name for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Hex(_) => "hex",
            Self::List(_) => "list",
        }
    }

    /// Whether this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Approximate in-memory size in bytes.
    ///
    /// Heuristic constants; overshooting is preferred to undershooting.
    #[must_use]
    pub fn estimated_bytes(&self) -> u64 {
        match self {
            Self::Null => 8,
            Self::Bool(_) => 4,
            Self::Int(_) | Self::Float(_) => 8,
            Self::BigInt(_) => 48,
            Self::String(s) => 2 * s.len() as u64,
            // Hex renders as a 0x-prefixed string, two characters per byte.
            Self::Hex(b) => 2 * (2 * b.len() as u64 + 2),
            Self::List(items) => items.iter().map(Self::estimated_bytes).sum(),
        }
    }

    /// Canonical fragment used when this value is part of a primary key.
    ///
    /// Hex values render lowercased, so keys differing only in hex casing
    /// address the same row.
    #[must_use]
    pub fn key_fragment(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::BigInt(i) => i.to_string(),
            Self::String(s) => s.clone(),
            Self::Hex(b) => format!("0x{}", hex::encode(b)),
            Self::List(items) => items
                .iter()
                .map(Self::key_fragment)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Convert to a JSON value (used by the access-pattern profiler and by
    /// list storage encoding).
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            Self::BigInt(i) => JsonValue::String(i.to_string()),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Hex(b) => JsonValue::String(format!("0x{}", hex::encode(b))),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

/// A user row: column name to value, fully materialized after
/// normalization.
pub type Row = BTreeMap<String, Value>;

/// Approximate size of a row plus its cache-entry metadata.
#[must_use]
pub fn estimated_row_bytes(row: &Row) -> u64 {
    const ENTRY_METADATA_BYTES: u64 = 13;
    ENTRY_METADATA_BYTES + row.values().map(Value::estimated_bytes).sum::<u64>()
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLUMN KINDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Declared scalar type of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// 64-bit integer.
    Int,
    /// Double-precision float.
    Float,
    /// 256-bit signed integer.
    BigInt,
    /// Boolean.
    Boolean,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Hex,
    /// One of a fixed set of string variants.
    Enum(Vec<String>),
    /// List of a scalar kind.
    List(Box<ColumnKind>),
}

impl ColumnKind {
    /// Coerce a supplied value into this column kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BigIntSerialization`] when a bigint column
    /// receives a plain number, [`StoreError::CheckConstraint`] on enum or
    /// type mismatches.
    pub fn coerce(&self, column: &str, value: Value) -> Result<Value, StoreError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (Self::Float, Value::Float(f)) => Ok(Value::Float(f)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Self::BigInt, Value::BigInt(i)) => Ok(Value::BigInt(i)),
            (Self::BigInt, got @ (Value::Int(_) | Value::Float(_) | Value::String(_))) => {
                Err(StoreError::BigIntSerialization {
                    column: column.to_string(),
                    hint: format!(
                        "got a {} value; bigint columns take Value::BigInt",
                        got.kind_name()
                    ),
                })
            }
            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::Text, Value::String(s)) => Ok(Value::String(s)),
            (Self::Hex, Value::Hex(b)) => Ok(Value::Hex(b)),
            (Self::Hex, Value::String(s)) => {
                let stripped = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(stripped).map_err(|_| StoreError::CheckConstraint {
                    column: column.to_string(),
                    message: format!("`{s}` is not valid hex"),
                })?;
                Ok(Value::Hex(Bytes::from(bytes)))
            }
            (Self::Enum(variants), Value::String(s)) => {
                if variants.contains(&s) {
                    Ok(Value::String(s))
                } else {
                    Err(StoreError::CheckConstraint {
                        column: column.to_string(),
                        message: format!("`{s}` is not a variant of the enum"),
                    })
                }
            }
            (Self::List(inner), Value::List(items)) => {
                let coerced = items
                    .into_iter()
                    .map(|v| inner.coerce(column, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(coerced))
            }
            (kind, got) => Err(StoreError::CheckConstraint {
                column: column.to_string(),
                message: format!("expected {}, got {}", kind.name(), got.kind_name()),
            }),
        }
    }

    /// Kind name for error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Hex => "hex",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
        }
    }

    /// Encode a coerced value into its storage form.
    ///
    /// `BigInt` is stored as decimal text, `Hex` as lowercase `0x`-hex
    /// text, lists as JSON text. Scalars that the database holds natively
    /// pass through.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BigIntSerialization`] if a list's JSON
    /// rendering fails (bigints inside lists are stringified first, so in
    /// practice this is unreachable for well-formed values).
    pub fn encode(&self, column: &str, value: &Value) -> Result<Value, StoreError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::BigInt, Value::BigInt(i)) => Ok(Value::String(i.to_string())),
            (Self::Hex, Value::Hex(b)) => Ok(Value::String(format!("0x{}", hex::encode(b)))),
            (Self::List(_), list @ Value::List(_)) => {
                let json = serde_json::to_string(&list.to_json()).map_err(|e| {
                    StoreError::BigIntSerialization {
                        column: column.to_string(),
                        hint: format!("list value failed to serialize: {e}"),
                    }
                })?;
                Ok(Value::String(json))
            }
            (_, v) => Ok(v.clone()),
        }
    }

    /// Decode a storage-form value back into domain form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CheckConstraint`] if the stored value does not
    /// parse as this kind.
    pub fn decode(&self, column: &str, value: &Value) -> Result<Value, StoreError> {
        let mismatch = |got: &Value| StoreError::CheckConstraint {
            column: column.to_string(),
            message: format!("stored value has kind {}, expected {}", got.kind_name(), self.name()),
        };

        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Int, Value::Int(i)) => Ok(Value::Int(*i)),
            (Self::Float, Value::Float(f)) => Ok(Value::Float(*f)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (Self::Text | Self::Enum(_), Value::String(s)) => Ok(Value::String(s.clone())),
            (Self::BigInt, Value::String(s)) => s
                .parse::<I256>()
                .map(Value::BigInt)
                .map_err(|_| mismatch(value)),
            (Self::Hex, Value::String(s)) => {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(stripped)
                    .map(|b| Value::Hex(Bytes::from(b)))
                    .map_err(|_| mismatch(value))
            }
            (Self::List(inner), Value::String(s)) => {
                let json: JsonValue = serde_json::from_str(s).map_err(|_| mismatch(value))?;
                let JsonValue::Array(items) = json else {
                    return Err(mismatch(value));
                };
                let decoded = items
                    .into_iter()
                    .map(|item| inner.decode_json(column, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(decoded))
            }
            (_, got) => Err(mismatch(got)),
        }
    }

    /// Decode one JSON list element into domain form.
    fn decode_json(&self, column: &str, json: JsonValue) -> Result<Value, StoreError> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => self.coerce(column, Value::Bool(b)),
            JsonValue::Number(n) => {
                let value = n
                    .as_i64()
                    .map(Value::Int)
                    .or_else(|| n.as_f64().map(Value::Float))
                    .unwrap_or(Value::Null);
                self.coerce(column, value)
            }
            // Bigint and hex elements are stringified inside lists; every
            // other kind takes the string as-is.
            JsonValue::String(s) => match self {
                Self::BigInt | Self::Hex => self.decode(column, &Value::String(s)),
                _ => self.coerce(column, Value::String(s)),
            },
            other => Err(StoreError::CheckConstraint {
                column: column.to_string(),
                message: format!("unsupported list element: {other}"),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TABLE SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of a user table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(String);

impl TableId {
    /// Create a table id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The table name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Computed column value provider (`default_fn` / `on_update_fn`).
pub type ValueFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Declared shape of one column.
#[derive(Clone)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Scalar kind.
    pub kind: ColumnKind,
    /// Whether NULL is permitted.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Static default applied when no value is supplied.
    pub default: Option<Value>,
    /// Computed default applied when no value is supplied.
    pub default_fn: Option<ValueFn>,
    /// Recomputed on every write when no value is supplied.
    pub on_update_fn: Option<ValueFn>,
}

impl ColumnSchema {
    /// A non-nullable column with no defaults.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            primary_key: false,
            default: None,
            default_fn: None,
            on_update_fn: None,
        }
    }

    /// Mark as nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as part of the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Set a static default.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Set a computed default.
    #[must_use]
    pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default_fn = Some(Arc::new(f));
        self
    }

    /// Set an on-update computation.
    #[must_use]
    pub fn on_update_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.on_update_fn = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("default", &self.default)
            .field("default_fn", &self.default_fn.is_some())
            .field("on_update_fn", &self.on_update_fn.is_some())
            .finish()
    }
}

/// Declared shape of one user table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table id.
    pub id: TableId,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSchema>,
    /// Whether the table belongs to the on-chain schema. The indexing
    /// store only accepts writes to on-chain tables.
    pub onchain: bool,
}

impl TableSchema {
    /// Create an on-chain table schema.
    #[must_use]
    pub fn new(id: impl Into<TableId>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            id: id.into(),
            columns,
            onchain: true,
        }
    }

    /// Mark as off-chain (reads only through raw SQL).
    #[must_use]
    pub fn offchain(mut self) -> Self {
        self.onchain = false;
        self
    }

    /// Primary-key columns in declaration order.
    #[must_use]
    pub fn primary_key_columns(&self) -> Vec<&ColumnSchema> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Canonical primary-key string for a normalized row.
    ///
    /// Multi-column keys concatenate fragments with a unit separator so
    /// adjacent values cannot collide.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CheckConstraint`] if a primary-key column is
    /// missing or NULL.
    pub fn encode_primary_key(&self, row: &Row) -> Result<String, StoreError> {
        let mut fragments = Vec::new();
        for column in self.primary_key_columns() {
            match row.get(&column.name) {
                Some(v) if !v.is_null() => {
                    let coerced = column.kind.coerce(&column.name, v.clone())?;
                    fragments.push(coerced.key_fragment());
                }
                _ => {
                    return Err(StoreError::CheckConstraint {
                        column: column.name.clone(),
                        message: "primary key column missing or null".into(),
                    });
                }
            }
        }
        Ok(fragments.join("\u{1f}"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// The set of declared user tables, produced by the external schema
/// module.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<TableId, Arc<TableSchema>>,
}

impl SchemaRegistry {
    /// Build a registry from table schemas.
    #[must_use]
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.id.clone(), Arc::new(t)))
                .collect(),
        }
    }

    /// Look up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Arc<TableSchema>> {
        self.tables.get(&TableId::new(name))
    }

    /// All registered tables, unordered.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Which write produced a row, for normalization purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A fresh insert; NOT NULL is enforced on the full row.
    Insert,
    /// An update patching an existing row.
    Update,
}

/// Normalize a supplied row against a table schema.
///
/// `base` is the current row for updates (the patch target). The result is
/// fully materialized: every declared column is present. Column values are
/// resolved in order: supplied value, then (on update) `on_update_fn`,
/// then the base value, then `default` / `default_fn` / (on insert)
/// `on_update_fn`, then NULL if the column is nullable.
///
/// # Errors
///
/// Returns [`StoreError::UndefinedColumn`] for unknown supplied columns,
/// [`StoreError::NotNull`] when a non-nullable column resolves to NULL on
/// insert, and coercion errors from [`ColumnKind::coerce`].
pub fn normalize_row(
    table: &TableSchema,
    supplied: &Row,
    base: Option<&Row>,
    kind: WriteKind,
) -> Result<Row, StoreError> {
    for name in supplied.keys() {
        if table.column(name).is_none() {
            return Err(StoreError::UndefinedColumn {
                table: table.id.to_string(),
                column: name.clone(),
            });
        }
    }

    let mut out = Row::new();
    for column in &table.columns {
        let resolved = if let Some(v) = supplied.get(&column.name) {
            column.kind.coerce(&column.name, v.clone())?
        } else if let (WriteKind::Update, Some(f)) = (kind, &column.on_update_fn) {
            column.kind.coerce(&column.name, f())?
        } else if let Some(existing) = base.and_then(|b| b.get(&column.name)) {
            existing.clone()
        } else if let Some(default) = &column.default {
            column.kind.coerce(&column.name, default.clone())?
        } else if let Some(f) = &column.default_fn {
            column.kind.coerce(&column.name, f())?
        } else if let Some(f) = &column.on_update_fn {
            column.kind.coerce(&column.name, f())?
        } else {
            Value::Null
        };

        if resolved.is_null() && !column.nullable && kind == WriteKind::Insert {
            return Err(StoreError::NotNull {
                table: table.id.to_string(),
                column: column.name.clone(),
            });
        }

        out.insert(column.name.clone(), resolved);
    }

    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn pet_table() -> TableSchema {
        TableSchema::new(
            "Pet",
            vec![
                ColumnSchema::new("id", ColumnKind::Text).primary_key(),
                ColumnSchema::new("name", ColumnKind::Text),
                ColumnSchema::new("age", ColumnKind::Int).nullable(),
                ColumnSchema::new("bigAge", ColumnKind::BigInt).nullable(),
            ],
        )
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn normalize_applies_defaults_and_nulls() {
        let table = TableSchema::new(
            "T",
            vec![
                ColumnSchema::new("id", ColumnKind::Text).primary_key(),
                ColumnSchema::new("count", ColumnKind::Int).default_value(Value::Int(0)),
                ColumnSchema::new("note", ColumnKind::Text).nullable(),
            ],
        );

        let out = normalize_row(
            &table,
            &row(&[("id", Value::String("a".into()))]),
            None,
            WriteKind::Insert,
        )
        .unwrap();

        assert_eq!(out["count"], Value::Int(0));
        assert_eq!(out["note"], Value::Null);
    }

    #[test]
    fn normalize_rejects_missing_not_null() {
        let table = pet_table();
        let err = normalize_row(
            &table,
            &row(&[("id", Value::String("a".into()))]),
            None,
            WriteKind::Insert,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::NotNull { ref column, .. } if column == "name"));
    }

    #[test]
    fn normalize_rejects_unknown_column() {
        let table = pet_table();
        let err = normalize_row(
            &table,
            &row(&[("id", Value::String("a".into())), ("nope", Value::Int(1))]),
            None,
            WriteKind::Insert,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UndefinedColumn { ref column, .. } if column == "nope"));
    }

    #[test]
    fn normalize_patches_base_row() {
        let table = pet_table();
        let base = normalize_row(
            &table,
            &row(&[
                ("id", Value::String("id1".into())),
                ("name", Value::String("Skip".into())),
                ("age", Value::Int(12)),
            ]),
            None,
            WriteKind::Insert,
        )
        .unwrap();

        let out = normalize_row(
            &table,
            &row(&[("name", Value::String("Skipper".into()))]),
            Some(&base),
            WriteKind::Update,
        )
        .unwrap();

        assert_eq!(out["name"], Value::String("Skipper".into()));
        assert_eq!(out["age"], Value::Int(12));
    }

    #[test]
    fn normalize_applies_on_update_fn() {
        let table = TableSchema::new(
            "T",
            vec![
                ColumnSchema::new("id", ColumnKind::Text).primary_key(),
                ColumnSchema::new("version", ColumnKind::Int).on_update_fn(|| Value::Int(7)),
            ],
        );

        // Applied on insert when nothing else supplies the value.
        let inserted = normalize_row(
            &table,
            &row(&[("id", Value::String("a".into()))]),
            None,
            WriteKind::Insert,
        )
        .unwrap();
        assert_eq!(inserted["version"], Value::Int(7));

        // Recomputed on update even though the base row has a value.
        let mut base = inserted;
        base.insert("version".into(), Value::Int(1));
        let updated = normalize_row(&table, &Row::new(), Some(&base), WriteKind::Update).unwrap();
        assert_eq!(updated["version"], Value::Int(7));
    }

    #[test]
    fn bigint_column_rejects_plain_int() {
        let table = pet_table();
        let err = normalize_row(
            &table,
            &row(&[
                ("id", Value::String("a".into())),
                ("name", Value::String("n".into())),
                ("bigAge", Value::Int(100)),
            ]),
            None,
            WriteKind::Insert,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::BigIntSerialization { .. }));
    }

    #[test]
    fn hex_primary_key_is_case_insensitive() {
        let table = TableSchema::new(
            "T",
            vec![ColumnSchema::new("id", ColumnKind::Hex).primary_key()],
        );

        let lower = table
            .encode_primary_key(&row(&[("id", Value::String("0x0a".into()))]))
            .unwrap();
        let upper = table
            .encode_primary_key(&row(&[("id", Value::String("0x0A".into()))]))
            .unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, "0x0a");
    }

    #[test]
    fn multi_column_keys_do_not_collide() {
        let table = TableSchema::new(
            "T",
            vec![
                ColumnSchema::new("a", ColumnKind::Text).primary_key(),
                ColumnSchema::new("b", ColumnKind::Text).primary_key(),
            ],
        );

        let k1 = table
            .encode_primary_key(&row(&[
                ("a", Value::String("x".into())),
                ("b", Value::String("yz".into())),
            ]))
            .unwrap();
        let k2 = table
            .encode_primary_key(&row(&[
                ("a", Value::String("xy".into())),
                ("b", Value::String("z".into())),
            ]))
            .unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn byte_accounting_constants() {
        let r = row(&[
            ("a", Value::Int(1)),
            ("b", Value::String("hi".into())),
            ("c", Value::Bool(true)),
            ("d", Value::BigInt(I256::try_from(5).unwrap())),
            ("e", Value::Null),
        ]);
        // 13 metadata + 8 + 4 + 4 + 48 + 8
        assert_eq!(estimated_row_bytes(&r), 13 + 8 + 4 + 4 + 48 + 8);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ENCODE / DECODE ROUND-TRIPS
    // ═══════════════════════════════════════════════════════════════════════════

    #[rstest]
    #[case(ColumnKind::Int, Value::Int(-42))]
    #[case(ColumnKind::Float, Value::Float(1.5))]
    #[case(ColumnKind::BigInt, Value::BigInt(I256::try_from(-123_456_789_i64).unwrap()))]
    #[case(ColumnKind::Boolean, Value::Bool(true))]
    #[case(ColumnKind::Text, Value::String("palisade".into()))]
    #[case(ColumnKind::Hex, Value::Hex(Bytes::from(vec![0xDE, 0xAD, 0xBE, 0xEF])))]
    #[case(
        ColumnKind::Enum(vec!["a".into(), "b".into()]),
        Value::String("b".into())
    )]
    #[case(
        ColumnKind::List(Box::new(ColumnKind::Int)),
        Value::List(vec![Value::Int(1), Value::Int(2)])
    )]
    #[case(
        ColumnKind::List(Box::new(ColumnKind::Enum(vec!["x".into()]))),
        Value::List(vec![Value::String("x".into())])
    )]
    #[case(
        ColumnKind::List(Box::new(ColumnKind::BigInt)),
        Value::List(vec![Value::BigInt(I256::try_from(7).unwrap())])
    )]
    fn encode_decode_round_trips(#[case] kind: ColumnKind, #[case] value: Value) {
        let encoded = kind.encode("col", &value).unwrap();
        let decoded = kind.decode("col", &encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn bigint_round_trips_extremes() {
        for v in [I256::MAX, I256::MIN, I256::ZERO] {
            let encoded = ColumnKind::BigInt.encode("col", &Value::BigInt(v)).unwrap();
            let decoded = ColumnKind::BigInt.decode("col", &encoded).unwrap();
            assert_eq!(decoded, Value::BigInt(v));
        }
    }
}
