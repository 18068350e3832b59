//! The closed set of cleaning/transform operations.
//!
//! Every operation validates against a schema at construction time (fail-fast,
//! before it enters a pipeline) and again inside [`Operation::apply`], because
//! upstream operations can change the schema by the point of application.
//!
//! [`Operation::describe`] returns a stable human-readable form covering the
//! operation kind and all parameters; pipeline content hashes are built from
//! these strings, never from object identity.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ApplyError, ApplyResult, OpError, OpResult, MAX_IN_LIST_VALUES};
use crate::models::{Column, ColumnType, Schema, Table, Value};

/// All available operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Remove the named columns.
    DropColumns { columns: BTreeSet<String> },

    /// Replace missing cells in one column.
    FillMissing {
        column: String,
        #[serde(flatten)]
        strategy: FillStrategy,
    },

    /// Remove rows with a missing cell in any of the named columns,
    /// or in any column at all when `columns` is omitted.
    DropRowsWithMissing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<BTreeSet<String>>,
    },

    /// Keep rows whose cell in `column` satisfies the predicate.
    /// Surviving rows keep their relative order.
    FilterRows {
        column: String,
        #[serde(flatten)]
        predicate: Predicate,
    },
}

/// How to replace missing cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FillStrategy {
    /// Mean of the column's non-missing values. Numeric columns only.
    Mean,
    /// Literal zero. Numeric columns only.
    Zero,
    /// A fixed value matching the column's type.
    Constant { value: Value },
}

/// Row filter predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum Predicate {
    Eq { value: Value },
    Neq { value: Value },
    Lt { value: Value },
    Lte { value: Value },
    Gt { value: Value },
    Gte { value: Value },
    In { values: Vec<Value> },
    Contains { value: String },
}

impl Operation {
    /// Construction-time validation against the schema the operation will see.
    ///
    /// Fails fast with [`OpError`] so a rejected operation never enters a
    /// pipeline.
    pub fn validate(&self, schema: &Schema) -> OpResult<()> {
        match self {
            Operation::DropColumns { columns } => {
                for name in columns {
                    require_column(schema, name)?;
                }
                Ok(())
            }
            Operation::FillMissing { column, strategy } => {
                let col = require_column(schema, column)?;
                match strategy {
                    FillStrategy::Mean => {
                        if col.ty != ColumnType::Numeric {
                            return Err(OpError::type_mismatch(
                                column,
                                format!("mean fill requires a numeric column, found {}", col.ty),
                            ));
                        }
                    }
                    FillStrategy::Zero => {
                        if col.ty != ColumnType::Numeric {
                            return Err(OpError::type_mismatch(
                                column,
                                format!("zero fill requires a numeric column, found {}", col.ty),
                            ));
                        }
                    }
                    FillStrategy::Constant { value } => {
                        if value.is_null() {
                            return Err(OpError::type_mismatch(
                                column,
                                "constant fill value may not be null",
                            ));
                        }
                        if !value.matches(col.ty) {
                            return Err(OpError::type_mismatch(
                                column,
                                format!("constant fill value does not match {} column", col.ty),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Operation::DropRowsWithMissing { columns } => {
                if let Some(columns) = columns {
                    for name in columns {
                        require_column(schema, name)?;
                    }
                }
                Ok(())
            }
            Operation::FilterRows { column, predicate } => {
                let col = require_column(schema, column)?;
                validate_predicate(col, predicate)
            }
        }
    }

    /// Apply this operation to a table.
    ///
    /// Revalidates against the table's actual schema first, since upstream
    /// operations may have changed it since construction.
    pub fn apply(&self, table: &Table) -> ApplyResult<Table> {
        self.validate(table.schema()).map_err(ApplyError::from)?;

        let result = match self {
            Operation::DropColumns { columns } => apply_drop_columns(table, columns),
            Operation::FillMissing { column, strategy } => {
                apply_fill_missing(table, column, strategy)
            }
            Operation::DropRowsWithMissing { columns } => {
                apply_drop_rows_with_missing(table, columns.as_ref())
            }
            Operation::FilterRows { column, predicate } => {
                apply_filter_rows(table, column, predicate)
            }
        };
        Ok(result)
    }

    /// Stable human-readable form covering kind and all parameters.
    pub fn describe(&self) -> String {
        match self {
            Operation::DropColumns { columns } => {
                format!("drop_columns({})", join(columns.iter()))
            }
            Operation::FillMissing { column, strategy } => {
                let strategy = match strategy {
                    FillStrategy::Mean => "mean".to_string(),
                    FillStrategy::Zero => "zero".to_string(),
                    FillStrategy::Constant { value } => format!("constant={}", value),
                };
                format!("fill_missing({}, {})", column, strategy)
            }
            Operation::DropRowsWithMissing { columns } => match columns {
                None => "drop_rows_with_missing(all)".to_string(),
                Some(columns) => {
                    format!("drop_rows_with_missing({})", join(columns.iter()))
                }
            },
            Operation::FilterRows { column, predicate } => {
                let predicate = match predicate {
                    Predicate::Eq { value } => format!("eq {}", value),
                    Predicate::Neq { value } => format!("neq {}", value),
                    Predicate::Lt { value } => format!("lt {}", value),
                    Predicate::Lte { value } => format!("lte {}", value),
                    Predicate::Gt { value } => format!("gt {}", value),
                    Predicate::Gte { value } => format!("gte {}", value),
                    Predicate::In { values } => {
                        format!("in [{}]", join(values.iter().map(|v| v.to_string())))
                    }
                    Predicate::Contains { value } => format!("contains \"{}\"", value),
                };
                format!("filter_rows({} {})", column, predicate)
            }
        }
    }
}

fn join<I: IntoIterator<Item = S>, S: ToString>(items: I) -> String {
    items
        .into_iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn require_column<'a>(schema: &'a Schema, name: &str) -> OpResult<&'a Column> {
    schema
        .column(name)
        .ok_or_else(|| OpError::UnknownColumn(name.to_string()))
}

fn validate_predicate(col: &Column, predicate: &Predicate) -> OpResult<()> {
    let check_value = |value: &Value| -> OpResult<()> {
        if value.is_null() {
            return Err(OpError::type_mismatch(
                &col.name,
                "comparison value may not be null",
            ));
        }
        if !value.matches(col.ty) {
            return Err(OpError::type_mismatch(
                &col.name,
                format!(
                    "comparison value does not match {} column",
                    col.ty
                ),
            ));
        }
        Ok(())
    };

    match predicate {
        Predicate::Eq { value } | Predicate::Neq { value } => check_value(value),
        Predicate::Lt { value }
        | Predicate::Lte { value }
        | Predicate::Gt { value }
        | Predicate::Gte { value } => {
            if col.ty != ColumnType::Numeric && col.ty != ColumnType::Temporal {
                return Err(OpError::type_mismatch(
                    &col.name,
                    format!("ordering predicates require a numeric or temporal column, found {}", col.ty),
                ));
            }
            check_value(value)
        }
        Predicate::In { values } => {
            if values.len() > MAX_IN_LIST_VALUES {
                return Err(OpError::OversizedInList(values.len()));
            }
            for value in values {
                check_value(value)?;
            }
            Ok(())
        }
        Predicate::Contains { .. } => {
            if col.ty != ColumnType::Text {
                return Err(OpError::type_mismatch(
                    &col.name,
                    format!("contains requires a text column, found {}", col.ty),
                ));
            }
            Ok(())
        }
    }
}

fn apply_drop_columns(table: &Table, columns: &BTreeSet<String>) -> Table {
    let keep: Vec<usize> = table
        .schema()
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !columns.contains(&c.name))
        .map(|(i, _)| i)
        .collect();

    let schema = Schema::new(
        keep.iter()
            .map(|&i| table.schema().columns()[i].clone())
            .collect(),
    );
    let rows = table
        .rows()
        .iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Table::new(schema, rows)
}

fn apply_fill_missing(table: &Table, column: &str, strategy: &FillStrategy) -> Table {
    let idx = table.schema().index_of(column).expect("validated");

    let fill = match strategy {
        FillStrategy::Zero => Value::Number(0.0),
        FillStrategy::Constant { value } => value.clone(),
        // Mean over the non-missing values; an all-missing column falls back
        // to zero (mean of nothing is undefined).
        FillStrategy::Mean => {
            let mut sum = 0.0;
            let mut count = 0usize;
            for cell in table.column_values(idx) {
                if let Some(n) = cell.as_number() {
                    sum += n;
                    count += 1;
                }
            }
            if count == 0 {
                Value::Number(0.0)
            } else {
                Value::Number(sum / count as f64)
            }
        }
    };

    let columns = table
        .schema()
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut c = c.clone();
            if i == idx {
                c.nullable = false;
            }
            c
        })
        .collect();

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            if row[idx].is_null() {
                row[idx] = fill.clone();
            }
            row
        })
        .collect();
    Table::new(Schema::new(columns), rows)
}

fn apply_drop_rows_with_missing(table: &Table, columns: Option<&BTreeSet<String>>) -> Table {
    let watched: Vec<usize> = match columns {
        None => (0..table.schema().len()).collect(),
        Some(columns) => columns
            .iter()
            .map(|name| table.schema().index_of(name).expect("validated"))
            .collect(),
    };

    let schema = Schema::new(
        table
            .schema()
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut c = c.clone();
                if watched.contains(&i) {
                    c.nullable = false;
                }
                c
            })
            .collect(),
    );

    let rows = table
        .rows()
        .iter()
        .filter(|row| watched.iter().all(|&i| !row[i].is_null()))
        .cloned()
        .collect();
    Table::new(schema, rows)
}

fn apply_filter_rows(table: &Table, column: &str, predicate: &Predicate) -> Table {
    let idx = table.schema().index_of(column).expect("validated");

    // Stable: rows are visited in order and survivors keep relative order.
    let rows = table
        .rows()
        .iter()
        .filter(|row| predicate_matches(&row[idx], predicate))
        .cloned()
        .collect();
    Table::new(table.schema().clone(), rows)
}

/// A missing cell never satisfies any predicate, `neq` included.
fn predicate_matches(cell: &Value, predicate: &Predicate) -> bool {
    if cell.is_null() {
        return false;
    }
    match predicate {
        Predicate::Eq { value } => cell == value,
        Predicate::Neq { value } => cell != value,
        Predicate::Lt { value } => compare(cell, value) == Some(Ordering::Less),
        Predicate::Lte { value } => {
            matches!(compare(cell, value), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::Gt { value } => compare(cell, value) == Some(Ordering::Greater),
        Predicate::Gte { value } => {
            matches!(compare(cell, value), Some(Ordering::Greater | Ordering::Equal))
        }
        Predicate::In { values } => values.contains(cell),
        Predicate::Contains { value } => match cell {
            Value::Text(text) => text.contains(value.as_str()),
            _ => false,
        },
    }
}

fn compare(cell: &Value, value: &Value) -> Option<Ordering> {
    match (cell, value) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Temporal(a), Value::Temporal(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Human-readable description of the operation set, for the CLI.
pub fn operations_description() -> String {
    r#"Available operations:

| Operation | Description | Parameters |
|-----------|-------------|------------|
| drop_columns | Remove named columns | columns: list of names |
| fill_missing | Replace missing cells in a column | column, strategy: mean / zero / constant (with value) |
| drop_rows_with_missing | Remove rows with missing cells | columns: list of names (omit for all columns) |
| filter_rows | Keep rows matching a predicate | column, predicate: eq / neq / lt / lte / gt / gte / in / contains, value(s) |

Example pipeline in JSON:
[
  {"type": "fill_missing", "column": "score", "strategy": "mean"},
  {"type": "drop_rows_with_missing", "columns": ["id"]},
  {"type": "filter_rows", "column": "score", "predicate": "gte", "value": 10},
  {"type": "drop_columns", "columns": ["notes"]}
]"#
    .to_string()
}
