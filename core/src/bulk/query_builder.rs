//! SQL generation for multi-row inserts.
//!
//! Placeholders use the `$n` positional form, which both PostgreSQL and SQLite accept.

use crate::{bulk::error::StatementBuildError, SqlValue};

/// A multi-row INSERT ready to execute, borrowing the rows it binds.
#[derive(Debug)]
pub struct InsertStatement<'a> {
    sql: String,
    rows: &'a [Vec<SqlValue>],
    param_count: usize,
}

impl<'a> InsertStatement<'a> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn rows(&self) -> &'a [Vec<SqlValue>] {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Bound parameters in placeholder order.
    pub fn params(&self) -> impl Iterator<Item = &'a SqlValue> + Send + 'a {
        self.rows.iter().flatten()
    }
}

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_identifier(name: &str) -> Result<String, StatementBuildError> {
    if name.is_empty() {
        return Err(StatementBuildError::InvalidIdentifier {
            identifier: name.to_string(),
            reason: "identifier is empty",
        });
    }

    if name.contains('\0') {
        return Err(StatementBuildError::InvalidIdentifier {
            identifier: name.to_string(),
            reason: "identifier contains a NUL byte",
        });
    }

    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Formats a table name, handling schema.table format.
pub fn format_table_name(table_name: &str) -> Result<String, StatementBuildError> {
    let parts: Vec<&str> = table_name.split('.').collect();
    if parts.len() == 2 {
        let schema = quote_identifier(parts[0].trim_matches('"'))?;
        let table = quote_identifier(parts[1].trim_matches('"'))?;
        Ok(format!("{}.{}", schema, table))
    } else {
        quote_identifier(table_name.trim_matches('"'))
    }
}

pub fn generate_columns_names_sql(column_names: &[String]) -> Result<String, StatementBuildError> {
    let quoted =
        column_names.iter().map(|name| quote_identifier(name)).collect::<Result<Vec<_>, _>>()?;

    Ok(quoted.join(", "))
}

/// Builds `INSERT INTO "table" ("a", "b") VALUES ($1,$2),($3,$4)` for `rows`.
///
/// Every row gets as many placeholders as it has values. A row whose arity does not match the
/// column list is left for the database to reject.
pub fn build_insert_statement<'a>(
    table_name: &str,
    column_names: &[String],
    rows: &'a [Vec<SqlValue>],
    max_bound_params: usize,
) -> Result<InsertStatement<'a>, StatementBuildError> {
    if rows.is_empty() {
        return Err(StatementBuildError::EmptyBatch);
    }

    if let Some(index) = rows.iter().position(|row| row.is_empty()) {
        return Err(StatementBuildError::EmptyRow { index });
    }

    let param_count: usize = rows.iter().map(|row| row.len()).sum();
    if param_count > max_bound_params {
        return Err(StatementBuildError::TooManyParameters {
            count: param_count,
            max: max_bound_params,
        });
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        format_table_name(table_name)?,
        generate_columns_names_sql(column_names)?,
    );

    let mut next_placeholder = 1;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let placeholders = (next_placeholder..next_placeholder + row.len())
            .map(|n| format!("${}", n))
            .collect::<Vec<_>>();
        sql.push_str(&format!("({})", placeholders.join(",")));
        next_placeholder += row.len();
    }

    Ok(InsertStatement { sql, rows, param_count })
}
