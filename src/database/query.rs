//! Partial `UPDATE` statements.
//!
//! SET clauses and their parameters are collected as structured data and the
//! placeholder for each value is taken from the parameter count at the moment
//! it is pushed, so `$10`, `$11` and beyond come out right.

use tokio_postgres::types::ToSql;

pub type SqlParam<'a> = &'a (dyn ToSql + Sync);

/// Builder for `UPDATE <table> SET ... WHERE <key> = $n RETURNING ...`
pub struct UpdateBuilder<'a> {
    table: &'static str,
    assignments: Vec<String>,
    params: Vec<SqlParam<'a>>,
    touched: bool,
}

/// Finished statement, ready for `client.query_opt(&stmt.sql, &stmt.params)`.
pub struct UpdateStatement<'a> {
    pub sql: String,
    pub params: Vec<SqlParam<'a>>,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            params: Vec::new(),
            touched: false,
        }
    }

    fn push_param(&mut self, value: SqlParam<'a>) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    /// `column = $n` with `value` bound to `$n`.
    pub fn set(&mut self, column: &'static str, value: SqlParam<'a>) -> &mut Self {
        let placeholder = self.push_param(value);
        self.assignments.push(format!("{column} = {placeholder}"));
        self.touched = true;
        self
    }

    /// Like [`Self::set`], skipped when `value` is `None`.
    pub fn set_opt<T>(&mut self, column: &'static str, value: &'a Option<T>) -> &mut Self
    where
        T: ToSql + Sync + 'a,
    {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    /// `column = <expression>` for a trusted SQL expression such as `NOW()`.
    /// Does not count as a change on its own.
    pub fn set_raw(&mut self, column: &'static str, expression: &'static str) -> &mut Self {
        self.assignments.push(format!("{column} = {expression}"));
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.touched
    }

    /// Finish the statement. Returns `None` when no column was set.
    pub fn build(
        mut self,
        key_column: &'static str,
        key: SqlParam<'a>,
        returning: &'static str,
    ) -> Option<UpdateStatement<'a>> {
        if self.is_empty() {
            return None;
        }
        let key_placeholder = self.push_param(key);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            self.table,
            self.assignments.join(", "),
            key_column,
            key_placeholder,
            returning,
        );
        Some(UpdateStatement {
            sql,
            params: self.params,
        })
    }
}
