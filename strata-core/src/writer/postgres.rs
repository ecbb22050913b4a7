use crate::{
    CompiledStatement, IsolationLevel, Page, RepositoryError, RepositoryResult, SqlWriter,
    StructuredInsert, Value, separated_by,
    writer::{Context, Fragment, scan_unquoted},
};
use std::collections::HashSet;

/// JSON/UPSERT dialect: `$n` placeholders, `RETURNING` on insert, bulk inserts
/// expanded server side from one JSON array parameter.
#[derive(Default, Debug, Clone, Copy)]
pub struct PostgresSqlWriter {}

impl PostgresSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for PostgresSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn insert_returns_key(&self) -> bool {
        true
    }

    fn write_column_type(&self, _context: &Context, out: &mut String, value: &Value) {
        match value {
            Value::Boolean(..) => out.push_str("BOOLEAN"),
            Value::Int8(..) | Value::Int16(..) | Value::UInt8(..) => out.push_str("SMALLINT"),
            Value::Int32(..) | Value::UInt16(..) => out.push_str("INTEGER"),
            Value::Int64(..) | Value::UInt32(..) => out.push_str("BIGINT"),
            Value::UInt64(..) => out.push_str("NUMERIC(19)"),
            Value::Float32(..) => out.push_str("REAL"),
            Value::Float64(..) => out.push_str("DOUBLE PRECISION"),
            Value::Decimal(..) => out.push_str("NUMERIC"),
            Value::Varchar(..) => out.push_str("TEXT"),
            Value::Blob(..) => out.push_str("BYTEA"),
            Value::Date(..) => out.push_str("DATE"),
            Value::Time(..) => out.push_str("TIME"),
            Value::Timestamp(..) => out.push_str("TIMESTAMP"),
            Value::TimestampWithTimezone(..) => out.push_str("TIMESTAMP WITH TIME ZONE"),
            Value::Uuid(..) => out.push_str("UUID"),
            Value::Json(..) => out.push_str("JSON"),
            Value::Null => log::error!("Cannot write the column type of an untyped null"),
        };
    }

    fn write_placeholder(&self, _context: &Context, out: &mut String, index: usize) {
        let mut buffer = itoa::Buffer::new();
        out.push('$');
        out.push_str(buffer.format(index));
    }

    /// Placeholders must read `$1`, `$2`, .. `$n` left to right, `n` the parameter count.
    fn verify_placeholders(&self, statement: &CompiledStatement) -> RepositoryResult<()> {
        let mut found = Vec::new();
        scan_unquoted(&statement.sql, |sql, i| {
            if sql.as_bytes()[i] != b'$' {
                return;
            }
            let digits: String = sql[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(index) = digits.parse::<usize>() {
                found.push(index);
            }
        });
        let expected: Vec<usize> = (1..=statement.params.len()).collect();
        if found != expected {
            return Err(RepositoryError::CompilationInvariant(format!(
                "placeholders {:?} do not bind the {} parameters in order: {}",
                found,
                statement.params.len(),
                statement
            )));
        }
        Ok(())
    }

    fn write_paging(&self, _context: &Context, out: &mut String, page: &Page) {
        let mut buffer = itoa::Buffer::new();
        out.push_str("\nLIMIT ");
        out.push_str(buffer.format(page.size));
        out.push_str(" OFFSET ");
        out.push_str(buffer.format(page.offset()));
    }

    fn write_first_row(&self, _context: &Context, out: &mut String) {
        out.push_str("\nLIMIT 1");
    }

    fn write_transaction_begin(
        &self,
        context: &Context,
        out: &mut String,
        isolation: Option<IsolationLevel>,
    ) {
        out.push_str("BEGIN");
        if let Some(level) = isolation {
            out.push_str(" ISOLATION LEVEL ");
            self.write_isolation_level(context, out, level);
        }
        out.push(';');
    }

    /// `INSERT .. SELECT .. FROM json_to_recordset($1::json)`, the rows travel as a
    /// single JSON array of objects keyed by source column.
    fn write_structured_insert(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        command: &StructuredInsert,
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlInsertInto, false);
        out.push_str("INSERT INTO ");
        self.write_location(&context, out, &command.target.location);
        out.push_str(" (");
        separated_by(
            out,
            command.columns.iter(),
            |out, (target, _)| self.write_attribute(&context, out, target),
            ", ",
        );
        out.push_str(")\nSELECT ");
        let recordset = context.switch_fragment(Fragment::SqlRecordset);
        separated_by(
            out,
            command.columns.iter(),
            |out, (_, source)| {
                self.write_identifier_quoted(&recordset, out, "source");
                out.push('.');
                self.write_identifier_quoted(&recordset, out, source.physical_name);
            },
            ", ",
        );
        out.push_str("\nFROM json_to_recordset(");
        let rows = command
            .rows
            .iter()
            .map(|row| {
                serde_json::Value::Object(
                    command
                        .columns
                        .iter()
                        .map(|(_, source)| {
                            (source.physical_name.to_string(), row[source.ordinal].to_json())
                        })
                        .collect(),
                )
            })
            .collect();
        self.write_parameter(
            &recordset,
            out,
            params,
            Value::Json(Some(serde_json::Value::Array(rows))),
        );
        out.push_str("::json) AS ");
        self.write_identifier_quoted(&recordset, out, "source");
        out.push('(');
        let mut declared = HashSet::new();
        separated_by(
            out,
            command
                .columns
                .iter()
                .filter(|(_, source)| declared.insert(source.physical_name)),
            |out, (_, source)| {
                self.write_identifier_quoted(&recordset, out, source.physical_name);
                out.push(' ');
                self.write_column_type(&recordset, out, &source.value);
            },
            ", ",
        );
        out.push(')');
        if let Some(conflict) = &command.conflict {
            self.write_on_conflict(&context, out, conflict);
        }
        self.write_returning(&context, out, &command.returning);
        out.push(';');
        Ok(())
    }
}
