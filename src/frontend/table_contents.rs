//! The side model of declared tables and their inserted contents.
//!
//! Mutated only by DDL and DML; independent of the operator graph
//! except that table creation may force a Source operator.

use crate::error::{CompileError, SourcePosition};
use crate::frontend::statements::CreateTableStatement;
use crate::ir::exprs::ZSetLiteral;
use indexmap::IndexMap;

pub struct TableContents {
    /// When false, only definitions are kept and inserts are dropped
    track_contents: bool,
    definitions: IndexMap<String, CreateTableStatement>,
    contents: IndexMap<String, ZSetLiteral>,
}

impl TableContents {
    pub fn new(track_contents: bool) -> Self {
        Self {
            track_contents,
            definitions: IndexMap::new(),
            contents: IndexMap::new(),
        }
    }

    pub fn create_table(&mut self, statement: &CreateTableStatement) {
        if self.track_contents {
            self.contents.insert(
                statement.name.clone(),
                ZSetLiteral::new(statement.row_type()),
            );
        }
        self.definitions
            .insert(statement.name.clone(), statement.clone());
    }

    pub fn drop_table(&mut self, name: &str) {
        self.definitions.shift_remove(name);
        self.contents.shift_remove(name);
    }

    pub fn table_definition(
        &self,
        name: &str,
        position: SourcePosition,
    ) -> Result<&CreateTableStatement, CompileError> {
        self.definitions.get(name).ok_or_else(|| {
            CompileError::translation(format!("table {name} is not defined"), position)
        })
    }

    /// Adds rows to a table's materialized contents.
    pub fn add_to_table(
        &mut self,
        name: &str,
        rows: &ZSetLiteral,
        position: SourcePosition,
    ) -> Result<(), CompileError> {
        if !self.track_contents {
            return Ok(());
        }
        match self.contents.get_mut(name) {
            Some(contents) => {
                contents.extend(rows);
                Ok(())
            }
            None => Err(CompileError::translation(
                format!("table {name} is not defined"),
                position,
            )),
        }
    }

    pub fn table_contents(
        &self,
        name: &str,
        position: SourcePosition,
    ) -> Result<&ZSetLiteral, CompileError> {
        self.contents.get(name).ok_or_else(|| {
            CompileError::translation(
                format!("contents of table {name} are not tracked"),
                position,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TableContents;
    use crate::error::SourcePosition;
    use crate::frontend::sql_types::{SqlField, SqlType, SqlTypeKind};
    use crate::frontend::statements::CreateTableStatement;
    use crate::ir::exprs::{Expr, Literal, TupleExpr, ZSetLiteral};
    use crate::ir::types::Type;

    fn table() -> CreateTableStatement {
        CreateTableStatement {
            name: "t".to_owned(),
            columns: vec![SqlField::new("a", SqlType::non_null(SqlTypeKind::Integer))],
            statement: None,
            position: SourcePosition::default(),
        }
    }

    fn row(value: i32) -> Expr {
        TupleExpr::new(vec![Literal::i32(value).into()]).into()
    }

    #[test]
    fn inserts_accumulate() {
        let mut contents = TableContents::new(true);
        contents.create_table(&table());

        let mut batch = ZSetLiteral::new(Type::tuple(vec![Type::i32()]));
        batch.add(row(1));
        batch.add(row(1));
        contents
            .add_to_table("t", &batch, SourcePosition::default())
            .unwrap();

        let stored = contents
            .table_contents("t", SourcePosition::default())
            .unwrap();
        assert_eq!(stored.weight_of(&row(1)), 2);
    }

    #[test]
    fn dropping_forgets_the_table() {
        let mut contents = TableContents::new(true);
        contents.create_table(&table());
        contents.drop_table("t");
        assert!(contents
            .table_definition("t", SourcePosition::default())
            .is_err());
    }
}
