//! The statements accepted by the compilation entry point.

use crate::error::SourcePosition;
use crate::frontend::relation::RelNode;
use crate::frontend::sql_types::{convert_row_type, SqlField};
use crate::ir::types::Type;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Statement {
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
    CreateView(CreateViewStatement),
    TableModify(TableModifyStatement),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateTableStatement {
    pub name: String,
    pub columns: Vec<SqlField>,
    /// The original statement text, carried into Source comments
    pub statement: Option<String>,
    pub position: SourcePosition,
}

impl CreateTableStatement {
    pub fn row_type(&self) -> Type {
        convert_row_type(&self.columns)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DropTableStatement {
    pub name: String,
    pub position: SourcePosition,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateViewStatement {
    pub name: String,
    pub query: Rc<RelNode>,
    /// The original statement text, carried into Sink comments
    pub statement: Option<String>,
    pub position: SourcePosition,
}

/// `INSERT INTO table ...`; the source is either a Values plan or a
/// bare scan of another table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TableModifyStatement {
    pub table: String,
    pub rel: Rc<RelNode>,
    pub position: SourcePosition,
}
