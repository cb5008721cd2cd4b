#![cfg(test)]
//! End-to-end lowering scenarios: statements in, circuit shapes out.

use crate::error::{CollectingReporter, SourcePosition};
use crate::frontend::compiler::{CircuitCompiler, CompilerOptions, StatementOutput};
use crate::frontend::relation::{
    AggregateCall, AggregateKind, CallKind, Direction, FieldCollation, JoinKind, RelKind,
    RelNode, ScalarExpr, SqlLiteral, SqlValue, WindowBound, WindowGroup,
};
use crate::frontend::sql_types::{SqlField, SqlType, SqlTypeKind};
use crate::frontend::statements::{
    CreateTableStatement, CreateViewStatement, Statement, TableModifyStatement,
};
use crate::ir::exprs::{Expr, Literal, Opcode, TupleExpr};
use crate::ir::nodes::{CircuitNode, Operator};
use crate::ir::{Circuit, RelNodeIdGen, Type};
use std::rc::Rc;

fn pos() -> SourcePosition {
    SourcePosition::new(1, 1)
}

fn int() -> SqlType {
    SqlType::non_null(SqlTypeKind::Integer)
}

fn int_null() -> SqlType {
    SqlType::nullable(SqlTypeKind::Integer)
}

fn bigint(nullable: bool) -> SqlType {
    SqlType::new(SqlTypeKind::BigInt, nullable)
}

fn field(name: &str, ty: SqlType) -> SqlField {
    SqlField::new(name, ty)
}

fn int_literal(value: i64) -> ScalarExpr {
    ScalarExpr::Literal(SqlLiteral::new(SqlValue::Integer(value), int()))
}

fn null_literal() -> ScalarExpr {
    ScalarExpr::Literal(SqlLiteral::new(
        SqlValue::Null,
        SqlType::nullable(SqlTypeKind::Null),
    ))
}

struct PlanBuilder {
    ids: RelNodeIdGen,
}

impl PlanBuilder {
    fn new() -> Self {
        Self {
            ids: RelNodeIdGen::new(),
        }
    }

    fn node(&self, row_type: Vec<SqlField>, kind: RelKind) -> Rc<RelNode> {
        Rc::new(RelNode {
            id: self.ids.next(),
            position: pos(),
            row_type,
            kind,
        })
    }

    fn scan(&self, table: &str, row_type: Vec<SqlField>) -> Rc<RelNode> {
        self.node(
            row_type,
            RelKind::TableScan {
                table: table.to_owned(),
            },
        )
    }
}

fn compiler() -> (CircuitCompiler, Rc<CollectingReporter>) {
    let reporter = Rc::new(CollectingReporter::new());
    (
        CircuitCompiler::new(true, CompilerOptions::default(), reporter.clone()),
        reporter,
    )
}

fn create_table(name: &str, columns: Vec<SqlField>) -> Statement {
    Statement::CreateTable(CreateTableStatement {
        name: name.to_owned(),
        columns,
        statement: None,
        position: pos(),
    })
}

fn create_view(name: &str, query: Rc<RelNode>) -> Statement {
    Statement::CreateView(CreateViewStatement {
        name: name.to_owned(),
        query,
        statement: None,
        position: pos(),
    })
}

fn operator_kinds(circuit: &Circuit) -> Vec<&'static str> {
    circuit
        .nodes()
        .values()
        .map(|operator| match operator {
            Operator::Source(_) => "source",
            Operator::Sink(_) => "sink",
            Operator::Noop(_) => "noop",
            Operator::Map(_) => "map",
            Operator::Filter(_) => "filter",
            Operator::Index(_) => "index",
            Operator::MapIndex(_) => "map_index",
            Operator::FlatMap(_) => "flat_map",
            Operator::Join(_) => "join",
            Operator::Aggregate(_) => "aggregate",
            Operator::WindowAggregate(_) => "window_aggregate",
            Operator::Distinct(_) => "distinct",
            Operator::Sum(_) => "sum",
            Operator::Subtract(_) => "subtract",
            Operator::Negate(_) => "negate",
            Operator::Differential(_) => "differential",
            Operator::Integral(_) => "integral",
            Operator::Constant(_) => "constant",
        })
        .collect()
}

// CREATE TABLE t(a INT); CREATE VIEW v AS SELECT a+1 FROM t
#[test]
fn projection_lowers_to_a_single_map() {
    let plan = PlanBuilder::new();
    let scan = plan.scan("t", vec![field("a", int())]);
    let project = plan.node(
        vec![field("x", int())],
        RelKind::Project {
            input: scan,
            exprs: vec![ScalarExpr::call(
                CallKind::Plus,
                vec![ScalarExpr::input(0, int()), int_literal(1)],
                int(),
            )],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", project))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(operator_kinds(&circuit), vec!["source", "map", "sink"]);
    assert_eq!(circuit.inputs()[0].name, "t");
    assert_eq!(circuit.outputs()[0].name, "v");

    // The map's closure adds 1 at the declared i32 type
    let map = circuit.nodes().values().find(|op| op.is_map()).unwrap();
    let Some(Expr::Closure(closure)) = map.function() else {
        panic!("expected a closure map function");
    };
    let Expr::Tuple(row) = &*closure.body else {
        panic!("expected a tuple row constructor");
    };
    let Expr::Binary(add) = &row.exprs[0] else {
        panic!("expected a binary projection");
    };
    assert_eq!(add.op, Opcode::Add);
    assert_eq!(add.ty(), &Type::i32());
}

// CREATE VIEW v AS SELECT a FROM t UNION SELECT b FROM s
#[test]
fn union_sums_and_distincts() {
    let plan = PlanBuilder::new();
    let left = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );
    let right = plan.node(
        vec![field("b", int())],
        RelKind::Project {
            input: plan.scan("s", vec![field("b", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );
    let union = plan.node(
        vec![field("a", int())],
        RelKind::Union {
            inputs: vec![left, right],
            all: false,
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_table("s", vec![field("b", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", union))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec!["source", "map", "source", "map", "sum", "distinct", "sink"],
    );
    let sum = circuit.nodes().values().find(|op| op.is_sum()).unwrap();
    assert_eq!(sum.input_list().len(), 2);
}

// CREATE VIEW v AS SELECT COUNT(*) FROM t: the 3-input correction
// makes the empty input produce {(0) -> 1} instead of {}
#[test]
fn empty_group_aggregation_is_corrected() {
    let plan = PlanBuilder::new();
    let aggregate = plan.node(
        vec![field("c", bigint(false))],
        RelKind::Aggregate {
            input: plan.scan("t", vec![field("a", int())]),
            group_set: vec![],
            calls: vec![AggregateCall {
                kind: AggregateKind::Count,
                distinct: false,
                arguments: vec![],
                result_type: bigint(false),
            }],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", aggregate))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec![
            "source",
            "index",
            "aggregate",
            "map",
            "map",
            "negate",
            "constant",
            "sum",
            "sink",
        ],
    );

    // The sum has 3 inputs: the constant zero, the negated zero map,
    // and the aggregate result
    let sum = circuit.nodes().values().find(|op| op.is_sum()).unwrap();
    assert_eq!(sum.input_list().len(), 3);

    // The constant is the fold's default zero with weight 1
    let constant = circuit
        .nodes()
        .values()
        .find_map(|op| match op {
            Operator::Constant(constant) => Some(constant),
            _ => None,
        })
        .unwrap();
    let zero_row: Expr = TupleExpr::new(vec![Literal::i64(0).into()]).into();
    assert_eq!(constant.value().weight_of(&zero_row), 1);
}

// SELECT * FROM t LEFT JOIN s ON t.a = s.b
#[test]
fn left_join_completes_unmatched_rows_with_nulls() {
    let plan = PlanBuilder::new();
    let join = plan.node(
        vec![field("a", int()), field("b", int_null())],
        RelKind::Join {
            left: plan.scan("t", vec![field("a", int())]),
            right: plan.scan("s", vec![field("b", int())]),
            kind: JoinKind::Left,
            condition: ScalarExpr::call(
                CallKind::Equals,
                vec![ScalarExpr::input(0, int()), ScalarExpr::input(1, int())],
                SqlType::non_null(SqlTypeKind::Boolean),
            ),
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_table("s", vec![field("b", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", join))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec![
            "source",
            "source",
            "index",
            "index",
            "join",
            "map",
            "distinct",
            "subtract",
            "distinct",
            "map",
            "sum",
            "sink",
        ],
    );

    // The sink carries the outer row type with a nullable right side
    assert_eq!(
        circuit.outputs()[0].element_type,
        Type::tuple(vec![Type::i32(), Type::i32().with_nullability(true)]),
    );

    // The expansion map fills the right side with NULL
    let expansion = circuit
        .nodes()
        .values()
        .filter(|op| op.is_map())
        .last()
        .unwrap();
    let Some(Expr::Closure(closure)) = expansion.function() else {
        panic!("expected a closure map function");
    };
    let Expr::Tuple(row) = &*closure.body else {
        panic!("expected a tuple row constructor");
    };
    assert!(matches!(&row.exprs[1], Expr::Literal(l) if l.is_null()));
}

// INSERT INTO t VALUES (1, NULL), (2, 3)
#[test]
fn insert_materializes_into_table_contents() {
    let plan = PlanBuilder::new();
    let columns = vec![field("a", int()), field("b", int_null())];
    let values = plan.node(
        vec![field("a", int()), field("b", SqlType::nullable(SqlTypeKind::Null))],
        RelKind::Values {
            tuples: vec![
                vec![int_literal(1), null_literal()],
                vec![int_literal(2), int_literal(3)],
            ],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", columns))
        .unwrap();
    let output = compiler
        .compile_statement(&Statement::TableModify(TableModifyStatement {
            table: "t".to_owned(),
            rel: values,
            position: pos(),
        }))
        .unwrap();

    let StatementOutput::Modification(rows) = output else {
        panic!("expected a materialized modification");
    };
    assert_eq!(rows.len(), 2);

    let nullable_int = Type::i32().with_nullability(true);
    let first: Expr = TupleExpr::new(vec![
        Literal::i32(1).into(),
        Expr::none(&nullable_int),
    ])
    .into();
    let second: Expr = TupleExpr::new(vec![
        Literal::i32(2).into(),
        Expr::from(Literal::i32(3)).cast(&nullable_int),
    ])
    .into();
    assert_eq!(rows.weight_of(&first), 1);
    assert_eq!(rows.weight_of(&second), 1);

    let stored = compiler.table_contents().table_contents("t", pos()).unwrap();
    assert_eq!(stored, &rows);

    // DML emits no operators
    assert!(compiler.circuit().nodes().is_empty());
}

// INSERT INTO u (SELECT * FROM t) copies materialized contents
#[test]
fn insert_from_scan_copies_contents() {
    let plan = PlanBuilder::new();
    let columns = vec![field("a", int())];
    let values = plan.node(
        vec![field("a", int())],
        RelKind::Values {
            tuples: vec![vec![int_literal(7)]],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", columns.clone()))
        .unwrap();
    compiler
        .compile_statement(&create_table("u", columns))
        .unwrap();
    compiler
        .compile_statement(&Statement::TableModify(TableModifyStatement {
            table: "t".to_owned(),
            rel: values,
            position: pos(),
        }))
        .unwrap();

    let scan = plan.scan("t", vec![field("a", int())]);
    compiler
        .compile_statement(&Statement::TableModify(TableModifyStatement {
            table: "u".to_owned(),
            rel: scan,
            position: pos(),
        }))
        .unwrap();

    let copied = compiler.table_contents().table_contents("u", pos()).unwrap();
    let row: Expr = TupleExpr::new(vec![Literal::i32(7).into()]).into();
    assert_eq!(copied.weight_of(&row), 1);
}

// SELECT SUM(x) OVER (PARTITION BY p ORDER BY o ROWS UNBOUNDED
// PRECEDING)
#[test]
fn window_aggregate_is_wrapped_in_differential_and_integral() {
    let plan = PlanBuilder::new();
    let input_fields = vec![field("p", int()), field("o", int()), field("x", int())];
    let window = plan.node(
        vec![
            field("p", int()),
            field("o", int()),
            field("x", int()),
            field("s", bigint(true)),
        ],
        RelKind::Window {
            input: plan.scan("t", input_fields),
            constants: vec![],
            groups: vec![WindowGroup {
                keys: vec![0],
                collations: vec![FieldCollation {
                    field: 1,
                    direction: Direction::Ascending,
                }],
                lower: WindowBound::UnboundedPreceding,
                upper: WindowBound::CurrentRow,
                calls: vec![AggregateCall {
                    kind: AggregateKind::Sum,
                    distinct: false,
                    arguments: vec![2],
                    result_type: bigint(true),
                }],
            }],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table(
            "t",
            vec![field("p", int()), field("o", int()), field("x", int())],
        ))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", window))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec![
            "source",
            "map_index",
            "differential",
            "window_aggregate",
            "integral",
            "index",
            "join",
            "sink",
        ],
    );

    // The aggregate column is cast to the declared nullable type
    assert_eq!(
        circuit.outputs()[0].element_type,
        Type::tuple(vec![
            Type::i32(),
            Type::i32(),
            Type::i32(),
            Type::i64().with_nullability(true),
        ]),
    );
}

// ORDER BY lowers to a single-group fold into a sorted vector
#[test]
fn sort_folds_into_a_vector_and_sorts_it() {
    let plan = PlanBuilder::new();
    let sort = plan.node(
        vec![field("a", int())],
        RelKind::Sort {
            input: plan.scan("t", vec![field("a", int())]),
            collations: vec![FieldCollation {
                field: 0,
                direction: Direction::Descending,
            }],
            fetch: None,
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", sort))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec!["source", "index", "aggregate", "map", "sink"],
    );

    // The terminal map sorts with the generated comparator
    let map = circuit.nodes().values().find(|op| op.is_map()).unwrap();
    let Some(Expr::Sort(sorter)) = map.function() else {
        panic!("expected a sort map function");
    };
    assert_eq!(sorter.comparator.keys(), vec![(0, false)]);
}

// Shared plan nodes compile once: the plan is a DAG, not a tree
#[test]
fn memoized_nodes_are_not_recompiled() {
    let plan = PlanBuilder::new();
    let project = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );
    let union = plan.node(
        vec![field("a", int())],
        RelKind::Union {
            inputs: vec![project.clone(), project],
            all: true,
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", union))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(
        operator_kinds(&circuit),
        vec!["source", "map", "sum", "sink"],
    );
    // Both sum inputs are the same operator
    let sum = circuit.nodes().values().find(|op| op.is_sum()).unwrap();
    let inputs = sum.input_list();
    assert_eq!(inputs[0], inputs[1]);
}

// A second view with an already-used name is reported and dropped
#[test]
fn duplicate_views_are_reported() {
    let plan = PlanBuilder::new();
    let first = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );
    let second = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );

    let (mut compiler, reporter) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    let first_output = compiler
        .compile_statement(&create_view("v", first))
        .unwrap();
    let second_output = compiler
        .compile_statement(&create_view("v", second))
        .unwrap();

    // Both definition sites are reported
    assert_eq!(reporter.diagnostics().len(), 2);
    assert_eq!(first_output, second_output);

    let circuit = compiler.finalize_circuit("c").unwrap();
    assert_eq!(circuit.outputs().len(), 1);
}

// Suppressed views emit a Noop instead of a Sink
#[test]
fn hidden_views_produce_no_outputs() {
    let plan = PlanBuilder::new();
    let project = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler.set_next_view_visible(false);
    compiler
        .compile_statement(&create_view("v", project))
        .unwrap();
    let circuit = compiler.finalize_circuit("c").unwrap();

    assert_eq!(operator_kinds(&circuit), vec!["source", "map", "noop"]);
    assert!(circuit.outputs().is_empty());
}

// Finalizing seals the circuit and resets the compiler
#[test]
fn finalize_resets_the_partial_circuit() {
    let plan = PlanBuilder::new();
    let project = plan.node(
        vec![field("a", int())],
        RelKind::Project {
            input: plan.scan("t", vec![field("a", int())]),
            exprs: vec![ScalarExpr::input(0, int())],
        },
    );

    let (mut compiler, _) = compiler();
    compiler
        .compile_statement(&create_table("t", vec![field("a", int())]))
        .unwrap();
    compiler
        .compile_statement(&create_view("v", project))
        .unwrap();
    let circuit = compiler.finalize_circuit("first").unwrap();
    assert_eq!(circuit.name(), "first");
    assert!(!circuit.nodes().is_empty());

    assert!(compiler.circuit().nodes().is_empty());
    let empty = compiler.finalize_circuit("second").unwrap();
    assert!(empty.nodes().is_empty());
}
