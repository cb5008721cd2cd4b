//! The stateful relational-to-circuit compiler.
//!
//! Compiles a sequence of statements defining tables and views; views
//! must be defined in terms of previously defined tables and views.
//! The result is a circuit with an input per table and an output per
//! view. [`CircuitCompiler::set_next_view_visible`] can suppress
//! outputs for selected views.

use crate::error::{CompileError, ErrorReporter, SourcePosition};
use crate::frontend::agg::create_fold;
use crate::frontend::expr::{wrap_bool_if_needed, ExpressionCompiler};
use crate::frontend::join::analyze_join_condition;
use crate::frontend::relation::{
    AggregateCall, Direction, FieldCollation, JoinKind, RelKind, RelNode, ScalarExpr, SqlLiteral,
    WindowBound, WindowGroup,
};
use crate::frontend::sql_types::convert_type;
use crate::frontend::statements::{CreateViewStatement, Statement, TableModifyStatement};
use crate::frontend::table_contents::TableContents;
use crate::ir::exprs::{
    Apply, ApplyMethod, Binary, ComparatorExpr, Expr, Literal, Opcode, PathExpr, RawTupleExpr,
    SortExpr, StructExpr, TupleExpr, Variable, ZSetLiteral,
};
use crate::ir::nodes::{
    Aggregate, CircuitNode, Constant, Differential, Distinct, Filter, FlatMap, Index, Integral,
    Join, Map, MapIndex, Negate, Noop, Operator, Sink, Source, Subtract, Sum, WindowAggregate,
};
use crate::ir::optimize;
use crate::ir::types::{IntWidth, Type, TypeKind};
use crate::ir::{Circuit, NodeId, PartialCircuit, RelNodeId};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerOptions {
    /// Emit a Source for every CREATE TABLE, even when no view scans
    /// the table
    pub source_for_every_table: bool,
}

/// What one statement compiled to.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    /// DDL produces nothing
    None,
    /// DML produces the materialized rows
    Modification(ZSetLiteral),
    /// A view produces its terminal operator
    View(NodeId),
}

/// Column re-targeting state for the INSERT statement currently being
/// compiled; Values plans deposit their materialization here instead
/// of emitting a Constant operator.
struct ModifyTableTranslation {
    result_type: Type,
    result: Option<ZSetLiteral>,
}

pub struct CircuitCompiler {
    circuit: PartialCircuit,
    /// Memoizes each compiled plan node's operator; plans may be DAGs
    memo: HashMap<RelNodeId, NodeId>,
    table_contents: TableContents,
    options: CompilerOptions,
    reporter: Rc<dyn ErrorReporter>,
    generate_output_for_next_view: bool,
    modify: Option<ModifyTableTranslation>,
}

impl CircuitCompiler {
    /// `track_table_contents` materializes INSERT statements in the
    /// table-contents model.
    pub fn new(
        track_table_contents: bool,
        options: CompilerOptions,
        reporter: Rc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            circuit: PartialCircuit::new(reporter.clone()),
            memo: HashMap::new(),
            table_contents: TableContents::new(track_table_contents),
            options,
            reporter,
            generate_output_for_next_view: true,
            modify: None,
        }
    }

    /// When `false`, subsequent CREATE VIEW statements compile to
    /// suppressed [`Noop`] outputs. Sticky: stays in effect until
    /// reset.
    pub fn set_next_view_visible(&mut self, visible: bool) {
        self.generate_output_for_next_view = visible;
    }

    pub fn table_contents(&self) -> &TableContents {
        &self.table_contents
    }

    pub fn circuit(&self) -> &PartialCircuit {
        &self.circuit
    }

    /// Seals the circuit produced so far, runs IR cleanup, and starts
    /// a fresh one.
    pub fn finalize_circuit(&mut self, name: impl Into<String>) -> Result<Circuit, CompileError> {
        let finished = std::mem::replace(
            &mut self.circuit,
            PartialCircuit::new(self.reporter.clone()),
        );
        self.memo.clear();
        let mut circuit = finished.seal(name)?;
        optimize::cleanup(&mut circuit);
        Ok(circuit)
    }

    /// The single compilation entry point.
    pub fn compile_statement(
        &mut self,
        statement: &Statement,
    ) -> Result<StatementOutput, CompileError> {
        match statement {
            Statement::CreateView(view) => self.compile_view(view),
            Statement::CreateTable(create) => {
                self.table_contents.create_table(create);
                if self.options.source_for_every_table {
                    // The input could also be created when a scan
                    // first references the table, but a table no view
                    // uses would then have no circuit input
                    self.circuit.add(Source::new(
                        create.name.clone(),
                        create.statement.clone(),
                        Type::zset(create.row_type()),
                        create.position,
                    ));
                }
                Ok(StatementOutput::None)
            }
            Statement::DropTable(drop) => {
                self.table_contents.drop_table(&drop.name);
                Ok(StatementOutput::None)
            }
            Statement::TableModify(modify) => self.compile_modify(modify),
        }
    }

    fn compile_view(
        &mut self,
        view: &CreateViewStatement,
    ) -> Result<StatementOutput, CompileError> {
        tracing::debug!(view = %view.name, "compiling view");
        self.visit(&view.query)?;
        let op = self.operator(&view.query)?;
        let output_type = self.circuit.get(op).output_type().clone();
        let multiset = self.circuit.get(op).is_multiset();

        let id = if self.generate_output_for_next_view {
            self.circuit.add(Sink::new(
                view.name.clone(),
                view.statement.clone(),
                op,
                output_type,
                multiset,
                view.position,
            ))
        } else {
            // A declaration for this output may already exist
            if let Some(previous) = self.circuit.resolve(&view.name) {
                return Ok(StatementOutput::View(previous));
            }
            self.circuit.add(Noop::new(
                view.name.clone(),
                op,
                output_type,
                multiset,
                view.position,
            ))
        };
        Ok(StatementOutput::View(id))
    }

    fn compile_modify(
        &mut self,
        modify: &TableModifyStatement,
    ) -> Result<StatementOutput, CompileError> {
        let definition = self
            .table_contents
            .table_definition(&modify.table, modify.position)?
            .clone();

        match &modify.rel.kind {
            // INSERT INTO t (SELECT * FROM s)
            RelKind::TableScan { table: source } => {
                let data = self
                    .table_contents
                    .table_contents(source, modify.position)?
                    .clone();
                self.table_contents
                    .add_to_table(&modify.table, &data, modify.position)?;
                Ok(StatementOutput::Modification(data))
            }
            RelKind::Values { .. } => {
                self.modify = Some(ModifyTableTranslation {
                    result_type: definition.row_type(),
                    result: None,
                });
                let outcome = self.visit(&modify.rel);
                let translation = self.modify.take();
                outcome?;
                let result = translation.and_then(|t| t.result).ok_or_else(|| {
                    CompileError::translation("INSERT produced no rows", modify.position)
                })?;
                self.table_contents
                    .add_to_table(&modify.table, &result, modify.position)?;
                Ok(StatementOutput::Modification(result))
            }
            _ => Err(CompileError::unimplemented(
                "INSERT from a general query",
                modify.position,
            )),
        }
    }

    /// Visits a plan node, emitting its operators. A no-op on nodes
    /// already compiled: the plan can be a DAG, not just a tree.
    fn visit(&mut self, node: &Rc<RelNode>) -> Result<(), CompileError> {
        if self.memo.contains_key(&node.id) {
            return Ok(());
        }
        tracing::trace!(node = %node.id, "visiting plan node");

        // Correlates are not compiled in postorder
        if let RelKind::Correlate { .. } = &node.kind {
            return self.visit_correlate(node);
        }

        let inputs: Vec<Rc<RelNode>> = node.inputs().into_iter().map(Rc::clone).collect();
        for input in &inputs {
            self.visit(input)?;
        }

        match &node.kind {
            RelKind::TableScan { table } => self.visit_scan(node, table),
            RelKind::Project { input, exprs } => self.visit_project(node, input, exprs),
            RelKind::Filter { input, condition } => self.visit_filter(node, input, condition),
            RelKind::Values { tuples } => self.visit_values(node, tuples),
            RelKind::Union { inputs, all } => self.visit_union(node, inputs, *all),
            RelKind::Minus { inputs, all } => self.visit_minus(node, inputs, *all),
            RelKind::Intersect { inputs, .. } => self.visit_intersect(node, inputs),
            RelKind::Aggregate {
                input,
                group_set,
                calls,
            } => self.visit_aggregate(node, input, group_set, calls),
            RelKind::Join {
                left,
                right,
                kind,
                condition,
            } => self.visit_join(node, left, right, *kind, condition),
            RelKind::Window {
                input,
                constants,
                groups,
            } => self.visit_window(node, input, constants, groups),
            RelKind::Sort {
                input,
                collations,
                fetch,
            } => self.visit_sort(node, input, collations, *fetch),
            RelKind::Uncollect {
                input,
                with_ordinality,
            } => self.visit_uncollect(node, input, *with_ordinality),
            RelKind::Correlate { .. } => unreachable!("correlates are dispatched above"),
        }
    }

    fn assign(&mut self, node: &RelNode, operator: NodeId) {
        self.memo.insert(node.id, operator);
    }

    fn operator(&self, node: &RelNode) -> Result<NodeId, CompileError> {
        self.memo.get(&node.id).copied().ok_or_else(|| {
            CompileError::translation(
                format!("plan node {} was not compiled", node.id),
                node.position,
            )
        })
    }

    fn is_multiset(&self, operator: NodeId) -> bool {
        self.circuit.get(operator).is_multiset()
    }

    /// The operator producing `node`'s rows. When a set is required
    /// of a multiset producer, a Distinct is inserted.
    fn input_as(&mut self, node: &RelNode, as_multiset: bool) -> Result<NodeId, CompileError> {
        let op = self.operator(node)?;
        if self.is_multiset(op) && !as_multiset {
            let output = self.circuit.get(op).output_type().clone();
            return Ok(self.circuit.add(Distinct::new(op, output, node.position)));
        }
        Ok(op)
    }

    /// Maps `operator`'s rows pointwise onto `output_element` when
    /// the element types disagree (input nullability may be narrower
    /// than the declared output).
    fn cast_output(
        &mut self,
        position: SourcePosition,
        operator: NodeId,
        output_element: &Type,
    ) -> NodeId {
        let input_element = self.circuit.get(operator).output_element_type().clone();
        if input_element.same_type(output_element) {
            return operator;
        }
        let t = Variable::new("t", input_element.ref_type());
        let body = TupleExpr::flatten(Expr::from(&t)).pointwise_cast(output_element);
        let function = Expr::from(body).closure(vec![t.as_parameter()]);
        self.circuit.add(Map::new(
            function,
            operator,
            Type::zset(output_element.clone()),
            position,
        ))
    }

    fn visit_scan(&mut self, node: &RelNode, table: &str) -> Result<(), CompileError> {
        if let Some(declared) = self.circuit.resolve(table) {
            // Sinks have no outputs; a scan of one (a view used as an
            // input to a query) reads its producer instead
            let op = match self.circuit.get(declared) {
                Operator::Sink(sink) => sink.input(),
                _ => declared,
            };
            self.assign(node, op);
            return Ok(());
        }

        if self.options.source_for_every_table {
            return Err(CompileError::translation(
                format!("could not find input for table {table}"),
                node.position,
            ));
        }

        let comment = self
            .table_contents
            .table_definition(table, node.position)
            .ok()
            .and_then(|definition| definition.statement.clone());
        let id = self.circuit.add(Source::new(
            table,
            comment,
            Type::zset(node.converted_row_type()),
            node.position,
        ));
        self.assign(node, id);
        Ok(())
    }

    fn visit_project(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        exprs: &[ScalarExpr],
    ) -> Result<(), CompileError> {
        let op_input = self.input_as(input, true)?;
        let output_type = node.converted_row_type();
        let input_type = input.converted_row_type();
        let row = Variable::new("t", input_type.ref_type());
        let compiler = ExpressionCompiler::new(Some(&row), node.position);

        let mut columns = Vec::with_capacity(exprs.len());
        for (index, column) in exprs.iter().enumerate() {
            let compiled = compiler.compile(column)?;
            // The planner's optimizations do not preserve types
            columns.push(compiled.cast(output_type.field(index)));
        }
        let closure = Expr::from(TupleExpr::new(columns)).closure(vec![row.as_parameter()]);
        let id = self.circuit.add(Map::new(
            closure,
            op_input,
            Type::zset(output_type),
            node.position,
        ));
        // No distinct: in SQL, project may produce a multiset
        self.assign(node, id);
        Ok(())
    }

    fn visit_filter(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        condition: &ScalarExpr,
    ) -> Result<(), CompileError> {
        let row_type = node.converted_row_type();
        let t = Variable::new("t", row_type.ref_type());
        let compiler = ExpressionCompiler::new(Some(&t), node.position);
        let condition = wrap_bool_if_needed(compiler.compile(condition)?);
        let closure = condition.closure(vec![t.as_parameter()]);

        let op_input = self.operator(input)?;
        let output = self.circuit.get(op_input).output_type().clone();
        let multiset = self.is_multiset(op_input);
        let id = self.circuit.add(Filter::new(
            closure,
            op_input,
            output,
            multiset,
            node.position,
        ));
        self.assign(node, id);
        Ok(())
    }

    /// A VALUES clause: a SQL literal Z-set. Invoked by DML
    /// statements and by queries computing constant results.
    fn visit_values(
        &mut self,
        node: &RelNode,
        tuples: &[Vec<ScalarExpr>],
    ) -> Result<(), CompileError> {
        let compiler = ExpressionCompiler::new(None, node.position);
        let source_type = node.converted_row_type();
        let result_type = match &self.modify {
            Some(translation) => {
                if translation.result_type.size() != source_type.size() {
                    return Err(CompileError::translation(
                        format!(
                            "expected tuples with {} values, got {}",
                            translation.result_type.size(),
                            source_type.size(),
                        ),
                        node.position,
                    ));
                }
                translation.result_type.clone()
            }
            None => source_type.clone(),
        };

        let mut result = ZSetLiteral::new(result_type.clone());
        for tuple in tuples {
            if tuple.len() != source_type.size() {
                return Err(CompileError::translation(
                    format!(
                        "expected a tuple with {} values, got {}",
                        source_type.size(),
                        tuple.len(),
                    ),
                    node.position,
                ));
            }
            let mut fields = Vec::with_capacity(tuple.len());
            for (index, literal) in tuple.iter().enumerate() {
                let field_type = result_type.field(index);
                let mut compiled = compiler.compile(literal)?;
                // The expression compiler has no field context, so
                // its NULLs carry the wrong type
                if let Expr::Literal(lit) = &compiled {
                    if lit.is_null() {
                        compiled = Expr::none(field_type);
                    }
                }
                fields.push(compiled.cast(field_type));
            }
            result.add(TupleExpr::new(fields).into());
        }

        match &mut self.modify {
            Some(translation) => {
                translation.result = Some(result);
                Ok(())
            }
            None => {
                let id = self
                    .circuit
                    .add(Constant::new(result, false, node.position));
                self.assign(node, id);
                Ok(())
            }
        }
    }

    fn visit_union(
        &mut self,
        node: &RelNode,
        inputs: &[Rc<RelNode>],
        all: bool,
    ) -> Result<(), CompileError> {
        let output = node.converted_row_type();
        let mut summands = Vec::with_capacity(inputs.len());
        for input in inputs {
            let op = self.operator(input)?;
            // Input nullability may not match the declared output
            summands.push(self.cast_output(node.position, op, &output));
        }
        let sum = self.circuit.add(Sum::new(
            summands,
            Type::zset(output.clone()),
            node.position,
        ));
        let id = if all {
            sum
        } else {
            self.circuit
                .add(Distinct::new(sum, Type::zset(output), node.position))
        };
        self.assign(node, id);
        Ok(())
    }

    fn visit_minus(
        &mut self,
        node: &RelNode,
        inputs: &[Rc<RelNode>],
        all: bool,
    ) -> Result<(), CompileError> {
        let output = node.converted_row_type();
        let mut summands = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let op_input = self.input_as(input, false)?;
            let op = if index == 0 {
                self.cast_output(node.position, op_input, &output)
            } else {
                let negated_output = self.circuit.get(op_input).output_type().clone();
                let multiset = self.is_multiset(op_input);
                let neg = self.circuit.add(Negate::new(
                    op_input,
                    negated_output,
                    multiset,
                    node.position,
                ));
                self.cast_output(node.position, neg, &output)
            };
            summands.push(op);
        }

        let sum = self.circuit.add(Sum::new(
            summands,
            Type::zset(output.clone()),
            node.position,
        ));
        let id = if all {
            sum
        } else {
            self.circuit
                .add(Distinct::new(sum, Type::zset(output), node.position))
        };
        self.assign(node, id);
        Ok(())
    }

    /// Intersect is a special case of join: index every side by the
    /// entire row and chain pairwise joins left to right.
    fn visit_intersect(
        &mut self,
        node: &RelNode,
        inputs: &[Rc<RelNode>],
    ) -> Result<(), CompileError> {
        let Some(first) = inputs.first() else {
            return Err(CompileError::unimplemented(
                "INTERSECT with no inputs",
                node.position,
            ));
        };
        let mut previous = self.input_as(first, false)?;
        if inputs.len() == 1 {
            self.memo.insert(node.id, previous);
            return Ok(());
        }

        let input_row_type = first.converted_row_type();
        let result_type = node.converted_row_type();
        let empty = Type::raw_tuple(Vec::new());

        let t = Variable::new("t", input_row_type.ref_type());
        let entire_key = Expr::from(RawTupleExpr::new(vec![
            Expr::from(&t).deref().clone_expr(),
            RawTupleExpr::empty().into(),
        ]))
        .closure(vec![t.as_parameter()]);

        let k = Variable::new("k", input_row_type.ref_type());
        let l = Variable::new("l", empty.ref_type());
        let r = Variable::new("r", empty.ref_type());
        let pair = Expr::from(&k).deref().clone_expr().closure(vec![
            k.as_parameter(),
            l.as_parameter(),
            r.as_parameter(),
        ]);

        for input in &inputs[1..] {
            let previous_index = self.circuit.add(Index::new(
                entire_key.clone(),
                input_row_type.clone(),
                empty.clone(),
                previous,
                self.is_multiset(previous),
                node.position,
            ));
            let op_input = self.input_as(input, false)?;
            let index = self.circuit.add(Index::new(
                entire_key.clone(),
                input_row_type.clone(),
                empty.clone(),
                op_input,
                self.is_multiset(op_input),
                node.position,
            ));
            previous = self.circuit.add(Join::new(
                pair.clone(),
                previous_index,
                index,
                Type::zset(result_type.clone()),
                false,
                node.position,
            ));
        }
        self.memo.insert(node.id, previous);
        Ok(())
    }

    fn visit_aggregate(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        group_set: &[usize],
        calls: &[AggregateCall],
    ) -> Result<(), CompileError> {
        let result_type = node.converted_row_type();
        let op_input = self.input_as(input, true)?;
        let input_row_type = input.converted_row_type();

        if calls.is_empty() {
            // Plain GROUP BY over all projected fields
            let output = self.circuit.get(op_input).output_type().clone();
            let id = self
                .circuit
                .add(Distinct::new(op_input, output, node.position));
            self.assign(node, id);
            return Ok(());
        }

        let t = Variable::new("t", input_row_type.ref_type());
        let group_count = group_set.len();
        let keys: Vec<Expr> = group_set
            .iter()
            .map(|&index| Expr::from(&t).field(index).clone_if_needed())
            .collect();
        let key = RawTupleExpr::new(keys);
        let key_type = key.ty().clone();

        let group_keys = Expr::from(RawTupleExpr::new(vec![
            key.into(),
            TupleExpr::flatten(Expr::from(&t)).into(),
        ]))
        .closure(vec![t.as_parameter()]);
        let index = self.circuit.add(Index::new(
            group_keys,
            key_type.clone(),
            input_row_type.clone(),
            op_input,
            false,
            node.position,
        ));

        let fold = create_fold(node.position, calls, &result_type, group_count, &input_row_type)?;
        // The aggregate's value type is the fold's default-zero
        // tuple, not the declared aggregate fields; the flattening
        // map corrects the difference
        let aggregate_value_type = fold.default_zero_type().clone();
        let default_zero = fold.default_zero().clone();
        let agg = self.circuit.add(Aggregate::with_fold(
            fold,
            key_type.clone(),
            aggregate_value_type.clone(),
            index,
            node.position,
        ));

        // Flatten (key, aggregates) into the declared output tuple
        let kv = Variable::new(
            "kv",
            Type::raw_tuple(vec![key_type.ref_type(), aggregate_value_type.ref_type()]),
        );
        let aggregate_arity = aggregate_value_type.size();
        let mut flattened = Vec::with_capacity(group_count + aggregate_arity);
        for index in 0..group_count {
            flattened.push(Expr::from(&kv).field(0).field(index).clone_if_needed());
        }
        for index in 0..aggregate_arity {
            flattened.push(
                Expr::from(&kv)
                    .field(1)
                    .field(index)
                    .clone_if_needed()
                    .cast(result_type.field(group_count + index)),
            );
        }
        let mapper = Expr::from(TupleExpr::new(flattened)).closure(vec![kv.as_parameter()]);
        let map = self.circuit.add(Map::new(
            mapper,
            agg,
            Type::zset(result_type.clone()),
            node.position,
        ));

        if group_count == 0 {
            // The aggregate operator never invokes the fold on an
            // empty input, so the default zero must be patched in.
            // The current result is {}/{c->1}; summing it with its
            // negation mapped to the zero tuple and the constant
            // {z->1} yields {z->1}/{c->1}, preserving at-most-one-row
            // semantics.
            let placeholder = Variable::new("_t", result_type.clone());
            let to_zero = default_zero
                .clone()
                .closure(vec![placeholder.as_ref_parameter()]);
            let map_to_zero = self.circuit.add(Map::new(
                to_zero,
                map,
                Type::zset(result_type.clone()),
                node.position,
            ));
            let negate = self.circuit.add(Negate::new(
                map_to_zero,
                Type::zset(result_type.clone()),
                true,
                node.position,
            ));
            let mut zero_zset = ZSetLiteral::new(result_type.clone());
            zero_zset.add(default_zero);
            let constant = self
                .circuit
                .add(Constant::new(zero_zset, false, node.position));
            let sum = self.circuit.add(Sum::new(
                vec![constant, negate, map],
                Type::zset(result_type),
                node.position,
            ));
            self.assign(node, sum);
        } else {
            self.assign(node, map);
        }
        Ok(())
    }

    /// Filters out rows whose join-key fields are NULL; NULL keys
    /// never match, and removing them makes outer-join completion
    /// sound.
    fn filter_non_null_keys(
        &mut self,
        position: SourcePosition,
        key_columns: &[usize],
        input: NodeId,
    ) -> NodeId {
        let row_type = self.circuit.get(input).output_element_type().clone();
        let should_filter = key_columns
            .iter()
            .any(|&column| row_type.field(column).may_be_null());
        if !should_filter {
            return input;
        }

        let var = Variable::new("r", row_type.ref_type());
        let mut any_null: Option<Expr> = None;
        for column in 0..row_type.size() {
            if !key_columns.contains(&column) {
                continue;
            }
            let is_null = Expr::from(&var).field(column).is_null_expr();
            any_null = Some(match any_null {
                None => is_null,
                Some(condition) => {
                    Binary::new(Opcode::Or, condition, is_null, Type::bool()).into()
                }
            });
        }

        let condition = any_null.map(Expr::not).unwrap_or_else(|| {
            // All key fields are non-nullable; unreachable given the
            // check above
            Literal::bool(true).into()
        });
        let closure = condition.closure(vec![var.as_parameter()]);
        let output = self.circuit.get(input).output_type().clone();
        let multiset = self.is_multiset(input);
        self.circuit
            .add(Filter::new(closure, input, output, multiset, position))
    }

    fn visit_join(
        &mut self,
        node: &RelNode,
        left: &Rc<RelNode>,
        right: &Rc<RelNode>,
        kind: JoinKind,
        condition: &ScalarExpr,
    ) -> Result<(), CompileError> {
        if matches!(kind, JoinKind::Semi | JoinKind::Anti) {
            return Err(CompileError::unimplemented(
                format!("{kind:?} join"),
                node.position,
            ));
        }

        let result_type = node.converted_row_type();
        let left_op = self.input_as(left, true)?;
        let right_op = self.input_as(right, true)?;
        let left_element = self.circuit.get(left_op).output_element_type().clone();
        let right_element = self.circuit.get(right_op).output_element_type().clone();

        let decomposition = analyze_join_condition(
            condition,
            left_element.size(),
            &left_element,
            &right_element,
            node.position,
        )?;

        // Nullable key fields force a filter, which makes the key
        // columns effectively non-nullable
        let filtered_left =
            self.filter_non_null_keys(node.position, &decomposition.left_columns(), left_op);
        let filtered_right =
            self.filter_non_null_keys(node.position, &decomposition.right_columns(), right_op);

        let left_element = self
            .circuit
            .get(filtered_left)
            .output_element_type()
            .clone();
        let right_element = self
            .circuit
            .get(filtered_right)
            .output_element_type()
            .clone();
        let left_columns = left_element.size();
        let right_columns = right_element.size();
        let total_columns = left_columns + right_columns;
        let left_result_type = result_type.slice(0, left_columns);
        let right_result_type = result_type.slice(left_columns, total_columns);

        let l = Variable::new("l", left_element.ref_type());
        let r = Variable::new("r", right_element.ref_type());
        let left_key = RawTupleExpr::new(
            decomposition
                .comparisons
                .iter()
                .map(|c| {
                    Expr::from(&l)
                        .field(c.left_column)
                        .clone_if_needed()
                        .cast(&c.result_type)
                })
                .collect(),
        );
        let right_key = RawTupleExpr::new(
            decomposition
                .comparisons
                .iter()
                .map(|c| {
                    Expr::from(&r)
                        .field(c.right_column)
                        .clone_if_needed()
                        .cast(&c.result_type)
                })
                .collect(),
        );
        let key_type = left_key.ty().clone();

        // The leftover predicate runs over the joined row
        let leftover_condition = match &decomposition.leftover {
            Some(leftover) => {
                let t = Variable::new("t", result_type.ref_type());
                let compiler = ExpressionCompiler::new(Some(&t), node.position);
                let compiled = wrap_bool_if_needed(compiler.compile(leftover)?);
                let closure = compiled.clone().closure(vec![t.as_parameter()]);
                Some((compiled, closure))
            }
            None => None,
        };

        let to_left_key = Expr::from(RawTupleExpr::new(vec![
            left_key.into(),
            TupleExpr::flatten(Expr::from(&l)).into(),
        ]))
        .closure(vec![l.as_parameter()]);
        let left_index = self.circuit.add(Index::new(
            to_left_key,
            key_type.clone(),
            left_element.clone(),
            filtered_left,
            false,
            node.position,
        ));

        let to_right_key = Expr::from(RawTupleExpr::new(vec![
            right_key.into(),
            TupleExpr::flatten(Expr::from(&r)).into(),
        ]))
        .closure(vec![r.as_parameter()]);
        let right_index = self.circuit.add(Index::new(
            to_right_key,
            key_type.clone(),
            right_element.clone(),
            filtered_right,
            false,
            node.position,
        ));

        // For outer joins additional columns may become nullable
        let k = Variable::new("k", key_type);
        let joined = TupleExpr::flatten_many(vec![Expr::from(&l), Expr::from(&r)])
            .pointwise_cast(&result_type);
        let pair = Expr::from(joined).closure(vec![
            k.as_ref_parameter(),
            l.as_parameter(),
            r.as_parameter(),
        ]);
        let join_multiset = self.is_multiset(left_op) || self.is_multiset(right_op);
        let join = self.circuit.add(Join::new(
            pair,
            left_index,
            right_index,
            Type::zset(result_type.clone()),
            join_multiset,
            node.position,
        ));

        let mut inner = join;
        if let Some((original, closure)) = leftover_condition {
            let trivially_true =
                matches!(&original, Expr::Literal(literal) if literal.as_bool() == Some(true));
            // A FALSE or NULL leftover means an empty join; the
            // optimizer is not expected to produce one, and ordinary
            // filtering handles it if it does
            if !trivially_true {
                inner = self.circuit.add(Filter::new(
                    closure,
                    join,
                    Type::zset(result_type.clone()),
                    join_multiset,
                    node.position,
                ));
            }
        }

        // Outer joins: sum the inner join with the null-extended
        // unmatched rows of each outer side
        let mut result = inner;
        let join_var = Variable::new("j", result_type.clone());
        if matches!(kind, JoinKind::Left | JoinKind::Full) {
            result = self.outer_completion(
                node.position,
                inner,
                result,
                &join_var,
                0,
                left_columns,
                &left_result_type,
                &right_element,
                left_op,
                &left_element,
                &l,
                &result_type,
                OuterSide::Left,
            );
        }
        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            result = self.outer_completion(
                node.position,
                inner,
                result,
                &join_var,
                left_columns,
                total_columns,
                &right_result_type,
                &left_element,
                right_op,
                &right_element,
                &r,
                &result_type,
                OuterSide::Right,
            );
        }

        self.assign(node, result);
        Ok(())
    }

    /// Derives the unmatched rows of one side of an outer join as
    /// `Distinct(side - Distinct(project_side(join)))`, extends them
    /// with NULLs on the other side, and sums with the accumulated
    /// result.
    #[allow(clippy::too_many_arguments)]
    fn outer_completion(
        &mut self,
        position: SourcePosition,
        inner: NodeId,
        result: NodeId,
        join_var: &Variable,
        slice_start: usize,
        slice_end: usize,
        side_result_type: &Type,
        other_element: &Type,
        side_op: NodeId,
        side_element: &Type,
        side_var: &Variable,
        result_type: &Type,
        side: OuterSide,
    ) -> NodeId {
        // Project the join onto this side's columns
        let projection = TupleExpr::flatten(Expr::from(join_var))
            .slice(slice_start, slice_end)
            .pointwise_cast(side_result_type);
        let project = Expr::from(projection).closure(vec![join_var.as_ref_parameter()]);
        let joined_columns = self.circuit.add(Map::new(
            project,
            inner,
            Type::zset(side_result_type.clone()),
            position,
        ));
        let distinct_joined = self.circuit.add(Distinct::new(
            joined_columns,
            Type::zset(side_result_type.clone()),
            position,
        ));

        // Subtract from the side relation (cast when the join widened
        // nullability)
        let mut side_cast = side_op;
        if !side_result_type.same_type(side_element) {
            let cast = TupleExpr::flatten(Expr::from(side_var)).pointwise_cast(side_result_type);
            let closure = Expr::from(cast).closure(vec![side_var.as_parameter()]);
            side_cast = self.circuit.add(Map::new(
                closure,
                side_op,
                Type::zset(side_result_type.clone()),
                position,
            ));
        }
        let subtract = self.circuit.add(Subtract::new(
            side_cast,
            distinct_joined,
            Type::zset(side_result_type.clone()),
            position,
        ));
        let unmatched = self.circuit.add(Distinct::new(
            subtract,
            Type::zset(side_result_type.clone()),
            position,
        ));

        // Fill the other side's fields with NULLs
        let casted = Variable::new(side.var_name(), side_result_type.clone());
        let nulls: Vec<Expr> = other_element
            .tuple_fields()
            .iter()
            .map(|field| Expr::none(&field.with_nullability(true)))
            .collect();
        let own = TupleExpr::flatten(Expr::from(&casted)).exprs;
        let fields = match side {
            OuterSide::Left => own.into_iter().chain(nulls).collect(),
            OuterSide::Right => nulls.into_iter().chain(own).collect(),
        };
        let expand = Expr::from(TupleExpr::new(fields)).closure(vec![casted.as_ref_parameter()]);
        let expanded = self.circuit.add(Map::new(
            expand,
            unmatched,
            Type::zset(result_type.clone()),
            position,
        ));

        self.circuit.add(Sum::new(
            vec![result, expanded],
            Type::zset(result_type.clone()),
            position,
        ))
    }

    fn compile_window_bound(
        &self,
        bound: &WindowBound,
        sort_type: &Type,
        compiler: &ExpressionCompiler<'_>,
        position: SourcePosition,
    ) -> Result<Expr, CompileError> {
        let numeric = match bound {
            WindowBound::UnboundedPreceding | WindowBound::UnboundedFollowing => {
                numeric_limit(sort_type, position)?
            }
            WindowBound::CurrentRow => numeric_zero(sort_type, position)?,
            WindowBound::Preceding(offset) | WindowBound::Following(offset) => compiler
                .compile(&ScalarExpr::Literal(offset.clone()))?
                .cast(sort_type),
        };
        let variant = if bound.is_preceding() {
            "Before"
        } else {
            "After"
        };
        Ok(StructExpr::new(
            PathExpr::simple(["RelOffset", variant]),
            vec![numeric],
            Type::any(),
        )
        .into())
    }

    fn visit_window(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        constants: &[SqlLiteral],
        groups: &[WindowGroup],
    ) -> Result<(), CompileError> {
        let window_result_type = node.converted_row_type();
        let input_op = self.input_as(input, true)?;
        let input_row_type = input.converted_row_type();
        let input_row_var = Variable::new("t", input_row_type.ref_type());
        let compiler =
            ExpressionCompiler::with_constants(Some(&input_row_var), constants, node.position);

        let mut window_field_index = input_row_type.size();
        let mut current_tuple_type = input_row_type.clone();
        let mut previous_row_var = input_row_var.clone();
        let mut last_operator = input_op;

        for group in groups {
            // Sanity checks
            if group.collations.len() != 1 {
                return Err(CompileError::unimplemented(
                    "ORDER BY with multiple columns in OVER",
                    node.position,
                ));
            }
            let collation = group.collations[0];
            if collation.direction != Direction::Ascending {
                return Err(CompileError::unimplemented(
                    "OVER only supports ascending sorting",
                    node.position,
                ));
            }
            let order_index = collation.field;
            let order_field = Expr::from(&input_row_var).field(order_index);
            let sort_type = input_row_type.field(order_index).clone();
            if !sort_type.is_integer() && !matches!(sort_type.kind(), TypeKind::Timestamp) {
                return Err(CompileError::unimplemented(
                    "OVER requires an integer or timestamp type for ordering",
                    node.position,
                ));
            }
            if sort_type.may_be_null() {
                return Err(CompileError::unimplemented(
                    "OVER does not support sorting on a nullable column",
                    node.position,
                ));
            }

            // The window frame
            let lower =
                self.compile_window_bound(&group.lower, &sort_type, &compiler, node.position)?;
            let upper =
                self.compile_window_bound(&group.upper, &sort_type, &compiler, node.position)?;
            let window: Expr = StructExpr::new(
                PathExpr::simple(["RelRange", "new"]),
                vec![lower, upper],
                Type::any(),
            )
            .into();

            // |t| ((partition), (order, t.clone()))
            let partition = TupleExpr::new(
                group
                    .keys
                    .iter()
                    .map(|&key| Expr::from(&input_row_var).field(key).clone_if_needed())
                    .collect(),
            );
            let partition_type = partition.ty().clone();
            let order_and_row = RawTupleExpr::new(vec![
                order_field.clone(),
                Expr::from(&input_row_var).deref().clone_expr(),
            ]);
            let value_type = order_and_row.ty().clone();
            let map_closure = Expr::from(RawTupleExpr::new(vec![
                partition.clone().into(),
                order_and_row.into(),
            ]))
            .closure(vec![input_row_var.as_parameter()]);
            let map_index = self.circuit.add(MapIndex::new(
                map_closure,
                partition_type.clone(),
                value_type,
                input_op,
                self.is_multiset(input_op),
                node.position,
            ));

            // Per-call aggregates folded over the frame
            let call_types = Type::tuple(
                group
                    .calls
                    .iter()
                    .map(|call| convert_type(&call.result_type))
                    .collect(),
            );
            let fold = create_fold(node.position, &group.calls, &call_types, 0, &input_row_type)?;
            let aggregate_result_type = fold.default_zero_type().clone();

            // The window aggregate is inherently incremental; D and I
            // around it present the non-incremental semantics
            let diff_output = self.circuit.get(map_index).output_type().clone();
            let diff = self.circuit.add(Differential::new(
                map_index,
                diff_output,
                self.is_multiset(map_index),
                node.position,
            ));
            let window_output = Type::zset(Type::raw_tuple(vec![
                Type::raw_tuple(vec![partition_type.clone(), sort_type.clone()]),
                aggregate_result_type.clone(),
            ]));
            let window_aggregate = self.circuit.add(WindowAggregate::new(
                fold,
                window,
                partition_type.clone(),
                sort_type.clone(),
                diff,
                window_output.clone(),
                node.position,
            ));
            let integral = self.circuit.add(Integral::new(
                window_aggregate,
                window_output,
                false,
                node.position,
            ));

            // Index the running rows by (partition, order) and join
            // the aggregates back in
            let part_and_order =
                RawTupleExpr::new(vec![partition.into(), order_field.clone()]);
            let key_type = part_and_order.ty().clone();
            let indexed_input = RawTupleExpr::new(vec![
                part_and_order.into(),
                Expr::from(&previous_row_var).deref().clone_expr(),
            ]);
            let index_closure =
                Expr::from(indexed_input).closure(vec![previous_row_var.as_parameter()]);
            let index_input = self.circuit.add(Index::new(
                index_closure,
                key_type.clone(),
                current_tuple_type.clone(),
                last_operator,
                self.is_multiset(last_operator),
                node.position,
            ));

            let key = Variable::new("k", key_type);
            let left = Variable::new("l", current_tuple_type.clone());
            let right = Variable::new("r", aggregate_result_type.ref_type());
            let mut all_fields =
                Vec::with_capacity(current_tuple_type.size() + aggregate_result_type.size());
            for index in 0..current_tuple_type.size() {
                all_fields.push(Expr::from(&left).field(index).clone_if_needed());
            }
            for index in 0..aggregate_result_type.size() {
                // The planner sometimes infers non-nullable types for
                // these aggregates; cast to whatever it declared
                all_fields.push(
                    Expr::from(&right)
                        .field(index)
                        .clone_if_needed()
                        .cast(window_result_type.field(window_field_index)),
                );
                window_field_index += 1;
            }
            let joined = TupleExpr::new(all_fields);
            let joined_type = joined.ty().clone();
            let join_closure = Expr::from(joined).closure(vec![
                key.as_ref_parameter(),
                left.as_ref_parameter(),
                right.as_parameter(),
            ]);
            last_operator = self.circuit.add(Join::new(
                join_closure,
                index_input,
                integral,
                Type::zset(joined_type.clone()),
                self.is_multiset(index_input),
                node.position,
            ));
            current_tuple_type = joined_type;
            previous_row_var = Variable::new("t", current_tuple_type.ref_type());
        }

        self.assign(node, last_operator);
        Ok(())
    }

    /// ORDER BY: aggregate everything into a single group, fold the
    /// group into a vector (pushing each row as many times as its
    /// weight), and sort the vector with a generated comparator.
    fn visit_sort(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        collations: &[FieldCollation],
        fetch: Option<usize>,
    ) -> Result<(), CompileError> {
        let input_row_type = input.converted_row_type();
        let op_input = self.operator(input)?;

        let t = Variable::new("t", input_row_type.clone());
        let empty_group_keys = Expr::from(RawTupleExpr::new(vec![
            RawTupleExpr::empty().into(),
            TupleExpr::flatten(Expr::from(&t)).into(),
        ]))
        .closure(vec![t.as_ref_parameter()]);
        let empty_key_type = Type::raw_tuple(Vec::new());
        let index = self.circuit.add(Index::new(
            empty_group_keys,
            empty_key_type.clone(),
            input_row_type.clone(),
            op_input,
            self.is_multiset(op_input),
            node.position,
        ));

        // A fold that just collects the vector
        let vec_type = Type::vec_of(input_row_type.clone());
        let zero: Expr = Apply::new("Vec::new", Vec::new(), vec_type.clone()).into();
        let accumulator = Variable::new("a", vec_type.clone());
        let row = Variable::new("v", input_row_type.clone());
        let weight = Variable::new("w", Type::weight());
        let push: Expr = Apply::new(
            "weighted_push",
            vec![
                Expr::from(&accumulator),
                Expr::from(&row),
                Expr::from(&weight),
            ],
            Type::raw_tuple(Vec::new()),
        )
        .into();
        let push = push.closure(vec![
            accumulator.as_ref_parameter(),
            row.as_ref_parameter(),
            weight.as_parameter(),
        ]);
        let folder: Expr = Apply::new("Fold::new", vec![zero, push], Type::any()).into();
        let aggregate = self.circuit.add(Aggregate::with_function(
            folder,
            empty_key_type,
            vec_type.clone(),
            index,
            node.position,
        ));

        // The lexicographic comparator from the collation list
        let mut comparator = ComparatorExpr::empty(input_row_type.clone());
        for collation in collations {
            let ascending = match collation.direction {
                Direction::Ascending => true,
                Direction::Descending => false,
                Direction::StrictlyAscending
                | Direction::StrictlyDescending
                | Direction::Clustered => {
                    return Err(CompileError::unimplemented(
                        format!("{:?} collation", collation.direction),
                        node.position,
                    ))
                }
            };
            comparator = comparator.then_field(collation.field, ascending);
        }
        let sorter: Expr = SortExpr::new(input_row_type, comparator, fetch).into();
        let id = self.circuit.add(Map::new(
            sorter,
            aggregate,
            Type::zset(vec_type),
            node.position,
        ));
        self.assign(node, id);
        Ok(())
    }

    /// Only decorrelated unnest shapes are lowered:
    ///
    /// ```text
    /// Correlate
    ///   LeftSubquery
    ///   Uncollect
    ///     Project($cor.ARRAY)
    ///       Values
    /// ```
    ///
    /// Instead of projecting and joining again, a single FlatMap
    /// clones the outer row's fields into each exploded element.
    fn visit_correlate(&mut self, node: &Rc<RelNode>) -> Result<(), CompileError> {
        let RelKind::Correlate { left, right, kind } = &node.kind else {
            unreachable!("visit_correlate requires a correlate node");
        };
        let row_type = node.converted_row_type();
        if kind.is_outer() {
            return Err(CompileError::unimplemented(
                "outer correlate",
                node.position,
            ));
        }

        self.visit(left)?;
        let left_op = self.input_as(left, true)?;
        let left_element = self.circuit.get(left_op).output_element_type().clone();

        let RelKind::Uncollect {
            input: uncollect_input,
            with_ordinality,
        } = &right.kind
        else {
            return Err(CompileError::unimplemented(
                "correlate whose right side is not an unnest",
                node.position,
            ));
        };
        let RelKind::Project { exprs, .. } = &uncollect_input.kind else {
            return Err(CompileError::unimplemented(
                "unnest over a non-projection",
                node.position,
            ));
        };
        let [projection] = exprs.as_slice() else {
            return Err(CompileError::unimplemented(
                "unnest projecting several columns",
                node.position,
            ));
        };
        let ScalarExpr::CorrelatedField { field, .. } = projection else {
            return Err(CompileError::unimplemented(
                "unnest of a non-correlated column",
                node.position,
            ));
        };

        let array_field_index = left
            .row_type
            .iter()
            .position(|f| &f.name == field)
            .ok_or_else(|| {
                CompileError::translation(
                    format!("left input has no field named {field}"),
                    node.position,
                )
            })?;
        let output_fields: Vec<usize> = (0..left_element.size()).collect();
        let index_type = with_ordinality
            // The ordinality field is always last
            .then(|| row_type.field(row_type.size() - 1).clone());

        let function = flatmap_expression(
            &left_element,
            array_field_index,
            &output_fields,
            index_type,
        );
        let id = self.circuit.add(FlatMap::new(
            function,
            left_op,
            Type::zset(row_type),
            node.position,
        ));
        self.assign(node, id);
        Ok(())
    }

    /// A standalone unnest: expand field 0 of the single-column input
    /// row.
    fn visit_uncollect(
        &mut self,
        node: &RelNode,
        input: &Rc<RelNode>,
        with_ordinality: bool,
    ) -> Result<(), CompileError> {
        let row_type = node.converted_row_type();
        let input_row_type = input.converted_row_type();
        let op_input = self.input_as(input, true)?;
        let index_type = with_ordinality.then(|| row_type.field(row_type.size() - 1).clone());
        let function = flatmap_expression(&input_row_type, 0, &[], index_type);
        let id = self.circuit.add(FlatMap::new(
            function,
            op_input,
            Type::zset(row_type),
            node.position,
        ));
        self.assign(node, id);
        Ok(())
    }
}

enum OuterSide {
    Left,
    Right,
}

impl OuterSide {
    const fn var_name(&self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Right => "r",
        }
    }
}

/// Builds the flat-map closure of an unnest:
///
/// ```text
/// |x| x.array.clone().into_iter().map(|e| (x.other_fields..., e))
/// ```
///
/// With an ordinality type, the iterator is enumerated and the
/// (1-based) position is appended as the final field.
/// The maximum value of an order-key type, used for unbounded window
/// frames.
fn numeric_limit(sort_type: &Type, position: SourcePosition) -> Result<Expr, CompileError> {
    let literal: Expr = match sort_type.kind() {
        TypeKind::Int { width, .. } => match width {
            IntWidth::W16 => Literal::i16(i16::MAX).into(),
            IntWidth::W32 => Literal::i32(i32::MAX).into(),
            IntWidth::W64 => Literal::i64(i64::MAX).into(),
        },
        TypeKind::Timestamp => Expr::from(Literal::i64(i64::MAX)).cast(sort_type),
        _ => {
            return Err(CompileError::unimplemented(
                format!("window bound of type {sort_type}"),
                position,
            ))
        }
    };
    Ok(literal.cast(sort_type))
}

/// The zero of an order-key type, used for CURRENT ROW bounds.
fn numeric_zero(sort_type: &Type, position: SourcePosition) -> Result<Expr, CompileError> {
    let literal: Expr = match sort_type.kind() {
        TypeKind::Int { width, .. } => match width {
            IntWidth::W16 => Literal::i16(0).into(),
            IntWidth::W32 => Literal::i32(0).into(),
            IntWidth::W64 => Literal::i64(0).into(),
        },
        TypeKind::Timestamp => Expr::from(Literal::i64(0)).cast(sort_type),
        _ => {
            return Err(CompileError::unimplemented(
                format!("window bound of type {sort_type}"),
                position,
            ))
        }
    };
    Ok(literal.cast(sort_type))
}

fn flatmap_expression(
    input_row: &Type,
    array_field: usize,
    output_fields: &[usize],
    index_type: Option<Type>,
) -> Expr {
    let x = Variable::new("x", input_row.ref_type());
    let array = Expr::from(&x).field(array_field).clone_if_needed();
    let element_type = input_row.field(array_field).vec_element().clone();
    let iterator: Expr = ApplyMethod::new("into_iter", array, Vec::new(), Type::any()).into();

    let outer_fields = |x: &Variable| -> Vec<Expr> {
        output_fields
            .iter()
            .map(|&field| Expr::from(x).field(field).clone_if_needed())
            .collect()
    };

    let body: Expr = match index_type {
        None => {
            let element = Variable::new("e", element_type);
            let mut fields = outer_fields(&x);
            fields.push(Expr::from(&element));
            let each =
                Expr::from(TupleExpr::new(fields)).closure(vec![element.as_parameter()]);
            ApplyMethod::new("map", iterator, vec![each], Type::any()).into()
        }
        Some(index_type) => {
            let enumerated: Expr =
                ApplyMethod::new("enumerate", iterator, Vec::new(), Type::any()).into();
            let element = Variable::new(
                "e",
                Type::raw_tuple(vec![Type::usize(), element_type]),
            );
            let mut fields = outer_fields(&x);
            fields.push(Expr::from(&element).field(1));
            // SQL ordinality is 1-based
            let position: Expr = Binary::new(
                Opcode::Add,
                Expr::from(&element).field(0),
                Literal::usize(1).into(),
                Type::usize(),
            )
            .into();
            fields.push(position.cast(&index_type));
            let each =
                Expr::from(TupleExpr::new(fields)).closure(vec![element.as_parameter()]);
            ApplyMethod::new("map", enumerated, vec![each], Type::any()).into()
        }
    };

    body.closure(vec![x.as_parameter()])
}
