//! Direct AST-walking executor.
//!
//! No separate logical plan: each clause runs against the current binding
//! row-set in source order. MATCH/OPTIONAL MATCH expand rows, WHERE filters
//! them, RETURN projects them. CREATE runs a declare-then-materialize pass
//! over its own patterns.

use std::collections::HashMap;

use crate::cypher::ast::{
    BinaryOp, CreateClause, Expr, Literal, MatchClause, NodePattern, Pattern, PatternDirection,
    PatternElement, Query, RelPattern, ReturnClause, Statement, StringOp, UnaryOp,
};
use crate::model::{Direction, Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::storage::GraphStore;
use crate::tx::{PendingSnapshot, TransactionManager};
use crate::{Error, Result};

/// One projected output row.
pub type Row = HashMap<String, Value>;

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryResult {
    pub records: Vec<Row>,
    pub counters: Counters,
}

/// Parses and runs `query_text` against `storage`, optionally scoped to an
/// open transaction. `tx_id` must already be `Active` in `tx_manager` when
/// present — the dispatcher is responsible for that check.
pub async fn execute(
    storage: &dyn GraphStore,
    tx_manager: &TransactionManager,
    tx_id: Option<&str>,
    query_text: &str,
    params: PropertyMap,
) -> Result<QueryResult> {
    let statement = crate::cypher::parse(query_text)?;
    let ctx = ExecCtx {
        storage,
        tx_manager,
        tx_id,
        params,
    };
    let mut counters = Counters::default();

    let records = match &statement {
        Statement::Query(query) => execute_query(query, &ctx).await?,
        Statement::Create(create) => execute_create(create, &ctx, &mut counters).await?,
        Statement::Merge(_) => {
            return Err(Error::NotImplemented(
                "MERGE is not part of the accepted Cypher subset".into(),
            ))
        }
        Statement::Delete(_) => {
            return Err(Error::NotImplemented(
                "DELETE is not part of the accepted Cypher subset".into(),
            ))
        }
        Statement::Set(_) => {
            return Err(Error::NotImplemented(
                "SET is not part of the accepted Cypher subset".into(),
            ))
        }
        Statement::Remove(_) => {
            return Err(Error::NotImplemented(
                "REMOVE is not part of the accepted Cypher subset".into(),
            ))
        }
        Statement::Schema(_) => {
            return Err(Error::NotImplemented(
                "schema commands are not part of the accepted Cypher subset".into(),
            ))
        }
    };

    Ok(QueryResult { records, counters })
}

struct ExecCtx<'a> {
    storage: &'a dyn GraphStore,
    tx_manager: &'a TransactionManager,
    tx_id: Option<&'a str>,
    params: PropertyMap,
}

impl ExecCtx<'_> {
    async fn pending_snapshot(&self) -> Result<Option<PendingSnapshot>> {
        match self.tx_id {
            Some(tx_id) => Ok(Some(self.tx_manager.snapshot_pending(tx_id)?)),
            None => Ok(None),
        }
    }

    async fn resolve_node_by_id(&self, id: NodeId) -> Result<Option<Node>> {
        if let Some(pending) = self.pending_snapshot().await? {
            if pending.deleted_node_ids.contains(&id) {
                return Ok(None);
            }
            if let Some(n) = pending.nodes.get(&id) {
                return Ok(Some(n.clone()));
            }
        }
        self.storage.get_node(id).await
    }

    async fn materialize_node(&self, labels: Vec<String>, properties: PropertyMap) -> Result<Node> {
        match self.tx_id {
            Some(tx_id) => {
                let node = Node::new(self.storage.allocate_node_id(), labels, properties);
                self.tx_manager.stage_created_node(tx_id, node.clone())?;
                Ok(node)
            }
            None => self.storage.create_node(labels, properties).await,
        }
    }

    async fn materialize_relationship(
        &self,
        rel_type: String,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Result<Relationship> {
        if self.resolve_node_by_id(start).await?.is_none() {
            return Err(Error::NotFound(format!("node {start}")));
        }
        if self.resolve_node_by_id(end).await?.is_none() {
            return Err(Error::NotFound(format!("node {end}")));
        }
        match self.tx_id {
            Some(tx_id) => {
                let rel = Relationship::new(
                    self.storage.allocate_relationship_id(),
                    rel_type,
                    start,
                    end,
                    properties,
                );
                self.tx_manager.stage_created_relationship(tx_id, rel.clone())?;
                Ok(rel)
            }
            None => {
                self.storage
                    .create_relationship(&rel_type, start, end, properties)
                    .await
            }
        }
    }
}

// ============================================================================
// CREATE
// ============================================================================

async fn execute_create(
    clause: &CreateClause,
    ctx: &ExecCtx<'_>,
    counters: &mut Counters,
) -> Result<Vec<Row>> {
    let mut row: Row = HashMap::new();

    for pattern in &clause.patterns {
        create_pattern(pattern, &mut row, ctx, counters).await?;
    }

    match &clause.return_clause {
        Some(return_clause) if !row.is_empty() => {
            Ok(vec![project_return(return_clause, &row, &ctx.params)?])
        }
        _ => Ok(Vec::new()),
    }
}

async fn create_pattern(
    pattern: &Pattern,
    row: &mut Row,
    ctx: &ExecCtx<'_>,
    counters: &mut Counters,
) -> Result<()> {
    let mut last_node_id: Option<NodeId> = None;
    let mut pending_rel: Option<&RelPattern> = None;

    for element in &pattern.elements {
        match element {
            PatternElement::Node(np) => {
                let node_id = create_or_reuse_node(np, row, ctx, counters).await?;
                if let Some(rel_pattern) = pending_rel.take() {
                    let anchor = last_node_id.ok_or_else(|| {
                        Error::SemanticError("relationship pattern has no preceding node".into())
                    })?;
                    let (start, end) = match rel_pattern.direction {
                        PatternDirection::Left => (node_id, anchor),
                        _ => (anchor, node_id),
                    };
                    let rel_type = rel_pattern
                        .rel_types
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "RELATED_TO".to_string());
                    let props = eval_property_map(&rel_pattern.properties, row, &ctx.params)?;
                    let rel = ctx
                        .materialize_relationship(rel_type, start, end, props.clone())
                        .await?;
                    counters.relationships_created += 1;
                    counters.properties_set += props.len() as u64;
                    if let Some(alias) = &rel_pattern.alias {
                        row.insert(alias.clone(), Value::Relationship(Box::new(rel)));
                    }
                }
                last_node_id = Some(node_id);
            }
            PatternElement::Relationship(rp) => {
                pending_rel = Some(rp);
            }
        }
    }
    Ok(())
}

async fn create_or_reuse_node(
    np: &NodePattern,
    row: &mut Row,
    ctx: &ExecCtx<'_>,
    counters: &mut Counters,
) -> Result<NodeId> {
    if let Some(alias) = &np.alias {
        if let Some(Value::Node(existing)) = row.get(alias) {
            return Ok(existing.id);
        }
    }
    let props = eval_property_map(&np.properties, row, &ctx.params)?;
    let labels = np.labels.clone();
    let node = ctx.materialize_node(labels.clone(), props.clone()).await?;
    counters.nodes_created += 1;
    counters.labels_added += labels.len() as u64;
    counters.properties_set += props.len() as u64;
    let id = node.id;
    if let Some(alias) = &np.alias {
        row.insert(alias.clone(), Value::Node(Box::new(node)));
    }
    Ok(id)
}

// ============================================================================
// MATCH / RETURN
// ============================================================================

async fn execute_query(query: &Query, ctx: &ExecCtx<'_>) -> Result<Vec<Row>> {
    let mut rows: Vec<Row> = vec![HashMap::new()];

    for clause in &query.matches {
        rows = execute_match_clause(clause, rows, ctx).await?;
        if rows.is_empty() {
            break;
        }
    }

    if let Some(where_expr) = &query.where_clause {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if eval_expr(where_expr, &row, &ctx.params)?.is_truthy() {
                kept.push(row);
            }
        }
        rows = kept;
    }

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(project_return(&query.return_clause, row, &ctx.params)?);
    }

    if let Some(order) = &query.order_by {
        records.sort_by(|a, b| {
            for term in order {
                let key = canonical_key(&term.expr);
                let ord = match (a.get(&key), b.get(&key)) {
                    (Some(x), Some(y)) => x.numeric_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
                    _ => std::cmp::Ordering::Equal,
                };
                let ord = if term.ascending { ord } else { ord.reverse() };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    if let Some(skip_expr) = &query.skip {
        let n = eval_expr(skip_expr, &HashMap::new(), &ctx.params)?
            .as_int()
            .unwrap_or(0)
            .max(0) as usize;
        if n >= records.len() {
            records.clear();
        } else {
            records.drain(0..n);
        }
    }
    if let Some(limit_expr) = &query.limit {
        let n = eval_expr(limit_expr, &HashMap::new(), &ctx.params)?
            .as_int()
            .unwrap_or(0)
            .max(0) as usize;
        records.truncate(n);
    }

    Ok(records)
}

async fn execute_match_clause(
    clause: &MatchClause,
    rows: Vec<Row>,
    ctx: &ExecCtx<'_>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        let mut extended = vec![row.clone()];
        for pattern in &clause.patterns {
            let mut next = Vec::new();
            for r in &extended {
                next.extend(evaluate_pattern(pattern, r, ctx).await?);
            }
            extended = next;
            if extended.is_empty() {
                break;
            }
        }
        if extended.is_empty() && clause.optional {
            let mut null_row = row;
            for pattern in &clause.patterns {
                bind_nulls(pattern, &mut null_row);
            }
            out.push(null_row);
        } else {
            out.extend(extended);
        }
    }
    Ok(out)
}

fn bind_nulls(pattern: &Pattern, row: &mut Row) {
    for element in &pattern.elements {
        match element {
            PatternElement::Node(np) => {
                if let Some(alias) = &np.alias {
                    row.entry(alias.clone()).or_insert(Value::Null);
                }
            }
            PatternElement::Relationship(rp) => {
                if let Some(alias) = &rp.alias {
                    row.entry(alias.clone()).or_insert(Value::Null);
                }
            }
        }
    }
}

async fn evaluate_pattern(pattern: &Pattern, base_row: &Row, ctx: &ExecCtx<'_>) -> Result<Vec<Row>> {
    let elements = &pattern.elements;
    let first = match elements.first() {
        Some(PatternElement::Node(np)) => np,
        _ => return Err(Error::SemanticError("pattern must start with a node".into())),
    };

    let mut frontier: Vec<(Row, NodeId)> = Vec::new();
    for candidate_row in resolve_node_candidates(first, base_row, ctx).await? {
        let id = match candidate_row.get(first.alias.as_deref().unwrap_or("")) {
            Some(Value::Node(n)) => n.id,
            _ => continue,
        };
        frontier.push((candidate_row, id));
    }
    if frontier.is_empty() {
        return Ok(Vec::new());
    }

    let mut i = 1;
    while i + 1 < elements.len() {
        let rel_pattern = match &elements[i] {
            PatternElement::Relationship(rp) => rp,
            _ => return Err(Error::SemanticError("malformed relationship pattern".into())),
        };
        let node_pattern = match &elements[i + 1] {
            PatternElement::Node(np) => np,
            _ => return Err(Error::SemanticError("malformed node pattern".into())),
        };

        let mut next_frontier = Vec::new();
        for (row, anchor) in frontier {
            for (rel, other_id) in relationship_candidates(rel_pattern, anchor, &row, ctx).await? {
                let mut candidate_row = row.clone();
                if let Some(alias) = &rel_pattern.alias {
                    candidate_row.insert(alias.clone(), Value::Relationship(Box::new(rel)));
                }
                for bound_row in resolve_node_candidates(node_pattern, &candidate_row, ctx).await? {
                    match bound_row.get(node_pattern.alias.as_deref().unwrap_or("")) {
                        Some(Value::Node(n)) if n.id == other_id => {
                            next_frontier.push((bound_row, n.id));
                        }
                        None if node_pattern.alias.is_none() => {
                            next_frontier.push((bound_row, other_id));
                        }
                        _ => {}
                    }
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            return Ok(Vec::new());
        }
        i += 2;
    }

    Ok(frontier.into_iter().map(|(row, _)| row).collect())
}

async fn resolve_node_candidates(pattern: &NodePattern, row: &Row, ctx: &ExecCtx<'_>) -> Result<Vec<Row>> {
    let filter_props = eval_property_map(&pattern.properties, row, &ctx.params)?;

    if let Some(alias) = &pattern.alias {
        if let Some(bound) = row.get(alias) {
            return match bound {
                Value::Node(n) if node_matches(n, &pattern.labels, &filter_props) => Ok(vec![row.clone()]),
                _ => Ok(Vec::new()),
            };
        }
    }

    let mut by_id: HashMap<NodeId, Node> = HashMap::new();
    let committed = if let Some(label) = pattern.labels.first() {
        ctx.storage.find_nodes_by_label(label).await?
    } else {
        ctx.storage.all_nodes().await?
    };
    for n in committed {
        by_id.insert(n.id, n);
    }
    if let Some(pending) = ctx.pending_snapshot().await? {
        for n in pending.nodes.values() {
            if pending.deleted_node_ids.contains(&n.id) {
                continue;
            }
            by_id.insert(n.id, n.clone());
        }
        for id in &pending.deleted_node_ids {
            by_id.remove(id);
        }
    }

    let mut out = Vec::new();
    for node in by_id.into_values() {
        if node_matches(&node, &pattern.labels, &filter_props) {
            let mut new_row = row.clone();
            if let Some(alias) = &pattern.alias {
                new_row.insert(alias.clone(), Value::Node(Box::new(node)));
            }
            out.push(new_row);
        }
    }
    Ok(out)
}

async fn relationship_candidates(
    pattern: &RelPattern,
    anchor: NodeId,
    row: &Row,
    ctx: &ExecCtx<'_>,
) -> Result<Vec<(Relationship, NodeId)>> {
    if let Some(alias) = &pattern.alias {
        if let Some(Value::Relationship(r)) = row.get(alias) {
            if !matches_direction(pattern.direction, r, anchor) {
                return Ok(Vec::new());
            }
            if !pattern.rel_types.is_empty() && !pattern.rel_types.contains(&r.rel_type) {
                return Ok(Vec::new());
            }
            let other = r.other_node(anchor).unwrap_or(anchor);
            return Ok(vec![((**r).clone(), other)]);
        }
    }

    let dir = match pattern.direction {
        PatternDirection::Right => Direction::Outgoing,
        PatternDirection::Left => Direction::Incoming,
        PatternDirection::Both => Direction::Both,
    };

    let mut by_id: HashMap<RelId, Relationship> = HashMap::new();
    for r in ctx.storage.relationships_of(anchor, dir, None).await? {
        by_id.insert(r.id, r);
    }
    if let Some(pending) = ctx.pending_snapshot().await? {
        for r in pending.relationships.values() {
            if pending.deleted_relationship_ids.contains(&r.id) {
                continue;
            }
            if matches_direction(pattern.direction, r, anchor) {
                by_id.insert(r.id, r.clone());
            }
        }
        for id in &pending.deleted_relationship_ids {
            by_id.remove(id);
        }
    }

    let filter_props = eval_property_map(&pattern.properties, row, &ctx.params)?;
    let mut out = Vec::new();
    for rel in by_id.into_values() {
        if !pattern.rel_types.is_empty() && !pattern.rel_types.contains(&rel.rel_type) {
            continue;
        }
        if !filter_props.iter().all(|(k, v)| rel.properties.get(k) == Some(v)) {
            continue;
        }
        let other = rel.other_node(anchor).unwrap_or(anchor);
        out.push((rel, other));
    }
    Ok(out)
}

fn matches_direction(direction: PatternDirection, rel: &Relationship, anchor: NodeId) -> bool {
    match direction {
        PatternDirection::Right => rel.start_node_id == anchor,
        PatternDirection::Left => rel.end_node_id == anchor,
        PatternDirection::Both => rel.start_node_id == anchor || rel.end_node_id == anchor,
    }
}

fn node_matches(node: &Node, labels: &[String], props: &PropertyMap) -> bool {
    node.has_all_labels(labels) && props.iter().all(|(k, v)| node.properties.get(k) == Some(v))
}

// ============================================================================
// Expressions
// ============================================================================

fn eval_property_map(exprs: &HashMap<String, Expr>, row: &Row, params: &PropertyMap) -> Result<PropertyMap> {
    let mut out = PropertyMap::new();
    for (k, expr) in exprs {
        out.insert(k.clone(), eval_expr(expr, row, params)?);
    }
    Ok(out)
}

fn eval_expr(expr: &Expr, row: &Row, params: &PropertyMap) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),
        Expr::Variable(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SemanticError(format!("variable `{name}` is not defined"))),
        Expr::Property { expr, key } => {
            let base = eval_expr(expr, row, params)?;
            match base {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                Value::Relationship(r) => Ok(r.properties.get(key).cloned().unwrap_or(Value::Null)),
                Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(Error::SemanticError(format!(
                    "cannot access property `{key}` on a {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ParameterMissing(name.clone())),
        Expr::FunctionCall { name, args, .. } => eval_function(name, args, row, params),
        Expr::BinaryOp { left, op, right } => eval_binary(*op, left, right, row, params),
        Expr::UnaryOp { op, expr } => {
            let v = eval_expr(expr, row, params)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Negate => match v {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    _ => Err(Error::SemanticError("unary minus requires a numeric operand".into())),
                },
            }
        }
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, row, params)?);
            }
            Ok(Value::List(out))
        }
        Expr::MapLiteral(map) => Ok(Value::Map(eval_property_map(map, row, params)?)),
        Expr::In { expr, list } => {
            let needle = eval_expr(expr, row, params)?;
            match eval_expr(list, row, params)? {
                Value::List(items) => Ok(Value::Bool(items.iter().any(|v| v.strict_eq(&needle)))),
                _ => Err(Error::SemanticError("IN requires a list operand".into())),
            }
        }
        Expr::IsNull { expr, negated } => {
            let v = eval_expr(expr, row, params)?;
            Ok(Value::Bool(v.is_null() != *negated))
        }
        Expr::HasLabel { expr, label } => {
            let v = eval_expr(expr, row, params)?;
            match v {
                Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
                _ => Ok(Value::Bool(false)),
            }
        }
        Expr::StringOp { left, op, right } => {
            let l = eval_expr(left, row, params)?;
            let r = eval_expr(right, row, params)?;
            match (l.as_str(), r.as_str()) {
                (Some(l), Some(r)) => Ok(Value::Bool(match op {
                    StringOp::StartsWith => l.starts_with(r),
                    StringOp::EndsWith => l.ends_with(r),
                    StringOp::Contains => l.contains(r),
                })),
                _ => Err(Error::SemanticError("string operators require string operands".into())),
            }
        }
        Expr::Case { .. } | Expr::Exists(_) | Expr::Star => {
            Err(Error::SemanticError("unsupported expression kind".into()))
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, row: &Row, params: &PropertyMap) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(Value::Bool(
            eval_expr(left, row, params)?.is_truthy() && eval_expr(right, row, params)?.is_truthy(),
        )),
        BinaryOp::Or => Ok(Value::Bool(
            eval_expr(left, row, params)?.is_truthy() || eval_expr(right, row, params)?.is_truthy(),
        )),
        BinaryOp::Xor => Ok(Value::Bool(
            eval_expr(left, row, params)?.is_truthy() ^ eval_expr(right, row, params)?.is_truthy(),
        )),
        BinaryOp::RegexMatch => Err(Error::SemanticError(
            "regular expression matching is not supported".into(),
        )),
        _ => {
            let l = eval_expr(left, row, params)?;
            let r = eval_expr(right, row, params)?;
            match op {
                BinaryOp::Eq => Ok(Value::Bool(l.strict_eq(&r))),
                BinaryOp::Neq => Ok(Value::Bool(!l.strict_eq(&r))),
                BinaryOp::Lt => Ok(Value::Bool(l.numeric_cmp(&r) == Some(std::cmp::Ordering::Less))),
                BinaryOp::Lte => Ok(Value::Bool(matches!(
                    l.numeric_cmp(&r),
                    Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
                ))),
                BinaryOp::Gt => Ok(Value::Bool(l.numeric_cmp(&r) == Some(std::cmp::Ordering::Greater))),
                BinaryOp::Gte => Ok(Value::Bool(matches!(
                    l.numeric_cmp(&r),
                    Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
                ))),
                BinaryOp::Add => match (&l, &r) {
                    (Value::String(a), _) => Ok(Value::String(format!("{a}{}", display_bare(&r)))),
                    (_, Value::String(b)) => Ok(Value::String(format!("{}{b}", display_bare(&l)))),
                    _ => numeric_binop(&l, &r, |a, b| a + b, |a, b| a + b),
                },
                BinaryOp::Sub => numeric_binop(&l, &r, |a, b| a - b, |a, b| a - b),
                BinaryOp::Mul => numeric_binop(&l, &r, |a, b| a * b, |a, b| a * b),
                BinaryOp::Div => numeric_binop(&l, &r, |a, b| a / b, |a, b| a / b),
                BinaryOp::Mod => numeric_binop(&l, &r, |a, b| a % b, |a, b| a % b),
                BinaryOp::Pow => {
                    let a = l
                        .as_float()
                        .ok_or_else(|| Error::SemanticError("^ requires numeric operands".into()))?;
                    let b = r
                        .as_float()
                        .ok_or_else(|| Error::SemanticError("^ requires numeric operands".into()))?;
                    Ok(Value::Float(a.powf(b)))
                }
                BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::RegexMatch => unreachable!(),
            }
        }
    }
}

fn display_bare(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_binop(
    l: &Value,
    r: &Value,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        _ => {
            let a = l
                .as_float()
                .ok_or_else(|| Error::SemanticError("arithmetic requires numeric operands".into()))?;
            let b = r
                .as_float()
                .ok_or_else(|| Error::SemanticError("arithmetic requires numeric operands".into()))?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn eval_function(name: &str, args: &[Expr], row: &Row, params: &PropertyMap) -> Result<Value> {
    let lname = name.to_ascii_lowercase();
    match lname.as_str() {
        "id" => {
            expect_arity(name, args, 1)?;
            match eval_expr(&args[0], row, params)? {
                Value::Node(n) => Ok(Value::Int(n.id.0 as i64)),
                Value::Relationship(r) => Ok(Value::Int(r.id.0 as i64)),
                _ => Err(Error::SemanticError("id() requires a node or relationship".into())),
            }
        }
        "labels" => {
            expect_arity(name, args, 1)?;
            match eval_expr(&args[0], row, params)? {
                Value::Node(n) => Ok(Value::List(n.labels.iter().map(|l| Value::String(l.clone())).collect())),
                _ => Err(Error::SemanticError("labels() requires a node".into())),
            }
        }
        "type" => {
            expect_arity(name, args, 1)?;
            match eval_expr(&args[0], row, params)? {
                Value::Relationship(r) => Ok(Value::String(r.rel_type.clone())),
                _ => Err(Error::SemanticError("type() requires a relationship".into())),
            }
        }
        "properties" => {
            expect_arity(name, args, 1)?;
            match eval_expr(&args[0], row, params)? {
                Value::Node(n) => Ok(Value::Map(n.properties.clone())),
                Value::Relationship(r) => Ok(Value::Map(r.properties.clone())),
                _ => Err(Error::SemanticError("properties() requires a node or relationship".into())),
            }
        }
        "count" => {
            expect_arity(name, args, 1)?;
            Ok(Value::Int(1))
        }
        _ => Err(Error::SyntaxError {
            position: 0,
            message: format!("unknown function `{name}`"),
        }),
    }
}

fn expect_arity(name: &str, args: &[Expr], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::SyntaxError {
            position: 0,
            message: format!("`{name}` expects {expected} argument(s), got {}", args.len()),
        });
    }
    Ok(())
}

// ============================================================================
// RETURN projection
// ============================================================================

fn project_return(clause: &ReturnClause, row: &Row, params: &PropertyMap) -> Result<Row> {
    let mut out = Row::new();
    for item in &clause.items {
        if matches!(item.expr, Expr::Star) {
            out.extend(row.clone());
            continue;
        }
        let key = item.alias.clone().unwrap_or_else(|| canonical_key(&item.expr));
        out.insert(key, eval_expr(&item.expr, row, params)?);
    }
    Ok(out)
}

fn canonical_key(expr: &Expr) -> String {
    match expr {
        Expr::Variable(name) => name.clone(),
        Expr::Property { expr, key } => format!("{}.{}", canonical_key(expr), key),
        Expr::FunctionCall { name, args, .. } => {
            format!("{}({})", name, args.iter().map(canonical_key).collect::<Vec<_>>().join(", "))
        }
        Expr::Parameter(name) => format!("${name}"),
        _ => "expr".to_string(),
    }
}
