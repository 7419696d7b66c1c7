//! Statement guard: only single read-only queries over the requested table
//! reach the store.

use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::identifier::DatasetId;

/// Schema a bare table name resolves to
const DEFAULT_SCHEMA: &str = "main";

/// CTE names introduced by one query, and what its own parts may see
struct QueryScope {
    /// Names visible from enclosing queries
    inherited: HashSet<String>,
    /// This query's CTEs in declaration order, with their bodies
    ctes: Vec<(String, *const Query)>,
    recursive: bool,
}

impl QueryScope {
    /// Names visible inside this query's body and ordinary subqueries
    fn visible(&self) -> HashSet<String> {
        let mut names = self.inherited.clone();
        names.extend(self.ctes.iter().map(|(name, _)| name.clone()));
        names
    }

    /// Names visible inside the body of this query's CTE number `idx`.
    /// A CTE sees the ones declared before it, and itself only when recursive.
    fn visible_in_cte(&self, idx: usize) -> HashSet<String> {
        let upto = if self.recursive { idx + 1 } else { idx };
        let mut names = self.inherited.clone();
        names.extend(self.ctes[..upto].iter().map(|(name, _)| name.clone()));
        names
    }
}

struct StatementScan<'a> {
    table: &'a DatasetId,
    scopes: Vec<QueryScope>,
    relations: usize,
    foreign: Vec<String>,
    writes: Vec<String>,
    select_into: bool,
}

impl<'a> StatementScan<'a> {
    fn new(table: &'a DatasetId) -> Self {
        Self {
            table,
            scopes: Vec::new(),
            relations: 0,
            foreign: Vec::new(),
            writes: Vec::new(),
            select_into: false,
        }
    }

    fn names_visible_to(&self, query: &Query) -> HashSet<String> {
        let Some(parent) = self.scopes.last() else {
            return HashSet::new();
        };
        let ptr: *const Query = query;
        match parent.ctes.iter().position(|(_, body)| *body == ptr) {
            Some(idx) => parent.visible_in_cte(idx),
            None => parent.visible(),
        }
    }
}

impl Visitor for StatementScan<'_> {
    type Break = ();

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<()> {
        if !matches!(statement, Statement::Query(_)) {
            self.writes.push(statement_keyword(statement));
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        let inherited = self.names_visible_to(query);
        let (ctes, recursive) = match &query.with {
            Some(with) => (
                with.cte_tables
                    .iter()
                    .map(|cte| {
                        let body: *const Query = &*cte.query;
                        (cte.alias.name.value.to_ascii_lowercase(), body)
                    })
                    .collect(),
                with.recursive,
            ),
            None => (Vec::new(), false),
        };
        self.scopes.push(QueryScope {
            inherited,
            ctes,
            recursive,
        });

        if has_select_into(&query.body) {
            self.select_into = true;
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.relations += 1;
        let parts: Vec<String> = relation
            .0
            .iter()
            .map(|part| unquote(&part.to_string()).to_string())
            .collect();

        let is_cte = match parts.as_slice() {
            [name] => self
                .scopes
                .last()
                .is_some_and(|scope| scope.visible().contains(&name.to_ascii_lowercase())),
            _ => false,
        };
        if !is_cte && !references_table(&parts, self.table) {
            self.foreign.push(parts.join("."));
        }
        ControlFlow::Continue(())
    }
}

fn has_select_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => has_select_into(&query.body),
        SetExpr::SetOperation { left, right, .. } => has_select_into(left) || has_select_into(right),
        _ => false,
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_ascii_uppercase()
}

fn unquote(part: &str) -> &str {
    part.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(part)
}

fn references_table(parts: &[String], table: &DatasetId) -> bool {
    match parts {
        [name] => name.eq_ignore_ascii_case(table.as_str()),
        [schema, name] => {
            schema.eq_ignore_ascii_case(DEFAULT_SCHEMA) && name.eq_ignore_ascii_case(table.as_str())
        }
        _ => false,
    }
}

/// Reject anything other than one read-only query that reads only `table`
/// (and CTEs it defines itself).
pub fn check_statement(sql: &str, table: &DatasetId) -> Result<()> {
    let statements = Parser::parse_sql(&DuckDbDialect {}, sql)
        .map_err(|e| PipelineError::TranslationInvalid(format!("statement does not parse: {e}")))?;

    let statement = match statements.as_slice() {
        [single] => single,
        [] => return Err(PipelineError::TranslationInvalid("no statement".to_string())),
        many => {
            return Err(PipelineError::TranslationInvalid(format!(
                "expected one statement, got {}",
                many.len()
            )))
        }
    };

    let mut scan = StatementScan::new(table);
    let _ = statement.visit(&mut scan);

    if let Some(keyword) = scan.writes.first() {
        return Err(PipelineError::TranslationInvalid(format!(
            "only SELECT queries are allowed, got {keyword}"
        )));
    }
    if scan.select_into {
        return Err(PipelineError::TranslationInvalid(
            "SELECT ... INTO is not allowed".to_string(),
        ));
    }

    if let Some(relation) = scan.foreign.first() {
        return Err(PipelineError::TranslationInvalid(format!(
            "statement reads '{}', only '{}' is allowed",
            relation, table
        )));
    }

    debug!(relations = scan.relations, "Statement accepted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sales() -> DatasetId {
        DatasetId::parse("SalesReport").unwrap()
    }

    fn rejected(sql: &str) -> bool {
        matches!(
            check_statement(sql, &sales()).map_err(|e| e.kind()),
            Err(ErrorKind::TranslationInvalid)
        )
    }

    #[test]
    fn test_accepts_reads_of_the_table() {
        for sql in [
            "SELECT * FROM SalesReport LIMIT 10",
            "select region, sum(amount) from salesreport group by region order by 2 desc",
            "SELECT * FROM \"SalesReport\" WHERE amount > 100",
            "SELECT * FROM main.SalesReport",
            "SELECT a.region FROM SalesReport a JOIN SalesReport b ON a.id = b.id",
            "WITH top AS (SELECT * FROM SalesReport ORDER BY amount DESC LIMIT 5) SELECT region FROM top",
            "SELECT count(*) FROM SalesReport WHERE id IN (SELECT id FROM SalesReport WHERE amount > 0)",
            "SELECT 1",
        ] {
            assert!(check_statement(sql, &sales()).is_ok(), "{sql} should be accepted");
        }
    }

    #[test]
    fn test_rejects_writes_and_ddl() {
        assert!(rejected("DROP TABLE SalesReport"));
        assert!(rejected("DELETE FROM SalesReport"));
        assert!(rejected("INSERT INTO SalesReport VALUES (1)"));
        assert!(rejected("UPDATE SalesReport SET amount = 0"));
        assert!(rejected("CREATE TABLE copy AS SELECT * FROM SalesReport"));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(rejected("SELECT 1; SELECT 2"));
        assert!(rejected("SELECT * FROM SalesReport; DROP TABLE SalesReport"));
    }

    #[test]
    fn test_rejects_other_relations() {
        assert!(rejected("SELECT * FROM Customers"));
        assert!(rejected("SELECT * FROM SalesReport JOIN Customers USING (id)"));
        assert!(rejected("SELECT * FROM read_csv('/etc/passwd')"));
        assert!(rejected("SELECT * FROM other_schema.SalesReport"));
        assert!(rejected("WITH x AS (SELECT * FROM secrets) SELECT * FROM x"));
        assert!(rejected("SELECT * FROM information_schema.tables"));
    }

    #[test]
    fn test_cte_names_only_cover_their_own_scope() {
        // A CTE inside a subquery does not hide a real table of the same name outside it
        assert!(rejected(
            "SELECT pw FROM secrets, (WITH secrets AS (SELECT 1 AS x) SELECT x FROM secrets) s"
        ));
        // A non-recursive CTE body resolves its own name to the base table
        assert!(rejected("WITH secrets AS (SELECT * FROM secrets) SELECT * FROM secrets"));
        // Earlier CTEs cannot see later ones
        assert!(rejected(
            "WITH a AS (SELECT * FROM b), b AS (SELECT * FROM SalesReport) SELECT * FROM a"
        ));
    }

    #[test]
    fn test_accepts_chained_and_recursive_ctes() {
        for sql in [
            "WITH a AS (SELECT * FROM SalesReport), b AS (SELECT region FROM a) SELECT * FROM b",
            "WITH RECURSIVE n AS (SELECT 1 AS i UNION ALL SELECT i + 1 FROM n WHERE i < 5) SELECT i FROM n",
            "WITH t AS (SELECT * FROM SalesReport) SELECT * FROM t WHERE id IN (SELECT id FROM t)",
        ] {
            assert!(check_statement(sql, &sales()).is_ok(), "{sql} should be accepted");
        }
    }

    #[test]
    fn test_rejects_unparseable_text() {
        assert!(rejected("show me the sales"));
        assert!(rejected(""));
    }
}
