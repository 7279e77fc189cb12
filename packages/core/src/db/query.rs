//! Tree Query Builder
//!
//! [`TreeQuery`] assembles a `SELECT` over a tree table from tree predicates
//! (self-or-ancestor, self-or-descendant, depth) and ordinary key filters.
//! Predicates are recorded as [`Condition`]s and only rendered by
//! [`TreeQuery::build`], which dispatches every tree predicate to the
//! configured [`Dialect`] and numbers placeholders in one pass.
//!
//! ```rust
//! use pathtree_core::db::{DialectKind, TreeFilter, TreeQuery};
//! use pathtree_core::models::Path;
//! use pathtree_core::TreeConfig;
//!
//! let config = TreeConfig::new("categories");
//! let path = Path::parse("1.2").unwrap();
//!
//! let statement = TreeQuery::new(&config, DialectKind::PrefixScan.dialect())
//!     .select(["categories.id"])
//!     .where_self_or_descendant("categories.path", &path)
//!     .where_key_not(&1i64.into())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     statement.sql,
//!     "SELECT categories.id FROM categories \
//!      WHERE (categories.path = ? OR categories.path LIKE ? ESCAPE '\\') \
//!      AND categories.id <> ?"
//! );
//! ```

use crate::config::TreeConfig;
use crate::db::dialect::{Bindings, Dialect};
use crate::db::error::DatabaseError;
use crate::models::{NodeKey, Path, TreeEntity};
use libsql::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Compiled statement with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// How a condition joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    fn as_sql(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Comparison used by depth filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl DepthOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            DepthOperator::Eq => "=",
            DepthOperator::NotEq => "<>",
            DepthOperator::Lt => "<",
            DepthOperator::LtEq => "<=",
            DepthOperator::Gt => ">",
            DepthOperator::GtEq => ">=",
        }
    }
}

impl FromStr for DepthOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(DepthOperator::Eq),
            "<>" | "!=" => Ok(DepthOperator::NotEq),
            "<" => Ok(DepthOperator::Lt),
            "<=" => Ok(DepthOperator::LtEq),
            ">" => Ok(DepthOperator::Gt),
            ">=" => Ok(DepthOperator::GtEq),
            other => Err(format!("Unknown depth operator: {}", other)),
        }
    }
}

impl fmt::Display for DepthOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A recorded predicate, rendered at build time.
///
/// Tree predicates built from an entity without a path keep `path: None`
/// and match nothing.
#[derive(Debug, Clone)]
pub enum Condition {
    SelfOrAncestor { column: String, path: Option<Path> },
    SelfOrDescendant { column: String, path: Option<Path> },
    Depth {
        column: String,
        operator: DepthOperator,
        depth: usize,
    },
    IsNull { column: String },
    Equals { column: String, value: Value },
    NotEquals { column: String, value: Value },
    Group(Vec<(Connector, Condition)>),
}

/// Columns predicates fall back to when none is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultColumns {
    pub key: String,
    pub parent: String,
    pub path: String,
}

impl DefaultColumns {
    fn for_qualifier(config: &TreeConfig, qualifier: &str) -> Self {
        Self {
            key: format!("{}.{}", qualifier, config.key_column),
            parent: format!("{}.{}", qualifier, config.parent_column),
            path: format!("{}.{}", qualifier, config.path_column),
        }
    }
}

/// Bind value for a key.
pub fn key_value(key: &NodeKey) -> Value {
    match key {
        NodeKey::Integer(value) => Value::Integer(*value),
        NodeKey::Text(value) => Value::Text(value.clone()),
    }
}

/// Tree predicate scopes shared by [`TreeQuery`] and [`WhereGroup`].
///
/// Each predicate has an `or_` variant, a column-level form taking an explicit
/// (possibly alias-qualified) column and a literal path, and a model-level
/// `_of` form taking the related entity.
pub trait TreeFilter: Sized {
    fn push_condition(self, connector: Connector, condition: Condition) -> Self;

    fn default_columns(&self) -> &DefaultColumns;

    fn where_self_or_ancestor(self, column: impl Into<String>, path: &Path) -> Self {
        self.push_condition(Connector::And, self_or_ancestor(column, Some(path)))
    }

    fn or_where_self_or_ancestor(self, column: impl Into<String>, path: &Path) -> Self {
        self.push_condition(Connector::Or, self_or_ancestor(column, Some(path)))
    }

    fn where_self_or_ancestor_of<E: TreeEntity>(self, entity: &E) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(Connector::And, self_or_ancestor(column, entity.path()))
    }

    fn or_where_self_or_ancestor_of<E: TreeEntity>(self, entity: &E) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(Connector::Or, self_or_ancestor(column, entity.path()))
    }

    fn where_self_or_descendant(self, column: impl Into<String>, path: &Path) -> Self {
        self.push_condition(Connector::And, self_or_descendant(column, Some(path)))
    }

    fn or_where_self_or_descendant(self, column: impl Into<String>, path: &Path) -> Self {
        self.push_condition(Connector::Or, self_or_descendant(column, Some(path)))
    }

    fn where_self_or_descendant_of<E: TreeEntity>(self, entity: &E) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(Connector::And, self_or_descendant(column, entity.path()))
    }

    fn or_where_self_or_descendant_of<E: TreeEntity>(self, entity: &E) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(Connector::Or, self_or_descendant(column, entity.path()))
    }

    fn where_depth(self, operator: DepthOperator, depth: usize) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(
            Connector::And,
            Condition::Depth {
                column,
                operator,
                depth,
            },
        )
    }

    fn or_where_depth(self, operator: DepthOperator, depth: usize) -> Self {
        let column = self.default_columns().path.clone();
        self.push_condition(
            Connector::Or,
            Condition::Depth {
                column,
                operator,
                depth,
            },
        )
    }

    fn where_root(self) -> Self {
        let column = self.default_columns().parent.clone();
        self.push_condition(Connector::And, Condition::IsNull { column })
    }

    fn where_key(self, key: &NodeKey) -> Self {
        let column = self.default_columns().key.clone();
        self.push_condition(
            Connector::And,
            Condition::Equals {
                column,
                value: key_value(key),
            },
        )
    }

    fn where_key_not(self, key: &NodeKey) -> Self {
        let column = self.default_columns().key.clone();
        self.push_condition(
            Connector::And,
            Condition::NotEquals {
                column,
                value: key_value(key),
            },
        )
    }

    fn where_parent(self, parent: &NodeKey) -> Self {
        let column = self.default_columns().parent.clone();
        self.push_condition(
            Connector::And,
            Condition::Equals {
                column,
                value: key_value(parent),
            },
        )
    }

    /// AND a parenthesized group built by `build`.
    fn where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(WhereGroup) -> WhereGroup,
    {
        let group = build(WhereGroup::new(self.default_columns().clone()));
        self.push_condition(Connector::And, Condition::Group(group.conditions))
    }

    /// OR a parenthesized group built by `build`.
    fn or_where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(WhereGroup) -> WhereGroup,
    {
        let group = build(WhereGroup::new(self.default_columns().clone()));
        self.push_condition(Connector::Or, Condition::Group(group.conditions))
    }
}

fn self_or_ancestor(column: impl Into<String>, path: Option<&Path>) -> Condition {
    Condition::SelfOrAncestor {
        column: column.into(),
        path: path.cloned(),
    }
}

fn self_or_descendant(column: impl Into<String>, path: Option<&Path>) -> Condition {
    Condition::SelfOrDescendant {
        column: column.into(),
        path: path.cloned(),
    }
}

/// Conditions wrapped in parentheses inside a query.
#[derive(Debug, Clone)]
pub struct WhereGroup {
    columns: DefaultColumns,
    conditions: Vec<(Connector, Condition)>,
}

impl WhereGroup {
    fn new(columns: DefaultColumns) -> Self {
        Self {
            columns,
            conditions: Vec::new(),
        }
    }
}

impl TreeFilter for WhereGroup {
    fn push_condition(mut self, connector: Connector, condition: Condition) -> Self {
        self.conditions.push((connector, condition));
        self
    }

    fn default_columns(&self) -> &DefaultColumns {
        &self.columns
    }
}

#[derive(Debug, Clone)]
enum Order {
    Depth { column: String, descending: bool },
    Column { column: String, descending: bool },
}

/// `SELECT` builder over a tree table.
#[derive(Debug, Clone)]
pub struct TreeQuery {
    config: TreeConfig,
    dialect: Arc<dyn Dialect>,
    table: String,
    alias: Option<String>,
    columns: DefaultColumns,
    select: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<(Connector, Condition)>,
    orders: Vec<Order>,
    limit: Option<usize>,
}

impl TreeQuery {
    pub fn new(config: &TreeConfig, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            columns: DefaultColumns::for_qualifier(config, &config.table),
            table: config.table.clone(),
            config: config.clone(),
            dialect,
            alias: None,
            select: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Query `table`, optionally under `alias`. Default columns follow the alias.
    pub fn from_table(mut self, table: impl Into<String>, alias: Option<&str>) -> Self {
        self.table = table.into();
        self.alias = alias.map(str::to_string);
        let qualifier = self.alias.clone().unwrap_or_else(|| self.table.clone());
        self.columns = DefaultColumns::for_qualifier(&self.config, &qualifier);
        self
    }

    /// Replace the selected columns. Without a call the node columns are selected.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `JOIN {table} ON {on}`; `table` may carry an alias.
    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins
            .push(format!("JOIN {} ON {}", table.into(), on.into()));
        self
    }

    pub fn order_by_depth(mut self) -> Self {
        self.orders.push(Order::Depth {
            column: self.columns.path.clone(),
            descending: false,
        });
        self
    }

    pub fn order_by_depth_desc(mut self) -> Self {
        self.orders.push(Order::Depth {
            column: self.columns.path.clone(),
            descending: true,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.orders.push(Order::Column {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Columns selected when none are chosen, in the order stores decode them.
    pub fn node_columns(&self) -> Vec<String> {
        let qualifier = self.alias.as_deref().unwrap_or(&self.table);
        let source = self
            .config
            .source_column()
            .map(|column| format!("{}.{}", qualifier, column))
            .unwrap_or_else(|| "NULL".to_string());

        vec![
            self.columns.key.clone(),
            self.columns.parent.clone(),
            source,
            self.columns.path.clone(),
            format!("{}.properties", qualifier),
            format!("{}.created_at", qualifier),
            format!("{}.modified_at", qualifier),
        ]
    }

    /// Render SQL and collect bind parameters.
    pub fn build(&self) -> Result<SqlStatement, DatabaseError> {
        let mut bindings = Bindings::new(self.dialect.placeholder_style());

        let select = if self.select.is_empty() {
            self.node_columns()
        } else {
            self.select.clone()
        };

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS {}", alias));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if let Some(clause) =
            compile_conditions(self.dialect.as_ref(), &self.conditions, &mut bindings)?
        {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !self.orders.is_empty() {
            let mut parts = Vec::with_capacity(self.orders.len());
            for order in &self.orders {
                let (expression, descending) = match order {
                    Order::Depth { column, descending } => (self.dialect.depth(column)?, *descending),
                    Order::Column { column, descending } => (column.clone(), *descending),
                };
                parts.push(format!(
                    "{} {}",
                    expression,
                    if descending { "DESC" } else { "ASC" }
                ));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(SqlStatement {
            sql,
            params: bindings.into_params(),
        })
    }
}

impl TreeFilter for TreeQuery {
    fn push_condition(mut self, connector: Connector, condition: Condition) -> Self {
        self.conditions.push((connector, condition));
        self
    }

    fn default_columns(&self) -> &DefaultColumns {
        &self.columns
    }
}

fn compile_conditions(
    dialect: &dyn Dialect,
    conditions: &[(Connector, Condition)],
    bindings: &mut Bindings,
) -> Result<Option<String>, DatabaseError> {
    let mut sql = String::new();

    for (connector, condition) in conditions {
        let Some(fragment) = compile_condition(dialect, condition, bindings)? else {
            continue;
        };
        if !sql.is_empty() {
            sql.push(' ');
            sql.push_str(connector.as_sql());
            sql.push(' ');
        }
        sql.push_str(&fragment);
    }

    Ok(if sql.is_empty() { None } else { Some(sql) })
}

fn compile_condition(
    dialect: &dyn Dialect,
    condition: &Condition,
    bindings: &mut Bindings,
) -> Result<Option<String>, DatabaseError> {
    let fragment = match condition {
        Condition::SelfOrAncestor { column, path } => match path {
            Some(path) => dialect.self_or_ancestor(column, path, bindings)?,
            None => "1 = 0".to_string(),
        },
        Condition::SelfOrDescendant { column, path } => match path {
            Some(path) => dialect.self_or_descendant(column, path, bindings)?,
            None => "1 = 0".to_string(),
        },
        Condition::Depth {
            column,
            operator,
            depth,
        } => {
            let expression = dialect.depth(column)?;
            let placeholder = bindings.bind(Value::Integer(*depth as i64));
            format!("{} {} {}", expression, operator.as_sql(), placeholder)
        }
        Condition::IsNull { column } => format!("{} IS NULL", column),
        Condition::Equals { column, value } => {
            format!("{} = {}", column, bindings.bind(value.clone()))
        }
        Condition::NotEquals { column, value } => {
            format!("{} <> {}", column, bindings.bind(value.clone()))
        }
        Condition::Group(inner) => {
            return Ok(compile_conditions(dialect, inner, bindings)?
                .map(|clause| format!("({})", clause)));
        }
    };

    Ok(Some(fragment))
}

/// Bulk rewrite of a subtree's paths after its root moved.
///
/// Scoped by the moved node's old path: every self-or-descendant row has the
/// old ancestor prefix replaced with the new parent's path, or dropped when the
/// node becomes a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeRebuild {
    pub old_path: Path,
    pub new_parent: Option<Path>,
}

impl SubtreeRebuild {
    pub fn new(old_path: Path, new_parent: Option<Path>) -> Self {
        Self {
            old_path,
            new_parent,
        }
    }

    pub fn compile(
        &self,
        config: &TreeConfig,
        dialect: &dyn Dialect,
    ) -> Result<SqlStatement, DatabaseError> {
        let mut bindings = Bindings::new(dialect.placeholder_style());
        let column = config.path_column.as_str();

        let expression = dialect.rebuild_path(
            column,
            &self.old_path,
            self.new_parent.as_ref(),
            &mut bindings,
        )?;
        let scope = dialect.self_or_descendant(column, &self.old_path, &mut bindings)?;

        Ok(SqlStatement {
            sql: format!(
                "UPDATE {} SET {} = {} WHERE {}",
                config.table, column, expression, scope
            ),
            params: bindings.into_params(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::DialectKind;
    use crate::models::{StoredNode, TreeNode};
    use serde_json::json;

    fn config() -> TreeConfig {
        TreeConfig::new("categories")
    }

    fn query(kind: DialectKind) -> TreeQuery {
        TreeQuery::new(&config(), kind.dialect()).select(["categories.id"])
    }

    fn node(key: i64, path: &str) -> TreeNode {
        TreeNode::from_stored(StoredNode {
            key: NodeKey::from(key),
            parent_key: None,
            source: None,
            path: Some(Path::parse(path).unwrap()),
            properties: json!({}),
            created_at: None,
            modified_at: None,
        })
    }

    #[test]
    fn test_default_select_uses_node_columns() {
        let statement = TreeQuery::new(&config(), DialectKind::PrefixScan.dialect())
            .where_root()
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT categories.id, categories.parent_id, NULL, categories.path, \
             categories.properties, categories.created_at, categories.modified_at \
             FROM categories WHERE categories.parent_id IS NULL"
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_model_level_ancestors_ordered_by_depth() {
        let statement = query(DialectKind::PrefixScan)
            .where_self_or_ancestor_of(&node(3, "1.2.3"))
            .where_key_not(&NodeKey::from(3i64))
            .order_by_depth()
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT categories.id FROM categories \
             WHERE categories.path IN (?, ?, ?) AND categories.id <> ? \
             ORDER BY ((length(categories.path) - length(replace(categories.path, '.', ''))) + 1) ASC"
        );
        assert_eq!(
            statement.params,
            vec![
                Value::Text("1".into()),
                Value::Text("1.2".into()),
                Value::Text("1.2.3".into()),
                Value::Integer(3),
            ]
        );
    }

    #[test]
    fn test_label_path_numbers_placeholders_across_conditions() {
        let statement = query(DialectKind::LabelPath)
            .where_self_or_descendant_of(&node(2, "1.2"))
            .where_depth(DepthOperator::LtEq, 3)
            .order_by_depth_desc()
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT categories.id FROM categories \
             WHERE categories.path <@ $1::ltree AND nlevel(categories.path) <= $2 \
             ORDER BY nlevel(categories.path) DESC"
        );
        assert_eq!(
            statement.params,
            vec![Value::Text("1.2".into()), Value::Integer(3)]
        );
    }

    #[test]
    fn test_or_group_for_many_nodes() {
        let statement = query(DialectKind::LabelPath)
            .where_group(|group| {
                group
                    .or_where_self_or_ancestor_of(&node(3, "1.2.3"))
                    .or_where_self_or_ancestor_of(&node(5, "4.5"))
            })
            .where_depth(DepthOperator::Gt, 0)
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT categories.id FROM categories \
             WHERE (categories.path @> $1::ltree OR categories.path @> $2::ltree) \
             AND nlevel(categories.path) > $3"
        );
    }

    #[test]
    fn test_empty_group_is_skipped() {
        let statement = query(DialectKind::PrefixScan)
            .where_group(|group| group)
            .build()
            .unwrap();

        assert_eq!(statement.sql, "SELECT categories.id FROM categories");
    }

    #[test]
    fn test_entity_without_path_matches_nothing() {
        let unsaved = TreeNode::new(json!({}));
        let statement = query(DialectKind::PrefixScan)
            .where_self_or_descendant_of(&unsaved)
            .build()
            .unwrap();

        assert!(statement.sql.ends_with("WHERE 1 = 0"));
    }

    #[test]
    fn test_alias_and_column_override() {
        let statement = TreeQuery::new(&config(), DialectKind::LabelPath.dialect())
            .from_table("products", None)
            .select(["products.*"])
            .join("categories AS c", "products.category_id = c.id")
            .where_self_or_descendant("c.path", &Path::parse("1").unwrap())
            .limit(10)
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT products.* FROM products \
             JOIN categories AS c ON products.category_id = c.id \
             WHERE c.path <@ $1::ltree LIMIT 10"
        );

        let aliased = TreeQuery::new(&config(), DialectKind::PrefixScan.dialect())
            .from_table("categories", Some("parent"))
            .where_root()
            .build()
            .unwrap();
        assert!(aliased.sql.contains("FROM categories AS parent WHERE parent.parent_id IS NULL"));
    }

    #[test]
    fn test_subtree_rebuild_statement() {
        let rebuild = SubtreeRebuild::new(
            Path::parse("1.2").unwrap(),
            Some(Path::parse("7").unwrap()),
        );

        let statement = rebuild
            .compile(&config(), DialectKind::PrefixScan.dialect().as_ref())
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE categories SET path = ? || substr(path, 3) \
             WHERE (path = ? OR path LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            statement.params,
            vec![
                Value::Text("7.".into()),
                Value::Text("1.2".into()),
                Value::Text("1.2.%".into()),
            ]
        );

        let statement = rebuild
            .compile(&config(), DialectKind::LabelPath.dialect().as_ref())
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE categories SET path = $1::ltree || subpath(path, 1) WHERE path <@ $2::ltree"
        );
    }

    #[test]
    fn test_depth_operator_parsing() {
        assert_eq!("<=".parse::<DepthOperator>().unwrap(), DepthOperator::LtEq);
        assert_eq!("!=".parse::<DepthOperator>().unwrap(), DepthOperator::NotEq);
        assert!("~".parse::<DepthOperator>().is_err());
    }
}
