//! Deep Relations
//!
//! Records of another table that belong to a node *or any of its descendants*,
//! e.g. every product filed under a category subtree. The related table
//! references tree rows through a foreign key; the relation joins the tree
//! table and filters it with a self-or-descendant predicate on the joined,
//! explicitly qualified path column.

use crate::config::TreeConfig;
use crate::db::dialect::Dialect;
use crate::db::error::DatabaseError;
use crate::db::query::{SqlStatement, TreeFilter, TreeQuery};
use crate::models::TreeEntity;
use std::sync::Arc;

/// `related_table.foreign_key -> tree.key`, widened to the whole subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepRelation {
    pub related_table: String,
    pub foreign_key: String,
}

impl DeepRelation {
    pub fn new(related_table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            related_table: related_table.into(),
            foreign_key: foreign_key.into(),
        }
    }

    /// Validate the related identifiers before they are spliced into SQL.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        for value in [&self.related_table, &self.foreign_key] {
            if !crate::config::is_identifier(value) {
                return Err(DatabaseError::invalid_config(format!(
                    "'{}' is not a valid SQL identifier",
                    value
                )));
            }
        }
        Ok(())
    }

    /// Base query: related rows joined to their tree node, before filtering.
    pub fn query(&self, config: &TreeConfig, dialect: Arc<dyn Dialect>) -> TreeQuery {
        TreeQuery::new(config, dialect)
            .from_table(self.related_table.clone(), None)
            .select([format!("{}.*", self.related_table)])
            .join(
                config.table.clone(),
                format!(
                    "{}.{} = {}",
                    self.related_table,
                    self.foreign_key,
                    config.qualified(&config.key_column)
                ),
            )
    }

    /// Related rows of `node` and all of its descendants.
    pub fn compile<E: TreeEntity>(
        &self,
        config: &TreeConfig,
        dialect: Arc<dyn Dialect>,
        node: &E,
    ) -> Result<SqlStatement, DatabaseError> {
        self.validate()?;

        let path_column = config.qualified(&config.path_column);
        let query = self.query(config, dialect);

        // an unsaved node has no subtree; the predicate compiles to no match
        let query = match node.path() {
            Some(path) => query.where_self_or_descendant(path_column, path),
            None => query.where_self_or_descendant_of(node),
        };

        query.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::DialectKind;
    use crate::models::{NodeKey, Path, StoredNode, TreeNode};
    use serde_json::json;

    fn category(path: &str) -> TreeNode {
        TreeNode::from_stored(StoredNode {
            key: NodeKey::from(1i64),
            parent_key: None,
            source: None,
            path: Some(Path::parse(path).unwrap()),
            properties: json!({}),
            created_at: None,
            modified_at: None,
        })
    }

    #[test]
    fn test_compiles_join_with_qualified_path_column() {
        let config = TreeConfig::new("categories");
        let relation = DeepRelation::new("products", "category_id");

        let statement = relation
            .compile(&config, DialectKind::PrefixScan.dialect(), &category("1"))
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT products.* FROM products \
             JOIN categories ON products.category_id = categories.id \
             WHERE (categories.path = ? OR categories.path LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_label_path_uses_containment_operator() {
        let config = TreeConfig::new("categories").with_dialect(DialectKind::LabelPath);
        let relation = DeepRelation::new("products", "category_id");

        let statement = relation
            .compile(&config, DialectKind::LabelPath.dialect(), &category("1.5"))
            .unwrap();

        assert!(statement.sql.contains("WHERE categories.path <@ $1::ltree"));
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let config = TreeConfig::new("categories");
        let relation = DeepRelation::new("products;--", "category_id");

        assert!(relation
            .compile(&config, DialectKind::PrefixScan.dialect(), &category("1"))
            .is_err());
    }
}
