//! The table-schema lookup contract.
//!
//! Schemas are registered explicitly: the compiler never scans attributes or
//! reflects over host types. The only requirement is that
//! [`SchemaResolver::resolve`] is total for every entity reachable from the
//! expression tree.
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One mapped field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// The entity-side field name as it appears in member accesses.
    pub name: String,
    /// The database column the field maps to.
    pub column: String,
    /// The field can be read but never written by statement assembly.
    pub read_only: bool,
    /// The database generates this value (identity columns, tokens).
    pub generated: bool,
}

/// The table mapping of one entity type.
///
/// Content is immutable once built; resolvers hand out shared references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    entity: String,
    table: String,
    primary_key: Vec<String>,
    fields: Vec<FieldDef>,
}

impl TableSchema {
    /// Starts a schema definition for the given entity, mapped to the given
    /// table.
    pub fn build(entity: impl Into<String>, table: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            entity: entity.into(),
            table: table.into(),
            primary_key: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ordered primary-key field names, at least one.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// All mapped fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The field definition for an entity-side name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The column for an entity-side field name.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.column.as_str())
    }

    /// Field names whose values the database generates.
    pub fn generated_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.generated)
    }

    /// Fields that may not be written.
    pub fn read_only_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.read_only)
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug)]
pub struct TableSchemaBuilder {
    entity: String,
    table: String,
    primary_key: Vec<String>,
    fields: Vec<FieldDef>,
}

impl TableSchemaBuilder {
    /// Adds a plain readable/writable field.
    pub fn field(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            column: column.into(),
            read_only: false,
            generated: false,
        });
        self
    }

    /// Adds a read-only field.
    pub fn read_only(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            column: column.into(),
            read_only: true,
            generated: false,
        });
        self
    }

    /// Adds a database-generated field (implies read-only).
    pub fn generated(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            column: column.into(),
            read_only: true,
            generated: true,
        });
        self
    }

    /// Marks already-added fields as the primary key, in the given order.
    pub fn primary_key(mut self, names: &[&str]) -> Self {
        self.primary_key = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn finish(self) -> TableSchema {
        let mut primary_key = self.primary_key;
        if primary_key.is_empty() {
            if let Some(first) = self.fields.first() {
                primary_key.push(first.name.clone());
            }
        }

        TableSchema {
            entity: self.entity,
            table: self.table,
            primary_key,
            fields: self.fields,
        }
    }
}

/// Maps entity type names to table schemas.
///
/// Implementations must be total for every entity reachable from a tree
/// handed to the compiler and must tolerate concurrent lookups.
pub trait SchemaResolver: Send + Sync {
    fn resolve(&self, entity: &str) -> Result<Arc<TableSchema>>;
}

/// The static, in-memory resolver.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any earlier one for the same entity.
    pub fn register(mut self, schema: TableSchema) -> Self {
        self.tables.insert(schema.entity().to_string(), Arc::new(schema));
        self
    }
}

impl SchemaResolver for SchemaRegistry {
    fn resolve(&self, entity: &str) -> Result<Arc<TableSchema>> {
        self.tables
            .get(entity)
            .cloned()
            .ok_or_else(|| Error::unknown_entity(entity))
    }
}

/// A memoizing wrapper for resolvers whose lookups are not free.
///
/// The cache is read-mostly: entries are immutable once computed, so
/// concurrent population from parallel compilations needs no coordination
/// beyond the lock around the map itself.
pub struct CachingResolver<R> {
    inner: R,
    cache: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl<R> CachingResolver<R>
where
    R: SchemaResolver,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> SchemaResolver for CachingResolver<R>
where
    R: SchemaResolver,
{
    fn resolve(&self, entity: &str) -> Result<Arc<TableSchema>> {
        {
            let cache = self.cache.read().unwrap();
            if let Some(schema) = cache.get(entity) {
                return Ok(schema.clone());
            }
        }

        let schema = self.inner.resolve(entity)?;
        let mut cache = self.cache.write().unwrap();
        let entry = cache.entry(entity.to_string()).or_insert(schema);
        Ok(entry.clone())
    }
}
