//! Relational table layout for a compiled map.

use edi_schema::{DataType, ElementSpec, Map, NodeId, NodeKind, SchemaNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Prefix of every generated table name
pub const TABLE_PREFIX: &str = "t_";

/// Interchange and group envelope ids; the envelope is not stored
const CONTROL_PREFIXES: [&str; 6] = ["ISA", "IEA", "TA1", "GS", "GE", "SE"];

/// Column types used by the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    DateTime,
    Char(usize),
    VarChar(usize),
    Int,
    Float,
    VarBinary(usize),
}

impl SqlType {
    /// Column type for an element
    pub fn for_element(spec: &ElementSpec) -> Self {
        match spec.data_type {
            DataType::Date | DataType::Time => SqlType::DateTime,
            DataType::AlphaNumeric | DataType::Identifier => {
                if spec.min_length == spec.max_length {
                    SqlType::Char(spec.max_length)
                } else {
                    SqlType::VarChar(spec.max_length)
                }
            }
            DataType::Numeric(0) => SqlType::Int,
            DataType::Numeric(_) | DataType::Decimal => SqlType::Float,
            DataType::Binary => SqlType::VarBinary(spec.max_length),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::DateTime => f.write_str("[datetime]"),
            SqlType::Char(n) => write!(f, "[char] ({n})"),
            SqlType::VarChar(n) => write!(f, "[varchar] ({n})"),
            SqlType::Int => f.write_str("[int]"),
            SqlType::Float => f.write_str("[float]"),
            SqlType::VarBinary(n) => write!(f, "[varbinary] ({n})"),
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    /// Element the column stores
    pub element_id: String,
    /// X12 type and length bounds, e.g. `ID(2, 2)`
    pub source: String,
}

/// Map node that opened a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableSource {
    Loop,
    Segment,
}

/// One table of the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// Auto-increment surrogate key, `<id>_num`
    pub key: String,
    pub source: TableSource,
    /// Map path of the node that opened the table
    pub path: String,
    /// Enclosing table, if any
    pub parent: Option<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Builds the table layout of a map
///
/// Loops always get a table. A segment gets its own table when it may
/// repeat or when no table is open around it; otherwise its elements
/// become columns of the innermost open table. Composites are stored as
/// a whole and their components get no columns.
#[derive(Debug, Clone)]
pub struct RelationalSchemaEmitter {
    prefix: String,
}

impl Default for RelationalSchemaEmitter {
    fn default() -> Self {
        Self {
            prefix: TABLE_PREFIX.to_string(),
        }
    }
}

impl RelationalSchemaEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another table name prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Lay out the tables of `map`, in the order they are opened
    pub fn emit(&self, map: &Map) -> Vec<TableDef> {
        let mut walk = Walk {
            map,
            prefix: &self.prefix,
            tables: Vec::new(),
            taken: HashSet::new(),
            open: Vec::new(),
        };
        walk.visit(NodeId::ROOT);
        debug!(map = %map.id(), tables = walk.tables.len(), "Emitted table layout");
        walk.tables
    }
}

/// Lay out the tables of `map` with the default prefix
pub fn emit(map: &Map) -> Vec<TableDef> {
    RelationalSchemaEmitter::new().emit(map)
}

struct Walk<'m> {
    map: &'m Map,
    prefix: &'m str,
    tables: Vec<TableDef>,
    /// Table names already emitted
    taken: HashSet<String>,
    /// Indices into `tables`, innermost last
    open: Vec<usize>,
}

impl Walk<'_> {
    fn visit(&mut self, id: NodeId) {
        let map = self.map;
        let node = map.node(id);
        let control = is_control(&node.id);

        match &node.kind {
            NodeKind::Root => self.visit_children(id),
            NodeKind::Loop if control => self.visit_children(id),
            NodeKind::Loop => {
                let base = format!("{}loop_{}_{}", self.prefix, node.id, normalize(&node.name));
                self.open_table(id, node, base, TableSource::Loop);
                self.visit_children(id);
                self.open.pop();
            }
            NodeKind::Segment if control => {
                trace!(segment = %node.id, "Skipping envelope segment");
            }
            NodeKind::Segment if !node.max_repeat.is_single() || self.open.is_empty() => {
                let base = format!("{}{}_{}", self.prefix, node.id, normalize(&node.name));
                self.open_table(id, node, base, TableSource::Segment);
                self.visit_children(id);
                self.open.pop();
            }
            NodeKind::Segment => self.visit_children(id),
            NodeKind::Composite => {}
            NodeKind::Element(spec) => {
                if let Some(&table) = self.open.last() {
                    self.add_column(table, node, spec);
                }
            }
        }
    }

    fn visit_children(&mut self, id: NodeId) {
        let map = self.map;
        for child in map.node(id).child_ids() {
            self.visit(child);
        }
    }

    fn open_table(&mut self, id: NodeId, node: &SchemaNode, base: String, source: TableSource) {
        let mut name = base.clone();
        let mut n = 1;
        while self.taken.contains(&name) {
            n += 1;
            name = format!("{base}_{n}");
        }
        self.taken.insert(name.clone());
        let parent = self.open.last().map(|&idx| self.tables[idx].name.clone());

        debug!(table = %name, path = %self.map.path(id), "Opening table");
        self.tables.push(TableDef {
            name,
            key: format!("{}_num", node.id),
            source,
            path: self.map.path(id),
            parent,
            columns: Vec::new(),
        });
        self.open.push(self.tables.len() - 1);
    }

    fn add_column(&mut self, table: usize, node: &SchemaNode, spec: &ElementSpec) {
        let table = &mut self.tables[table];
        let base = format!("{}_{}", node.id, normalize(&node.name));
        let mut name = base.clone();
        let mut n = 1;
        while name == table.key || table.column(&name).is_some() {
            n += 1;
            name = format!("{base}_{n}");
        }
        table.columns.push(ColumnDef {
            name,
            sql_type: SqlType::for_element(spec),
            nullable: true,
            element_id: node.id.clone(),
            source: format!(
                "{}({}, {})",
                spec.data_type, spec.min_length, spec.max_length
            ),
        });
    }
}

fn is_control(id: &str) -> bool {
    CONTROL_PREFIXES.iter().any(|prefix| id.starts_with(prefix))
}

/// Replace everything outside `[A-Za-z0-9_]` with `_`
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
