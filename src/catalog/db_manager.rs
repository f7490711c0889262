use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use crate::buffer::BufferManager;
use crate::common::{DbConfig, DbError, PageId, Result};
use crate::heap::Relation;
use crate::storage::disk::DiskManager;
use crate::tuple::ColumnInfo;

/// Name of the catalog file inside the database directory.
pub const CATALOG_FILE: &str = "database.save";

/// DbManager keeps the set of relations of the database.
///
/// The catalog is persisted as one line per relation, in creation order:
///
/// ```text
/// Name|fileIdx,pageIdx|Col1:TYPE,Col2:TYPE(n),...
/// ```
///
/// where `fileIdx,pageIdx` is the relation's header page.
pub struct DbManager {
    catalog_path: PathBuf,
    tables: Vec<Relation>,
}

impl DbManager {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            catalog_path: config.db_path.join(CATALOG_FILE),
            tables: Vec::new(),
        }
    }

    /// Registers `relation`. Fails if a table with the same name exists.
    pub fn add_table(&mut self, relation: Relation) -> Result<()> {
        check_table_name(relation.name())?;
        if self.get_table(relation.name()).is_some() {
            return Err(DbError::TableAlreadyExists(relation.name().to_string()));
        }
        self.tables.push(relation);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<&Relation> {
        self.tables.iter().find(|r| r.name() == name)
    }

    /// Removes the table and frees every page it owns.
    pub fn remove_table(&mut self, name: &str) -> Result<()> {
        let idx = self
            .tables
            .iter()
            .position(|r| r.name() == name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        self.tables.remove(idx).destroy()
    }

    /// Removes every table, freeing their pages.
    pub fn remove_all_tables(&mut self) -> Result<()> {
        for relation in self.tables.drain(..) {
            relation.destroy()?;
        }
        Ok(())
    }

    /// Returns the schema of `name` as `Name (C1:INT,C2:CHAR(5))`.
    pub fn describe_table(&self, name: &str) -> Result<String> {
        self.get_table(name)
            .map(describe)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Returns the schema of every table, in creation order.
    pub fn describe_all_tables(&self) -> Vec<String> {
        self.tables.iter().map(describe).collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Writes the catalog file.
    pub fn save_state(&self) -> Result<()> {
        let mut out = String::new();
        for relation in &self.tables {
            let header = relation.header_page_id();
            out.push_str(&format!(
                "{}|{},{}|{}\n",
                relation.name(),
                header.file_idx,
                header.page_idx,
                format_columns(relation.columns())
            ));
        }

        if let Some(dir) = self.catalog_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.catalog_path, out)?;
        info!(
            "saved {} tables to {}",
            self.tables.len(),
            self.catalog_path.display()
        );
        Ok(())
    }

    /// Replaces the in-memory tables with the ones in the catalog file.
    /// A missing file means an empty database.
    pub fn load_state(
        &mut self,
        disk_manager: &Arc<DiskManager>,
        buffer_manager: &Arc<BufferManager>,
    ) -> Result<()> {
        self.tables.clear();
        if !self.catalog_path.exists() {
            return Ok(());
        }

        let text = fs::read_to_string(&self.catalog_path)?;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (name, header, columns) = parse_catalog_line(line).map_err(|e| {
                DbError::Catalog(format!("{} line {}: {}", CATALOG_FILE, lineno + 1, e))
            })?;
            let relation = Relation::open(
                name,
                columns,
                header,
                Arc::clone(disk_manager),
                Arc::clone(buffer_manager),
            )?;
            self.add_table(relation)?;
        }

        info!(
            "loaded {} tables from {}",
            self.tables.len(),
            self.catalog_path.display()
        );
        Ok(())
    }
}

fn describe(relation: &Relation) -> String {
    format!("{} ({})", relation.name(), format_columns(relation.columns()))
}

fn format_columns(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Table names end up in the catalog file, so they may not contain its
/// separators.
pub(crate) fn check_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '|' | ',' | '(' | ')' | ':'));
    if valid {
        Ok(())
    } else {
        Err(DbError::Parse(format!("invalid table name '{}'", name)))
    }
}

fn parse_catalog_line(line: &str) -> std::result::Result<(&str, PageId, Vec<ColumnInfo>), String> {
    let mut parts = line.split('|');
    let (Some(name), Some(header), Some(columns), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected NAME|FILE,PAGE|COLUMNS, got '{}'", line));
    };

    let header = header
        .split_once(',')
        .and_then(|(f, p)| Some(PageId::new(f.trim().parse().ok()?, p.trim().parse().ok()?)))
        .ok_or_else(|| format!("invalid header page '{}'", header))?;

    let columns = columns
        .split(',')
        .map(|c| c.parse::<ColumnInfo>().map_err(|e| e.to_string()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((name.trim(), header, columns))
}
