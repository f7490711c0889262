use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::sync::Arc;

use log::{info, warn};

use crate::buffer::BufferManager;
use crate::catalog::{check_table_name, DbManager};
use crate::common::{DbConfig, DbError, Result};
use crate::heap::Relation;
use crate::storage::disk::DiskManager;
use crate::tuple::ColumnInfo;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateTable { name: String, columns: Vec<ColumnInfo> },
    DropTable(String),
    DropTables,
    DescribeTable(String),
    DescribeTables,
    Exit,
}

impl Command {
    /// Parses one command. Keywords are case-insensitive, names keep their
    /// case.
    ///
    /// ```text
    /// CREATE TABLE Name (C1:INT,C2:VARCHAR(10))
    /// DROP TABLE Name | DROP TABLES
    /// DESCRIBE TABLE Name | DESCRIBE TABLES
    /// EXIT
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();
        let keywords: Vec<&str> = upper.split_whitespace().collect();
        let words: Vec<&str> = line.split_whitespace().collect();

        match keywords.as_slice() {
            ["EXIT"] => Ok(Command::Exit),
            ["DROP", "TABLES"] => Ok(Command::DropTables),
            ["DESCRIBE", "TABLES"] => Ok(Command::DescribeTables),
            ["DROP", "TABLE", _] => Ok(Command::DropTable(words[2].to_string())),
            ["DESCRIBE", "TABLE", _] => Ok(Command::DescribeTable(words[2].to_string())),
            ["CREATE", "TABLE", _, ..] => parse_create_table(line),
            _ => Err(DbError::Parse(format!("unknown command '{}'", line))),
        }
    }
}

/// `line` starts with `CREATE` and then `TABLE`, in any case.
fn parse_create_table(line: &str) -> Result<Command> {
    let rest = line["CREATE".len()..].trim_start();
    let rest = rest["TABLE".len()..].trim_start();

    let syntax = || DbError::Parse(format!("expected CREATE TABLE Name (Col:TYPE,...), got '{}'", line));
    let open = rest.find('(').ok_or_else(syntax)?;
    let close = rest.rfind(')').ok_or_else(syntax)?;
    if close < open || !rest[close + 1..].trim().is_empty() {
        return Err(syntax());
    }

    let name = rest[..open].trim();
    check_table_name(name)?;

    let columns = rest[open + 1..close]
        .split(',')
        .map(str::parse::<ColumnInfo>)
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for col in &columns {
        if !seen.insert(col.name()) {
            return Err(DbError::Parse(format!("duplicate column '{}'", col.name())));
        }
    }

    Ok(Command::CreateTable {
        name: name.to_string(),
        columns,
    })
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Lines to show the user
    Output(Vec<String>),
    /// State was saved; the session is over
    Exit,
}

/// Sgbd ties the storage stack together and executes commands against it.
pub struct Sgbd {
    disk_manager: Arc<DiskManager>,
    buffer_manager: Arc<BufferManager>,
    db_manager: DbManager,
}

impl Sgbd {
    /// Opens the database described by `config` and loads its catalog.
    pub fn new(config: &DbConfig) -> Result<Self> {
        config.validate()?;

        let disk_manager = Arc::new(DiskManager::new(config));
        disk_manager.init()?;
        let buffer_manager = Arc::new(BufferManager::from_config(config, Arc::clone(&disk_manager)));

        let mut db_manager = DbManager::new(config);
        db_manager.load_state(&disk_manager, &buffer_manager)?;

        info!(
            "opened {} ({} tables, {} buffers, {})",
            config.db_path.display(),
            db_manager.table_count(),
            config.buffer_count,
            config.policy
        );

        Ok(Self {
            disk_manager,
            buffer_manager,
            db_manager,
        })
    }

    pub fn db_manager(&self) -> &DbManager {
        &self.db_manager
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Parses and executes one command line.
    pub fn process_command(&mut self, line: &str) -> Result<CommandOutcome> {
        match Command::parse(line)? {
            Command::CreateTable { name, columns } => {
                if self.db_manager.get_table(&name).is_some() {
                    return Err(DbError::TableAlreadyExists(name));
                }
                let relation = Relation::create(
                    name.as_str(),
                    columns,
                    Arc::clone(&self.disk_manager),
                    Arc::clone(&self.buffer_manager),
                )?;
                self.db_manager.add_table(relation)?;
                Ok(CommandOutcome::Output(vec![format!("Table created: {}", name)]))
            }
            Command::DropTable(name) => {
                self.db_manager.remove_table(&name)?;
                Ok(CommandOutcome::Output(vec![format!("Table dropped: {}", name)]))
            }
            Command::DropTables => {
                let count = self.db_manager.table_count();
                self.db_manager.remove_all_tables()?;
                Ok(CommandOutcome::Output(vec![format!("{} tables dropped", count)]))
            }
            Command::DescribeTable(name) => Ok(CommandOutcome::Output(vec![self
                .db_manager
                .describe_table(&name)?])),
            Command::DescribeTables => {
                Ok(CommandOutcome::Output(self.db_manager.describe_all_tables()))
            }
            Command::Exit => {
                self.shutdown()?;
                Ok(CommandOutcome::Exit)
            }
        }
    }

    /// Saves the catalog, writes back every dirty page and closes the data
    /// files.
    pub fn shutdown(&mut self) -> Result<()> {
        self.db_manager.save_state()?;
        self.buffer_manager.flush_all()?;
        self.disk_manager.finish()?;
        info!("database state saved");
        Ok(())
    }

    /// Reads commands from `input` until `EXIT` or end of input, writing
    /// results and per-command errors to `output`. Reaching the end of input
    /// shuts down as `EXIT` does.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match self.process_command(&line) {
                Ok(CommandOutcome::Output(lines)) => {
                    for l in lines {
                        writeln!(output, "{}", l)?;
                    }
                }
                Ok(CommandOutcome::Exit) => {
                    writeln!(output, "Bye.")?;
                    return Ok(());
                }
                Err(e) => {
                    warn!("command '{}' failed: {}", line.trim(), e);
                    writeln!(output, "Error: {}", e)?;
                }
            }
            output.flush()?;
        }

        self.shutdown()
    }
}
