#![forbid(unsafe_code)]

use crate::address::{Address, Predicate};
use crate::error::StoreError;
use crate::record::Record;
use crate::schema::{self, Table};
use crate::values::ContentValues;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DB_FILE: &str = "turnstile.db";

/// Emitted to subscribers after a write to their table commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
}

/// One step of a batched request. The whole batch commits or rolls back as a
/// unit.
#[derive(Clone, Debug)]
pub enum Operation {
    Insert {
        address: Address,
        values: ContentValues,
    },
    Update {
        address: Address,
        values: ContentValues,
        predicate: Option<Predicate>,
    },
    Delete {
        address: Address,
        predicate: Option<Predicate>,
    },
}

impl Operation {
    fn table(&self) -> Table {
        match self {
            Self::Insert { address, .. }
            | Self::Update { address, .. }
            | Self::Delete { address, .. } => address.table(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpResult {
    Inserted(i64),
    Affected(usize),
}

struct Observer {
    table: Table,
    tx: mpsc::Sender<ChangeEvent>,
}

/// The sole entry point to the store: one writable connection behind a
/// mutex, resource addressing, and change notifications. Writers serialize;
/// batches are all-or-nothing.
pub struct Provider {
    conn: Mutex<Connection>,
    observers: Mutex<Vec<Observer>>,
    storage_dir: Option<PathBuf>,
}

impl Provider {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        Self::initialize(conn, Some(storage_dir))
    }

    /// Throwaway store for tests; same schema, no file behind it.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(mut conn: Connection, storage_dir: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::install(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            observers: Mutex::new(Vec::new()),
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Change events for one table, delivered after each committed write.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self, table: Table) -> Result<mpsc::Receiver<ChangeEvent>, StoreError> {
        let (tx, rx) = mpsc::channel();
        let mut observers = self.observers.lock().map_err(|_| StoreError::Poisoned)?;
        observers.push(Observer { table, tx });
        Ok(rx)
    }

    pub fn query(
        &self,
        address: &Address,
        projection: Option<&[&str]>,
        predicate: Option<&Predicate>,
        order: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn()?;
        query_tx(&conn, address, projection, predicate, order)
    }

    pub fn insert(&self, address: &Address, values: &ContentValues) -> Result<i64, StoreError> {
        let rowid = {
            let conn = self.conn()?;
            insert_tx(&conn, address, values)?
        };
        self.notify(&[address.table()]);
        Ok(rowid)
    }

    pub fn update(
        &self,
        address: &Address,
        values: &ContentValues,
        predicate: Option<&Predicate>,
    ) -> Result<usize, StoreError> {
        let affected = {
            let conn = self.conn()?;
            update_tx(&conn, address, values, predicate)?
        };
        self.notify(&[address.table()]);
        Ok(affected)
    }

    pub fn delete(
        &self,
        address: &Address,
        predicate: Option<&Predicate>,
    ) -> Result<usize, StoreError> {
        let affected = {
            let conn = self.conn()?;
            delete_tx(&conn, address, predicate)?
        };
        self.notify(&[address.table()]);
        Ok(affected)
    }

    /// Inserts every row inside one transaction; any failure rolls back the
    /// whole set.
    pub fn bulk_insert(
        &self,
        address: &Address,
        rows: &[ContentValues],
    ) -> Result<usize, StoreError> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            for row in rows {
                insert_tx(&tx, address, row)?;
            }
            tx.commit()?;
        }
        self.notify(&[address.table()]);
        Ok(rows.len())
    }

    /// Runs the operations in order inside one transaction. An error in any
    /// step rolls back every step; nothing is notified.
    pub fn apply_batch(&self, operations: &[Operation]) -> Result<Vec<OpResult>, StoreError> {
        let mut results = Vec::with_capacity(operations.len());
        let mut touched: Vec<Table> = Vec::new();
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            for operation in operations {
                let result = match operation {
                    Operation::Insert { address, values } => {
                        OpResult::Inserted(insert_tx(&tx, address, values)?)
                    }
                    Operation::Update {
                        address,
                        values,
                        predicate,
                    } => OpResult::Affected(update_tx(&tx, address, values, predicate.as_ref())?),
                    Operation::Delete { address, predicate } => {
                        OpResult::Affected(delete_tx(&tx, address, predicate.as_ref())?)
                    }
                };
                results.push(result);
                let table = operation.table();
                if !touched.contains(&table) {
                    touched.push(table);
                }
            }
            tx.commit()?;
        }
        self.notify(&touched);
        Ok(results)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Best-effort delivery after commit; observers with a dropped receiver
    /// are pruned here.
    fn notify(&self, tables: &[Table]) {
        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.retain(|observer| {
            if tables.contains(&observer.table) {
                observer
                    .tx
                    .send(ChangeEvent {
                        table: observer.table,
                    })
                    .is_ok()
            } else {
                true
            }
        });
    }
}

fn query_tx(
    conn: &Connection,
    address: &Address,
    projection: Option<&[&str]>,
    predicate: Option<&Predicate>,
    order: Option<&str>,
) -> Result<Vec<Record>, StoreError> {
    let columns = match projection {
        Some(columns) if !columns.is_empty() => columns.join(", "),
        _ => "*".to_string(),
    };
    let mut sql = format!("SELECT {columns} FROM {}", address.table().base_name());
    let (clause, args) = address.selection(predicate);
    if let Some(clause) = clause {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    if let Some(order) = order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }

    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(args))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let value: Value = row.get(index)?;
            columns.push((name.clone(), value));
        }
        records.push(Record::new(columns));
    }
    Ok(records)
}

fn insert_tx(
    conn: &Connection,
    address: &Address,
    values: &ContentValues,
) -> Result<i64, StoreError> {
    let Address::Collection(table) = address else {
        return Err(StoreError::InvalidAddress(format!(
            "{address} (insert requires a collection address)"
        )));
    };
    if values.is_empty() {
        return Err(StoreError::InvalidInput("insert requires at least one column"));
    }
    let columns: Vec<&str> = values.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table.base_name(),
        columns.join(", ")
    );
    conn.execute(&sql, params_from_iter(values.values()))?;
    Ok(conn.last_insert_rowid())
}

fn update_tx(
    conn: &Connection,
    address: &Address,
    values: &ContentValues,
    predicate: Option<&Predicate>,
) -> Result<usize, StoreError> {
    if values.is_empty() {
        return Err(StoreError::InvalidInput("update requires at least one column"));
    }
    let assignments = values
        .columns()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("UPDATE {} SET {assignments}", address.table().base_name());
    let (clause, mut args) = address.selection(predicate);
    if let Some(clause) = clause {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    let mut params: Vec<Value> = values.values().cloned().collect();
    params.append(&mut args);
    Ok(conn.execute(&sql, params_from_iter(params))?)
}

fn delete_tx(
    conn: &Connection,
    address: &Address,
    predicate: Option<&Predicate>,
) -> Result<usize, StoreError> {
    let mut sql = format!("DELETE FROM {}", address.table().base_name());
    let (clause, args) = address.selection(predicate);
    if let Some(clause) = clause {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    Ok(conn.execute(&sql, params_from_iter(args))?)
}
