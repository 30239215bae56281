//! In-memory relational tables with the platform's query surface.
//!
//! Rows are snake_case JSON objects. The query surface is the subset the
//! client actually uses: equality filters OR-ed over groups, `id ∈ set`,
//! ordering by a column, and row-level CRUD with declared unique
//! constraints. Every committed write publishes a change event.
//!
//! A [`FaultPlan`] lets tests and the demo make the next n writes fail
//! without mutating state — the hook the optimistic-rollback paths are
//! exercised through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use connect_core::RemoteError;

use crate::feed::{ChangeFeed, ChangeKind, RowChange};

/// Declarative schema for one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    /// Column sets that must be unique across rows. NULL values are exempt,
    /// matching SQL unique-constraint semantics.
    pub unique: &'static [&'static [&'static str]],
    /// Assign a fresh uuid `id` on insert when the row has none.
    pub auto_id: bool,
    /// Stamp `created_at` on insert when the row has none.
    pub auto_timestamp: bool,
}

/// Equality filter: OR over AND-groups, plus an optional `id ∈ set` clause.
///
/// `Filter::new()` matches every row. `.eq()` adds a condition to the
/// implicit first group; `.or_group()` adds an alternative group (the
/// `or(and(..), and(..))` shape conversation fetches use).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    groups: Vec<Vec<(String, Value)>>,
    id_in: Option<Vec<Value>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        if self.groups.is_empty() {
            self.groups.push(Vec::new());
        }
        self.groups[0].push((column.to_owned(), value.into()));
        self
    }

    pub fn or_group(mut self, conditions: &[(&str, Value)]) -> Self {
        self.groups.push(
            conditions
                .iter()
                .map(|(c, v)| ((*c).to_owned(), v.clone()))
                .collect(),
        );
        self
    }

    pub fn id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.id_in = Some(ids.into_iter().map(|id| Value::from(id.to_string())).collect());
        self
    }

    fn matches(&self, row: &Value) -> bool {
        if let Some(ids) = &self.id_in {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            if !ids.contains(&id) {
                return false;
            }
        }
        if self.groups.is_empty() {
            return true;
        }
        self.groups.iter().any(|group| {
            group
                .iter()
                .all(|(column, value)| row.get(column) == Some(value))
        })
    }
}

/// Counted write-failure injection. `fail_next_writes(n)` makes the next n
/// insert/update/delete calls return `RemoteError::Unavailable`.
pub struct FaultPlan {
    failing_writes: AtomicUsize,
}

impl FaultPlan {
    fn new() -> Self {
        Self {
            failing_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Consume one planned failure, if any.
    fn take(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// All tables of the emulated platform.
pub struct TableStore {
    tables: RwLock<HashMap<&'static str, Vec<Value>>>,
    specs: HashMap<&'static str, TableSpec>,
    feed: ChangeFeed,
    faults: FaultPlan,
}

impl TableStore {
    pub fn new(specs: &[TableSpec], feed_capacity: usize) -> Self {
        let mut tables = HashMap::new();
        let mut by_name = HashMap::new();
        for spec in specs {
            tables.insert(spec.name, Vec::new());
            by_name.insert(spec.name, *spec);
        }
        Self {
            tables: RwLock::new(tables),
            specs: by_name,
            feed: ChangeFeed::new(feed_capacity),
            faults: FaultPlan::new(),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    fn spec(&self, table: &str) -> Result<TableSpec, RemoteError> {
        self.specs
            .get(table)
            .copied()
            .ok_or_else(|| RemoteError::Malformed(format!("unknown table {table}")))
    }

    /// All rows matching the filter, in storage order.
    pub async fn select(&self, table: &'static str, filter: &Filter) -> Result<Vec<Value>, RemoteError> {
        self.spec(table)?;
        let tables = self.tables.read().await;
        Ok(tables[table]
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    /// Like [`select`](Self::select), ordered by one column. The sort is
    /// stable, so equal keys keep storage order.
    pub async fn select_ordered(
        &self,
        table: &'static str,
        filter: &Filter,
        column: &str,
        descending: bool,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut rows = self.select(table, filter).await?;
        rows.sort_by(|a, b| {
            let ka = a.get(column).cloned().unwrap_or(Value::Null);
            let kb = b.get(column).cloned().unwrap_or(Value::Null);
            let ord = compare_values(&ka, &kb);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(rows)
    }

    pub async fn count(&self, table: &'static str, filter: &Filter) -> Result<usize, RemoteError> {
        Ok(self.select(table, filter).await?.len())
    }

    /// Insert one row, returning it as stored (with any assigned id and
    /// timestamp).
    pub async fn insert(&self, table: &'static str, row: Value) -> Result<Value, RemoteError> {
        let spec = self.spec(table)?;
        if self.faults.take() {
            return Err(RemoteError::Unavailable);
        }

        let mut row = match row {
            Value::Object(map) => map,
            other => return Err(RemoteError::Malformed(format!("not an object: {other}"))),
        };
        if spec.auto_id && !row.contains_key("id") {
            row.insert("id".to_owned(), Value::from(Uuid::new_v4().to_string()));
        }
        if spec.auto_timestamp && !row.contains_key("created_at") {
            row.insert("created_at".to_owned(), Value::from(now_rfc3339()));
        }
        let row = Value::Object(row);

        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).expect("spec checked above");
        check_unique(&spec, rows, &row, None)?;
        rows.push(row.clone());
        drop(tables);

        self.feed.publish(RowChange {
            table,
            kind: ChangeKind::Inserted,
            old: None,
            new: Some(row.clone()),
        });
        Ok(row)
    }

    /// Patch every matching row, returning the rows as updated. One change
    /// event is published per updated row.
    pub async fn update(
        &self,
        table: &'static str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let spec = self.spec(table)?;
        if self.faults.take() {
            return Err(RemoteError::Unavailable);
        }
        let patch = patch
            .as_object()
            .ok_or_else(|| RemoteError::Malformed("patch is not an object".to_owned()))?;

        let mut changes = Vec::new();
        {
            let mut tables = self.tables.write().await;
            let rows = tables.get_mut(table).expect("spec checked above");

            // Uniqueness must hold against unpatched rows (excluding each
            // row's own previous value) and among the patched rows
            // themselves; all checks pass before anything is written.
            let indices: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| filter.matches(row))
                .map(|(i, _)| i)
                .collect();
            let mut patched_rows = Vec::with_capacity(indices.len());
            for &i in &indices {
                let patched = apply_patch(&rows[i], patch);
                check_unique(&spec, rows, &patched, Some(i))?;
                check_unique(&spec, &patched_rows, &patched, None)?;
                patched_rows.push(patched);
            }
            for (&i, patched) in indices.iter().zip(patched_rows) {
                let old = rows[i].clone();
                rows[i] = patched;
                changes.push((old, rows[i].clone()));
            }
        }

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            updated.push(new.clone());
            self.feed.publish(RowChange {
                table,
                kind: ChangeKind::Updated,
                old: Some(old),
                new: Some(new),
            });
        }
        Ok(updated)
    }

    /// Delete every matching row, returning the removed rows. Deleting
    /// nothing is not an error.
    pub async fn delete(&self, table: &'static str, filter: &Filter) -> Result<Vec<Value>, RemoteError> {
        self.spec(table)?;
        if self.faults.take() {
            return Err(RemoteError::Unavailable);
        }

        let removed: Vec<Value> = {
            let mut tables = self.tables.write().await;
            let rows = tables.get_mut(table).expect("spec checked above");
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| filter.matches(row));
            *rows = kept;
            gone
        };

        for row in &removed {
            self.feed.publish(RowChange {
                table,
                kind: ChangeKind::Deleted,
                old: Some(row.clone()),
                new: None,
            });
        }
        Ok(removed)
    }
}

/// RFC 3339 with microseconds: uniform precision keeps lexicographic and
/// chronological order identical.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn apply_patch(row: &Value, patch: &Map<String, Value>) -> Value {
    let mut map = row.as_object().cloned().unwrap_or_default();
    for (key, value) in patch {
        map.insert(key.clone(), value.clone());
    }
    Value::Object(map)
}

/// Reject `candidate` if a declared unique column set collides with any
/// row other than `exclude`. Rows with NULL in a constrained column never
/// collide.
fn check_unique(
    spec: &TableSpec,
    rows: &[Value],
    candidate: &Value,
    exclude: Option<usize>,
) -> Result<(), RemoteError> {
    for columns in spec.unique {
        let key: Vec<&Value> = columns
            .iter()
            .map(|c| candidate.get(*c).unwrap_or(&Value::Null))
            .collect();
        if key.iter().any(|v| v.is_null()) {
            continue;
        }
        let collision = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != exclude
                && columns
                    .iter()
                    .zip(&key)
                    .all(|(c, v)| row.get(*c) == Some(*v))
        });
        if collision {
            return Err(RemoteError::UniqueViolation {
                constraint: format!("{}_{}_key", spec.name, columns.join("_")),
            });
        }
    }
    Ok(())
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering as O;
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(O::Equal),
        (Value::Null, Value::Null) => O::Equal,
        (Value::Null, _) => O::Less,
        (_, Value::Null) => O::Greater,
        _ => O::Equal,
    }
}
