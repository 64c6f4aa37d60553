use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{check_relation_names, PreparedWrite, RelationSink};
use crate::config::DatabaseConfig;
use crate::constants::{FEATURES_EXCLUDED_COLUMNS, FEATURES_RELATION, ID, OVERVIEW_RELATION, TRAINING_VIEW};
use crate::error::Result;
use crate::metrics::SinkMetrics;
use crate::table::{value_i64, value_text, Table};

/// Persists relations into a local SQLite file.
///
/// The connection is opened inside each call. A prepared write holds its
/// connection with an open transaction covering every relation of the run.
pub struct SqliteSink {
    config: DatabaseConfig,
}

impl SqliteSink {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.config.path)?;
        Ok(conn)
    }

    /// Read a persisted relation back, columns in table order and typed by their
    /// declared SQL type.
    pub fn read_relation(&self, name: &str) -> Result<Table> {
        let conn = self.open()?;
        let declared = declared_columns(&conn, name)?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(name)))?;
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); declared.len()];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, column) in values.iter_mut().enumerate() {
                column.push(row.get::<_, Value>(i)?);
            }
        }
        let series = declared
            .iter()
            .zip(values)
            .map(|((column, sql_type), values)| series_from_values(column, sql_type, values))
            .collect();
        Table::from_series(name, series)
    }

    /// Ids that occur more than once in a relation, with their counts.
    pub fn id_collisions(&self, relation: &str, id_column: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {id}, COUNT(*) FROM {rel} GROUP BY {id} HAVING COUNT(*) > 1 ORDER BY {id}",
            id = quote_ident(id_column),
            rel = quote_ident(relation)
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut collisions = Vec::new();
        while let Some(row) = rows.next()? {
            collisions.push((row.get(0)?, row.get(1)?));
        }
        Ok(collisions)
    }

    pub fn relation_names(&self) -> Result<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let mut rows = stmt.query([])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }
}

/// An open transaction holding every relation of one run.
struct StagedTransaction {
    conn: Connection,
    relations: usize,
    rows: usize,
    started: Instant,
    committed: bool,
}

impl PreparedWrite for StagedTransaction {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.committed = true;
        SinkMetrics::record_persisted("sqlite", self.relations, self.rows, self.started.elapsed().as_secs_f64());
        info!(rows = self.rows, "relations written to sqlite");
        Ok(())
    }
}

impl Drop for StagedTransaction {
    fn drop(&mut self) {
        if self.committed || self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "could not roll back staged sqlite write");
        }
    }
}

impl RelationSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip_all, fields(path = %self.config.path.display(), relations = relations.len()))]
    fn prepare(&self, relations: &[Table]) -> Result<Box<dyn PreparedWrite + '_>> {
        check_relation_names(relations)?;
        let started = Instant::now();
        let conn = self.open()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let mut staged = StagedTransaction {
            conn,
            relations: relations.len(),
            rows: 0,
            started,
            committed: false,
        };
        staged
            .conn
            .execute_batch(&format!("DROP VIEW IF EXISTS {};", quote_ident(TRAINING_VIEW)))?;
        for table in relations {
            replace_relation(&staged.conn, table)?;
            staged.rows += table.len();
        }
        let has = |name: &str| relations.iter().any(|t| t.name() == name);
        if has(FEATURES_RELATION) && has(OVERVIEW_RELATION) {
            staged.conn.execute_batch(&training_view_sql())?;
        }
        Ok(Box::new(staged))
    }
}

fn replace_relation(conn: &Connection, table: &Table) -> Result<()> {
    let name = quote_ident(table.name());
    let series: Vec<&Series> = table
        .frame()
        .get_columns()
        .iter()
        .map(Column::as_materialized_series)
        .collect();
    let columns: Vec<String> = series
        .iter()
        .map(|s| format!("{} {}", quote_ident(s.name()), sql_type(s)))
        .collect();
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {name};\nCREATE TABLE {name} ({});",
        columns.join(", ")
    ))?;

    let placeholders: Vec<String> = (1..=series.len()).map(|i| format!("?{i}")).collect();
    let mut stmt = conn.prepare(&format!("INSERT INTO {name} VALUES ({})", placeholders.join(", ")))?;
    for row in 0..table.len() {
        let values = series
            .iter()
            .map(|s| Ok(value_from_any(s.get(row)?)))
            .collect::<Result<Vec<_>>>()?;
        stmt.execute(params_from_iter(values))?;
    }
    debug!(relation = %table.name(), rows = table.len(), "relation replaced");
    Ok(())
}

/// INTEGER for integer and boolean columns, REAL for floats, TEXT otherwise.
pub fn sql_type(series: &Series) -> &'static str {
    match series.dtype() {
        dtype if dtype.is_integer() => "INTEGER",
        DataType::Boolean => "INTEGER",
        dtype if dtype.is_float() => "REAL",
        _ => "TEXT",
    }
}

fn declared_columns(conn: &Connection, relation: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(relation)))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push((row.get::<_, String>(1)?, row.get::<_, String>(2)?));
    }
    Ok(columns)
}

fn training_view_sql() -> String {
    let extra: Vec<String> = FEATURES_EXCLUDED_COLUMNS
        .iter()
        .map(|c| format!("o.{}", quote_ident(c)))
        .collect();
    format!(
        "CREATE VIEW {view} AS SELECT f.*, {extra} FROM {features} f LEFT JOIN {overview} o ON f.{id} = o.{id};",
        view = quote_ident(TRAINING_VIEW),
        extra = extra.join(", "),
        features = quote_ident(FEATURES_RELATION),
        overview = quote_ident(OVERVIEW_RELATION),
        id = quote_ident(ID),
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_from_any(value: AnyValue<'_>) -> Value {
    if let Some(v) = value_i64(&value) {
        return Value::Integer(v);
    }
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(b.into()),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::Float32(v) => Value::Real(v.into()),
        other => Value::Text(value_text(&other)),
    }
}

fn series_from_values(column: &str, sql_type: &str, values: Vec<Value>) -> Series {
    let name: PlSmallStr = column.into();
    match sql_type.to_ascii_uppercase().as_str() {
        "INTEGER" => Series::new(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        "REAL" => Series::new(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Real(f) => Some(f),
                    Value::Integer(i) => Some(i as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        _ => Series::new(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(f) => Some(f.to_string()),
                    Value::Text(s) => Some(s),
                    Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
                })
                .collect::<Vec<_>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sink(dir: &TempDir) -> SqliteSink {
        SqliteSink::new(DatabaseConfig {
            path: dir.path().join("db").join("esc.db"),
            enabled: true,
        })
    }

    fn ids(name: &str, ids: &[&str]) -> Table {
        Table::new(name, df!("id" => ids).unwrap())
    }

    #[test]
    fn test_sql_type_inference() {
        let t = df!(
            "i" => [Some(1i64), None],
            "f" => [1.0f64, 0.5],
            "s" => ["a", "2"]
        )
        .unwrap();
        let column = |c: &str| t.column(c).unwrap().as_materialized_series().clone();
        assert_eq!(sql_type(&column("i")), "INTEGER");
        assert_eq!(sql_type(&column("f")), "REAL");
        assert_eq!(sql_type(&column("s")), "TEXT");
        assert_eq!(sql_type(&Series::new_null("m".into(), 2)), "TEXT");
    }

    #[test]
    fn test_round_trip_and_replace() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir);
        let t = Table::new(
            "year_scores",
            df!("_id" => ["2016Sweden"], "Norway \"N\"" => [12i64], "share" => [Some(0.5f64)]).unwrap(),
        );
        sink.persist(&[t.clone()]).unwrap();
        assert_eq!(sink.read_relation("year_scores").unwrap(), t);

        let shorter = Table::new("year_scores", df!("_id" => Vec::<&str>::new()).unwrap());
        sink.persist(&[shorter.clone()]).unwrap();
        assert_eq!(sink.read_relation("year_scores").unwrap(), shorter);
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir);
        let good = ids("song_overview", &["2016Sweden"]);
        sink.persist(&[good.clone()]).unwrap();
        // A zero-column relation cannot be created, so the whole transaction fails.
        let broken = Table::empty("broken");
        let replaced = ids("song_overview", &[]);
        assert!(sink.persist(&[replaced, broken]).is_err());
        assert_eq!(sink.read_relation("song_overview").unwrap(), good);
        assert_eq!(sink.relation_names().unwrap(), vec!["song_overview"]);
    }

    #[test]
    fn test_uncommitted_write_rolls_back() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir);
        let good = ids("song_overview", &["2016Sweden"]);
        sink.persist(&[good.clone()]).unwrap();
        let staged = sink.prepare(&[ids("song_overview", &[]), ids("year_scores", &["x"])]).unwrap();
        drop(staged);
        assert_eq!(sink.read_relation("song_overview").unwrap(), good);
        assert_eq!(sink.relation_names().unwrap(), vec!["song_overview"]);
    }

    #[test]
    fn test_collisions() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir);
        sink.persist(&[ids("song_overview", &["1995Bosnia", "1995Bosnia", "1995Sweden"])]).unwrap();
        assert_eq!(
            sink.id_collisions("song_overview", "id").unwrap(),
            vec![("1995Bosnia".to_string(), 2)]
        );
    }
}
