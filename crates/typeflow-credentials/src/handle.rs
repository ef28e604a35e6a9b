//! Typed connection handles.
//!
//! A handle wraps a live connection for one credential. Handles are created
//! lazily on first use, pooled per execution by [`HandlePool`], and closed
//! when the execution ends regardless of outcome.

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use redis::AsyncCommands;
use serde_json::{Map, Value, json};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, PgPool, Row};
use tokio::sync::Mutex;
use tracing::debug;
use typeflow_model::CredentialKind;

use crate::config::{MongoConfig, RedisConfig, SqlConfig, parse_config};
use crate::error::CredentialError;
use crate::service::CredentialService;

/// A live, typed connection for one credential.
pub enum CredentialHandle {
  Postgres { pool: PgPool },
  Mysql { pool: MySqlPool },
  Mongodb {
    client: mongodb::Client,
    database: String,
  },
  Redis {
    manager: redis::aio::ConnectionManager,
  },
}

fn connection_error(kind: CredentialKind, e: impl std::fmt::Display) -> CredentialError {
  CredentialError::Connection {
    kind: kind.as_str().to_string(),
    message: e.to_string(),
  }
}

impl CredentialHandle {
  /// Open a connection for the given kind and decrypted config.
  pub async fn connect(
    kind: CredentialKind,
    name: &str,
    config: &Value,
  ) -> Result<Self, CredentialError> {
    match kind {
      CredentialKind::Postgres => {
        let config: SqlConfig = parse_config(name, config)?;
        let pool = PgPoolOptions::new()
          .max_connections(2)
          .connect(&config.postgres_url())
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(CredentialHandle::Postgres { pool })
      }
      CredentialKind::Mysql => {
        let config: SqlConfig = parse_config(name, config)?;
        let pool = MySqlPoolOptions::new()
          .max_connections(2)
          .connect(&config.mysql_url())
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(CredentialHandle::Mysql { pool })
      }
      CredentialKind::Mongodb => {
        let config: MongoConfig = parse_config(name, config)?;
        let client = mongodb::Client::with_uri_str(&config.uri)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(CredentialHandle::Mongodb {
          client,
          database: config.database,
        })
      }
      CredentialKind::Redis => {
        let config: RedisConfig = parse_config(name, config)?;
        let client =
          redis::Client::open(config.url()).map_err(|e| connection_error(kind, e))?;
        let manager = client
          .get_connection_manager()
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(CredentialHandle::Redis { manager })
      }
    }
  }

  pub fn kind(&self) -> CredentialKind {
    match self {
      CredentialHandle::Postgres { .. } => CredentialKind::Postgres,
      CredentialHandle::Mysql { .. } => CredentialKind::Mysql,
      CredentialHandle::Mongodb { .. } => CredentialKind::Mongodb,
      CredentialHandle::Redis { .. } => CredentialKind::Redis,
    }
  }

  /// Dispatch a method call from a code node.
  pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value, CredentialError> {
    // connect/disconnect are lifecycle no-ops: the pool connects lazily and
    // closes handles when the execution ends.
    if method == "connect" || method == "disconnect" {
      return Ok(Value::Bool(true));
    }

    match self {
      CredentialHandle::Postgres { pool } => self.call_postgres(pool, method, args).await,
      CredentialHandle::Mysql { pool } => self.call_mysql(pool, method, args).await,
      CredentialHandle::Mongodb { client, database } => {
        self.call_mongodb(client, database, method, args).await
      }
      CredentialHandle::Redis { manager } => self.call_redis(manager.clone(), method, args).await,
    }
  }

  async fn call_postgres(
    &self,
    pool: &PgPool,
    method: &str,
    args: &[Value],
  ) -> Result<Value, CredentialError> {
    match method {
      "query" => {
        let sql = string_arg(self.kind(), method, args, 0)?;
        let params = args.get(1).and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut query = sqlx::query(&sql);
        for param in &params {
          query = bind_pg(query, param);
        }
        let rows = query
          .fetch_all(pool)
          .await
          .map_err(|e| connection_error(CredentialKind::Postgres, e))?;
        let row_count = rows.len();
        let rows: Vec<Value> = rows.iter().map(pg_row_to_json).collect();
        Ok(json!({ "rows": rows, "rowCount": row_count }))
      }
      other => Err(self.unsupported(other)),
    }
  }

  async fn call_mysql(
    &self,
    pool: &MySqlPool,
    method: &str,
    args: &[Value],
  ) -> Result<Value, CredentialError> {
    match method {
      "query" => {
        let sql = string_arg(self.kind(), method, args, 0)?;
        let params = args.get(1).and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut query = sqlx::query(&sql);
        for param in &params {
          query = bind_mysql(query, param);
        }
        let rows = query
          .fetch_all(pool)
          .await
          .map_err(|e| connection_error(CredentialKind::Mysql, e))?;
        let meta = json!({ "rowCount": rows.len() });
        let rows: Vec<Value> = rows.iter().map(mysql_row_to_json).collect();
        Ok(Value::Array(vec![Value::Array(rows), meta]))
      }
      other => Err(self.unsupported(other)),
    }
  }

  async fn call_mongodb(
    &self,
    client: &mongodb::Client,
    database: &str,
    method: &str,
    args: &[Value],
  ) -> Result<Value, CredentialError> {
    use mongodb::bson::{Document, to_document};

    let kind = CredentialKind::Mongodb;
    let collection_name = string_arg(kind, method, args, 0)?;
    let collection = client
      .database(database)
      .collection::<Document>(&collection_name);

    let doc_arg = |index: usize| -> Result<Document, CredentialError> {
      let value = args.get(index).cloned().unwrap_or(json!({}));
      to_document(&value).map_err(|e| connection_error(kind, e))
    };

    match method {
      "find" => {
        let cursor = collection
          .find(doc_arg(1)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        let docs: Vec<Document> = cursor
          .try_collect()
          .await
          .map_err(|e| connection_error(kind, e))?;
        serde_json::to_value(&docs).map_err(|e| connection_error(kind, e))
      }
      "findOne" => {
        let doc = collection
          .find_one(doc_arg(1)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        serde_json::to_value(&doc).map_err(|e| connection_error(kind, e))
      }
      "insertOne" => {
        let result = collection
          .insert_one(doc_arg(1)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        let inserted_id =
          serde_json::to_value(&result.inserted_id).map_err(|e| connection_error(kind, e))?;
        Ok(json!({ "insertedId": inserted_id }))
      }
      "updateOne" => {
        let result = collection
          .update_one(doc_arg(1)?, doc_arg(2)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(json!({
          "matchedCount": result.matched_count,
          "modifiedCount": result.modified_count,
        }))
      }
      "deleteOne" => {
        let result = collection
          .delete_one(doc_arg(1)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(json!({ "deletedCount": result.deleted_count }))
      }
      "countDocuments" => {
        let count = collection
          .count_documents(doc_arg(1)?)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(json!(count))
      }
      other => Err(self.unsupported(other)),
    }
  }

  async fn call_redis(
    &self,
    mut manager: redis::aio::ConnectionManager,
    method: &str,
    args: &[Value],
  ) -> Result<Value, CredentialError> {
    let kind = CredentialKind::Redis;
    match method {
      "get" => {
        let key = string_arg(kind, method, args, 0)?;
        let value: Option<String> = manager
          .get(&key)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(value.map(Value::String).unwrap_or(Value::Null))
      }
      "set" => {
        let key = string_arg(kind, method, args, 0)?;
        let value = match args.get(1) {
          Some(Value::String(s)) => s.clone(),
          Some(other) => other.to_string(),
          None => String::new(),
        };
        let _: () = manager
          .set(&key, value)
          .await
          .map_err(|e| connection_error(kind, e))?;
        Ok(Value::Bool(true))
      }
      other => Err(self.unsupported(other)),
    }
  }

  /// Close the underlying connection.
  pub async fn close(&self) {
    match self {
      CredentialHandle::Postgres { pool } => pool.close().await,
      CredentialHandle::Mysql { pool } => pool.close().await,
      CredentialHandle::Mongodb { client, .. } => client.clone().shutdown().await,
      CredentialHandle::Redis { .. } => {}
    }
  }

  fn unsupported(&self, method: &str) -> CredentialError {
    CredentialError::UnsupportedMethod {
      kind: self.kind().as_str().to_string(),
      method: method.to_string(),
    }
  }
}

fn string_arg(
  kind: CredentialKind,
  method: &str,
  args: &[Value],
  index: usize,
) -> Result<String, CredentialError> {
  args
    .get(index)
    .and_then(|v| v.as_str())
    .map(|s| s.to_string())
    .ok_or_else(|| CredentialError::Connection {
      kind: kind.as_str().to_string(),
      message: format!("{}: missing string argument {}", method, index),
    })
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;
type MysqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_pg<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
  match value {
    Value::Null => query.bind(Option::<String>::None),
    Value::Bool(b) => query.bind(*b),
    Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
    Value::Number(n) => query.bind(n.as_f64()),
    Value::String(s) => query.bind(s.clone()),
    other => query.bind(other.to_string()),
  }
}

fn bind_mysql<'q>(query: MysqlQuery<'q>, value: &Value) -> MysqlQuery<'q> {
  match value {
    Value::Null => query.bind(Option::<String>::None),
    Value::Bool(b) => query.bind(*b),
    Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
    Value::Number(n) => query.bind(n.as_f64()),
    Value::String(s) => query.bind(s.clone()),
    other => query.bind(other.to_string()),
  }
}

/// Decode a column by trying the common scalar types in order.
macro_rules! try_column {
  ($row:expr, $idx:expr, $($ty:ty),+) => {
    {
      let mut result = Value::Null;
      let mut decoded = false;
      $(
        if !decoded {
          if let Ok(v) = $row.try_get::<Option<$ty>, _>($idx) {
            result = v.map(|x| json!(x)).unwrap_or(Value::Null);
            decoded = true;
          }
        }
      )+
      let _ = decoded;
      result
    }
  };
}

fn pg_row_to_json(row: &PgRow) -> Value {
  let mut map = Map::new();
  for column in row.columns() {
    let idx = column.ordinal();
    let value = try_column!(row, idx, i64, f64, bool, String, Value);
    map.insert(column.name().to_string(), value);
  }
  Value::Object(map)
}

fn mysql_row_to_json(row: &MySqlRow) -> Value {
  let mut map = Map::new();
  for column in row.columns() {
    let idx = column.ordinal();
    let value = try_column!(row, idx, i64, f64, bool, String, Value);
    map.insert(column.name().to_string(), value);
  }
  Value::Object(map)
}

/// Per-execution cache of open handles.
///
/// Materializes a handle the first time a credential is called; unused
/// credentials never connect. `close_all` must run when the execution ends.
pub struct HandlePool {
  service: Arc<CredentialService>,
  organization_id: String,
  handles: Mutex<HashMap<String, Arc<CredentialHandle>>>,
}

impl HandlePool {
  pub fn new(service: Arc<CredentialService>, organization_id: impl Into<String>) -> Self {
    Self {
      service,
      organization_id: organization_id.into(),
      handles: Mutex::new(HashMap::new()),
    }
  }

  /// Call `method` on the named credential, connecting lazily.
  pub async fn call(
    &self,
    name: &str,
    method: &str,
    args: &[Value],
  ) -> Result<Value, CredentialError> {
    let handle = self.materialize(name).await?;
    handle.call(method, args).await
  }

  async fn materialize(&self, name: &str) -> Result<Arc<CredentialHandle>, CredentialError> {
    let mut handles = self.handles.lock().await;
    if let Some(handle) = handles.get(name) {
      return Ok(handle.clone());
    }

    let (credential, config) = self
      .service
      .decrypted_config(&self.organization_id, name)
      .await?;
    let handle = Arc::new(CredentialHandle::connect(credential.kind, name, &config).await?);
    debug!(credential = %name, kind = %credential.kind.as_str(), "credential handle opened");
    handles.insert(name.to_string(), handle.clone());
    Ok(handle)
  }

  /// Close every handle opened during this execution.
  pub async fn close_all(&self) {
    let mut handles = self.handles.lock().await;
    for (name, handle) in handles.drain() {
      debug!(credential = %name, "credential handle closed");
      handle.close().await;
    }
  }
}
