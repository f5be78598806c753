use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use super::{RowSource, SourceFilter, SourceKind};
use crate::error::{Result, ServiceError};
use crate::types::{parse_i64_lenient, RawRow};

/// Rows straight from Postgres through a small connection pool.
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| ServiceError::Database {
                message: format!("Failed to connect to database: {e}"),
            })?;
        info!("Connected to database");
        Ok(Self { pool })
    }

    /// The SELECT statement for `filter`, with `$n` placeholders in the
    /// order the values are bound by `fetch_rows`.
    pub fn build_query(table: &str, filter: &SourceFilter) -> String {
        let mut clauses = Vec::new();
        let mut next = 1;
        if filter.ano.is_some() {
            clauses.push(format!("CAST(ano AS integer) = ${}", next));
            next += 1;
        }
        if filter.mes.is_some() {
            clauses.push(format!("CAST(mes AS integer) = ${}", next));
            next += 1;
        }
        if filter.uf.is_some() {
            clauses.push(format!("tx_sigla ILIKE ${}", next));
        }

        let mut query = format!(
            "SELECT tx_sigla::text AS tx_sigla, tx_insumo::text AS tx_insumo, \
             ano::text AS ano, mes::text AS mes, qtde::text AS qtde FROM {}",
            quote_identifier(table)
        );
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn text_column(row: &PgRow, name: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(name)
        .map_err(|e| ServiceError::Database {
            message: format!("Failed to read column {name}: {e}"),
        })
}

#[async_trait]
impl RowSource for PostgresSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Database
    }

    async fn fetch_rows(&self, table: &str, filter: &SourceFilter) -> Result<Vec<RawRow>> {
        let sql = Self::build_query(table, filter);
        let mut query = sqlx::query(&sql);
        if let Some(ano) = filter.ano {
            query = query.bind(ano);
        }
        if let Some(mes) = filter.mes {
            query = query.bind(mes as i32);
        }
        if let Some(uf) = &filter.uf {
            query = query.bind(format!("%{}%", uf));
        }

        let records = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ServiceError::Database {
                message: format!("Failed to query {table}: {e}"),
            })?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let ano = text_column(record, "ano")?.as_deref().and_then(parse_i64_lenient);
            let mes = text_column(record, "mes")?.as_deref().and_then(parse_i64_lenient);
            rows.push(RawRow {
                tx_sigla: text_column(record, "tx_sigla")?,
                tx_insumo: text_column(record, "tx_insumo")?,
                ano: ano.and_then(|v| i32::try_from(v).ok()),
                mes: mes.and_then(|v| u32::try_from(v).ok()),
                qtde: text_column(record, "qtde")?
                    .as_deref()
                    .and_then(parse_i64_lenient)
                    .unwrap_or(0),
                ..Default::default()
            });
        }
        Ok(rows)
    }
}
