use chrono::DateTime;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::field_type::FieldType;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job_reference::JobReference;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_row::TableRow;
use tracing::debug;
use crate::error::{parse_bq_error, BigQueryError, ErrorContext, Result, RowDriftError};
use crate::row::{Row, Value};

#[derive(Clone)]
pub struct BqClient {
    client: Client,
    project_id: String,
}

impl BqClient {
    pub async fn new(project_id: impl Into<String>) -> Result<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                RowDriftError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(Self {
            client,
            project_id: project_id.into(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Runs a DDL or DML statement and returns the number of affected rows
    /// (0 for DDL).
    pub async fn execute(&self, sql: &str, operation: &str) -> Result<u64> {
        debug!(operation, "Executing statement");
        let response = self.client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation(operation).with_sql(sql);
                RowDriftError::BigQuery(parse_bq_error(e, ctx))
            })?;

        let affected = response
            .num_dml_affected_rows
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(affected)
    }

    /// Runs a query and materializes every result row, columns in schema order.
    pub async fn query_rows(&self, sql: &str, operation: &str) -> Result<Vec<Row>> {
        debug!(operation, "Running query");
        let ctx = || ErrorContext::new().with_operation(operation).with_sql(sql);

        let response = self.client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(|e| RowDriftError::BigQuery(parse_bq_error(e, ctx())))?;

        let mut fields = response.schema.and_then(|s| s.fields).unwrap_or_default();
        let mut raw_rows: Vec<TableRow> = Vec::new();
        let mut complete = response.job_complete.unwrap_or(true);
        let mut page_token = response.page_token;
        if complete {
            raw_rows.extend(response.rows.unwrap_or_default());
        }

        let job = response.job_reference;
        while !complete || page_token.is_some() {
            let (job_id, location) = job_location(job.as_ref(), operation)?;
            let params = GetQueryResultsParameters {
                page_token: page_token.take(),
                location,
                ..Default::default()
            };
            let page = self.client
                .job()
                .get_query_results(&self.project_id, &job_id, params)
                .await
                .map_err(|e| RowDriftError::BigQuery(parse_bq_error(e, ctx())))?;

            complete = page.job_complete.unwrap_or(true);
            if complete {
                if fields.is_empty() {
                    fields = page.schema.and_then(|s| s.fields).unwrap_or_default();
                }
                raw_rows.extend(page.rows.unwrap_or_default());
                page_token = page.page_token;
            }
        }

        raw_rows
            .iter()
            .map(|raw| materialize_row(&fields, raw, operation))
            .collect()
    }

    /// First column of the first row as an integer.
    pub async fn query_single_int(&self, sql: &str, operation: &str) -> Result<Option<i64>> {
        let rows = self.query_rows(sql, operation).await?;
        let first = rows.first().and_then(|r| r.iter().next().map(|(_, v)| v.clone()));
        match first {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
                    operation: operation.to_string(),
                    message: format!("Could not read {} value as integer", value.type_name()),
                })
            }),
        }
    }

    /// Creates `dataset` unless it already exists. Only a not-found lookup
    /// leads to creation; any other lookup error is returned.
    pub async fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        if let Err(e) = self.client.dataset().get(&self.project_id, dataset).await {
            let ctx = ErrorContext::new()
                .with_operation("get_dataset")
                .with_dataset(&self.project_id, dataset);
            let err = parse_bq_error(e, ctx);
            if !err.is_not_found() {
                return Err(RowDriftError::BigQuery(err));
            }

            debug!(dataset, "Creating tracking dataset");
            let ds = Dataset::new(&self.project_id, dataset);
            self.client
                .dataset()
                .create(ds)
                .await
                .map_err(|e| {
                    let ctx = ErrorContext::new()
                        .with_operation("create_dataset")
                        .with_dataset(&self.project_id, dataset);
                    RowDriftError::BigQuery(parse_bq_error(e, ctx))
                })?;
        }
        Ok(())
    }
}

fn job_location(job: Option<&JobReference>, operation: &str) -> Result<(String, Option<String>)> {
    let job = job.ok_or_else(|| {
        RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
            operation: operation.to_string(),
            message: "Incomplete result without a job reference".to_string(),
        })
    })?;
    let job_id = job.job_id.clone().ok_or_else(|| {
        RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
            operation: operation.to_string(),
            message: "Job reference has no job id".to_string(),
        })
    })?;
    Ok((job_id, job.location.clone()))
}

fn materialize_row(fields: &[TableFieldSchema], raw: &TableRow, operation: &str) -> Result<Row> {
    let cells = raw.columns.as_deref().unwrap_or(&[]);
    let mut row = Row::new();
    for (field, cell) in fields.iter().zip(cells) {
        let value = cell_to_value(&field.r#type, cell.value.as_ref()).map_err(|message| {
            RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
                operation: operation.to_string(),
                message: format!("column '{}': {}", field.name, message),
            })
        })?;
        row.push(field.name.clone(), value);
    }
    Ok(row)
}

/// Converts one REST cell into a typed value. Scalars arrive as JSON strings.
pub(crate) fn cell_to_value(
    field_type: &FieldType,
    raw: Option<&serde_json::Value>,
) -> std::result::Result<Value, String> {
    let text = match raw {
        None | Some(serde_json::Value::Null) => return Ok(Value::Null),
        Some(serde_json::Value::String(s)) => s.as_str(),
        Some(other) => return Ok(Value::String(other.to_string())),
    };

    match field_type {
        FieldType::Integer | FieldType::Int64 => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("invalid integer '{}'", text)),
        FieldType::Float | FieldType::Float64 => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid float '{}'", text)),
        FieldType::Boolean | FieldType::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(format!("invalid boolean '{}'", other)),
        },
        FieldType::Timestamp => {
            let seconds = text
                .parse::<f64>()
                .map_err(|_| format!("invalid timestamp '{}'", text))?;
            DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("timestamp out of range '{}'", text))
        }
        _ => Ok(Value::String(text.to_string())),
    }
}
