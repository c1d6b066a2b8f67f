use gcp_bigquery_client::error::{BQError, ResponseError};
use super::bq_error::{BigQueryError, QueryErrorLocation};
use regex::Regex;

pub fn parse_bq_error(error: BQError, context: ErrorContext) -> BigQueryError {
    match &error {
        BQError::ResponseError { error: resp } => parse_response_error(resp, context),

        BQError::RequestError(req_err) => {
            if req_err.is_timeout() {
                BigQueryError::Timeout {
                    operation: context.operation.unwrap_or_else(|| "request".to_string()),
                }
            } else {
                BigQueryError::ConnectionFailed {
                    reason: req_err.to_string(),
                }
            }
        }

        BQError::NoToken => {
            BigQueryError::AuthenticationFailed {
                reason: "No authentication token available".to_string(),
            }
        }

        BQError::AuthError(auth_err) => {
            BigQueryError::AuthenticationFailed {
                reason: format!("{:?}", auth_err),
            }
        }

        BQError::YupAuthError(yup_err) => {
            BigQueryError::AuthenticationFailed {
                reason: yup_err.to_string(),
            }
        }

        BQError::InvalidServiceAccountKey(io_err) => {
            BigQueryError::InvalidCredentials {
                path: std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
                reason: io_err.to_string(),
            }
        }

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            BigQueryError::AuthenticationFailed {
                reason: io_err.to_string(),
            }
        }

        BQError::NoDataAvailable => {
            BigQueryError::UnexpectedResponse {
                operation: context.operation.unwrap_or_else(|| "query".to_string()),
                message: "No data available in response".to_string(),
            }
        }

        BQError::SerializationError(serde_err) => {
            BigQueryError::UnexpectedResponse {
                operation: context.operation.unwrap_or_else(|| "query".to_string()),
                message: serde_err.to_string(),
            }
        }

        BQError::ConnectionPoolError(msg) => {
            BigQueryError::ConnectionFailed {
                reason: msg.clone(),
            }
        }

        _ => BigQueryError::Unknown {
            code: None,
            message: error.to_string(),
            raw_error: format!("{:?}", error),
        }
    }
}

fn parse_response_error(
    resp: &ResponseError,
    context: ErrorContext,
) -> BigQueryError {
    let status = resp.error.code;
    let message = &resp.error.message;
    let reason = resp.error.errors.first().and_then(|e| e.get("reason").map(|s| s.as_str()));

    match (status, reason) {
        (400, Some("invalidQuery")) | (400, Some("invalid")) => {
            BigQueryError::InvalidQuery {
                sql_preview: context.sql.unwrap_or_default(),
                message: message.clone(),
                location: extract_query_location(message),
            }
        }

        (400, Some("timeout")) => {
            BigQueryError::Timeout {
                operation: context.operation.unwrap_or_else(|| "query".to_string()),
            }
        }

        (403, Some("accessDenied")) => {
            BigQueryError::AccessDenied {
                resource: context.resource.unwrap_or_else(|| "resource".to_string()),
                required_permission: extract_required_permission(message),
            }
        }

        (403, Some("quotaExceeded")) | (403, Some("rateLimitExceeded")) => {
            let quota_type = extract_quota_type(message).unwrap_or_else(|| "API".to_string());
            BigQueryError::QuotaExceeded {
                quota_type,
                message: message.clone(),
            }
        }

        (404, _) => parse_not_found_error(message, &context),

        (500..=599, _) => {
            BigQueryError::Unknown {
                code: Some(format!("HTTP_{}", status)),
                message: format!("BigQuery server error: {}", message),
                raw_error: format!("{:?}", resp),
            }
        }

        _ => BigQueryError::Unknown {
            code: reason.map(|s| s.to_string()),
            message: message.clone(),
            raw_error: format!("{:?}", resp),
        }
    }
}

fn parse_not_found_error(message: &str, context: &ErrorContext) -> BigQueryError {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("table") {
        // "Not found: Table project:dataset.table"
        let table_re = Regex::new(r"(?i)table\s+([^:\s]+):([^.\s]+)\.([^\s]+)").ok();
        if let Some(caps) = table_re.and_then(|re| re.captures(message)) {
            return BigQueryError::TableNotFound {
                project: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                dataset: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                table: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
            };
        }

        if let (Some(project), Some(dataset), Some(table)) =
            (&context.project, &context.dataset, &context.table) {
            return BigQueryError::TableNotFound {
                project: project.clone(),
                dataset: dataset.clone(),
                table: table.clone(),
            };
        }
    }

    if msg_lower.contains("dataset") {
        let dataset_re = Regex::new(r"(?i)dataset\s+([^:\s]+):([^\s]+)").ok();
        if let Some(caps) = dataset_re.and_then(|re| re.captures(message)) {
            return BigQueryError::DatasetNotFound {
                project: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                dataset: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            };
        }

        if let (Some(project), Some(dataset)) = (&context.project, &context.dataset) {
            return BigQueryError::DatasetNotFound {
                project: project.clone(),
                dataset: dataset.clone(),
            };
        }
    }

    BigQueryError::Unknown {
        code: Some("notFound".to_string()),
        message: message.to_string(),
        raw_error: message.to_string(),
    }
}

fn extract_query_location(message: &str) -> Option<QueryErrorLocation> {
    // "at [line:column]"
    let line_col_re = Regex::new(r"\[(\d+):(\d+)\]").ok()?;
    let caps = line_col_re.captures(message)?;
    Some(QueryErrorLocation {
        line: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        column: caps.get(2).and_then(|m| m.as_str().parse().ok()),
    })
}

fn extract_required_permission(message: &str) -> Option<String> {
    let perm_re = Regex::new(r"(bigquery\.[a-zA-Z.]+)").ok()?;
    perm_re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

fn extract_quota_type(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("concurrent") {
        Some("concurrent queries".to_string())
    } else if msg_lower.contains("dml") {
        Some("DML statements".to_string())
    } else if msg_lower.contains("rate") {
        Some("rate limit".to_string())
    } else {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub sql: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
}

const SQL_PREVIEW_LEN: usize = 500;

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let full_sql = sql.into();
        self.sql = Some(match full_sql.char_indices().nth(SQL_PREVIEW_LEN) {
            Some((cut, _)) => format!("{}...", &full_sql[..cut]),
            None => full_sql,
        });
        self
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_dataset(mut self, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        let (project, dataset) = (project.into(), dataset.into());
        self.resource = Some(format!("{}.{}", project, dataset));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self
    }

    pub fn with_table(mut self, project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        let (project, dataset, table) = (project.into(), dataset.into(), table.into());
        self.resource = Some(format!("{}.{}.{}", project, dataset, table));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self.table = Some(table);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_location_brackets() {
        let msg = "Unrecognized name: order_idd at [1:31]";
        let loc = extract_query_location(msg).unwrap();
        assert_eq!(loc.line, Some(1));
        assert_eq!(loc.column, Some(31));
    }

    #[test]
    fn test_extract_query_location_no_match() {
        assert!(extract_query_location("Some error without location info").is_none());
    }

    #[test]
    fn test_extract_required_permission() {
        let msg = "Access denied: User does not have bigquery.tables.updateData permission";
        assert_eq!(extract_required_permission(msg).unwrap(), "bigquery.tables.updateData");
    }

    #[test]
    fn test_extract_quota_type() {
        assert_eq!(extract_quota_type("Too many concurrent queries"), Some("concurrent queries".to_string()));
        assert_eq!(extract_quota_type("Too many DML statements outstanding"), Some("DML statements".to_string()));
        assert!(extract_quota_type("Some other quota issue").is_none());
    }

    #[test]
    fn test_error_context_sql_truncation() {
        let long_sql = "SELECT ".to_string() + &"x, ".repeat(500);
        let ctx = ErrorContext::new().with_sql(long_sql);
        let sql = ctx.sql.unwrap();
        assert_eq!(sql.chars().count(), SQL_PREVIEW_LEN + 3);
        assert!(sql.ends_with("..."));
    }

    #[test]
    fn test_error_context_with_table() {
        let ctx = ErrorContext::new()
            .with_operation("find_by_key")
            .with_table("my-project", "rowdrift", "_rowdrift_checksums");
        assert_eq!(ctx.operation.as_deref(), Some("find_by_key"));
        assert_eq!(ctx.resource.as_deref(), Some("my-project.rowdrift._rowdrift_checksums"));
        assert_eq!(ctx.table.as_deref(), Some("_rowdrift_checksums"));
    }

    #[test]
    fn test_parse_not_found_table_from_message() {
        let msg = "Not found: Table my-project:sales.orders was not found in location US";
        let err = parse_not_found_error(msg, &ErrorContext::new());

        match err {
            BigQueryError::TableNotFound { project, dataset, table } => {
                assert_eq!(project, "my-project");
                assert_eq!(dataset, "sales");
                assert_eq!(table, "orders");
            }
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_found_dataset_from_context() {
        let ctx = ErrorContext::new().with_table("proj", "rowdrift", "_rowdrift_audit");
        let err = parse_not_found_error("Dataset was removed", &ctx);

        match err {
            BigQueryError::DatasetNotFound { project, dataset } => {
                assert_eq!(project, "proj");
                assert_eq!(dataset, "rowdrift");
            }
            other => panic!("Expected DatasetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_found_dataset_with_dataset_context() {
        let ctx = ErrorContext::new().with_dataset("proj", "rowdrift");
        assert_eq!(ctx.resource.as_deref(), Some("proj.rowdrift"));

        let err = parse_not_found_error("Not found: Dataset was not found in location US", &ctx);
        assert!(matches!(err, BigQueryError::DatasetNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_parse_not_found_generic() {
        let err = parse_not_found_error("Resource unavailable", &ErrorContext::new());
        match err {
            BigQueryError::Unknown { code, .. } => assert_eq!(code, Some("notFound".to_string())),
            other => panic!("Expected Unknown, got {:?}", other),
        }
    }
}
