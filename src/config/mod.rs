use std::collections::HashSet;
use std::fs;
use std::path::Path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::drift::ColumnOrder;
use crate::error::{Result, RowDriftError};

fn default_max_deletes() -> usize {
    1
}

fn default_interval_secs() -> u64 {
    60
}

fn default_tracking_dataset() -> String {
    "rowdrift".to_string()
}

/// Settings for monitoring one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub table_name: String,
    pub primary_key_column: String,
    #[serde(default)]
    pub column_order: ColumnOrder,
    /// Deleted keys audited per pass.
    #[serde(default = "default_max_deletes")]
    pub max_deletes_per_pass: usize,
    /// Abort the pass on the first invalid row instead of collecting it.
    #[serde(default)]
    pub fail_fast: bool,
}

impl MonitorConfig {
    pub fn new(table_name: impl Into<String>, primary_key_column: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key_column: primary_key_column.into(),
            column_order: ColumnOrder::default(),
            max_deletes_per_pass: default_max_deletes(),
            fail_fast: false,
        }
    }

    pub fn with_column_order(mut self, order: ColumnOrder) -> Self {
        self.column_order = order;
        self
    }

    pub fn with_max_deletes_per_pass(mut self, limit: usize) -> Self {
        self.max_deletes_per_pass = limit;
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(RowDriftError::validation("Table name cannot be null or empty"));
        }
        if self.primary_key_column.trim().is_empty() {
            return Err(RowDriftError::validation("Primary key name cannot be null or empty"));
        }
        if self.max_deletes_per_pass == 0 {
            return Err(RowDriftError::validation(format!(
                "max_deletes_per_pass must be at least 1 for table '{}'",
                self.table_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs() }
    }
}

/// Contents of the `rowdrift.yaml` file read by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub project: Option<String>,
    pub dataset: String,
    #[serde(default = "default_tracking_dataset")]
    pub tracking_dataset: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub monitors: Vec<MonitorConfig>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| RowDriftError::ConfigFileNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| RowDriftError::Config(e.to_string()))?;

        for (field, value) in [("dataset", &self.dataset), ("tracking_dataset", &self.tracking_dataset)] {
            if !ident.is_match(value) {
                return Err(RowDriftError::Config(format!("Invalid {}: '{}'", field, value)));
            }
        }

        if self.schedule.interval_secs == 0 {
            return Err(RowDriftError::Config("schedule.interval_secs must be positive".to_string()));
        }

        if self.monitors.is_empty() {
            return Err(RowDriftError::Config("No monitors configured".to_string()));
        }

        let mut seen = HashSet::new();
        for monitor in &self.monitors {
            monitor.validate()?;
            for name in [&monitor.table_name, &monitor.primary_key_column] {
                if !ident.is_match(name) {
                    return Err(RowDriftError::Config(format!("Invalid identifier: '{}'", name)));
                }
            }
            if !seen.insert(monitor.table_name.as_str()) {
                return Err(RowDriftError::Config(format!(
                    "Table '{}' is monitored more than once",
                    monitor.table_name
                )));
            }
        }

        Ok(())
    }

    pub fn monitor(&self, table_name: &str) -> Option<&MonitorConfig> {
        self.monitors.iter().find(|m| m.table_name == table_name)
    }
}
