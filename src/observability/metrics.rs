//! Pipeline metrics, recorded through the `metrics` facade.
//!
//! No exporter is installed here; the calls are free until an embedding
//! process installs a recorder. Each stage owns a submodule so metric names
//! stay in one place.

use std::fmt;

/// Every metric the pipeline emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RowsGenerated,
    DefectsInjected,
    RowsAccepted,
    RowsRejected,
    StatusesRecoded,
    ValuesImputed,
    RowsLoaded,
    LoadsAborted,
    StageDuration,
}

impl MetricName {
    pub const ALL: [MetricName; 9] = [
        MetricName::RowsGenerated,
        MetricName::DefectsInjected,
        MetricName::RowsAccepted,
        MetricName::RowsRejected,
        MetricName::StatusesRecoded,
        MetricName::ValuesImputed,
        MetricName::RowsLoaded,
        MetricName::LoadsAborted,
        MetricName::StageDuration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsGenerated => "etl_rows_generated_total",
            MetricName::DefectsInjected => "etl_defects_injected_total",
            MetricName::RowsAccepted => "etl_rows_accepted_total",
            MetricName::RowsRejected => "etl_rows_rejected_total",
            MetricName::StatusesRecoded => "etl_statuses_recoded_total",
            MetricName::ValuesImputed => "etl_values_imputed_total",
            MetricName::RowsLoaded => "etl_rows_loaded_total",
            MetricName::LoadsAborted => "etl_loads_aborted_total",
            MetricName::StageDuration => "etl_stage_duration_seconds",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            MetricName::RowsGenerated => "Raw shipment rows generated",
            MetricName::DefectsInjected => "Defects injected by the generator",
            MetricName::RowsAccepted => "Rows accepted into the fact table",
            MetricName::RowsRejected => "Rows rejected during cleaning",
            MetricName::StatusesRecoded => "Statuses recoded to match delivery timestamps",
            MetricName::ValuesImputed => "Field values imputed during cleaning",
            MetricName::RowsLoaded => "Rows committed to the warehouse",
            MetricName::LoadsAborted => "Loads aborted by a storage failure",
            MetricName::StageDuration => "Wall time per pipeline stage",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register help text with whatever recorder is installed
pub fn describe_all() {
    for name in MetricName::ALL {
        match name {
            MetricName::StageDuration => {
                ::metrics::describe_histogram!(name.as_str(), ::metrics::Unit::Seconds, name.help());
            }
            _ => {
                ::metrics::describe_counter!(name.as_str(), name.help());
            }
        }
    }
}

pub fn stage_completed(stage: &'static str, seconds: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(seconds);
}

pub mod generation {
    use super::MetricName;
    use crate::pipeline::generation::Defect;

    pub fn rows_generated(rows: usize) {
        ::metrics::counter!(MetricName::RowsGenerated.as_str()).increment(rows as u64);
    }

    pub fn defect_injected(defect: Defect) {
        ::metrics::counter!(MetricName::DefectsInjected.as_str(),
            "defect" => format!("{defect:?}")
        )
        .increment(1);
    }
}

pub mod transform {
    use super::MetricName;
    use crate::pipeline::processing::RejectReason;

    pub fn rows_accepted(rows: usize) {
        ::metrics::counter!(MetricName::RowsAccepted.as_str()).increment(rows as u64);
    }

    pub fn row_rejected(reason: RejectReason) {
        ::metrics::counter!(MetricName::RowsRejected.as_str(), "reason" => reason.as_str()).increment(1);
    }

    pub fn statuses_recoded(count: usize) {
        ::metrics::counter!(MetricName::StatusesRecoded.as_str()).increment(count as u64);
    }

    pub fn values_imputed(field: &'static str, count: usize) {
        ::metrics::counter!(MetricName::ValuesImputed.as_str(), "field" => field).increment(count as u64);
    }
}

pub mod load {
    use super::MetricName;
    use crate::pipeline::storage::Table;

    pub fn rows_loaded(table: Table, rows: usize) {
        ::metrics::counter!(MetricName::RowsLoaded.as_str(), "table" => table.name()).increment(rows as u64);
    }

    pub fn load_aborted(table: Table) {
        ::metrics::counter!(MetricName::LoadsAborted.as_str(), "table" => table.name()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: HashSet<_> = MetricName::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("etl_")));
    }

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        describe_all();
        stage_completed("test", 0.5);
        transform::rows_accepted(3);
    }
}
