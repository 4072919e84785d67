// ── KPI metric catalog ──
//
// Dashboard metrics are evaluated server-side by stored procedures.
// The metric-to-procedure mapping is a typed enum so a missing mapping
// is a compile error, not a runtime lookup miss.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A predefined dashboard KPI, evaluated via a backend stored procedure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    OpenNonConformitiesCount,
    Open8dCount,
    DfClosureRate,
    AvgQualityNcClosureTime,
    AvgQualityProcessTime,
    ProducedVehiclesCount,
    QualityInspectionPassRate,
    AvgQualityInspectionTime,
    QuarantineCount,
    TotalNonQualityCost,
    ExpiredDocumentCount,
    OpenDeviationCount,
    CalibrationDueCount,
    OpenInternalAuditCount,
    OpenSupplierNcCount,
    ActiveSuppliersCount,
    AvgSupplierScore,
    SupplierNcRate,
    IncomingRejectionRate,
}

impl Metric {
    /// The stored procedure that evaluates this metric.
    pub fn procedure(self) -> &'static str {
        match self {
            Self::OpenNonConformitiesCount => "get_open_non_conformities_count",
            Self::Open8dCount => "get_open_8d_count",
            Self::DfClosureRate => "get_df_closure_rate",
            Self::AvgQualityNcClosureTime => "get_avg_quality_nc_closure_time",
            Self::AvgQualityProcessTime => "get_avg_quality_process_time",
            Self::ProducedVehiclesCount => "get_produced_vehicles_count",
            Self::QualityInspectionPassRate => "get_quality_inspection_pass_rate",
            Self::AvgQualityInspectionTime => "get_avg_quality_inspection_time",
            Self::QuarantineCount => "get_quarantine_count",
            Self::TotalNonQualityCost => "get_total_non_quality_cost",
            Self::ExpiredDocumentCount => "get_expired_document_count",
            Self::OpenDeviationCount => "get_open_deviation_count",
            Self::CalibrationDueCount => "get_calibration_due_count",
            Self::OpenInternalAuditCount => "get_open_internal_audit_count",
            Self::OpenSupplierNcCount => "get_open_supplier_nc_count",
            Self::ActiveSuppliersCount => "get_active_suppliers_count",
            Self::AvgSupplierScore => "get_avg_supplier_score",
            Self::SupplierNcRate => "get_supplier_nc_rate",
            Self::IncomingRejectionRate => "get_incoming_rejection_rate",
        }
    }

    /// Unit suffix for display (`""` for plain counts).
    pub fn unit(self) -> &'static str {
        match self {
            Self::DfClosureRate
            | Self::QualityInspectionPassRate
            | Self::SupplierNcRate
            | Self::IncomingRejectionRate => "%",
            Self::AvgQualityNcClosureTime
            | Self::AvgQualityProcessTime
            | Self::AvgQualityInspectionTime => " days",
            Self::TotalNonQualityCost => " TL",
            Self::AvgSupplierScore => " pts",
            _ => "",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn procedures_are_unique() {
        let mut names: Vec<&str> = Metric::iter().map(Metric::procedure).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Metric::iter().count());
    }

    #[test]
    fn identifier_round_trips() {
        for m in Metric::iter() {
            let parsed: Metric = m.to_string().parse().unwrap();
            assert_eq!(parsed, m);
        }
        assert_eq!(
            Metric::TotalNonQualityCost.procedure(),
            "get_total_non_quality_cost"
        );
    }

    #[test]
    fn rates_render_as_percentages() {
        assert_eq!(Metric::DfClosureRate.unit(), "%");
        assert_eq!(Metric::QuarantineCount.unit(), "");
    }
}
