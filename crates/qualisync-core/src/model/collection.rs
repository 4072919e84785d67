// ── Collection catalog ──
//
// Every mirrored collection is a variant here, with its load wave,
// query definition, and merge behavior as static metadata. The enum is
// the single source of truth: the loader, the refresh ops, and the
// change-feed listener all route through it, so an unknown table can
// only fail at the edge (a dropped event), never as a missed lookup
// deep in the merge path.

use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

// ── Wave ────────────────────────────────────────────────────────────

/// Load priority tier. Waves execute strictly in this order; collections
/// inside a wave are fetched concurrently and merged as one update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Wave {
    /// Small lookup/reference tables every form depends on.
    Critical,
    /// Primary transactional tables with light joins.
    Medium,
    /// Large row counts or per-row secondary queries.
    Heavy,
    /// Audit trails, logs, and secondary cross-references, row-capped.
    LowPriority,
}

// ── FetchSpec / OptionMapping ───────────────────────────────────────

/// Static query definition for one collection.
#[derive(Debug, Clone, Copy)]
pub struct FetchSpec {
    /// Backend relation (table or view) to select from.
    pub table: &'static str,
    /// Column / embedded-resource projection.
    pub columns: &'static str,
    /// Optional ordering: (column, ascending).
    pub order: Option<(&'static str, bool)>,
    /// Optional row cap.
    pub limit: Option<u32>,
}

/// Declares that a collection is stored as `{value, label, ...}` option
/// rows instead of raw records.
#[derive(Debug, Clone, Copy)]
pub struct OptionMapping {
    pub value_field: &'static str,
    pub label_field: &'static str,
    /// Extra fields carried over verbatim.
    pub carry: &'static [&'static str],
}

// ── Collection ──────────────────────────────────────────────────────

/// All collections mirrored from the backend, identified by their
/// snake_case name (`Display` / `FromStr`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumCount,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    QualityCosts,
    Personnel,
    UnitCostSettings,
    MaterialCostSettings,
    ProducedVehicles,
    ProductionDepartments,
    NonConformities,
    Suppliers,
    SupplierNonConformities,
    Audits,
    AuditFindings,
    Documents,
    Equipment,
    Deviations,
    QuarantineRecords,
    IncomingInspections,
    Kpis,
    Tasks,
    TaskTags,
    IncomingControlPlans,
    Characteristics,
    MeasurementEquipment,
    ToleranceStandards,
    SupplierAuditQuestions,
    KaizenEntries,
    AuditLogs,
    StockRiskControls,
    InkrReports,
    Customers,
    CustomerComplaints,
    ComplaintAnalyses,
    ComplaintActions,
    ComplaintDocuments,
}

impl Collection {
    /// Stable slot index for array-backed storage.
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// The collection's snake_case name.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Which load wave this collection belongs to.
    pub fn wave(self) -> Wave {
        match self {
            Self::Personnel
            | Self::UnitCostSettings
            | Self::MaterialCostSettings
            | Self::ProductionDepartments
            | Self::TaskTags
            | Self::Customers
            | Self::Characteristics
            | Self::MeasurementEquipment
            | Self::ToleranceStandards => Wave::Critical,

            Self::NonConformities
            | Self::Suppliers
            | Self::SupplierNonConformities
            | Self::Audits
            | Self::AuditFindings
            | Self::Documents
            | Self::Equipment
            | Self::Deviations
            | Self::QuarantineRecords
            | Self::IncomingInspections
            | Self::Kpis
            | Self::Tasks
            | Self::KaizenEntries
            | Self::CustomerComplaints => Wave::Medium,

            Self::QualityCosts | Self::ProducedVehicles => Wave::Heavy,

            Self::IncomingControlPlans
            | Self::SupplierAuditQuestions
            | Self::AuditLogs
            | Self::StockRiskControls
            | Self::InkrReports
            | Self::ComplaintAnalyses
            | Self::ComplaintActions
            | Self::ComplaintDocuments => Wave::LowPriority,
        }
    }

    /// All collections in the given wave, in declaration order.
    pub fn in_wave(wave: Wave) -> impl Iterator<Item = Self> {
        Self::iter().filter(move |c| c.wave() == wave)
    }

    /// The query this collection is loaded (and refreshed) with.
    #[allow(clippy::too_many_lines)]
    pub fn spec(self) -> FetchSpec {
        match self {
            Self::QualityCosts => FetchSpec {
                table: "quality_costs",
                columns: "*, responsible_personnel:personnel!responsible_personnel_id(full_name), \
                          non_conformities(nc_number, id), supplier:suppliers!supplier_id(name)",
                order: Some(("cost_date", false)),
                limit: None,
            },
            Self::Personnel => FetchSpec {
                table: "personnel",
                columns: "id, full_name, email, avatar_url, department, unit_id, is_active",
                order: Some(("full_name", true)),
                limit: None,
            },
            Self::UnitCostSettings => FetchSpec {
                table: "cost_settings",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::MaterialCostSettings => FetchSpec {
                table: "material_costs",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::ProducedVehicles => FetchSpec {
                table: "quality_inspections",
                columns: "*, quality_inspection_faults(*, fault_category:fault_categories(name)), \
                          vehicle_timeline_events(*)",
                order: None,
                limit: None,
            },
            Self::ProductionDepartments => FetchSpec {
                table: "production_departments",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::NonConformities => FetchSpec {
                table: "non_conformities",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::Suppliers => FetchSpec {
                table: "suppliers",
                columns: "*, alternative_supplier:suppliers!alternative_to_supplier_id(id, name), \
                          supplier_certificates(valid_until), supplier_audits(*), \
                          supplier_scores(final_score, grade, period), supplier_audit_plans(*)",
                order: None,
                limit: None,
            },
            Self::SupplierNonConformities => FetchSpec {
                table: "supplier_non_conformities",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::Audits => FetchSpec {
                table: "audits",
                columns: "*, department:cost_settings(id, unit_name)",
                order: None,
                limit: None,
            },
            Self::AuditFindings => FetchSpec {
                table: "audit_findings",
                columns: "*, audits(report_number), \
                          non_conformities!source_finding_id(id, nc_number, status)",
                order: None,
                limit: None,
            },
            Self::Documents => FetchSpec {
                table: "documents",
                columns: "*, personnel(id, full_name), \
                          document_revisions:current_revision_id(*), valid_until",
                order: None,
                limit: None,
            },
            Self::Equipment => FetchSpec {
                table: "equipments",
                columns: "*, equipment_calibrations(*), \
                          equipment_assignments(*, personnel(full_name))",
                order: None,
                limit: None,
            },
            Self::Deviations => FetchSpec {
                table: "deviations",
                columns: "*, deviation_approvals(*), deviation_attachments(*), \
                          deviation_vehicles(*)",
                order: None,
                limit: None,
            },
            Self::QuarantineRecords => FetchSpec {
                table: "quarantine_records_api",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::IncomingInspections => FetchSpec {
                table: "incoming_inspections_with_supplier",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::Kpis => FetchSpec {
                table: "kpis",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::Tasks => FetchSpec {
                table: "tasks",
                columns: "*, owner:owner_id(full_name, email), \
                          assignees:task_assignees(personnel(id, full_name, email, avatar_url)), \
                          tags:task_tag_relations(task_tags(id, name, color)), \
                          checklist:task_checklists(*)",
                order: None,
                limit: None,
            },
            Self::TaskTags => FetchSpec {
                table: "task_tags",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::IncomingControlPlans => FetchSpec {
                table: "incoming_control_plans",
                columns: "part_code, is_current",
                order: None,
                limit: None,
            },
            Self::Characteristics => FetchSpec {
                table: "characteristics",
                columns: "id, name, type, sampling_rate",
                order: None,
                limit: None,
            },
            Self::MeasurementEquipment => FetchSpec {
                table: "measurement_equipment",
                columns: "id, name",
                order: Some(("name", true)),
                limit: None,
            },
            Self::ToleranceStandards => FetchSpec {
                table: "tolerance_standards",
                columns: "id, name",
                order: None,
                limit: None,
            },
            Self::SupplierAuditQuestions => FetchSpec {
                table: "supplier_audit_questions",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::KaizenEntries => FetchSpec {
                table: "kaizen_entries",
                columns: "*, proposer:proposer_id(full_name), \
                          responsible_person:responsible_person_id(full_name), \
                          approver:approver_id(full_name), \
                          department:department_id(unit_name, cost_per_minute), \
                          supplier:supplier_id(name)",
                order: None,
                limit: None,
            },
            Self::AuditLogs => FetchSpec {
                table: "audit_log_entries",
                columns: "*",
                order: Some(("created_at", false)),
                limit: Some(200),
            },
            Self::StockRiskControls => FetchSpec {
                table: "stock_risk_controls",
                columns: "*",
                order: Some(("created_at", false)),
                limit: Some(200),
            },
            Self::InkrReports => FetchSpec {
                table: "inkr_reports",
                columns: "*, supplier:supplier_id(name)",
                order: Some(("created_at", false)),
                limit: Some(200),
            },
            Self::Customers => FetchSpec {
                table: "customers",
                columns: "*",
                order: Some(("name", true)),
                limit: None,
            },
            Self::CustomerComplaints => FetchSpec {
                table: "customer_complaints",
                columns: "*, customer:customer_id(name, customer_code), \
                          responsible_person:responsible_personnel_id(full_name), \
                          assigned_to:assigned_to_id(full_name), \
                          responsible_department:responsible_department_id(unit_name)",
                order: Some(("complaint_date", false)),
                limit: None,
            },
            Self::ComplaintAnalyses => FetchSpec {
                table: "complaint_analyses",
                columns: "*",
                order: None,
                limit: None,
            },
            Self::ComplaintActions => FetchSpec {
                table: "complaint_actions",
                columns: "*, responsible_person:responsible_person_id(full_name), \
                          responsible_department:responsible_department_id(unit_name)",
                order: None,
                limit: None,
            },
            Self::ComplaintDocuments => FetchSpec {
                table: "complaint_documents",
                columns: "*",
                order: None,
                limit: None,
            },
        }
    }

    /// `true` for the one unbounded collection fetched in fixed-size
    /// pages and merged as a unit.
    pub fn paginated(self) -> bool {
        matches!(self, Self::QualityCosts)
    }

    /// Secondary per-row fetch: (relation, foreign-key column, field the
    /// result is attached under). Used where the backend cannot embed
    /// the relation at this depth.
    pub fn row_subfetch(self) -> Option<(&'static str, &'static str, &'static str)> {
        match self {
            Self::ProducedVehicles => Some((
                "quality_inspection_history",
                "inspection_id",
                "quality_inspection_history",
            )),
            _ => None,
        }
    }

    /// Option-row transform applied at store time, if any.
    pub fn option_mapping(self) -> Option<OptionMapping> {
        match self {
            Self::Characteristics => Some(OptionMapping {
                value_field: "id",
                label_field: "name",
                carry: &["type", "sampling_rate"],
            }),
            Self::MeasurementEquipment | Self::ToleranceStandards => Some(OptionMapping {
                value_field: "id",
                label_field: "name",
                carry: &[],
            }),
            _ => None,
        }
    }

    /// `true` if the collection is kept live through the change feed.
    pub fn realtime(self) -> bool {
        matches!(
            self,
            Self::Tasks
                | Self::NonConformities
                | Self::Deviations
                | Self::Personnel
                | Self::Kpis
                | Self::QualityCosts
                | Self::Documents
        )
    }

    /// `true` if change-feed events are merged as targeted patches
    /// instead of triggering a refetch (high-frequency tables).
    pub fn patchable(self) -> bool {
        matches!(self, Self::QualityCosts | Self::Documents)
    }

    /// Resolve a backend relation name back to its collection.
    pub fn from_table(table: &str) -> Option<Self> {
        Self::iter().find(|c| c.spec().table == table)
    }

    /// The tables the change-feed subscription covers.
    pub fn realtime_tables() -> Vec<String> {
        Self::iter()
            .filter(|c| c.realtime())
            .map(|c| c.spec().table.to_owned())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_collection_is_in_exactly_one_wave() {
        let total: usize = Wave::iter().map(|w| Collection::in_wave(w).count()).sum();
        assert_eq!(total, Collection::COUNT);
        assert_eq!(Collection::COUNT, 33);
    }

    #[test]
    fn wave_sizes_match_the_load_plan() {
        assert_eq!(Collection::in_wave(Wave::Critical).count(), 9);
        assert_eq!(Collection::in_wave(Wave::Medium).count(), 14);
        assert_eq!(Collection::in_wave(Wave::Heavy).count(), 2);
        assert_eq!(Collection::in_wave(Wave::LowPriority).count(), 8);
    }

    #[test]
    fn waves_execute_in_priority_order() {
        let order: Vec<Wave> = Wave::iter().collect();
        assert_eq!(
            order,
            vec![Wave::Critical, Wave::Medium, Wave::Heavy, Wave::LowPriority]
        );
        assert!(Wave::Critical < Wave::LowPriority);
    }

    #[test]
    fn slot_indexes_are_unique_and_dense() {
        let mut seen = vec![false; Collection::COUNT];
        for c in Collection::iter() {
            assert!(!seen[c.index()], "duplicate index for {c}");
            seen[c.index()] = true;
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn from_table_resolves_aliased_relations() {
        assert_eq!(
            Collection::from_table("cost_settings"),
            Some(Collection::UnitCostSettings)
        );
        assert_eq!(
            Collection::from_table("quality_inspections"),
            Some(Collection::ProducedVehicles)
        );
        assert_eq!(
            Collection::from_table("quarantine_records_api"),
            Some(Collection::QuarantineRecords)
        );
        assert_eq!(Collection::from_table("no_such_table"), None);
    }

    #[test]
    fn name_round_trips_through_from_str() {
        for c in Collection::iter() {
            let parsed: Collection = c.name().parse().unwrap();
            assert_eq!(parsed, c);
        }
        assert_eq!(Collection::QualityCosts.name(), "quality_costs");
    }

    #[test]
    fn patchable_is_a_subset_of_realtime() {
        for c in Collection::iter().filter(|c| c.patchable()) {
            assert!(c.realtime(), "{c} is patchable but not realtime");
        }
        assert_eq!(Collection::iter().filter(|c| c.realtime()).count(), 7);
        assert_eq!(Collection::iter().filter(|c| c.patchable()).count(), 2);
    }

    #[test]
    fn only_quality_costs_is_paginated() {
        let paginated: Vec<Collection> =
            Collection::iter().filter(|c| c.paginated()).collect();
        assert_eq!(paginated, vec![Collection::QualityCosts]);
    }

    #[test]
    fn option_mappings_cover_the_reference_collections() {
        let mapped: Vec<Collection> = Collection::iter()
            .filter(|c| c.option_mapping().is_some())
            .collect();
        assert_eq!(
            mapped,
            vec![
                Collection::Characteristics,
                Collection::MeasurementEquipment,
                Collection::ToleranceStandards,
            ]
        );
    }

    #[test]
    fn row_caps_only_on_low_priority_logs() {
        for c in Collection::iter().filter(|c| c.spec().limit.is_some()) {
            assert_eq!(c.wave(), Wave::LowPriority, "{c} has a cap outside low priority");
        }
    }
}
