/// Dataset keys. Each key names one exported artifact and one cleaning pass.
pub const ABGAR_GRIEVANCES: &str = "abgar_grievances";
pub const ABGAR_APPEALS: &str = "abgar_appeals";
pub const ABGAR_EXPEDITED_APPEALS: &str = "abgar_expedited_appeals";
pub const ABGAR_NOABD: &str = "abgar_noabd";
pub const ADULT_DEPRESSION_LGHC: &str = "adult_depression_lghc";
pub const CORE_SET_MENTAL_HEALTH: &str = "core_set_mental_health";
pub const MAT_ANNUAL: &str = "mat_annual";
pub const MAT_QUARTERLY: &str = "mat_quarterly";
pub const FFS_PROVIDERS_PROFILE: &str = "ffs_providers_profile";
pub const ACS_5YR_ESTIMATES: &str = "acs_5yr_estimates";
pub const SUD_RECOVERY_FACILITIES: &str = "sud_recovery_facilities";
pub const SUD_RECOVERY_FACILITIES_GEOJSON: &str = "sud_recovery_facilities_geojson";
pub const FOSTER_CARE_ENTRIES_EXITS: &str = "foster_care_entries_exits";
pub const CIGARETTE_USE_PREVALENCE: &str = "cigarette_use_prevalence";
pub const TOBACCO_USE_PREVALENCE: &str = "tobacco_use_prevalence";
pub const LANTERMAN_PETRIS_SHORT: &str = "lanterman_petris_short_data";
pub const CRISIS_SERVICE_UTILIZATION: &str = "crisis_service_utilization_ocw";
pub const MANAGED_CARE_ENROLLMENT: &str = "managed_care_enrollment_report";

/// Cleaning rule references. A dataset spec names one of these; the
/// cleaning registry maps each to a strategy.
pub const RULE_STANDARD: &str = "standard";
pub const RULE_MAT_QUARTERLY: &str = "mat_quarterly";
pub const RULE_CORE_SET: &str = "core_set";
pub const RULE_SUD_FACILITIES: &str = "sud_facilities";
pub const RULE_FOSTER_CARE: &str = "foster_care";
pub const RULE_ACS_ESTIMATES: &str = "acs_estimates";

pub const DEFAULT_TARGET_COUNTY: &str = "Calaveras";
pub const DEFAULT_SAMPLE_ROWS: usize = 5;
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_REPORT_FILE: &str = "run_report.json";
pub const DEFAULT_QUALITY_REPORT_FILE: &str = "data_quality_report.md";
pub const DEFAULT_SQLITE_FILE: &str = "output_data.sqlite";
pub const DEFAULT_WORKBOOK_FILE: &str = "behavioral_health_dashboard_data.xlsx";

/// Get all built-in dataset keys in catalog order
pub fn builtin_dataset_keys() -> Vec<&'static str> {
    vec![
        ABGAR_GRIEVANCES,
        ABGAR_APPEALS,
        ABGAR_EXPEDITED_APPEALS,
        ABGAR_NOABD,
        ADULT_DEPRESSION_LGHC,
        CORE_SET_MENTAL_HEALTH,
        MAT_ANNUAL,
        MAT_QUARTERLY,
        FFS_PROVIDERS_PROFILE,
        ACS_5YR_ESTIMATES,
        SUD_RECOVERY_FACILITIES,
        SUD_RECOVERY_FACILITIES_GEOJSON,
        FOSTER_CARE_ENTRIES_EXITS,
        CIGARETTE_USE_PREVALENCE,
        TOBACCO_USE_PREVALENCE,
        LANTERMAN_PETRIS_SHORT,
        CRISIS_SERVICE_UTILIZATION,
        MANAGED_CARE_ENROLLMENT,
    ]
}
