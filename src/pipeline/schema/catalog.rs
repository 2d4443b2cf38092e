//! Built-in dataset contracts for the county behavioral-health dashboard.

use std::collections::BTreeMap;

use super::{
    Aggregation, CanonicalLabel, CoercionHint, ColumnSpec, DatasetSpec, DatasetSpecBuilder, DedupRule,
    RollupSentinel,
};
use crate::constants::*;
use crate::error::{EtlError, Result};

/// Startup knobs that shape the built-in specs
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub target_county: String,
    /// Added to every dataset's own statewide markers
    pub statewide_markers: Vec<String>,
    /// dataset key -> categorical column -> sentinel labels. Replaces the
    /// catalog's default rollup sentinels for that dataset.
    pub rollup_overrides: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            target_county: DEFAULT_TARGET_COUNTY.to_string(),
            statewide_markers: Vec::new(),
            rollup_overrides: BTreeMap::new(),
        }
    }
}

impl CatalogSettings {
    pub fn for_county(target_county: impl Into<String>) -> Self {
        Self {
            target_county: target_county.into(),
            ..Self::default()
        }
    }
}

pub fn builtin_specs(settings: &CatalogSettings) -> Result<Vec<DatasetSpec>> {
    let county = settings.target_county.as_str();
    let builders = vec![
        abgar_grievances(county),
        abgar_appeals(county, ABGAR_APPEALS, "ABGAR Appeals by Type", "Appeal Count"),
        abgar_appeals(
            county,
            ABGAR_EXPEDITED_APPEALS,
            "ABGAR Expedited Appeals by Type",
            "Expedited Appeal Count",
        ),
        abgar_noabd(county),
        adult_depression(),
        core_set_mental_health(),
        mat_annual(county),
        mat_quarterly(county),
        ffs_providers_profile(county),
        acs_estimates(county),
        sud_facilities(county),
        sud_facilities_geojson(county),
        foster_care(),
        cigarette_use(),
        tobacco_use(),
        lanterman_petris_short(county),
        crisis_service_utilization(county),
        managed_care_enrollment(county),
    ];

    for key in settings.rollup_overrides.keys() {
        if !builders.iter().any(|b| b.key() == key) {
            return Err(EtlError::config(format!(
                "rollup override given for unknown dataset '{key}'"
            )));
        }
    }

    builders
        .into_iter()
        .map(|builder| {
            let builder = builder.extra_statewide_markers(&settings.statewide_markers);
            let builder = match settings.rollup_overrides.get(builder.key()) {
                Some(columns) => builder.rollups(
                    columns
                        .iter()
                        .map(|(column, values)| RollupSentinel {
                            column: column.clone(),
                            values: values.clone(),
                        })
                        .collect(),
                ),
                None => builder,
            };
            builder.build()
        })
        .collect()
}

fn other_labels() -> Vec<CanonicalLabel> {
    vec![CanonicalLabel::new("Other", "Other")]
}

fn sum_of(measures: &[&str]) -> Vec<(String, Aggregation)> {
    measures.iter().map(|m| (m.to_string(), Aggregation::Sum)).collect()
}

fn count(name: &str) -> ColumnSpec {
    ColumnSpec::numeric(name).non_negative()
}

fn percent(name: &str) -> ColumnSpec {
    ColumnSpec::numeric(name).range(Some(0.0), Some(100.0))
}

fn abgar_grievances(county: &str) -> DatasetSpecBuilder {
    let measures = [
        "Grievance Count",
        "Exempt Grievance Count",
        "Unresolved as of June 30",
        "Resolved",
        "Referred",
    ];
    DatasetSpec::builder(ABGAR_GRIEVANCES, "ABGAR Grievances by Type")
        .notes("Annual Beneficiary Grievance and Appeal Report, county and statewide rows")
        .column(ColumnSpec::categorical("Report Year").not_null())
        .column(ColumnSpec::categorical("Geography").not_null())
        .column(ColumnSpec::categorical("Grievance Category"))
        .column(ColumnSpec::categorical("Grievance Type"))
        .columns(measures.iter().map(|m| count(m)))
        .geography("Geography", county, &["State"])
        .rollup("Grievance Category", &["All"])
        .rollup("Grievance Type", &["All"])
        .dedup(DedupRule {
            category_column: "Grievance Category".into(),
            canonical_labels: other_labels(),
            measures: sum_of(&measures),
        })
        .sort_by(&["Report Year", "Geography", "Grievance Type", "Grievance Category"])
}

fn abgar_appeals(county: &str, key: &str, label: &str, count_column: &str) -> DatasetSpecBuilder {
    let category = "Notice of Adverse Benefit Determination Category";
    let measures = [
        count_column,
        "Unresolved as of June 30",
        "Decision Upheld",
        "Decision Overturned",
    ];
    DatasetSpec::builder(key, label)
        .notes("Annual Beneficiary Grievance and Appeal Report, county and statewide rows")
        .column(ColumnSpec::categorical("Report Year").not_null())
        .column(ColumnSpec::categorical("Geography").not_null())
        .column(ColumnSpec::categorical(category))
        .columns(measures.iter().map(|m| count(m)))
        .geography("Geography", county, &["State"])
        .rollup(category, &["All"])
        .dedup(DedupRule {
            category_column: category.into(),
            canonical_labels: other_labels(),
            measures: sum_of(&measures),
        })
        .sort_by(&["Report Year", "Geography", category])
}

fn abgar_noabd(county: &str) -> DatasetSpecBuilder {
    let category = "Notice of Adverse Benefit Determination (NOABD) Category";
    let issued = "Notice of Adverse Benefit Determination (NOABD) Issued";
    DatasetSpec::builder(ABGAR_NOABD, "ABGAR Notices of Adverse Benefit Determination")
        .column(ColumnSpec::categorical("Report Year").not_null())
        .column(ColumnSpec::categorical("Geography").not_null())
        .column(ColumnSpec::categorical(category))
        .column(count(issued))
        .geography("Geography", county, &["State"])
        .rollup(category, &["All"])
        .dedup(DedupRule {
            category_column: category.into(),
            canonical_labels: other_labels(),
            measures: sum_of(&[issued]),
        })
        .sort_by(&["Report Year", "Geography", category])
}

fn adult_depression() -> DatasetSpecBuilder {
    DatasetSpec::builder(ADULT_DEPRESSION_LGHC, "Adult Depression (LGHC Indicator 24)")
        .notes("Statewide prevalence; no county rows")
        .column(ColumnSpec::integer("Year").not_null().range(Some(1900.0), Some(2100.0)))
        .column(ColumnSpec::categorical("Strata").not_null())
        .column(ColumnSpec::categorical("Strata Name"))
        .column(count("Frequency"))
        .column(count("Weighted Frequency"))
        .column(percent("Percent"))
        .column(percent("Lower 95% CL"))
        .column(percent("Upper 95% CL"))
        .sort_by(&["Year", "Strata", "Strata Name"])
}

fn core_set_mental_health() -> DatasetSpecBuilder {
    DatasetSpec::builder(CORE_SET_MENTAL_HEALTH, "Core Set Measures for Mental Health")
        .rule(RULE_CORE_SET)
        .notes("Export carries a title row above the header; rates arrive as percent strings")
        .column(ColumnSpec::categorical("Measure_Year").not_null())
        .column(ColumnSpec::categorical("Type"))
        .column(ColumnSpec::categorical("Measure").not_null())
        .column(ColumnSpec::categorical("Category"))
        .column(ColumnSpec::categorical("Population"))
        .column(count("Numerator"))
        .column(ColumnSpec::categorical("Numerator_ANNOT").optional())
        .column(count("Denominator"))
        .column(ColumnSpec::categorical("Denominator_ANNOT").optional())
        .column(count("Rate").coerce(CoercionHint::StripPercent))
        .column(ColumnSpec::categorical("Rate_ANNOT").optional())
        .column(ColumnSpec::numeric("Mean Rate").derived())
        .sort_by(&["Measure_Year", "Type", "Measure", "Category", "Population"])
}

fn mat_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::categorical("Medication_Assisted_Treatment"),
        count("members"),
        ColumnSpec::categorical("status").optional(),
        ColumnSpec::categorical("annotation").optional(),
        ColumnSpec::categorical("annotation_description").optional(),
    ]
}

fn mat_annual(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(MAT_ANNUAL, "Medication-Assisted Treatment (Annual)")
        .notes("Suppressed member counts become missing markers")
        .column(ColumnSpec::categorical("County").not_null().coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::integer("Year").not_null())
        .columns(mat_columns())
        .geography("County", county, &["Statewide"])
        .sort_by(&["Year", "County", "Medication_Assisted_Treatment"])
}

fn mat_quarterly(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(MAT_QUARTERLY, "Medication-Assisted Treatment (Quarterly)")
        .rule(RULE_MAT_QUARTERLY)
        .column(ColumnSpec::categorical("County").not_null().coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::integer("Year").not_null())
        .column(ColumnSpec::categorical("Quarter").not_null())
        .columns(mat_columns())
        .column(ColumnSpec::categorical("YearQuarter").derived().not_null())
        .geography("County", county, &["Statewide"])
        .sort_by(&["Year", "Quarter", "County", "Medication_Assisted_Treatment"])
}

fn coordinates() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::numeric("Latitude").range(Some(-90.0), Some(90.0)),
        ColumnSpec::numeric("Longitude").range(Some(-180.0), Some(180.0)),
    ]
}

fn ffs_providers_profile(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(FFS_PROVIDERS_PROFILE, "Medi-Cal Fee-for-Service Provider Profile")
        .notes("County-only listing; no statewide rows")
        .column(ColumnSpec::integer("OBJECTID").optional())
        .column(ColumnSpec::identifier("Provider_Number").not_null())
        .column(ColumnSpec::identifier("NPI"))
        .column(ColumnSpec::categorical("Legal_Name").not_null())
        .column(ColumnSpec::date("Enroll_Status_Eff_DT"))
        .column(ColumnSpec::categorical("FI_Provider_Type"))
        .column(ColumnSpec::categorical("FI_Provider_Specialty"))
        .column(ColumnSpec::categorical("Address"))
        .column(ColumnSpec::categorical("City").coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::categorical("State"))
        .column(ColumnSpec::identifier("ZIP").coerce(CoercionHint::ZeroPad(5)))
        .column(ColumnSpec::identifier("ZIP_4").optional().coerce(CoercionHint::ZeroPad(4)))
        .column(ColumnSpec::categorical("County").not_null().coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::identifier("Phone_Number").optional())
        .column(ColumnSpec::categorical("Telehealth_Services").optional())
        .columns(coordinates())
        .geography("County", county, &[])
        .sort_by(&["Legal_Name", "Provider_Number"])
}

fn acs_estimates(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(ACS_5YR_ESTIMATES, "ACS 5-Year Estimates")
        .rule(RULE_ACS_ESTIMATES)
        .notes("Two-column census table; the county is read from the value header")
        .column(ColumnSpec::categorical("Label").not_null())
        .column(ColumnSpec::numeric("Value"))
        .column(ColumnSpec::categorical("County").not_null())
        .geography("County", county, &[])
        .sort_by(&["County", "Label"])
}

fn sud_facility_columns() -> Vec<ColumnSpec> {
    let mut columns = vec![
        ColumnSpec::integer("OBJECTID").optional(),
        ColumnSpec::identifier("County_Code").coerce(CoercionHint::ZeroPad(2)),
        ColumnSpec::categorical("Legal_Entity_Name"),
        ColumnSpec::categorical("Facility_Name").not_null(),
        ColumnSpec::categorical("Facility_City").coerce(CoercionHint::TitleCase),
        ColumnSpec::categorical("Facility_State"),
        ColumnSpec::identifier("Facility_Zip").coerce(CoercionHint::ZeroPad(5)),
        ColumnSpec::categorical("Type_of_Application"),
        ColumnSpec::identifier("Program_Code"),
        ColumnSpec::integer("Treatment_Capacity").non_negative(),
        ColumnSpec::integer("Total_Capacity").non_negative(),
        ColumnSpec::date("Expiration_Date"),
        ColumnSpec::categorical("Target_Population"),
        ColumnSpec::categorical("Incident_Medical_Services").optional(),
        ColumnSpec::categorical("Adolescent_Waiver").optional(),
    ];
    columns.extend(coordinates());
    columns.push(ColumnSpec::categorical("CountyName").not_null().coerce(CoercionHint::TitleCase));
    columns
}

fn sud_facilities(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(SUD_RECOVERY_FACILITIES, "SUD Recovery Treatment Facilities")
        .rule(RULE_SUD_FACILITIES)
        .columns(sud_facility_columns())
        .column(ColumnSpec::numeric("Capacity_Utilization").derived().non_negative())
        .column(ColumnSpec::integer("Expiration_Year").derived())
        .column(ColumnSpec::flag("Large_Facility").derived())
        .geography("CountyName", county, &[])
        .sort_by(&["Facility_Name", "OBJECTID"])
}

fn sud_facilities_geojson(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(SUD_RECOVERY_FACILITIES_GEOJSON, "SUD Recovery Treatment Facilities (GeoJSON)")
        .columns(sud_facility_columns())
        .column(ColumnSpec::categorical("geometry_type").optional())
        .column(ColumnSpec::categorical("geometry_coordinates").optional())
        .geography("CountyName", county, &[])
        .sort_by(&["Facility_Name", "OBJECTID"])
}

fn foster_care() -> DatasetSpecBuilder {
    DatasetSpec::builder(FOSTER_CARE_ENTRIES_EXITS, "CCWIP Foster Care Entries and Exits")
        .rule(RULE_FOSTER_CARE)
        .notes("Regional workbook; the header row sits below a banner")
        .column(ColumnSpec::identifier("Measure number").not_null())
        .column(ColumnSpec::categorical("Measure description"))
        .column(ColumnSpec::categorical("Most recent start date"))
        .column(ColumnSpec::categorical("Most recent end date"))
        .column(count("Most recent numerator"))
        .column(count("Most recent denominator"))
        .column(ColumnSpec::numeric("Most recent performance"))
        .column(ColumnSpec::categorical("National performance or goal"))
        .column(ColumnSpec::categorical("Desired direction"))
        .column(ColumnSpec::categorical("Actual one-year direction"))
        .column(ColumnSpec::numeric("One-year percent change").coerce(CoercionHint::PercentAsFraction))
        .column(ColumnSpec::categorical("External Links to CCWIP Online Reports").optional())
        .column(ColumnSpec::numeric("Rate").derived())
        .column(ColumnSpec::flag("OneYearChangeFlag").derived().not_null())
        .sort_by(&["Measure number"])
}

fn cigarette_use() -> DatasetSpecBuilder {
    DatasetSpec::builder(CIGARETTE_USE_PREVALENCE, "Adult Cigarette Use Prevalence")
        .notes("Statewide trend since 1984")
        .column(ColumnSpec::integer("YEAR").not_null())
        .column(ColumnSpec::categorical("COMPARISON"))
        .column(ColumnSpec::categorical("GENDER"))
        .column(percent("PERCENT"))
        .column(percent("LOWER95"))
        .column(percent("UPPER95"))
        .sort_by(&["YEAR", "COMPARISON", "GENDER"])
}

fn tobacco_use() -> DatasetSpecBuilder {
    DatasetSpec::builder(TOBACCO_USE_PREVALENCE, "Adult Tobacco Use Prevalence")
        .notes("Suppressed cells arrive as '*'")
        .column(ColumnSpec::integer("YEAR").not_null())
        .column(ColumnSpec::categorical("DEMOGRAPHIC").not_null())
        .column(percent("PERCENT"))
        .column(ColumnSpec::numeric("SE").non_negative())
        .column(percent("LOWER95"))
        .column(percent("UPPER95"))
        .sort_by(&["YEAR", "DEMOGRAPHIC"])
}

fn lanterman_petris_short(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(LANTERMAN_PETRIS_SHORT, "Lanterman-Petris-Short Act Holds")
        .column(ColumnSpec::integer("RPT_YEAR").not_null())
        .column(ColumnSpec::categorical("COUNTY").not_null().coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::categorical("CATEGORY"))
        .column(ColumnSpec::categorical("AMOUNT_TYPE"))
        .column(ColumnSpec::categorical("AMOUNT_DESC"))
        .column(count("AMOUNT"))
        .column(ColumnSpec::categorical("AMOUNT_ANNOT").optional())
        .geography("COUNTY", county, &["Statewide"])
        .sort_by(&["RPT_YEAR", "COUNTY", "CATEGORY", "AMOUNT_TYPE", "AMOUNT_DESC"])
}

fn crisis_service_utilization(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(CRISIS_SERVICE_UTILIZATION, "Crisis Service Utilization (OCW)")
        .column(ColumnSpec::categorical("Health Care Delivery System").not_null())
        .column(ColumnSpec::identifier("Health Care Delivery System Id"))
        .column(ColumnSpec::integer("Fiscal Year").not_null())
        .column(ColumnSpec::categorical("Demographic Group"))
        .column(ColumnSpec::categorical("MH Service Description"))
        .column(ColumnSpec::categorical("Units"))
        .column(count("Amount MH Service Received"))
        .column(ColumnSpec::categorical("Amount MH Service Received Suppression Identifier").optional())
        .column(ColumnSpec::categorical("Medi-Cal Delivery System").optional())
        .column(ColumnSpec::categorical("Population Category").optional())
        .column(ColumnSpec::categorical("Demographic Category").optional())
        .geography("Health Care Delivery System", county, &["Statewide"])
        .sort_by(&["Fiscal Year", "Health Care Delivery System", "Demographic Group", "MH Service Description"])
}

fn managed_care_enrollment(county: &str) -> DatasetSpecBuilder {
    DatasetSpec::builder(MANAGED_CARE_ENROLLMENT, "Medi-Cal Managed Care Enrollment")
        .column(ColumnSpec::categorical("Enrollment Month").not_null())
        .column(ColumnSpec::categorical("Plan Type"))
        .column(ColumnSpec::categorical("County").not_null().coerce(CoercionHint::TitleCase))
        .column(ColumnSpec::categorical("Plan Name"))
        .column(count("Count of Enrollees"))
        .column(ColumnSpec::categorical("Count of Enrollees Annotation Code").optional())
        .column(ColumnSpec::categorical("Count of Enrollees Annotation Description").optional())
        .geography("County", county, &["Statewide"])
        .sort_by(&["Enrollment Month", "County", "Plan Type", "Plan Name"])
}
