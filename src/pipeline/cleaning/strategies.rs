use std::collections::HashMap;

use super::steps::{normalize_header, Table};
use super::CleaningStrategy;
use crate::constants::*;
use crate::domain::{RawFrame, Value};
use crate::error::{EtlError, Result};
use crate::pipeline::schema::DatasetSpec;

fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

fn ratio(numerator: &Value, denominator: &Value, places: i32) -> Value {
    match (numerator.as_f64(), denominator.as_f64()) {
        (Some(n), Some(d)) if d != 0.0 => Value::Number(round_to(n / d, places)),
        _ => Value::absent(),
    }
}

/// Use the first row with a cell equal to `marker` as the header when the export
/// carries banner or title rows above the real one.
pub fn promote_header_row(raw: RawFrame, marker: &str) -> RawFrame {
    let wanted = normalize_header(marker);
    if raw.columns().iter().any(|c| normalize_header(c) == wanted) {
        return raw;
    }
    let Some(header_at) = raw
        .rows()
        .iter()
        .position(|row| row.iter().any(|cell| normalize_header(&cell.to_string()) == wanted))
    else {
        return raw;
    };

    let (_, rows) = raw.into_parts();
    let mut rows = rows.into_iter().skip(header_at);
    let columns = rows
        .next()
        .map(|header| header.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    RawFrame::from_rows(columns, rows.collect())
}

/// No prepare or derive hooks
pub struct StandardStrategy;

impl CleaningStrategy for StandardStrategy {
    fn name(&self) -> &str {
        RULE_STANDARD
    }
}

/// Adds a `Year-Quarter` key for quarterly trend charts
pub struct MatQuarterlyStrategy;

impl CleaningStrategy for MatQuarterlyStrategy {
    fn name(&self) -> &str {
        RULE_MAT_QUARTERLY
    }

    fn derives(&self) -> &[&'static str] {
        &["YearQuarter"]
    }

    fn derive(&self, table: &mut Table, spec: &DatasetSpec) -> Result<()> {
        let values = table
            .column("Year")?
            .into_iter()
            .zip(table.column("Quarter")?)
            .map(|(year, quarter)| {
                if year.is_missing() || quarter.is_missing() {
                    Value::absent()
                } else {
                    Value::Text(format!("{year}-{quarter}"))
                }
            })
            .collect();
        table.add_derived(spec, "YearQuarter", values)
    }
}

/// Core-set measures: title row above the header, mean rate per
/// (Measure_Year, Type)
pub struct CoreSetStrategy;

impl CleaningStrategy for CoreSetStrategy {
    fn name(&self) -> &str {
        RULE_CORE_SET
    }

    fn derives(&self) -> &[&'static str] {
        &["Mean Rate"]
    }

    fn prepare(&self, raw: RawFrame, _spec: &DatasetSpec) -> Result<RawFrame> {
        Ok(promote_header_row(raw, "Measure_Year"))
    }

    fn derive(&self, table: &mut Table, spec: &DatasetSpec) -> Result<()> {
        let keys: Vec<String> = table
            .column("Measure_Year")?
            .into_iter()
            .zip(table.column("Type")?)
            .map(|(year, kind)| format!("{}\u{1f}{}", year.group_key(), kind.group_key()))
            .collect();
        let rates = table.column("Rate")?;

        let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
        for (key, rate) in keys.iter().zip(&rates) {
            if let Some(r) = rate.as_f64() {
                let entry = totals.entry(key.as_str()).or_insert((0.0, 0));
                entry.0 += r;
                entry.1 += 1;
            }
        }
        let values = keys
            .iter()
            .map(|key| match totals.get(key.as_str()) {
                Some((sum, n)) => Value::Number(sum / *n as f64),
                None => Value::absent(),
            })
            .collect();
        table.add_derived(spec, "Mean Rate", values)
    }
}

/// SUD recovery facilities: utilization, licence expiry year and size flag
pub struct SudFacilitiesStrategy;

impl CleaningStrategy for SudFacilitiesStrategy {
    fn name(&self) -> &str {
        RULE_SUD_FACILITIES
    }

    fn derives(&self) -> &[&'static str] {
        &["Capacity_Utilization", "Expiration_Year", "Large_Facility"]
    }

    fn derive(&self, table: &mut Table, spec: &DatasetSpec) -> Result<()> {
        let treatment = table.column("Treatment_Capacity")?;
        let total = table.column("Total_Capacity")?;
        let utilization: Vec<Value> = treatment.iter().zip(&total).map(|(t, c)| ratio(t, c, 2)).collect();
        let large: Vec<Value> = total
            .iter()
            .map(|c| c.as_f64().map(|n| Value::Flag(n > 50.0)).unwrap_or_else(Value::absent))
            .collect();
        let expiration: Vec<Value> = table
            .column("Expiration_Date")?
            .into_iter()
            .map(|d| match d {
                Value::Date(date) => Value::Integer(i64::from(chrono::Datelike::year(date))),
                _ => Value::absent(),
            })
            .collect();

        table.add_derived(spec, "Capacity_Utilization", utilization)?;
        table.add_derived(spec, "Expiration_Year", expiration)?;
        table.add_derived(spec, "Large_Facility", large)
    }
}

/// CCWIP foster-care measures: banner rows above the header, rate and
/// one-year change flag
pub struct FosterCareStrategy;

impl CleaningStrategy for FosterCareStrategy {
    fn name(&self) -> &str {
        RULE_FOSTER_CARE
    }

    fn derives(&self) -> &[&'static str] {
        &["Rate", "OneYearChangeFlag"]
    }

    fn prepare(&self, raw: RawFrame, _spec: &DatasetSpec) -> Result<RawFrame> {
        Ok(promote_header_row(raw, "Measure number"))
    }

    fn derive(&self, table: &mut Table, spec: &DatasetSpec) -> Result<()> {
        let rate: Vec<Value> = table
            .column("Most recent numerator")?
            .into_iter()
            .zip(table.column("Most recent denominator")?)
            .map(|(n, d)| ratio(n, d, 4))
            .collect();
        let flag: Vec<Value> = table
            .column("One-year percent change")?
            .into_iter()
            .map(|change| Value::Flag(change.as_f64().is_some_and(|x| x.abs() > 0.05)))
            .collect();

        table.add_derived(spec, "Rate", rate)?;
        table.add_derived(spec, "OneYearChangeFlag", flag)
    }
}

/// ACS two-column estimate tables: the first column is the label, the second
/// the estimate, and the county is named in the estimate header
/// (`"Calaveras County, California"`).
pub struct AcsEstimatesStrategy;

impl CleaningStrategy for AcsEstimatesStrategy {
    fn name(&self) -> &str {
        RULE_ACS_ESTIMATES
    }

    fn prepare(&self, raw: RawFrame, spec: &DatasetSpec) -> Result<RawFrame> {
        if raw.columns().len() < 2 {
            return Err(EtlError::SchemaMismatch {
                dataset: spec.key().to_string(),
                column: "Value".to_string(),
            });
        }
        let county = raw.columns()[1]
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let (_, rows) = raw.into_parts();
        let rows = rows
            .into_iter()
            .filter(|row| !row[0].is_missing() && !row[0].to_string().trim().is_empty())
            .map(|mut row| {
                row.truncate(2);
                row.push(Value::Text(county.clone()));
                row
            })
            .collect();
        Ok(RawFrame::from_rows(
            vec!["Label".into(), "Value".into(), "County".into()],
            rows,
        ))
    }
}

/// Every strategy shipped with the pipeline
pub fn builtin() -> Vec<Box<dyn CleaningStrategy>> {
    vec![
        Box::new(StandardStrategy),
        Box::new(MatQuarterlyStrategy),
        Box::new(CoreSetStrategy),
        Box::new(SudFacilitiesStrategy),
        Box::new(FosterCareStrategy),
        Box::new(AcsEstimatesStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{CatalogSettings, SchemaRegistry};
    use chrono::NaiveDate;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builtin(&CatalogSettings::default()).unwrap()
    }

    fn text_rows(rows: &[&[&str]]) -> Vec<Vec<Value>> {
        rows.iter().map(|r| r.iter().map(|v| Value::text(*v)).collect()).collect()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn header_row_is_promoted_below_banner() {
        let raw = RawFrame::from_rows(
            columns(&["Entries and exits", "", ""]),
            text_rows(&[&["Region: Central", "", ""], &["Measure number", "Measure description", "Rate"], &["4B", "Entries", "1"]]),
        );
        let promoted = promote_header_row(raw, "Measure number");
        assert_eq!(promoted.columns(), &["Measure number", "Measure description", "Rate"]);
        assert_eq!(promoted.len(), 1);
    }

    #[test]
    fn banner_text_containing_the_marker_is_not_a_header() {
        let raw = RawFrame::from_rows(
            columns(&["Entries and exits", "", ""]),
            text_rows(&[
                &["Measure number definitions", "", ""],
                &["measure  NUMBER", "Measure description", "Rate"],
                &["4B", "Entries", "1"],
            ]),
        );
        let promoted = promote_header_row(raw, "Measure number");
        assert_eq!(promoted.columns(), &["measure  NUMBER", "Measure description", "Rate"]);
        assert_eq!(promoted.len(), 1);
    }

    #[test]
    fn header_already_present_is_left_alone() {
        let raw = RawFrame::from_rows(columns(&["Measure number"]), text_rows(&[&["4B"]]));
        assert_eq!(promote_header_row(raw.clone(), "Measure number"), raw);
    }

    #[test]
    fn acs_reshape_reads_county_from_header() {
        let spec = registry().get(ACS_5YR_ESTIMATES).unwrap();
        let raw = RawFrame::from_rows(
            columns(&["Label (Grouping)", "Calaveras County, California", "Margin"]),
            vec![
                vec![Value::text("Total population"), Value::text("45,828"), Value::text("x")],
                vec![Value::absent(), Value::text("1"), Value::text("x")],
            ],
        );
        let frame = AcsEstimatesStrategy.clean(raw, &spec).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.value(0, "Value"), Some(&Value::Number(45828.0)));
        assert_eq!(frame.value(0, "County"), Some(&Value::text("Calaveras")));
    }

    #[test]
    fn quarterly_key_joins_year_and_quarter() {
        let spec = registry().get(MAT_QUARTERLY).unwrap();
        let raw = RawFrame::from_rows(
            columns(&["County", "Year", "Quarter", "Medication_Assisted_Treatment", "members"]),
            text_rows(&[&["CALAVERAS", "2023", "Q2", "Buprenorphine", "12"], &["Statewide", "2023", "Q2", "Buprenorphine", "*"]]),
        );
        let frame = MatQuarterlyStrategy.clean(raw, &spec).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.value(0, "YearQuarter"), Some(&Value::text("2023-Q2")));
        assert_eq!(frame.value(0, "County"), Some(&Value::text("Calaveras")));
        assert!(frame.value(1, "members").unwrap().is_invalid());
    }

    #[test]
    fn facility_derivations() {
        let spec = registry().get(SUD_RECOVERY_FACILITIES).unwrap();
        let raw = RawFrame::from_rows(
            columns(&[
                "County_Code",
                "Legal_Entity_Name",
                "Facility_Name",
                "Facility_City",
                "Facility_State",
                "Facility_Zip",
                "Type_of_Application",
                "Program_Code",
                "Treatment_Capacity",
                "Total_Capacity",
                "Expiration_Date",
                "Target_Population",
                "Latitude",
                "Longitude",
                "CountyName",
            ]),
            text_rows(&[&[
                "5", "Entity", "Hope House", "SAN ANDREAS", "CA", "95249", "Residential", "050001", "30", "60",
                "2026-03-31", "Adults", "38.19", "-120.68", "calaveras",
            ]]),
        );
        let frame = SudFacilitiesStrategy.clean(raw, &spec).unwrap();
        assert_eq!(frame.value(0, "County_Code"), Some(&Value::text("05")));
        assert_eq!(frame.value(0, "Facility_City"), Some(&Value::text("San Andreas")));
        assert_eq!(frame.value(0, "Capacity_Utilization"), Some(&Value::Number(0.5)));
        assert_eq!(frame.value(0, "Expiration_Year"), Some(&Value::Integer(2026)));
        assert_eq!(frame.value(0, "Large_Facility"), Some(&Value::Flag(true)));
        assert_eq!(
            frame.value(0, "Expiration_Date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()))
        );
    }

    #[test]
    fn foster_care_rate_and_flag() {
        let spec = registry().get(FOSTER_CARE_ENTRIES_EXITS).unwrap();
        let raw = RawFrame::from_rows(
            columns(&["CCWIP", "", "", "", "", "", "", "", "", "", ""]),
            text_rows(&[
                &[
                    "Measure number",
                    "Measure description",
                    "Most recent start date",
                    "Most recent end date",
                    "Most recent numerator",
                    "Most recent denominator",
                    "Most recent performance",
                    "National performance or goal",
                    "Desired direction",
                    "Actual one-year\ndirection",
                    "One-year percent change",
                ],
                &["4B", "Entries", "Jan 2023", "Dec 2023", "3", "7", "42.9", "n/a", "Up", "Down", "-5.2%"],
                &["4E", "Exits", "Jan 2023", "Dec 2023", "1", "0", "", "n/a", "Up", "Up", "1%"],
            ]),
        );
        let frame = FosterCareStrategy.clean(raw, &spec).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.value(0, "Rate"), Some(&Value::Number(0.4286)));
        assert_eq!(frame.value(0, "OneYearChangeFlag"), Some(&Value::Flag(true)));
        assert!(frame.value(1, "Rate").unwrap().is_missing());
        assert_eq!(frame.value(1, "OneYearChangeFlag"), Some(&Value::Flag(false)));
    }

    #[test]
    fn core_set_mean_rate_by_year_and_type() {
        let spec = registry().get(CORE_SET_MENTAL_HEALTH).unwrap();
        let raw = RawFrame::from_rows(
            columns(&["Core Set Measures", "", "", "", "", "", "", ""]),
            text_rows(&[
                &["Measure_Year", "Type", "Measure", "Category", "Population", "Numerator", "Denominator", "Rate"],
                &["2022", "Adult", "FUH", "Follow-up", "All", "1,200", "2,000", "60%"],
                &["2022", "Adult", "FUM", "Follow-up", "All", "80", "100", "80%"],
                &["2022", "Child", "FUH", "Follow-up", "All", "5", "10", "50%"],
            ]),
        );
        let frame = CoreSetStrategy.clean(raw, &spec).unwrap();
        let adult: Vec<_> = (0..frame.len())
            .filter(|&i| frame.value(i, "Type") == Some(&Value::text("Adult")))
            .map(|i| frame.value(i, "Mean Rate").cloned())
            .collect();
        assert_eq!(adult, vec![Some(Value::Number(70.0)), Some(Value::Number(70.0))]);
        assert_eq!(frame.value(0, "Numerator"), Some(&Value::Number(1200.0)));
        assert!(frame.value(0, "Rate_ANNOT").unwrap().is_missing());
    }
}
