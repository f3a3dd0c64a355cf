use crate::domain::model::{AnalysisResult, ComparisonGroups, FieldValue, Record, SiteData};
use crate::domain::ports::MethodAdapter;
use crate::methods::mle::{self, cell_f64, P_THRESHOLD};
use crate::utils::error::Result;
use serde_json::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct Fel;

struct FelColumns {
    alpha: usize,
    beta: usize,
    p_value: usize,
}

impl FelColumns {
    fn find(raw: &AnalysisResult) -> Option<Self> {
        let indices = mle::header_indices(raw);
        Some(Self {
            alpha: *indices.get("alpha")?,
            beta: *indices.get("beta")?,
            p_value: *indices.get("p-value")?,
        })
    }

    fn read(&self, row: &Value) -> Option<(f64, f64, f64)> {
        Some((
            cell_f64(row, self.alpha)?,
            cell_f64(row, self.beta)?,
            cell_f64(row, self.p_value)?,
        ))
    }
}

impl MethodAdapter for Fel {
    fn name(&self) -> &str {
        "FEL"
    }

    fn file_suffix(&self) -> &str {
        "FEL.json"
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        vec!["N", "T", "sites", "negative_sites"]
    }

    fn site_fields(&self) -> Vec<&'static str> {
        vec!["fel_selection"]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec!["MLE.headers", "MLE.content.0"]
    }

    fn required_headers(&self) -> Vec<&'static str> {
        vec!["alpha", "beta", "p-value"]
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record> {
        let mut record = mle::common_fields(raw);

        let negative = match FelColumns::find(raw) {
            Some(columns) if mle::has_mle_content(raw) => FieldValue::from(
                mle::rows(raw)
                    .iter()
                    .filter_map(|row| columns.read(row))
                    .filter(|(alpha, beta, p)| *p <= P_THRESHOLD && beta < alpha)
                    .count(),
            ),
            _ => FieldValue::Missing,
        };
        record.insert("negative_sites", negative);

        Ok(record)
    }

    fn process_site_data(
        &self,
        raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<SiteData> {
        let columns = FelColumns::find(raw);

        Ok(mle::site_records(raw, |row| {
            let selection = match columns.as_ref().and_then(|c| c.read(row)) {
                Some((alpha, beta, p)) if p <= P_THRESHOLD && beta > alpha => {
                    FieldValue::from("positive")
                }
                Some((alpha, beta, p)) if p <= P_THRESHOLD && beta < alpha => {
                    FieldValue::from("negative")
                }
                Some(_) => FieldValue::from("neutral"),
                None => FieldValue::Missing,
            };
            Record::new().with("fel_selection", selection)
        }))
    }
}
