use crate::domain::model::{AnalysisResult, ComparisonGroups, FieldValue, Record, SiteData};
use crate::domain::ports::MethodAdapter;
use crate::methods::mle::{self, cell_f64, P_THRESHOLD};
use crate::utils::error::Result;

/// Position of the episodic p-value in MEME output when the header is absent.
const DEFAULT_P_COLUMN: usize = 7;

#[derive(Debug, Default, Clone, Copy)]
pub struct Meme;

impl Meme {
    fn p_column(raw: &AnalysisResult) -> usize {
        mle::header_indices(raw)
            .get("p-value")
            .copied()
            .unwrap_or(DEFAULT_P_COLUMN)
    }
}

impl MethodAdapter for Meme {
    fn name(&self) -> &str {
        "MEME"
    }

    fn file_suffix(&self) -> &str {
        "MEME.json"
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        vec!["positive_sites"]
    }

    fn site_fields(&self) -> Vec<&'static str> {
        vec!["meme_marker"]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec!["MLE.headers", "MLE.content.0"]
    }

    fn required_headers(&self) -> Vec<&'static str> {
        vec!["p-value"]
    }

    fn process_results(&self, raw: &AnalysisResult) -> Result<Record> {
        let positive = if mle::has_mle_content(raw) {
            let p_idx = Self::p_column(raw);
            FieldValue::from(
                mle::rows(raw)
                    .iter()
                    .filter_map(|row| cell_f64(row, p_idx))
                    .filter(|p| *p <= P_THRESHOLD)
                    .count(),
            )
        } else {
            FieldValue::Missing
        };
        Ok(Record::new().with("positive_sites", positive))
    }

    fn process_site_data(
        &self,
        raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<SiteData> {
        let p_idx = Self::p_column(raw);

        Ok(mle::site_records(raw, |row| {
            let marker = match cell_f64(row, p_idx) {
                Some(p) if p <= P_THRESHOLD => FieldValue::Text(mle::format_p(p)),
                Some(_) => FieldValue::NotSignificant,
                None => FieldValue::Missing,
            };
            Record::new().with("meme_marker", marker)
        }))
    }
}
