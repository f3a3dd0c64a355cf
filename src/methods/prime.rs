use crate::domain::model::{AnalysisResult, ComparisonGroups, FieldValue, Record, SiteData};
use crate::domain::ports::MethodAdapter;
use crate::methods::mle::{self, cell_f64, P_THRESHOLD};
use crate::utils::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct Prime;

impl Prime {
    /// `(column, property)` for every p-value column, ordered by property index.
    /// `p-value` is the overall test; `p<k>` columns name their property in the
    /// last word of the header description.
    fn property_columns(raw: &AnalysisResult) -> Vec<(usize, String)> {
        let mut tagged: Vec<(usize, usize, String)> = mle::headers(raw)
            .into_iter()
            .enumerate()
            .filter_map(|(idx, (name, description))| {
                if name == "p-value" {
                    return Some((0, idx, "overall".to_string()));
                }
                let order: usize = name.strip_prefix('p')?.parse().ok()?;
                let property = description
                    .rsplit(' ')
                    .next()
                    .filter(|word| !word.is_empty() && description.contains(' '))
                    .unwrap_or(name.as_str())
                    .to_string();
                Some((order, idx, property))
            })
            .collect();

        tagged.sort_by_key(|(order, _, _)| *order);
        tagged
            .into_iter()
            .map(|(_, idx, property)| (idx, property))
            .collect()
    }
}

impl MethodAdapter for Prime {
    fn name(&self) -> &str {
        "PRIME"
    }

    fn file_suffix(&self) -> &str {
        "PRIME.json"
    }

    fn summary_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn site_fields(&self) -> Vec<&'static str> {
        vec!["prime_marker"]
    }

    fn required_paths(&self) -> Vec<&'static str> {
        vec!["MLE.headers", "MLE.content.0"]
    }

    fn required_headers(&self) -> Vec<&'static str> {
        vec!["p-value"]
    }

    fn process_results(&self, _raw: &AnalysisResult) -> Result<Record> {
        Ok(Record::new())
    }

    fn process_site_data(
        &self,
        raw: &AnalysisResult,
        _groups: Option<&ComparisonGroups>,
    ) -> Result<SiteData> {
        let columns = Self::property_columns(raw);

        Ok(mle::site_records(raw, |row| {
            let p_values: Option<Vec<f64>> =
                columns.iter().map(|(idx, _)| cell_f64(row, *idx)).collect();

            let marker = match p_values {
                Some(p_values) if !p_values.is_empty() => {
                    let significant: Vec<&str> = columns
                        .iter()
                        .zip(p_values)
                        .filter(|(_, p)| *p <= P_THRESHOLD)
                        .map(|((_, property), _)| property.as_str())
                        .collect();
                    if significant.is_empty() {
                        FieldValue::NotSignificant
                    } else {
                        FieldValue::Text(significant.join(","))
                    }
                }
                _ => FieldValue::Missing,
            };
            Record::new().with("prime_marker", marker)
        }))
    }
}
