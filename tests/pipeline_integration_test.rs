use anyhow::Result;
use hyphy_etl::core::Pipeline;
use hyphy_etl::{EtlEngine, LocalStorage, SelectionPipeline, TomlConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn write_result(root: &Path, dir: &str, file: &str, value: &Value) -> Result<()> {
    std::fs::create_dir_all(root.join(dir))?;
    std::fs::write(root.join(dir).join(file), serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn config(results: &Path, output: &Path, extra: &str) -> Result<TomlConfig> {
    let toml_content = format!(
        "[input]\nresults_path = '{}'\n\n[output]\noutput_path = '{}'\n{}",
        results.display(),
        output.display(),
        extra
    );
    Ok(TomlConfig::from_toml_str(&toml_content)?)
}

async fn run(config: TomlConfig) -> Result<String> {
    let storage = LocalStorage::new(hyphy_etl::core::ConfigProvider::output_path(&config));
    let engine = EtlEngine::new(SelectionPipeline::new(storage, config));
    Ok(engine.run().await?)
}

fn read_table(path: &Path, delimiter: u8) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

fn fel(p_values: &[f64]) -> Value {
    let rows: Vec<Value> = p_values.iter().map(|p| json!([1.0, 0.5, p])).collect();
    json!({
        "input": {"number of sequences": 4, "number of sites": p_values.len()},
        "MLE": {
            "headers": [["alpha", "Synonymous rate"], ["beta", "Non-synonymous rate"], ["p-value", "LRT p-value"]],
            "content": {"0": rows}
        }
    })
}

fn meme(p_values: &[Value]) -> Value {
    let rows: Vec<Value> = p_values.iter().map(|p| json!([1.0, 0.0, p])).collect();
    json!({
        "MLE": {
            "headers": [["alpha", ""], ["beta-", ""], ["p-value", ""]],
            "content": {"0": rows}
        }
    })
}

fn relax(labels: &[&str]) -> Value {
    let mut k = serde_json::Map::new();
    k.insert("overall".into(), json!(0.8));
    for label in labels {
        k.insert(label.to_string(), json!(0.5));
    }
    json!({"test results": {"p-value": 0.2, "relaxation or intensification parameter": k}})
}

fn cfel(labels: &[&str]) -> Value {
    let tested: serde_json::Map<String, Value> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (format!("b{}", i), json!(label)))
        .collect();
    json!({
        "tested": {"0": tested},
        "MLE": {
            "headers": [["Q-value (overall)", ""]],
            "content": {"0": [[0.01], [0.9]]}
        }
    })
}

#[tokio::test]
async fn test_end_to_end_combines_methods() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    let output = dir.path().join("out");

    write_result(&results, "FEL", "g1.FEL.json", &fel(&[0.01, 0.9]))?;
    write_result(&results, "FEL", "g2.FEL.json", &fel(&[0.5]))?;
    write_result(&results, "MEME", "g1.MEME.json", &meme(&[json!(0.01), json!(0.6)]))?;
    write_result(&results, "RELAX", "g1.RELAX.json", &relax(&["A", "B"]))?;
    write_result(&results, "CONTRASTFEL", "g1.CONTRASTFEL.json", &cfel(&["B", "A"]))?;

    let output_path = run(config(&results, &output, "")?).await?;
    assert_eq!(output_path, output.display().to_string());

    let summary = read_table(&output.join("combined_summary.csv"), b',')?;
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0]["gene"], "g1");
    assert_eq!(summary[0]["negative_sites"], "1");
    assert_eq!(summary[0]["positive_sites"], "1");
    assert_eq!(summary[0]["RELAX_K"], "0.8");
    assert_eq!(summary[1]["gene"], "g2");
    // Methods that never ran for g2 still have their columns, filled with NA
    assert_eq!(summary[1]["positive_sites"], "NA");
    assert_eq!(summary[1]["RELAX_K"], "NA");
    assert_eq!(summary[1]["BUSTED_pval"], "NA");

    let sites = read_table(&output.join("combined_sites.csv"), b',')?;
    assert_eq!(sites.len(), 3);
    assert_eq!(sites[0]["site"], "1");
    assert_eq!(sites[0]["fel_selection"], "negative");
    assert_eq!(sites[2]["gene"], "g2");
    assert_eq!(sites[2]["meme_marker"], "NA");

    let comparison = read_table(&output.join("combined_comparison_summary.csv"), b',')?;
    let groups: Vec<&str> = comparison
        .iter()
        .map(|row| row["comparison_group"].as_str())
        .collect();
    assert_eq!(groups, vec!["A", "B"]);
    assert!(comparison.iter().all(|row| row["group_K"] == "0.5"));
    assert!(output.join("combined_comparison_site.csv").exists());

    Ok(())
}

#[tokio::test]
async fn test_not_significant_and_missing_are_distinct() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    let output = dir.path().join("out");

    write_result(
        &results,
        "MEME",
        "g1.MEME.json",
        &meme(&[json!(0.01), json!(0.6), Value::Null]),
    )?;

    run(config(&results, &output, "")?).await?;

    let sites = read_table(&output.join("combined_sites.csv"), b',')?;
    let markers: Vec<&str> = sites.iter().map(|row| row["meme_marker"].as_str()).collect();
    assert_eq!(markers, vec!["0.010", "-", "NA"]);

    // No comparison output anywhere, so neither comparison file is written
    assert!(!output.join("combined_comparison_summary.csv").exists());
    assert!(!output.join("combined_comparison_site.csv").exists());

    Ok(())
}

#[tokio::test]
async fn test_inconsistent_groups_keep_plain_rows() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    let output = dir.path().join("out");

    write_result(&results, "RELAX", "g1.RELAX.json", &relax(&["A", "B"]))?;
    write_result(&results, "CONTRASTFEL", "g1.CONTRASTFEL.json", &cfel(&["A", "C"]))?;
    write_result(&results, "FEL", "g1.FEL.json", &fel(&[0.01]))?;

    let config = config(&results, &output, "")?;
    let pipeline = SelectionPipeline::new(LocalStorage::new(&output), config);

    let batch = pipeline.extract().await?;
    let result = pipeline.transform(batch).await?;
    assert_eq!(result.inconsistent_genes, vec!["g1"]);
    assert!(result.tables.comparison_summary.is_none());
    assert_eq!(result.tables.summary.cell(0, "RELAX_K"), Some("0.8"));
    assert_eq!(result.tables.sites.rows.len(), 1);

    pipeline.load(result).await?;
    assert!(output.join("combined_summary.csv").exists());
    assert!(!output.join("combined_comparison_summary.csv").exists());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_matches_sequential() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");

    for i in 0..12 {
        let p = if i % 3 == 0 { 0.01 } else { 0.4 };
        write_result(&results, "FEL", &format!("gene{:02}.FEL.json", i), &fel(&[p, 0.9]))?;
        if i % 2 == 0 {
            write_result(
                &results,
                "MEME",
                &format!("gene{:02}.MEME.json", i),
                &meme(&[json!(p), json!(0.2)]),
            )?;
        }
    }

    let sequential = dir.path().join("sequential");
    let concurrent = dir.path().join("concurrent");
    run(config(&results, &sequential, "[processing]\nconcurrent_genes = 1\n")?).await?;
    run(config(&results, &concurrent, "[processing]\nconcurrent_genes = 8\n")?).await?;

    for name in ["combined_summary.csv", "combined_sites.csv"] {
        let a = std::fs::read_to_string(sequential.join(name))?;
        let b = std::fs::read_to_string(concurrent.join(name))?;
        assert_eq!(a, b, "{} differs between runs", name);
    }

    Ok(())
}

#[tokio::test]
async fn test_tabular_output() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    let output = dir.path().join("out");

    write_result(&results, "FEL", "g1.FEL.json", &fel(&[0.01]))?;

    run(config(&results, &output, "tabular = true\n")?).await?;

    assert!(output.join("combined_summary.tab").exists());
    assert!(!output.join("combined_summary.csv").exists());

    let summary = read_table(&output.join("combined_summary.tab"), b'\t')?;
    assert_eq!(summary[0]["gene"], "g1");
    assert_eq!(summary[0]["dN/dS"], "NA");

    Ok(())
}

#[tokio::test]
async fn test_method_directory_override() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    let output = dir.path().join("out");

    write_result(&results, "fel-results", "g1.FEL.json", &fel(&[0.01]))?;

    run(config(&results, &output, "\n[methods]\nFEL = \"fel-results\"\n")?).await?;

    let summary = read_table(&output.join("combined_summary.csv"), b',')?;
    assert_eq!(summary[0]["negative_sites"], "1");

    Ok(())
}

#[tokio::test]
async fn test_empty_results_directory_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let results = dir.path().join("results");
    std::fs::create_dir_all(&results)?;

    let err = run(config(&results, &dir.path().join("out"), "")?)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No genes found"));

    Ok(())
}
