//! CSV reference-data loaders
//!
//! Files are header-keyed numeric tables. Headers are lowercased on input.
//! Sex columns keep the {1 = male, 2 = female} encoding of the source data;
//! the codes match `Sex::code`.

use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};
use crate::population::{PopulationSource, Sex};

use super::DataTable;

/// Load a numeric CSV into a `DataTable`.
pub fn load_table(path: &Path) -> Result<DataTable> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| Error::Numeric {
                column: headers[i].clone(),
                value: field.to_string(),
            })?;
            columns[i].push(value);
        }
    }

    let mut table = DataTable::new();
    for (name, values) in headers.iter().zip(columns) {
        table.push_column(name, values)?;
    }
    Ok(table)
}

/// Load the initial cohort from `age.csv` and `sex.csv` under `dir`.
pub fn load_population_source(dir: &Path) -> Result<PopulationSource> {
    let ages = load_table(&dir.join("age.csv"))?
        .column("age")?
        .to_vec();
    let sexes = load_table(&dir.join("sex.csv"))?
        .column("sex")?
        .iter()
        .map(|&code| Sex::from_code(code.round() as i64))
        .collect::<Result<Vec<_>>>()?;
    PopulationSource::new(ages, sexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("health_microsim_loader_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_table_lowercases_headers() {
        let path = write_temp("rates.csv", "Age,Sex,Mortality_Rate\n40,1,0.01\n40,2,0.008\n");
        let table = load_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("mortality_rate").unwrap(), &[0.01, 0.008]);
    }

    #[test]
    fn test_load_table_rejects_non_numeric() {
        let path = write_temp("bad.csv", "age,rate\nforty,0.01\n");
        assert!(matches!(
            load_table(&path).unwrap_err(),
            Error::Numeric { .. }
        ));
    }
}
