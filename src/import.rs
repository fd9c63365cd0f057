// Bulk Import - spreadsheet rows → classified household records
// Continue-on-error: every row is inserted on its own, a failing row becomes
// a warning and the batch keeps going. Only an unreadable file aborts.

use crate::classify::{classify, coerce_count, coerce_label, coerce_number};
use crate::db::{HouseholdStore, NewHousehold};
use crate::error::{Error, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Columns the import understands; anything else is ignored
pub const EXPECTED_COLUMNS: [&str; 6] = [
    "name",
    "address",
    "education",
    "num_children",
    "monthly_income",
    "occupation",
];

pub const DEFAULT_EDUCATION: &str = "SMA/SMK";
pub const DEFAULT_OCCUPATION: &str = "Wiraswasta kecil";

/// Rows shown back to the operator after an import
pub const PREVIEW_ROWS: usize = 5;

static MISSING: Value = Value::Null;

// ============================================================================
// TABULAR INPUT
// ============================================================================

/// Header row plus untyped cells; blank cells are `Value::Null`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Cell for `column`, or None when the column is absent or the cell blank
    pub fn field<'a>(&self, row: &'a [Value], column: &str) -> Option<&'a Value> {
        let idx = self.headers.iter().position(|h| h == column)?;
        match row.get(idx) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

fn text_cell(raw: &str) -> Value {
    if raw.trim().is_empty() {
        Value::Null
    } else {
        Value::String(raw.to_string())
    }
}

fn workbook_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => text_cell(s),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

/// Read a CSV file with a header row
pub fn read_csv(path: &Path) -> Result<Table> {
    let unreadable = |e: csv::Error| Error::Unreadable(format!("{}: {}", path.display(), e));

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(unreadable)?;
        rows.push(record.iter().map(text_cell).collect());
    }

    Ok(Table { headers, rows })
}

/// Read the first sheet of an xlsx/xls/ods workbook
pub fn read_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Unreadable(format!("{}: {}", path.display(), e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Unreadable(format!("{}: workbook has no sheets", path.display())))?
        .map_err(|e| Error::Unreadable(format!("{}: {}", path.display(), e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(Table::default()),
    };

    let rows = rows
        .map(|r| r.iter().map(workbook_cell).collect::<Vec<Value>>())
        .collect();
    Ok(Table { headers, rows })
}

/// Dispatch on the file extension
pub fn read_table(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path),
        _ => Err(Error::Unreadable(format!(
            "{}: unsupported file type (expected .xlsx, .xls, .ods or .csv)",
            path.display()
        ))),
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Apply defaults and coercions to one row and classify it
pub fn row_to_household(table: &Table, row: &[Value]) -> Result<NewHousehold> {
    let text = |column: &str, default: &str| {
        table
            .field(row, column)
            .map(coerce_label)
            .unwrap_or_else(|| default.to_string())
    };

    let name = text("name", "");
    let address = text("address", "");
    let education = text("education", DEFAULT_EDUCATION);
    let occupation = text("occupation", DEFAULT_OCCUPATION);

    let num_children = coerce_count(
        "num_children",
        table.field(row, "num_children").unwrap_or(&MISSING),
    )?;
    let monthly_income = coerce_number(
        "monthly_income",
        table.field(row, "monthly_income").unwrap_or(&MISSING),
    )?;

    let classification = classify(monthly_income, &education, num_children, &occupation);

    Ok(NewHousehold {
        name,
        address,
        education,
        num_children,
        monthly_income,
        occupation,
        classification,
        image_path: None,
    })
}

// ============================================================================
// IMPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportWarning {
    /// 1-based data row (the header row is not counted)
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub warnings: Vec<ImportWarning>,
    pub preview: Table,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "Import finished. {} rows saved, {} rows failed.",
            self.inserted,
            self.warnings.len()
        )
    }
}

/// Insert every row of `table`, one statement per row
pub fn import_table(store: &impl HouseholdStore, table: &Table) -> ImportReport {
    let mut report = ImportReport {
        preview: table.head(PREVIEW_ROWS),
        ..ImportReport::default()
    };

    for (idx, row) in table.rows.iter().enumerate() {
        let row_number = idx + 1;

        // Fully blank lines are skipped, not imported as empty households
        if row.iter().all(|cell| matches!(cell, Value::Null)) {
            continue;
        }

        let result = row_to_household(table, row).and_then(|record| store.insert(&record));
        match result {
            Ok(_) => report.inserted += 1,
            Err(e) => {
                warn!(row = row_number, error = %e, "import row failed");
                report.warnings.push(ImportWarning {
                    row: row_number,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        inserted = report.inserted,
        failed = report.warnings.len(),
        "import finished"
    );
    report
}

/// Read a spreadsheet and import it. Only file-level failures are errors.
pub fn import_file(store: &impl HouseholdStore, path: &Path) -> Result<ImportReport> {
    let table = read_table(path)?;
    info!(file = %path.display(), rows = table.rows.len(), "importing spreadsheet");
    Ok(import_table(store, &table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::db::tests::temp_store;
    use rust_xlsxwriter::Workbook;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_malformed_row_is_reported_and_batch_continues() {
        let (dir, store) = temp_store();
        let path = write_csv(
            &dir,
            "data.csv",
            "name,address,education,num_children,monthly_income,occupation\n\
             Ani,Jl. A,SD,1,1500000,Pengangguran\n\
             Budi,Jl. B,SMP,2,banyak,Pegawai swasta\n\
             Citra,Jl. C,S1 ke atas,0,8000000,PNS / Profesional\n\
             Dedi,Jl. D,SD,3,900000,Pengangguran\n",
        );

        let report = import_file(&store, &path).unwrap();

        assert_eq!(report.inserted, 3);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 2);
        assert!(report.warnings[0].message.contains("banyak"));

        let names: Vec<String> = store.fetch_all().unwrap().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Dedi", "Citra", "Ani"]);
    }

    #[test]
    fn test_missing_columns_use_defaults() {
        let (dir, store) = temp_store();
        let path = write_csv(&dir, "minimal.csv", "name,monthly_income\nEka,\nFajar,4500000\n");

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 2);
        assert!(report.warnings.is_empty());

        let stored = store.fetch_all().unwrap();
        let eka = stored.iter().find(|h| h.name == "Eka").unwrap();
        assert_eq!(eka.address, "");
        assert_eq!(eka.education, DEFAULT_EDUCATION);
        assert_eq!(eka.occupation, DEFAULT_OCCUPATION);
        assert_eq!(eka.num_children, 0);
        assert_eq!(eka.monthly_income, 0.0);
        // 0 + 30 + 10 + 20 = 60
        assert_eq!(eka.classification, Classification::Middle);

        let fajar = stored.iter().find(|h| h.name == "Fajar").unwrap();
        // 60 + 30 + 10 + 20 = 120
        assert_eq!(fajar.classification, Classification::Wealthy);
    }

    #[test]
    fn test_store_rejection_becomes_row_warning() {
        let (dir, store) = temp_store();
        let path = write_csv(
            &dir,
            "negative.csv",
            "name,num_children,monthly_income\nGita,1,-100\nHadi,1,100\n",
        );

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 1);
        assert!(report.warnings[0].message.contains("Constraint"));
    }

    #[test]
    fn test_infinite_income_becomes_row_warning() {
        let (dir, store) = temp_store();
        let path = write_csv(
            &dir,
            "inf.csv",
            "name,monthly_income\nIndra,inf\nJoni,2500000\n",
        );

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 1);
        assert!(report.warnings[0].message.contains("inf"));

        let stored = store.fetch_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Joni");
    }

    #[test]
    fn test_blank_lines_skipped_but_counted() {
        let (dir, store) = temp_store();
        let path = write_csv(&dir, "gaps.csv", "name,monthly_income\nIra,1\n,\nJoko,x\n");

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 3);
    }

    #[test]
    fn test_preview_holds_first_five_rows() {
        let (dir, store) = temp_store();
        let mut content = String::from("name,monthly_income\n");
        for i in 0..8 {
            content.push_str(&format!("Warga {},{}\n", i, i * 1000));
        }
        let path = write_csv(&dir, "many.csv", &content);

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 8);
        assert_eq!(report.preview.headers, vec!["name", "monthly_income"]);
        assert_eq!(report.preview.rows.len(), PREVIEW_ROWS);
    }

    #[test]
    fn test_xlsx_import() {
        let (dir, store) = temp_store();
        let path = dir.path().join("data.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in EXPECTED_COLUMNS.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "Kartika").unwrap();
        sheet.write_string(1, 1, "Jl. K").unwrap();
        sheet.write_string(1, 2, "Diploma").unwrap();
        sheet.write_number(1, 3, 2.0).unwrap();
        sheet.write_number(1, 4, 3_000_000.0).unwrap();
        sheet.write_string(1, 5, "Pegawai swasta").unwrap();
        sheet.write_string(2, 0, "Lukman").unwrap();
        sheet.write_string(2, 4, "tidak tahu").unwrap();
        workbook.save(&path).unwrap();

        let report = import_file(&store, &path).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 2);

        let stored = store.fetch_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Kartika");
        assert_eq!(stored[0].num_children, 2);
        // 30 + 40 - 10 + 30 = 90
        assert_eq!(stored[0].classification, Classification::Middle);
    }

    #[test]
    fn test_unreadable_file_aborts_whole_import() {
        let (dir, store) = temp_store();

        let garbage = dir.path().join("broken.xlsx");
        fs::write(&garbage, b"definitely not a zip archive").unwrap();
        assert!(matches!(import_file(&store, &garbage), Err(Error::Unreadable(_))));

        let unsupported = write_csv(&dir, "notes.txt", "name\nx\n");
        assert!(matches!(import_file(&store, &unsupported), Err(Error::Unreadable(_))));

        let missing = dir.path().join("missing.csv");
        assert!(matches!(import_file(&store, &missing), Err(Error::Unreadable(_))));

        assert_eq!(store.count_households().unwrap(), 0);
    }
}
