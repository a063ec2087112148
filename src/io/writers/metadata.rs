use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::info;

use crate::core::dataset::MetadataRecord;
use crate::error::Result;

/// Fields emitted as JSON numbers when their value parses as one
const NUMERIC_FIELDS: &[&str] = &[
    "cols",
    "rows",
    "nbands",
    "nbits",
    "nodata",
    "epsg",
    "cellx",
    "celly",
    "rotation",
    "cloudcover",
    "viewangle",
    "sunazimuth",
    "sunelevation",
];

fn field_value(key: &str, value: &str) -> Value {
    if NUMERIC_FIELDS.contains(&key) {
        if let Ok(num) = value.parse::<i64>() {
            return Value::Number(Number::from(num));
        }
        if let Some(num) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(num);
        }
    }
    Value::String(value.to_string())
}

/// Convert a record to JSON: fields at the top level, plus `extent` and `filelist`
pub fn record_to_json(record: &MetadataRecord) -> Value {
    let mut obj = Map::new();
    for (key, value) in record.fields.iter() {
        obj.insert(key.clone(), field_value(key, value));
    }
    let extent = record
        .extent
        .iter()
        .map(|&(x, y)| {
            Value::Array(
                [x, y]
                    .iter()
                    .map(|&v| Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect();
    obj.insert("extent".to_string(), Value::Array(extent));
    obj.insert(
        "filelist".to_string(),
        Value::Array(
            record
                .filelist
                .iter()
                .map(|p| Value::String(p.display().to_string()))
                .collect(),
        ),
    );
    Value::Object(obj)
}

/// Write all records as a pretty-printed JSON array
pub fn write_records_json(path: &Path, records: &[MetadataRecord]) -> Result<()> {
    let json = Value::Array(records.iter().map(record_to_json).collect());
    let json_string = serde_json::to_string_pretty(&json)?;
    std::fs::write(path, json_string)?;
    info!("Wrote {} metadata records to {:?}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Metadata;
    use std::path::PathBuf;

    fn record() -> MetadataRecord {
        let mut fields = Metadata::default();
        fields.set("filename", "007");
        fields.set("cols", "100");
        fields.set("rows", "100,120");
        fields.set("cellx", "0.5");
        fields.set("nodata", "nan");
        MetadataRecord {
            fields,
            extent: vec![(1.0, 2.0), (3.0, 4.0)],
            filelist: vec![PathBuf::from("/d/007")],
        }
    }

    #[test]
    fn numeric_fields_become_numbers() {
        let json = record_to_json(&record());
        assert_eq!(json["filename"], Value::String("007".into()));
        assert_eq!(json["cols"], Value::from(100));
        assert_eq!(json["rows"], Value::String("100,120".into()));
        assert_eq!(json["cellx"], Value::from(0.5));
        assert_eq!(json["nodata"], Value::String("nan".into()));
        assert_eq!(json["extent"][1][0], Value::from(3.0));
        assert_eq!(json["filelist"][0], Value::String("/d/007".into()));
    }

    #[test]
    fn writes_array_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.json");
        write_records_json(&path, &[record(), record()]).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.as_array().map(Vec::len), Some(2));
    }
}
