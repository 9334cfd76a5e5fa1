use csv::{ReaderBuilder, StringRecord};
use serde_json::{Map, Number, Value};

use super::FluxRow;
use crate::error::AppError;

#[derive(Default)]
struct TableSchema {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    columns: Option<Vec<String>>,
    is_error: bool,
}

impl TableSchema {
    fn datatype(&self, idx: usize) -> &str {
        self.datatypes.get(idx).map(String::as_str).unwrap_or("string")
    }

    fn default_at(&self, idx: usize) -> &str {
        self.defaults.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Decodes an InfluxDB annotated CSV response into typed rows.
///
/// Tables may be separated by blank lines and each may carry its own
/// annotations and header. An in-band error table fails the whole decode.
pub fn decode_annotated_csv(body: &str) -> Result<Vec<FluxRow>, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    let mut schema = TableSchema::default();
    let mut record = StringRecord::new();

    while reader.read_record(&mut record)? {
        if record.iter().all(str::is_empty) {
            continue;
        }

        let first = record.get(0).unwrap_or("");
        if first.starts_with('#') {
            // annotations open a new table
            if schema.columns.is_some() {
                schema = TableSchema::default();
            }
            let values: Vec<String> = record.iter().map(str::to_string).collect();
            match first {
                "#datatype" => schema.datatypes = values,
                "#default" => schema.defaults = values,
                _ => {}
            }
            continue;
        }

        let Some(columns) = schema.columns.as_ref() else {
            schema.is_error = record.get(1) == Some("error");
            schema.columns = Some(record.iter().map(str::to_string).collect());
            continue;
        };

        if schema.is_error {
            let message = record.get(1).unwrap_or("unknown error");
            return Err(AppError::Query(message.to_string()));
        }

        let mut row = Map::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let raw = match record.get(idx).unwrap_or("") {
                "" => schema.default_at(idx),
                raw => raw,
            };
            row.insert(name.clone(), cell(raw, schema.datatype(idx))?);
        }
        rows.push(FluxRow(row));
    }

    Ok(rows)
}

fn cell(raw: &str, datatype: &str) -> Result<Value, AppError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let bad = || AppError::Decode(format!("{:?} is not a valid {}", raw, datatype));

    let value = match datatype {
        "double" => {
            let v: f64 = raw.parse().map_err(|_| bad())?;
            Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
        }
        "long" => Value::from(raw.parse::<i64>().map_err(|_| bad())?),
        "unsignedLong" => Value::from(raw.parse::<u64>().map_err(|_| bad())?),
        "boolean" => Value::Bool(raw.parse().map_err(|_| bad())?),
        _ => Value::String(raw.to_string()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_FIELD: &str = "\
#group,false,false,true,true,false,false,true,true,true
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string
#default,_result,,,,,,,,
,result,table,_start,_stop,_time,_value,_field,_measurement,id_
,,0,2021-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T00:00:00Z,999,price,goods,100044884
,,0,2021-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T12:00:00Z,950.5,price,goods,100044884
";

    #[test]
    fn decodes_typed_cells_and_defaults() {
        let rows = decode_annotated_csv(SINGLE_FIELD).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.get("result"), Some(&Value::from("_result")));
        assert_eq!(first.get("table"), Some(&Value::from(0)));
        assert_eq!(first.get("_value").and_then(Value::as_f64), Some(999.0));
        assert_eq!(first.get("id_"), Some(&Value::from("100044884")));
        assert_eq!(rows[1].value(), Some(950.5));
        assert_eq!(
            rows[1].time().map(|t| t.timestamp_millis()),
            Some(1_704_110_400_000)
        );
    }

    #[test]
    fn empty_body_decodes_to_no_rows() {
        assert!(decode_annotated_csv("").unwrap().is_empty());
        assert!(decode_annotated_csv("\r\n\r\n").unwrap().is_empty());
    }

    #[test]
    fn multiple_tables_with_their_own_headers() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string
#default,_result,,,,
,result,table,_time,price,id_
,,0,2024-01-01T00:00:00Z,999,1

#datatype,string,long,dateTime:RFC3339,double,string
#default,_result,,,,
,result,table,_time,discount,id_
,,1,2024-01-01T00:00:00Z,100,1
";
        let rows = decode_annotated_csv(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("price").is_some());
        assert!(rows[0].get("discount").is_none());
        assert_eq!(rows[1].get("discount").and_then(Value::as_f64), Some(100.0));
        assert_eq!(rows[1].get("table"), Some(&Value::from(1)));
    }

    #[test]
    fn each_table_starts_from_a_fresh_schema() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string
#default,_result,,,,
,result,table,_time,_value,_field
,,0,2024-01-01T00:00:00Z,999,price

#datatype,string,long,dateTime:RFC3339,double,string
#default,_other,,,,
,result,table,_time,_value,_field
,,1,2024-01-01T00:00:00Z,100,discount
";
        let rows = decode_annotated_csv(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("result"), Some(&Value::from("_result")));
        assert_eq!(rows[1].get("result"), Some(&Value::from("_other")));
        assert_eq!(rows[1].value(), Some(100.0));
    }

    #[test]
    fn missing_cells_become_null() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,double
#default,_result,,,,
,result,table,_time,price,discount
,,0,2024-01-01T12:00:00Z,950,
";
        let rows = decode_annotated_csv(body).unwrap();
        assert_eq!(rows[0].get("discount"), Some(&Value::Null));
    }

    #[test]
    fn error_table_fails_the_decode() {
        let body = "\
#datatype,string,string
#group,true,true
#default,,
,error,reference
,\"error calling function \"\"schema\"\"\",897
";
        match decode_annotated_csv(body) {
            Err(AppError::Query(msg)) => assert!(msg.contains("error calling function")),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_double_is_a_decode_error() {
        let body = "\
#datatype,string,long,double
,result,table,_value
,,0,not-a-number
";
        assert!(matches!(decode_annotated_csv(body), Err(AppError::Decode(_))));
    }
}
