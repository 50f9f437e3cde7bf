use serde_json::Value;
use std::io;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            if let Some(Value::Object(allocation)) = map.get("allocation") {
                // symbol, percent, shares
                let shares = map.get("shareAllocations").and_then(Value::as_object);
                let _ = wtr.write_record(["symbol", "weight_pct", "shares"]);
                for (symbol, pct) in allocation {
                    let count = shares
                        .and_then(|s| s.get(symbol))
                        .map(format_csv_value)
                        .unwrap_or_default();
                    let _ = wtr.write_record([symbol.as_str(), &format_csv_value(pct), &count]);
                }
            } else if let Some(result) = map.get("result") {
                write_result_csv(&mut wtr, result);
            } else {
                write_pairs(&mut wtr, map);
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

/// Tabular results (frontier points, backtest records) as rows, others as
/// field/value pairs.
fn write_result_csv(wtr: &mut StdoutWriter<'_>, result: &Value) {
    let Value::Object(map) = result else {
        let _ = wtr.write_record([&format_csv_value(result)]);
        return;
    };
    for key in ["points", "records"] {
        if let Some(Value::Array(rows)) = map.get(key) {
            write_array_csv(wtr, rows);
            return;
        }
    }
    write_pairs(wtr, map);
}

fn write_pairs(wtr: &mut StdoutWriter<'_>, map: &serde_json::Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };
    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let _ = wtr.write_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
