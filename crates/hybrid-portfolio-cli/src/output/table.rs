use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else if map.contains_key("allocation") {
                print_allocation_report(map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

/// Request response: allocation per symbol, then the summary metrics.
fn print_allocation_report(report: &Map<String, Value>) {
    let shares = report.get("shareAllocations").and_then(Value::as_object);
    let mut builder = Builder::default();
    builder.push_record(["Symbol", "Weight %", "Shares"]);
    if let Some(Value::Object(allocation)) = report.get("allocation") {
        for (symbol, pct) in allocation {
            let count = shares
                .and_then(|s| s.get(symbol))
                .map(format_value)
                .unwrap_or_default();
            builder.push_record([symbol.clone(), format_value(pct), count]);
        }
    }
    println!("{}", Table::from(builder));

    let mut summary = Builder::default();
    summary.push_record(["Metric", "Value"]);
    for key in ["expectedReturn", "expectedRisk", "sharpeRatio", "error"] {
        if let Some(v) = report.get(key) {
            summary.push_record([key.to_string(), format_value(v)]);
        }
    }
    if let Some(Value::Object(extra)) = report.get("additionalMetrics") {
        for (key, v) in extra {
            if !v.is_null() {
                summary.push_record([key.clone(), format_value(v)]);
            }
        }
    }
    println!("\n{}", Table::from(summary));

    if let Some(Value::Array(records)) = report.get("backtestResults") {
        if !records.is_empty() {
            println!("\nBacktest:");
            print_array_table(records);
        }
    }
    print_warnings(report);
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => print_flat_object(res_map),
        other => println!("{}", format_value(other)),
    }
    print_warnings(envelope);
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_warnings(map: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = map.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.clone(), format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(headers.clone());
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
