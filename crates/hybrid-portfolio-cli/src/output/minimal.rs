use serde_json::Value;

/// Print just the key answer: the weights.
///
/// Looks for the allocation of a request response first, then the weight
/// vector inside a computation envelope.
pub fn print_minimal(value: &Value) {
    if let Some(Value::Object(allocation)) = value.get("allocation") {
        let line: Vec<String> = allocation
            .iter()
            .map(|(symbol, pct)| format!("{}={}%", symbol, format_minimal(pct)))
            .collect();
        println!("{}", line.join(" "));
        return;
    }

    let result = value.get("result").unwrap_or(value);
    let candidates = [
        result.get("weights"),
        result.get("outcome").and_then(|o| o.get("shares")),
        result.get("refinement").and_then(|r| r.get("weights")),
        result.get("points"),
        result.get("records"),
    ];
    match candidates.into_iter().flatten().next() {
        Some(v) => println!("{}", format_minimal(v)),
        None => println!("{}", format_minimal(result)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) if arr.iter().all(Value::is_number) => arr
            .iter()
            .map(format_minimal)
            .collect::<Vec<_>>()
            .join(" "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
