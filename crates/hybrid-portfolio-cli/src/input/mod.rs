pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Input from `--input <file>` when given, otherwise from piped stdin.
pub fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
    command: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        file::read_document(path)
    } else if let Some(value) = stdin::read_piped()? {
        Ok(value)
    } else {
        Err(format!("--input <file.json|file.yaml> or stdin required for {}", command).into())
    }
}
