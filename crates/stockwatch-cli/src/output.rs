use std::io::{self, Write};

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::metadata::Envelope;

pub fn render(envelope: &Envelope, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_envelope(&mut out, envelope, format, pretty)?;
    out.flush()?;
    Ok(())
}

fn write_envelope(
    out: &mut impl Write,
    envelope: &Envelope,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match (format, &envelope.data) {
        (OutputFormat::Ndjson, Value::Array(items)) => {
            for item in items {
                writeln!(out, "{}", serde_json::to_string(item)?)?;
            }
        }
        (OutputFormat::Ndjson, _) => {
            writeln!(out, "{}", serde_json::to_string(envelope)?)?;
        }
        (OutputFormat::Json, _) => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            writeln!(out, "{payload}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use serde_json::json;
    use stockwatch_core::CacheStats;

    fn envelope(data: Value) -> Envelope {
        Envelope {
            meta: Metadata::new("search", 3, CacheStats::default()),
            data,
        }
    }

    #[test]
    fn ndjson_prints_one_line_per_array_element() {
        let mut buffer = Vec::new();
        let data = json!([{"symbol": "AAPL"}, {"symbol": "MSFT"}]);

        write_envelope(&mut buffer, &envelope(data), OutputFormat::Ndjson, false).expect("renders");

        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text, "{\"symbol\":\"AAPL\"}\n{\"symbol\":\"MSFT\"}\n");
    }

    #[test]
    fn pretty_json_spans_multiple_lines() {
        let mut buffer = Vec::new();

        write_envelope(&mut buffer, &envelope(json!({"ok": true})), OutputFormat::Json, true)
            .expect("renders");

        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.lines().count() > 1);
        assert!(text.contains("\"command\": \"search\""));
    }
}
