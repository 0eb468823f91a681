// Turns the `key=value` output of `systemctl show` into a ServiceDescriptor.

use super::model::ServiceDescriptor;

enum ScanState {
    ExpectingKey,
    InMultilineValue { key: String, buffer: Vec<String> },
}

/// Parses `systemctl show` output. Never fails: lines without `=` are skipped,
/// and an `Exec*={ ...` block still open at end of input is dropped.
pub fn parse<I, S>(lines: I) -> ServiceDescriptor
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut descriptor = ServiceDescriptor::new();
    let mut state = ScanState::ExpectingKey;

    for line in lines {
        let line = line.as_ref();
        state = match state {
            ScanState::ExpectingKey => {
                let Some((key, value)) = line.split_once('=') else {
                    continue;
                };
                if opens_multiline(key, value) {
                    ScanState::InMultilineValue {
                        key: key.to_string(),
                        buffer: vec![value.to_string()],
                    }
                } else {
                    descriptor.insert(key, value.trim());
                    ScanState::ExpectingKey
                }
            }
            ScanState::InMultilineValue { key, mut buffer } => {
                buffer.push(line.to_string());
                if line.trim_end().ends_with('}') {
                    descriptor.insert(key, buffer.join("\n").trim());
                    ScanState::ExpectingKey
                } else {
                    ScanState::InMultilineValue { key, buffer }
                }
            }
        };
    }

    descriptor
}

/// Convenience wrapper for raw command output.
pub fn parse_output(text: &str) -> ServiceDescriptor {
    parse(text.lines())
}

fn opens_multiline(key: &str, value: &str) -> bool {
    let value = value.trim();
    key.starts_with("Exec") && value.starts_with('{') && !value.ends_with('}')
}
