use crate::assertions::Outcome;

const UNIT_SEPARATOR: char = '\x1f';
const SENTINEL_PREFIX: &str = "__BULWARK__";

#[derive(Debug, Clone, PartialEq)]
pub struct SentinelData {
    pub index: usize,
    pub outcome: Outcome,
}

/// Line a worker writes to stdout once its unit has finished.
/// Format: `__BULWARK__<US><INDEX><US><OUTCOME_JSON>`
pub fn format_sentinel(index: usize, outcome: &Outcome) -> serde_json::Result<String> {
    let json = serde_json::to_string(outcome)?;
    Ok(format!(
        "{}{}{}{}{}",
        SENTINEL_PREFIX, UNIT_SEPARATOR, index, UNIT_SEPARATOR, json
    ))
}

pub fn parse_sentinel(line: &str) -> Option<SentinelData> {
    let rest = line.strip_prefix(SENTINEL_PREFIX)?;
    let rest = rest.strip_prefix(UNIT_SEPARATOR)?;

    // JSON escapes control characters, so the payload cannot hold a separator.
    let (index_str, json) = rest.split_once(UNIT_SEPARATOR)?;
    if index_str.is_empty() || json.is_empty() || json.contains(UNIT_SEPARATOR) {
        return None;
    }

    let index = index_str.parse::<usize>().ok()?;
    let outcome = serde_json::from_str::<Outcome>(json).ok()?;

    Some(SentinelData { index, outcome })
}

#[derive(Debug)]
pub struct SentinelExtractResult {
    pub found: bool,
    pub output: String,
    pub sentinel: Option<SentinelData>,
}

/// Splits a worker's complete stdout into the unit's own output and the
/// sentinel reported for `expected_index`. The last sentinel wins, so text a
/// unit prints that merely looks like one is left in the output.
pub fn extract_sentinel(buffer: &str, expected_index: usize) -> SentinelExtractResult {
    let not_found = || SentinelExtractResult {
        found: false,
        output: buffer.to_string(),
        sentinel: None,
    };

    let Some(sentinel_index) = buffer.rfind(SENTINEL_PREFIX) else {
        return not_found();
    };

    let after_sentinel = &buffer[sentinel_index..];
    let Some(newline_index) = after_sentinel.find('\n') else {
        return not_found();
    };

    let parsed = match parse_sentinel(after_sentinel[..newline_index].trim()) {
        Some(p) if p.index == expected_index => p,
        _ => return not_found(),
    };

    let output = &buffer[..sentinel_index];
    let clean_output = output.strip_suffix('\n').unwrap_or(output);

    SentinelExtractResult {
        found: true,
        output: clean_output.to_string(),
        sentinel: Some(parsed),
    }
}
