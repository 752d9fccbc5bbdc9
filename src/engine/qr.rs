use serde_json::Value;

use crate::error::TripError;

const TICKET_QUERY_KEYS: [&str; 3] = ["ticket", "ticket_number", "ticketNumber"];

/// Extracts a ticket number from what a scanner hands us: a bare number, a
/// JSON object carrying it, or a URL with a `ticket=` query parameter.
pub fn parse_scan_payload(payload: &str) -> Result<String, TripError> {
    let payload = payload.trim();

    let candidate = if payload.starts_with('{') {
        from_json(payload)
    } else if payload.contains("://") || payload.contains('?') {
        from_url(payload)
    } else {
        Some(payload.to_string())
    };

    candidate
        .map(|number| number.trim().to_string())
        .filter(|number| is_ticket_number(number))
        .ok_or(TripError::InvalidScanPayload)
}

pub fn is_ticket_number(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 64
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn from_json(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    ["ticket_number", "ticketNumber"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn from_url(payload: &str) -> Option<String> {
    let (_, query) = payload.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        TICKET_QUERY_KEYS
            .contains(&key)
            .then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::parse_scan_payload;
    use crate::error::TripError;

    #[test]
    fn bare_number_is_trimmed() {
        assert_eq!(parse_scan_payload("  T20261018-00042\n").unwrap(), "T20261018-00042");
    }

    #[test]
    fn json_payload_accepts_either_key_style() {
        assert_eq!(
            parse_scan_payload(r#"{"ticketNumber":"T-9"}"#).unwrap(),
            "T-9"
        );
        assert_eq!(
            parse_scan_payload(r#"{"ticket_number":"T-10","price":40}"#).unwrap(),
            "T-10"
        );
    }

    #[test]
    fn url_payload_reads_ticket_query() {
        assert_eq!(
            parse_scan_payload("https://shuttle.example/verify?src=qr&ticket=T-11#top").unwrap(),
            "T-11"
        );
    }

    #[test]
    fn unreadable_payloads_are_rejected() {
        for payload in ["", "   ", "{\"other\":1}", "https://x.example/?id=1", "T 12", "{oops"] {
            assert_eq!(
                parse_scan_payload(payload).unwrap_err(),
                TripError::InvalidScanPayload,
                "payload {payload:?}"
            );
        }
    }
}
