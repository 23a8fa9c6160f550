use thiserror::Error;

/// Transaction-level failures reported by the amplifier itself. These are
/// recoverable; the caller decides whether to retry, ignore, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("command rejected by the amplifier")]
    BadExecution,

    #[error("command acknowledged but not executed")]
    AckNoExecute,

    #[error("command timed out inside the amplifier")]
    Timeout,

    #[error("no data received, link may be down")]
    NoData,
}

/// Decode one raw response line. `!` marks a rejected command, `#` an
/// acknowledged-but-not-executed command, `$` an amplifier-side timeout and an
/// empty line means the link produced no data at all. Anything else is a
/// success whose payload is returned with the `%` marker stripped.
pub fn parse_response(raw: &str) -> Result<String, ResponseError> {
    if raw.contains('!') {
        return Err(ResponseError::BadExecution);
    }
    if raw.contains('#') {
        return Err(ResponseError::AckNoExecute);
    }
    if raw.contains('$') {
        return Err(ResponseError::Timeout);
    }

    let payload = raw.trim();
    if payload.is_empty() {
        return Err(ResponseError::NoData);
    }

    Ok(payload.replace('%', ""))
}
