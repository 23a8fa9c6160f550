use bitflags::bitflags;
use thiserror::Error;

bitflags!(
    /// Axis status word returned by `AXISSTATUS(<axis>)`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AxisStatus: u32 {
        const ENABLED = 1 << 0;
        const IN_POSITION = 1 << 2;
    }
);

#[derive(Debug, Error)]
#[error("malformed status word {word:?}")]
pub struct StatusParseError {
    word: String,
}

impl AxisStatus {
    /// Parse the decimal status word from a response payload. The amplifier
    /// reports a signed 32-bit word; bits outside the known set are dropped.
    pub fn parse(payload: &str) -> Result<Self, StatusParseError> {
        let word = payload
            .trim()
            .parse::<i64>()
            .map_err(|_| StatusParseError {
                word: payload.to_string(),
            })?;

        Ok(Self::from_bits_truncate(word as u32))
    }

    pub fn is_enabled(&self) -> bool {
        self.contains(Self::ENABLED)
    }

    pub fn is_in_position(&self) -> bool {
        self.contains(Self::IN_POSITION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_enabled_and_in_position_bits() {
        let status = AxisStatus::parse("5").unwrap();
        assert!(status.is_enabled());
        assert!(status.is_in_position());

        let status = AxisStatus::parse("1").unwrap();
        assert!(status.is_enabled());
        assert!(!status.is_in_position());

        let status = AxisStatus::parse("0").unwrap();
        assert!(!status.is_enabled());
    }

    #[test]
    fn tolerates_unrelated_bits() {
        let status = AxisStatus::parse("-2147483643").unwrap();
        assert!(status.is_enabled());
        assert!(status.is_in_position());
    }

    #[test]
    fn rejects_garbage() {
        assert!(AxisStatus::parse("bogus").is_err());
    }
}
