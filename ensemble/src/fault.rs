use thiserror::Error;

/// Bit index of the emergency-stop fault, handled as its own category.
pub const ESTOP_BIT: u32 = 11;

/// Fault names indexed by bit position in the `AXISFAULT` word. Bits the
/// amplifier does not define read "N/A".
const FAULT_NAMES: [&str; 29] = [
    "PositionError Fault",                     // 0
    "OverCurrent Fault",                       // 1
    "CW/Positive End-of-Travel Limit Fault",   // 2
    "CCW/Negative End-of-Travel Limit Fault",  // 3
    "CW/High Software Limit Fault",            // 4
    "CCW/Low Software Limit Fault",            // 5
    "Amplifier Fault",                         // 6
    "Position Feedback Fault",                 // 7
    "Velocity Feedback Fault",                 // 8
    "Hall Sensor Fault",                       // 9
    "Maximum Velocity Command Fault",          // 10
    "Emergency Stop Fault",                    // 11
    "Velocity Error Fault",                    // 12
    "N/A",                                     // 13
    "N/A",                                     // 14
    "External Fault",                          // 15
    "N/A",                                     // 16
    "Motor Temperature Fault",                 // 17
    "Amplifier Temperature Fault",             // 18
    "Encoder Fault",                           // 19
    "Communication Lost Fault",                // 20
    "N/A",                                     // 21
    "N/A",                                     // 22
    "Feedback Scaling Fault",                  // 23
    "Marker Search Fault",                     // 24
    "N/A",                                     // 25
    "N/A",                                     // 26
    "Voltage Clamp Fault",                     // 27
    "Power Supply Fault",                      // 28
];

#[derive(Debug, Error)]
#[error("malformed fault word {word:?}")]
pub struct FaultParseError {
    word: String,
}

/// 29-bit fault register of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultMask(u32);

impl FaultMask {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn parse(payload: &str) -> Result<Self, FaultParseError> {
        let word = payload
            .trim()
            .parse::<i64>()
            .map_err(|_| FaultParseError {
                word: payload.to_string(),
            })?;

        Ok(Self(word as u32))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_clear(&self) -> bool {
        self.0 == 0
    }

    pub fn is_estop(&self) -> bool {
        self.0 & (1 << ESTOP_BIT) != 0
    }

    /// Names of all faults present in the mask, lowest bit first.
    pub fn faults(&self) -> impl Iterator<Item = &'static str> + '_ {
        (0..FAULT_NAMES.len() as u32)
            .filter(|bit| self.0 & (1 << bit) != 0)
            .map(|bit| FAULT_NAMES[bit as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estop_bit_is_distinguished() {
        let mask = FaultMask::new(0b1000_0000_0000);
        assert!(mask.is_estop());
        assert_eq!(mask.faults().collect::<Vec<_>>(), ["Emergency Stop Fault"]);
    }

    #[test]
    fn position_error_is_bit_zero() {
        let mask = FaultMask::new(0b1);
        assert!(!mask.is_estop());
        assert_eq!(mask.faults().collect::<Vec<_>>(), ["PositionError Fault"]);
    }

    #[test]
    fn reports_one_name_per_set_bit() {
        let mask = FaultMask::parse("65\n").unwrap();
        assert_eq!(
            mask.faults().collect::<Vec<_>>(),
            ["PositionError Fault", "Amplifier Fault"]
        );
    }

    #[test]
    fn undefined_bits_read_not_applicable() {
        let mask = FaultMask::new(1 << 13);
        assert_eq!(mask.faults().collect::<Vec<_>>(), ["N/A"]);
    }

    #[test]
    fn clear_mask_names_nothing() {
        let mask = FaultMask::new(0);
        assert!(mask.is_clear());
        assert_eq!(mask.faults().count(), 0);
    }
}
