//! Wire protocol for the fader deck serial link.
//!
//! The deck emits line-delimited text records: either a numeric frame of
//! fixed-width fields (one per slider) joined by `|`, or a literal command
//! token. Decoding is a pure transform; anything unusable is reported as
//! [`Record::NoData`] and the cycle becomes a no-op.

/// Digit width of one numeric field ("0512", zero-padded by the firmware).
pub const FIELD_WIDTH: usize = 4;

/// Delimiter between numeric fields.
pub const FIELD_DELIMITER: char = '|';

/// Upper bound of the 10-bit reading domain.
pub const MAX_RAW: u16 = 1023;

/// Prefix shared by all command tokens.
const COMMAND_MARKER: &str = "VM";

/// Command tokens the deck firmware can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckCommand {
    ChangePreset,
    PlayPause,
    Next,
    Previous,
    Stop,
}

impl DeckCommand {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "VM.changePreset" => Some(Self::ChangePreset),
            "VM.playPause" => Some(Self::PlayPause),
            "VM.next" => Some(Self::Next),
            "VM.previous" => Some(Self::Previous),
            "VM.stop" => Some(Self::Stop),
            _ => None,
        }
    }

    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangePreset => "change-preset",
            Self::PlayPause => "play-pause",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Stop => "stop",
        }
    }
}

/// One decoded transport record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A full numeric frame, one reading per slider, clamped to 0..=1023.
    Readings(Vec<u16>),
    /// A command token; numeric processing is skipped this cycle.
    Command(DeckCommand),
    /// Nothing usable (malformed frame, unknown token, empty line).
    NoData,
}

/// Decode one raw line from the deck.
pub fn decode(line: &str) -> Record {
    let line = line.trim();

    if line.contains(COMMAND_MARKER) {
        return match DeckCommand::parse(line) {
            Some(cmd) => Record::Command(cmd),
            None => Record::NoData,
        };
    }

    if line.is_empty() {
        return Record::NoData;
    }

    let mut readings = Vec::new();
    for field in line.split(FIELD_DELIMITER) {
        if field.len() != FIELD_WIDTH || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Record::NoData;
        }
        match field.parse::<u16>() {
            Ok(value) => readings.push(value.min(MAX_RAW)),
            Err(_) => return Record::NoData,
        }
    }

    Record::Readings(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_frame() {
        assert_eq!(
            decode("0512|1023|0000|0007"),
            Record::Readings(vec![512, 1023, 0, 7])
        );
    }

    #[test]
    fn clamps_out_of_domain_field() {
        assert_eq!(decode("9999|0000"), Record::Readings(vec![1023, 0]));
    }

    #[test]
    fn decodes_commands() {
        assert_eq!(decode("VM.changePreset"), Record::Command(DeckCommand::ChangePreset));
        assert_eq!(decode("VM.playPause\r"), Record::Command(DeckCommand::PlayPause));
        assert_eq!(decode("VM.next"), Record::Command(DeckCommand::Next));
        assert_eq!(decode("VM.previous"), Record::Command(DeckCommand::Previous));
        assert_eq!(decode("VM.stop"), Record::Command(DeckCommand::Stop));
    }

    #[test]
    fn unknown_command_token_is_no_data() {
        assert_eq!(decode("VM.reboot"), Record::NoData);
    }

    #[test]
    fn wrong_field_width_is_no_data() {
        assert_eq!(decode("512|1023"), Record::NoData);
        assert_eq!(decode("00512|0000"), Record::NoData);
    }

    #[test]
    fn non_numeric_field_is_no_data() {
        assert_eq!(decode("05a2|0000"), Record::NoData);
        // A sign character has the right width but is not a digit.
        assert_eq!(decode("+512|0000"), Record::NoData);
    }

    #[test]
    fn empty_line_is_no_data() {
        assert_eq!(decode(""), Record::NoData);
        assert_eq!(decode("  \r\n"), Record::NoData);
    }
}
