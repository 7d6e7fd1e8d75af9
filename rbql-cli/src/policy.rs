//! Field-splitting/quoting policies and text encodings (§6.3), mirroring
//! the original engine's CSV front end rather than anything in `rbql-core`
//! itself — the engine only ever sees already-decoded [`rbql_core::Record`]
//! values.

use clap::ValueEnum;

/// How a line of text is split into fields, and how fields are quoted back
/// together on the way out.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum Policy {
    /// Plain split on the delimiter; fields may not themselves contain it.
    Simple,
    /// Split on the delimiter, but a field wrapped in `"..."` may contain
    /// it; `""` inside a quoted field is a literal `"`. More forgiving than
    /// [`Policy::QuotedRfc`] (no embedded newlines, no field-count checks).
    Quoted,
    /// Full RFC 4180 quoting via the `csv` crate, including fields that
    /// span multiple physical lines.
    QuotedRfc,
    /// Split on runs of whitespace; no quoting at all.
    Whitespace,
    /// The entire line is a single field.
    Monocolumn,
}

/// Byte-to-text decoding for the input stream (§6.3).
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    /// Decodes `bytes` read from the input file. `Latin1` is a trivial
    /// one-byte-per-codepoint mapping (ISO-8859-1), not a full charset
    /// conversion crate, since every byte value 0-255 maps to the
    /// identically-numbered Unicode scalar.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Inverse of [`Encoding::decode`], used when writing output back out.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text.chars().map(|c| c as u32 as u8).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trips_high_bytes() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = Encoding::Latin1.decode(&bytes);
        assert_eq!(Encoding::Latin1.encode(&text), bytes);
    }
}
