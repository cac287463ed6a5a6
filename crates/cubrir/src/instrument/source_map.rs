//! Version 3 source maps for instrumented output.

use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Append `value` to `out` as a base64 VLQ
pub(crate) fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = vlq & 0b1_1111;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(char::from(BASE64[digit as usize]));
        if vlq == 0 {
            break;
        }
    }
}

/// One generated-to-original mapping (all 0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_line: u32,
    pub original_column: u32,
}

/// Collects mappings for a single-source file
#[derive(Debug, Default)]
pub(crate) struct SourceMapBuilder {
    mappings: Vec<Mapping>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapDocument<'a> {
    version: u8,
    file: &'a str,
    sources: [&'a str; 1],
    sources_content: [&'a str; 1],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMapBuilder {
    pub fn add(&mut self, mapping: Mapping) {
        if self.mappings.last() != Some(&mapping) {
            self.mappings.push(mapping);
        }
    }

    /// Encode the `mappings` field
    pub fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut line = 0;
        let mut previous_column = 0i64;
        let mut previous_original_line = 0i64;
        let mut previous_original_column = 0i64;
        let mut first_on_line = true;

        for mapping in &self.mappings {
            while line < mapping.generated_line {
                out.push(';');
                line += 1;
                previous_column = 0;
                first_on_line = true;
            }
            if !first_on_line {
                out.push(',');
            }
            first_on_line = false;

            let column = i64::from(mapping.generated_column);
            let original_line = i64::from(mapping.original_line);
            let original_column = i64::from(mapping.original_column);
            encode_vlq(&mut out, column - previous_column);
            encode_vlq(&mut out, 0);
            encode_vlq(&mut out, original_line - previous_original_line);
            encode_vlq(&mut out, original_column - previous_original_column);
            previous_column = column;
            previous_original_line = original_line;
            previous_original_column = original_column;
        }
        out
    }

    /// Serialise the whole map as JSON
    pub fn to_json(&self, file: &str, source_path: &str, source: &str) -> serde_json::Result<String> {
        serde_json::to_string(&SourceMapDocument {
            version: 3,
            file,
            sources: [source_path],
            sources_content: [source],
            names: [],
            mappings: self.encode_mappings(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(&mut out, value);
        out
    }

    #[test]
    fn test_vlq_known_values() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_mappings_reset_column_per_line() {
        let mut builder = SourceMapBuilder::default();
        builder.add(Mapping {
            generated_line: 0,
            generated_column: 4,
            original_line: 0,
            original_column: 0,
        });
        builder.add(Mapping {
            generated_line: 2,
            generated_column: 0,
            original_line: 1,
            original_column: 0,
        });
        assert_eq!(builder.encode_mappings(), "IAAA;;AACA");
    }

    #[test]
    fn test_document_fields() {
        let builder = SourceMapBuilder::default();
        let json = builder.to_json("a.js", "/src/a.js", "x()").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 3);
        assert_eq!(value["sources"][0], "/src/a.js");
        assert_eq!(value["sourcesContent"][0], "x()");
        assert_eq!(value["mappings"], "");
    }
}
