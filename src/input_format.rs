// src/input_format.rs - Line parsers for the supported field strategies

use indexmap::IndexMap;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::ParseFailure;

/// Result of parsing one line
pub type ParseOutcome = Result<Record, ParseFailure>;

/// One parsed line: field names to captured text, in strategy order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn with_capacity(capacity: usize) -> Self {
        Record {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compact JSON, empty fields left out
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present = self.fields.values().filter(|v| !v.is_empty()).count();
        let mut map = serializer.serialize_map(Some(present))?;
        for (name, value) in self.fields.iter().filter(|(_, v)| !v.is_empty()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub trait LineParser: Send + Sync {
    fn parse_line(&self, line: &str) -> ParseOutcome;
    fn field_names(&self) -> Vec<&str>;
    fn name(&self) -> &str;
}

/// Positional groups mapped onto a fixed list of field names
pub struct FixedFieldParser {
    name: String,
    regex: Regex,
    fields: &'static [&'static str],
}

impl FixedFieldParser {
    pub fn new(name: impl Into<String>, regex: Regex, fields: &'static [&'static str]) -> Self {
        Self {
            name: name.into(),
            regex,
            fields,
        }
    }
}

impl LineParser for FixedFieldParser {
    fn parse_line(&self, line: &str) -> ParseOutcome {
        let captures = self.regex.captures(line).ok_or(ParseFailure::Unparsable)?;

        // Whole match plus one participating group per field
        let participating = captures.iter().filter(Option::is_some).count();
        if participating < self.fields.len() + 1 {
            return Err(ParseFailure::Unparsable);
        }

        let mut record = Record::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let value = captures.get(i + 1).map_or("", |m| m.as_str());
            record.insert(*field, value);
        }
        Ok(record)
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.to_vec()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Named groups copied into fields of the same name
pub struct NamedFieldParser {
    name: String,
    regex: Regex,
    fields: Vec<String>,
}

impl NamedFieldParser {
    pub fn new(name: impl Into<String>, regex: Regex, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            regex,
            fields,
        }
    }
}

impl LineParser for NamedFieldParser {
    fn parse_line(&self, line: &str) -> ParseOutcome {
        let Some(captures) = self.regex.captures(line) else {
            return Err(ParseFailure::Unparsable);
        };

        let mut record = Record::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = captures.name(field).map_or("", |m| m.as_str());
            record.insert(field.as_str(), value);
        }
        Ok(record)
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(String::as_str).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern_extraction::{CompiledFormat, FormatSpec};

    const COMBINED_LINE: &str =
        r#"1.2.3.4 - bob [10/Oct/2020:10:00:00] "GET / HTTP/1.1" 200 512 "-" "curl/7""#;

    fn parser_for(spec: FormatSpec) -> Box<dyn LineParser> {
        CompiledFormat::compile(&spec).unwrap().into_parser()
    }

    #[test]
    fn test_combined_line() {
        let parser = parser_for(FormatSpec::default());
        let record = parser.parse_line(COMBINED_LINE).unwrap();

        assert_eq!(record.get("remote_addr"), Some("1.2.3.4"));
        assert_eq!(record.get("remote_user"), Some("bob"));
        assert_eq!(record.get("time_local"), Some("10/Oct/2020:10:00:00"));
        assert_eq!(record.get("request"), Some("GET / HTTP/1.1"));
        assert_eq!(record.get("status"), Some("200"));
        assert_eq!(record.get("body_bytes_sent"), Some("512"));
        assert_eq!(record.get("http_referer"), Some("-"));
        assert_eq!(record.get("http_user_agent"), Some("curl/7"));

        assert_eq!(
            record.to_json().unwrap(),
            r#"{"remote_addr":"1.2.3.4","remote_user":"bob","time_local":"10/Oct/2020:10:00:00","request":"GET / HTTP/1.1","status":"200","body_bytes_sent":"512","http_referer":"-","http_user_agent":"curl/7"}"#
        );
    }

    #[test]
    fn test_combined_unparsable() {
        let parser = parser_for(FormatSpec::default());
        assert_eq!(
            parser.parse_line("not a valid log line"),
            Err(ParseFailure::Unparsable)
        );
        assert_eq!(parser.parse_line(""), Err(ParseFailure::Unparsable));
        assert_eq!(
            ParseFailure::Unparsable.to_string(),
            "unparsable line"
        );
    }

    #[test]
    fn test_common_and_main_presets() {
        let common = parser_for(FormatSpec::Preset("common".to_string()));
        let record = common
            .parse_line(r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#)
            .unwrap();
        assert_eq!(record.len(), 6);
        assert_eq!(record.get("remote_user"), Some("frank"));
        assert_eq!(record.get("time_local"), Some("10/Oct/2000:13:55:36 -0700"));
        assert_eq!(record.get("body_bytes_sent"), Some("2326"));

        let main = parser_for(FormatSpec::Preset("main".to_string()));
        let record = main
            .parse_line(r#"10.0.0.2 - - [10/Oct/2020:10:00:00 +0000] "GET /x HTTP/1.1" 404 0 "-" "Mozilla/5.0" "203.0.113.9""#)
            .unwrap();
        assert_eq!(record.get("status"), Some("404"));
        assert_eq!(record.get("http_user_agent"), Some("Mozilla/5.0"));
        assert_eq!(record.get("http_x_forwarded_for"), Some("203.0.113.9"));
        assert!(main.parse_line(COMBINED_LINE).is_err());
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let parser = parser_for(FormatSpec::Preset("main".to_string()));
        let record = parser
            .parse_line(r#"10.0.0.2 - - [t] "" 400 0 "" "" """#)
            .unwrap();
        assert_eq!(record.len(), 9);
        assert_eq!(record.get("request"), Some(""));
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"remote_addr":"10.0.0.2","remote_user":"-","time_local":"t","status":"400","body_bytes_sent":"0"}"#
        );
    }

    #[test]
    fn test_named_parser() {
        let parser = parser_for(FormatSpec::Pattern(
            r"^(?P<level>[A-Z]+) (?:\[(?P<module>\w+)\] )?(?P<message>.*)$".to_string(),
        ));
        assert_eq!(parser.field_names(), vec!["level", "module", "message"]);

        let record = parser.parse_line("INFO [db] connected").unwrap();
        assert_eq!(record.to_json().unwrap(), r#"{"level":"INFO","module":"db","message":"connected"}"#);

        // Optional group that did not participate
        let record = parser.parse_line("WARN disk almost full").unwrap();
        assert_eq!(record.get("module"), Some(""));
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"level":"WARN","message":"disk almost full"}"#
        );

        assert_eq!(parser.parse_line("lowercase"), Err(ParseFailure::Unparsable));
    }

    #[test]
    fn test_template_parser() {
        let parser = parser_for(FormatSpec::Template(
            r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_time"#
                .to_string(),
        ));
        let record = parser
            .parse_line(r#"1.2.3.4 - - [10/Oct/2020:10:00:00 +0000] "POST /api HTTP/2.0" 201 17 0.004"#)
            .unwrap();
        assert_eq!(record.get("request"), Some("POST /api HTTP/2.0"));
        assert_eq!(record.get("request_time"), Some("0.004"));
        assert_eq!(parser.name(), "template");

        assert!(parser.parse_line("1.2.3.4 [no dashes]").is_err());
    }

    #[test]
    fn test_json_escaping() {
        let parser = parser_for(FormatSpec::Pattern(r"(?P<msg>.*)".to_string()));
        let record = parser.parse_line("say \"hi\"\t\\ ok").unwrap();
        assert_eq!(record.to_json().unwrap(), r#"{"msg":"say \"hi\"\t\\ ok"}"#);
    }
}
