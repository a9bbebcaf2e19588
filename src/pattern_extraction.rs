use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;
use crate::input_format::{FixedFieldParser, LineParser, NamedFieldParser};

/// A built-in format with positional capture groups
#[derive(Debug)]
pub struct Preset {
    pub description: &'static str,
    pattern: &'static str,
    fields: &'static [&'static str],
}

const COMBINED_FIELDS: &[&str] = &[
    "remote_addr",
    "remote_user",
    "time_local",
    "request",
    "status",
    "body_bytes_sent",
    "http_referer",
    "http_user_agent",
];

const MAIN_FIELDS: &[&str] = &[
    "remote_addr",
    "remote_user",
    "time_local",
    "request",
    "status",
    "body_bytes_sent",
    "http_referer",
    "http_user_agent",
    "http_x_forwarded_for",
];

// Built-in presets, in the order `--list-formats` shows them
pub static PRESETS: Lazy<IndexMap<&'static str, Preset>> = Lazy::new(|| {
    let mut presets = IndexMap::new();

    presets.insert(
        "combined",
        Preset {
            description: "NCSA combined log format (nginx/Apache default)",
            pattern: r#"(.+) - (.+) \[(.+)\] "(.+)" (.+) (.+) "(.+)" "(.+)""#,
            fields: COMBINED_FIELDS,
        },
    );
    presets.insert(
        "common",
        Preset {
            description: "NCSA common log format (no referer or user agent)",
            pattern: r#"^(\S+) \S+ (\S+) \[([^\]]+)\] "([^"]*)" (\d{3}) (\S+)"#,
            fields: &COMBINED_FIELDS[..6],
        },
    );
    presets.insert(
        "main",
        Preset {
            description: "stock nginx 'main' format (combined plus X-Forwarded-For)",
            pattern: r#"^(\S+) - (\S+) \[([^\]]+)\] "(.*?)" (\d{3}) (\S+) "(.*?)" "(.*?)" "(.*?)"$"#,
            fields: MAIN_FIELDS,
        },
    );

    presets
});

/// Preset names and descriptions, for `--list-formats`
pub fn list_presets() -> Vec<(&'static str, &'static str)> {
    PRESETS
        .iter()
        .map(|(name, preset)| (*name, preset.description))
        .collect()
}

/// What the user asked to parse lines with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSpec {
    /// A built-in preset such as "combined"
    Preset(String),
    /// A regular expression with named capture groups
    Pattern(String),
    /// An nginx `log_format` string such as `$remote_addr [$time_local]`
    Template(String),
}

impl Default for FormatSpec {
    fn default() -> Self {
        FormatSpec::Preset("combined".to_string())
    }
}

impl FormatSpec {
    /// Resolve a `--format` value.
    ///
    /// Preset names win, then custom formats from the settings file. Anything
    /// else that looks like a bare name is an unknown format; the rest is
    /// taken to be a regular expression.
    pub fn from_selector(
        selector: &str,
        custom: &IndexMap<String, String>,
    ) -> Result<Self, ConfigError> {
        if PRESETS.contains_key(selector) {
            return Ok(FormatSpec::Preset(selector.to_string()));
        }
        if let Some(pattern) = custom.get(selector) {
            return Ok(FormatSpec::Pattern(pattern.clone()));
        }
        if is_format_name(selector) {
            return Err(ConfigError::UnknownFormat(selector.to_string()));
        }
        Ok(FormatSpec::Pattern(selector.to_string()))
    }
}

fn is_format_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// How capture groups map onto record fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Group N+1 is field N
    FixedFields(&'static [&'static str]),
    /// Named groups, in declaration order
    NamedFields(Vec<String>),
}

/// A matcher plus its field mapping, built once per run
#[derive(Debug, Clone)]
pub struct CompiledFormat {
    label: String,
    regex: Regex,
    strategy: FieldStrategy,
}

impl CompiledFormat {
    pub fn compile(spec: &FormatSpec) -> Result<Self, ConfigError> {
        match spec {
            FormatSpec::Preset(name) => {
                let preset = PRESETS
                    .get(name.as_str())
                    .ok_or_else(|| ConfigError::UnknownFormat(name.clone()))?;
                Ok(CompiledFormat {
                    label: name.clone(),
                    regex: Regex::new(preset.pattern)?,
                    strategy: FieldStrategy::FixedFields(preset.fields),
                })
            }
            FormatSpec::Pattern(pattern) => Self::compile_named("pattern", pattern),
            FormatSpec::Template(template) => {
                let pattern = template_to_regex(template)?;
                Self::compile_named("template", &pattern)
            }
        }
    }

    fn compile_named(label: &str, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)?;
        // Group 0 and unnamed groups have no name
        let names: Vec<String> = regex.capture_names().flatten().map(String::from).collect();
        if names.is_empty() {
            return Err(ConfigError::NoNamedGroups);
        }
        Ok(CompiledFormat {
            label: label.to_string(),
            regex,
            strategy: FieldStrategy::NamedFields(names),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn strategy(&self) -> &FieldStrategy {
        &self.strategy
    }

    pub fn field_names(&self) -> Vec<&str> {
        match &self.strategy {
            FieldStrategy::FixedFields(names) => names.to_vec(),
            FieldStrategy::NamedFields(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Build the line parser for this format
    pub fn into_parser(self) -> Box<dyn LineParser> {
        match self.strategy {
            FieldStrategy::FixedFields(names) => {
                Box::new(FixedFieldParser::new(self.label, self.regex, names))
            }
            FieldStrategy::NamedFields(names) => {
                Box::new(NamedFieldParser::new(self.label, self.regex, names))
            }
        }
    }
}

/// Turn an nginx `log_format` string into an anchored regex.
///
/// `$name` and `${name}` become lazy named groups; every other character
/// matches itself.
fn template_to_regex(template: &str) -> Result<String, ConfigError> {
    if template.trim().is_empty() {
        return Err(ConfigError::EmptyTemplate);
    }

    let mut regex_pattern = String::from("^");
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            literal.push(ch);
            continue;
        }

        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut found_closing = false;
            for inner_ch in chars.by_ref() {
                if inner_ch == '}' {
                    found_closing = true;
                    break;
                }
                name.push(inner_ch);
            }
            if !found_closing {
                return Err(ConfigError::InvalidTemplate(format!(
                    "unclosed variable '${{{}'",
                    name
                )));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }

        validate_variable_name(&name)?;

        regex_pattern.push_str(&regex::escape(&literal));
        literal.clear();
        regex_pattern.push_str(&format!("(?P<{}>.*?)", name));
    }

    regex_pattern.push_str(&regex::escape(&literal));
    regex_pattern.push('$');
    Ok(regex_pattern)
}

fn validate_variable_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ConfigError::InvalidTemplate(
            "'$' must be followed by a variable name".to_string(),
        ));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ConfigError::InvalidTemplate(format!(
            "variable '{}' must start with a letter or underscore",
            name
        )));
    }

    if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(ConfigError::InvalidTemplate(format!(
            "variable '{}' contains invalid character '{}'",
            name, c
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_custom() -> IndexMap<String, String> {
        IndexMap::new()
    }

    #[test]
    fn test_selector_resolution() {
        assert_eq!(
            FormatSpec::from_selector("combined", &no_custom()).unwrap(),
            FormatSpec::Preset("combined".to_string())
        );

        let mut custom = IndexMap::new();
        custom.insert("app".to_string(), r"(?P<level>\w+): (?P<msg>.*)".to_string());
        assert_eq!(
            FormatSpec::from_selector("app", &custom).unwrap(),
            FormatSpec::Pattern(r"(?P<level>\w+): (?P<msg>.*)".to_string())
        );

        assert!(matches!(
            FormatSpec::from_selector("apache", &no_custom()),
            Err(ConfigError::UnknownFormat(name)) if name == "apache"
        ));

        assert_eq!(
            FormatSpec::from_selector(r"(?P<ip>\S+) .*", &no_custom()).unwrap(),
            FormatSpec::Pattern(r"(?P<ip>\S+) .*".to_string())
        );
    }

    #[test]
    fn test_preset_fields() {
        let compiled = CompiledFormat::compile(&FormatSpec::default()).unwrap();
        assert_eq!(compiled.label(), "combined");
        assert_eq!(compiled.field_names(), COMBINED_FIELDS.to_vec());
        assert_eq!(compiled.regex().captures_len(), COMBINED_FIELDS.len() + 1);

        // Every preset has one group per field
        for (name, preset) in PRESETS.iter() {
            let regex = Regex::new(preset.pattern).unwrap();
            assert_eq!(regex.captures_len(), preset.fields.len() + 1, "{}", name);
        }
    }

    #[test]
    fn test_named_fields_in_declaration_order() {
        let spec = FormatSpec::Pattern(r"(?P<b>\d+)-(\w+)-(?P<a>\w+)".to_string());
        let compiled = CompiledFormat::compile(&spec).unwrap();
        assert_eq!(
            compiled.strategy(),
            &FieldStrategy::NamedFields(vec!["b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_pattern_errors() {
        let spec = FormatSpec::Pattern(r"(?P<ip>\S+".to_string());
        assert!(matches!(
            CompiledFormat::compile(&spec),
            Err(ConfigError::PatternCompile(_))
        ));

        let spec = FormatSpec::Pattern(r"(\S+) (\S+)".to_string());
        assert!(matches!(
            CompiledFormat::compile(&spec),
            Err(ConfigError::NoNamedGroups)
        ));

        let spec = FormatSpec::Preset("nope".to_string());
        assert!(matches!(
            CompiledFormat::compile(&spec),
            Err(ConfigError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_template_to_regex() {
        let regex = template_to_regex(r#"$remote_addr [${time_local}] "$request""#).unwrap();
        assert_eq!(
            regex,
            r#"^(?P<remote_addr>.*?) \[(?P<time_local>.*?)\] "(?P<request>.*?)"$"#
        );

        let regex = template_to_regex("$status").unwrap();
        assert_eq!(regex, "^(?P<status>.*?)$");
    }

    #[test]
    fn test_template_errors() {
        assert!(matches!(
            template_to_regex("   "),
            Err(ConfigError::EmptyTemplate)
        ));
        assert!(matches!(
            template_to_regex("cost: $ 5"),
            Err(ConfigError::InvalidTemplate(_))
        ));
        assert!(matches!(
            template_to_regex("${unclosed"),
            Err(ConfigError::InvalidTemplate(_))
        ));
        assert!(matches!(
            template_to_regex("$9lives"),
            Err(ConfigError::InvalidTemplate(_))
        ));
        assert!(matches!(
            template_to_regex("${bad-name}"),
            Err(ConfigError::InvalidTemplate(_))
        ));

        // Literal text only compiles but declares nothing
        let spec = FormatSpec::Template("plain text".to_string());
        assert!(matches!(
            CompiledFormat::compile(&spec),
            Err(ConfigError::NoNamedGroups)
        ));
    }

    #[test]
    fn test_list_presets() {
        let names: Vec<&str> = list_presets().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["combined", "common", "main"]);
    }
}
