//! Minimal INI document for the AWS shared config files.
//!
//! Only lines touched through [`IniDocument::set`] change on render. Everything
//! else, including comments, blank lines and indented sub-properties, is written
//! back as read.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    /// `None` for the lines preceding the first header.
    name: Option<String>,
    /// Raw lines, header included.
    lines: Vec<String>,
}

impl Section {
    fn entry_index(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| parse_entry(line).is_some_and(|(k, _)| k == key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

fn parse_header(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn parse_entry(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let trimmed = line.trim_end();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    trimmed
        .split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
}

impl IniDocument {
    pub fn parse(content: &str) -> Self {
        let mut doc = IniDocument::default();
        if content.is_empty() {
            return doc;
        }

        let body = content.strip_suffix('\n').unwrap_or(content);
        let mut current = Section {
            name: None,
            lines: Vec::new(),
        };
        for line in body.split('\n') {
            if let Some(name) = parse_header(line) {
                doc.push_section(current);
                current = Section {
                    name: Some(name.to_string()),
                    lines: Vec::new(),
                };
            }
            current.lines.push(line.to_string());
        }
        doc.push_section(current);
        doc
    }

    fn push_section(&mut self, section: Section) {
        if section.name.is_some() || !section.lines.is_empty() {
            self.sections.push(section);
        }
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let section = self.section(section)?;
        section
            .lines
            .iter()
            .filter_map(|line| parse_entry(line))
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = format!("{key} = {value}");
        let index = match self
            .sections
            .iter()
            .position(|s| s.name.as_deref() == Some(section))
        {
            Some(index) => index,
            None => self.append_section(section),
        };
        let section = &mut self.sections[index];

        match section.entry_index(key) {
            Some(line) => section.lines[line] = entry,
            None => {
                let insert_at = section
                    .lines
                    .iter()
                    .rposition(|line| !line.trim().is_empty())
                    .map_or(section.lines.len(), |last| last + 1);
                section.lines.insert(insert_at, entry);
            }
        }
    }

    fn append_section(&mut self, name: &str) -> usize {
        if let Some(last) = self.sections.last_mut() {
            if last.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                last.lines.push(String::new());
            }
        }
        self.sections.push(Section {
            name: Some(name.to_string()),
            lines: vec![format!("[{name}]")],
        });
        self.sections.len() - 1
    }

    pub fn render(&self) -> String {
        let mut out = self
            .sections
            .iter()
            .flat_map(|s| s.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
# managed by hand
[default]
region = eu-west-1
output=json

[profile other]
; keep me
region = us-west-2
s3 =
  max_concurrent_requests = 20

[sso-session corp]
sso_start_url = https://corp.awsapps.com/start
";

    #[test]
    fn test_render_without_changes_is_identical() {
        assert_eq!(IniDocument::parse(CONFIG).render(), CONFIG);
    }

    #[test]
    fn test_get_ignores_comments_and_sub_properties() {
        let doc = IniDocument::parse(CONFIG);
        assert_eq!(doc.get("default", "output"), Some("json"));
        assert_eq!(doc.get("profile other", "region"), Some("us-west-2"));
        assert_eq!(doc.get("profile other", "s3"), Some(""));
        assert_eq!(doc.get("profile other", "max_concurrent_requests"), None);
        assert_eq!(doc.get("profile missing", "region"), None);
    }

    #[test]
    fn test_set_replaces_in_place_and_preserves_other_sections() {
        let mut doc = IniDocument::parse(CONFIG);
        doc.set("default", "region", "us-east-1");
        doc.set("default", "asa.login_url", "https://idp.example.com/saml");

        let rendered = doc.render();
        assert!(rendered.starts_with(
            "# managed by hand\n[default]\nregion = us-east-1\noutput=json\nasa.login_url = https://idp.example.com/saml\n\n[profile other]\n"
        ));
        assert!(rendered.ends_with(&CONFIG[CONFIG.find("[profile other]").unwrap()..]));
    }

    #[test]
    fn test_set_appends_new_section() {
        let mut doc = IniDocument::parse(CONFIG);
        doc.set("profile new", "region", "ap-south-1");
        let rendered = doc.render();
        assert!(rendered.starts_with(CONFIG));
        assert!(rendered.ends_with("\n\n[profile new]\nregion = ap-south-1\n"));
        assert!(IniDocument::parse(&rendered).has_section("profile new"));
    }

    #[test]
    fn test_empty_document() {
        let mut doc = IniDocument::parse("");
        assert_eq!(doc.render(), "");
        doc.set("default", "region", "us-east-1");
        assert_eq!(doc.render(), "[default]\nregion = us-east-1\n");
    }
}
