//! Parsing of `key=value,key=value` option strings and the sub-option tables
//! that map option names onto locations inside an element.

use xmltree::{Element, XMLNode};

use crate::error::{Result, VmXmlError};
use crate::snapshot::{ensure_child, set_text, text_of};

/// Where a sub-option's value lives, relative to the element being edited.
///
/// Paths are `/`-separated child tags; `""` is the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An attribute on the element at `path`.
    Attr(&'static str, &'static str),
    /// The text content of the element at `path`.
    Text(&'static str),
    /// Presence of an empty child element, toggled with on/off.
    Flag(&'static str),
    /// Handled by the element kind itself.
    Custom,
    /// Not stored in XML; consumed by storage setup.
    Storage,
}

#[derive(Debug, Clone, Copy)]
pub struct SubOption {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub target: Target,
    /// Repeated occurrences are joined with `,` instead of rejected.
    pub multi: bool,
}

impl SubOption {
    pub const fn attr(name: &'static str, path: &'static str, attr: &'static str) -> Self {
        Self::new(name, Target::Attr(path, attr))
    }

    pub const fn text(name: &'static str, path: &'static str) -> Self {
        Self::new(name, Target::Text(path))
    }

    pub const fn flag(name: &'static str, path: &'static str) -> Self {
        Self::new(name, Target::Flag(path))
    }

    pub const fn custom(name: &'static str) -> Self {
        Self::new(name, Target::Custom)
    }

    pub const fn storage(name: &'static str) -> Self {
        Self::new(name, Target::Storage)
    }

    const fn new(name: &'static str, target: Target) -> Self {
        Self {
            name,
            aliases: &[],
            target,
            multi: false,
        }
    }

    pub const fn alias(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub const fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    fn answers_to(&self, key: &str) -> bool {
        self.name == key || self.aliases.contains(&key)
    }
}

/// Reserved key that wipes an existing element before other options apply.
pub const CLEARXML: &str = "clearxml";

/// An option string split into canonical `(name, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOptions {
    pub raw: String,
    pairs: Vec<(&'static str, String)>,
    pub clearxml: bool,
}

impl ParsedOptions {
    /// Options handled outside the sub-option tables.
    pub(crate) fn unstructured(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && !self.clearxml
    }

    /// Pairs in sub-option table order, so results never depend on how the
    /// user ordered the keys.
    pub fn ordered<'a>(
        &'a self,
        table: &'static [SubOption],
    ) -> impl Iterator<Item = (&'static SubOption, &'a str)> + 'a {
        table.iter().filter_map(move |opt| {
            self.get(opt.name).map(|value| (opt, value))
        })
    }
}

/// Split an option string on commas, honoring single and double quotes.
pub fn tokenize(kind: &str, input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => tokens.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if let Some(q) = quote {
        return Err(VmXmlError::OptionSyntax {
            kind: kind.to_string(),
            input: input.to_string(),
            reason: format!("unterminated {q} quote"),
        });
    }
    tokens.push(current);

    Ok(tokens.into_iter().filter(|t| !t.is_empty()).collect())
}

/// Parse an option string against a sub-option table.
///
/// A token without `=` is assigned to `positional`. Unknown keys are
/// collected and reported together.
pub fn parse(
    kind: &str,
    table: &'static [SubOption],
    positional: Option<&'static str>,
    allow_clearxml: bool,
    input: &str,
) -> Result<ParsedOptions> {
    let mut parsed = ParsedOptions {
        raw: input.to_string(),
        ..Default::default()
    };
    let mut unknown = Vec::new();

    for token in tokenize(kind, input)? {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), v.to_string()),
            None => match positional {
                Some(p) => (p.to_string(), token.clone()),
                None => {
                    unknown.push(token);
                    continue;
                }
            },
        };

        if allow_clearxml && key == CLEARXML {
            parsed.clearxml = parse_bool(&value).ok_or_else(|| invalid(kind, &key, &value))?;
            continue;
        }

        let Some(opt) = table.iter().find(|o| o.answers_to(&key)) else {
            unknown.push(key);
            continue;
        };

        match parsed.pairs.iter_mut().find(|(k, _)| *k == opt.name) {
            Some((_, existing)) if opt.multi => {
                existing.push(',');
                existing.push_str(&value);
            }
            Some(_) => {
                return Err(VmXmlError::OptionSyntax {
                    kind: kind.to_string(),
                    input: input.to_string(),
                    reason: format!("option '{}' specified more than once", opt.name),
                });
            }
            None => parsed.pairs.push((opt.name, value)),
        }
    }

    if !unknown.is_empty() {
        return Err(VmXmlError::UnknownOptions {
            kind: kind.to_string(),
            options: unknown
                .iter()
                .map(|u| format!("'{u}'"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    Ok(parsed)
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Some(true),
        "off" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

pub(crate) fn invalid(kind: &str, option: &str, value: &str) -> VmXmlError {
    VmXmlError::InvalidOptionValue {
        kind: kind.to_string(),
        option: option.to_string(),
        value: value.to_string(),
        reason: "expected on/off".to_string(),
    }
}

/// Walk `path` below `element` without creating anything.
pub fn find_path<'a>(element: &'a Element, path: &str) -> Option<&'a Element> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .try_fold(element, |el, seg| el.get_child(seg))
}

/// Walk `path` below `element`, creating missing children.
pub fn ensure_path<'a>(element: &'a mut Element, path: &str) -> &'a mut Element {
    path.split('/')
        .filter(|s| !s.is_empty())
        .fold(element, |el, seg| ensure_child(el, seg))
}

/// Remove the element at `path` if present.
pub fn remove_path(element: &mut Element, path: &str) {
    let (parent, leaf) = match path.rsplit_once('/') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    };
    if leaf.is_empty() {
        return;
    }
    let parent = if parent.is_empty() {
        Some(element)
    } else {
        parent
            .split('/')
            .try_fold(element, |el, seg| el.get_mut_child(seg))
    };
    if let Some(parent) = parent {
        parent
            .children
            .retain(|n| !matches!(n, XMLNode::Element(e) if e.name == leaf));
    }
}

/// Read the current value of a table-driven target.
pub fn read_target(element: &Element, target: Target) -> Option<String> {
    match target {
        Target::Attr(path, attr) => find_path(element, path)?.attributes.get(attr).cloned(),
        Target::Text(path) => find_path(element, path).and_then(text_of),
        Target::Flag(path) => Some(
            if find_path(element, path).is_some() { "on" } else { "off" }.to_string(),
        ),
        Target::Custom | Target::Storage => None,
    }
}

/// Write a table-driven target. An empty value clears it.
pub fn write_target(kind: &str, element: &mut Element, opt: &SubOption, value: &str) -> Result<()> {
    match opt.target {
        Target::Attr(path, attr) => {
            if value.is_empty() {
                if let Some(el) = find_path_mut(element, path) {
                    el.attributes.shift_remove(attr);
                }
            } else {
                ensure_path(element, path)
                    .attributes
                    .insert(attr.to_string(), value.to_string());
            }
        }
        Target::Text(path) => {
            if value.is_empty() && !path.is_empty() {
                remove_path(element, path);
            } else {
                set_text(ensure_path(element, path), value);
            }
        }
        Target::Flag(path) => {
            if parse_bool(value).ok_or_else(|| invalid(kind, opt.name, value))? {
                ensure_path(element, path);
            } else {
                remove_path(element, path);
            }
        }
        Target::Custom | Target::Storage => {}
    }
    Ok(())
}

fn find_path_mut<'a>(element: &'a mut Element, path: &str) -> Option<&'a mut Element> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .try_fold(element, |el, seg| el.get_mut_child(seg))
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: &[SubOption] = &[
        SubOption::custom("path"),
        SubOption::attr("bus", "target", "bus"),
        SubOption::attr("target", "target", "dev").alias(&["target.dev"]),
        SubOption::flag("readonly", "readonly"),
        SubOption::text("serial", "serial"),
        SubOption::custom("order").multi(),
    ];

    #[test]
    fn tokenize_respects_quotes() {
        let toks = tokenize("disk", r#"path="/a,b.img",bus=virtio,serial='x,y'"#).unwrap();
        assert_eq!(toks, ["path=/a,b.img", "bus=virtio", "serial=x,y"]);
    }

    #[test]
    fn tokenize_rejects_open_quote() {
        assert!(tokenize("disk", "path=\"/a").is_err());
    }

    #[test]
    fn positional_and_aliases() {
        let p = parse("disk", TABLE, Some("path"), true, "/tmp/x.img,target.dev=vdb").unwrap();
        assert_eq!(p.get("path"), Some("/tmp/x.img"));
        assert_eq!(p.get("target"), Some("vdb"));
        assert!(!p.clearxml);
    }

    #[test]
    fn unknown_keys_are_collected() {
        let err = parse("disk", TABLE, None, true, "foo=1,bus=sata,bar=2").unwrap_err();
        assert_eq!(err.to_string(), "Unknown --disk options: ['foo', 'bar']");
    }

    #[test]
    fn duplicates_rejected_unless_multi() {
        assert!(parse("disk", TABLE, None, true, "bus=sata,bus=ide").is_err());
        let p = parse("boot", TABLE, Some("order"), false, "hd,cdrom,network").unwrap();
        assert_eq!(p.get("order"), Some("hd,cdrom,network"));
    }

    #[test]
    fn clearxml_only_where_allowed() {
        let p = parse("disk", TABLE, None, true, "clearxml=yes,bus=sata").unwrap();
        assert!(p.clearxml);
        assert!(parse("memory", TABLE, None, false, "clearxml=yes").is_err());
    }

    #[test]
    fn ordered_follows_table() {
        let p = parse("disk", TABLE, None, true, "serial=abc,bus=sata").unwrap();
        let names: Vec<_> = p.ordered(TABLE).map(|(o, _)| o.name).collect();
        assert_eq!(names, ["bus", "serial"]);
    }

    #[test]
    fn write_and_read_targets() {
        let mut disk = Element::new("disk");
        write_target("disk", &mut disk, &TABLE[1], "virtio").unwrap();
        write_target("disk", &mut disk, &TABLE[3], "on").unwrap();
        write_target("disk", &mut disk, &TABLE[4], "SN1").unwrap();
        assert_eq!(read_target(&disk, TABLE[1].target).as_deref(), Some("virtio"));
        assert_eq!(read_target(&disk, TABLE[3].target).as_deref(), Some("on"));
        assert_eq!(read_target(&disk, TABLE[4].target).as_deref(), Some("SN1"));

        write_target("disk", &mut disk, &TABLE[3], "off").unwrap();
        write_target("disk", &mut disk, &TABLE[4], "").unwrap();
        assert_eq!(read_target(&disk, TABLE[3].target).as_deref(), Some("off"));
        assert!(disk.get_child("serial").is_none());

        assert!(write_target("disk", &mut disk, &TABLE[3], "maybe").is_err());
    }
}
