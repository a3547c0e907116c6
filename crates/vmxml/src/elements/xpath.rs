//! Raw path edits against the domain document (`--xml`).
//!
//! Paths are relative to `<domain>`: `devices/disk[2]/target@dev`. Indexes
//! are 1-based and default to the first match.

use xmltree::{Element, XMLNode};

use super::{ElementKind, Placement};
use crate::error::{Result, VmXmlError};
use crate::options::{self, ParsedOptions, SubOption};
use crate::snapshot::set_text;

#[derive(Debug, Clone, Copy)]
pub struct XmlPath;

static XML_OPTIONS: &[SubOption] = &[
    SubOption::custom("xpath.set"),
    SubOption::custom("xpath.create"),
    SubOption::custom("xpath.delete"),
];

#[derive(Debug, PartialEq)]
struct PathExpr {
    steps: Vec<(String, usize)>,
    attr: Option<String>,
}

fn bad_path(path: &str, reason: impl Into<String>) -> VmXmlError {
    VmXmlError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

impl PathExpr {
    fn parse(path: &str) -> Result<Self> {
        let trimmed = path
            .trim()
            .trim_start_matches("./")
            .trim_start_matches("/domain/")
            .trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(bad_path(path, "empty path"));
        }

        let mut steps = Vec::new();
        let mut attr = None;
        let segments: Vec<&str> = trimmed.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let (segment, seg_attr) = match segment.split_once('@') {
                Some((s, a)) if last && !a.is_empty() => (s, Some(a)),
                Some(_) => return Err(bad_path(path, "attributes are only allowed at the end")),
                None => (*segment, None),
            };
            attr = seg_attr.map(str::to_string);
            if segment.is_empty() {
                if seg_attr.is_some() {
                    continue;
                }
                return Err(bad_path(path, "empty path segment"));
            }

            let step = match segment.split_once('[') {
                Some((tag, rest)) => {
                    let index = rest
                        .strip_suffix(']')
                        .and_then(|n| n.parse::<usize>().ok())
                        .filter(|n| *n > 0)
                        .ok_or_else(|| bad_path(path, format!("bad index in '{segment}'")))?;
                    (tag.to_string(), index)
                }
                None => (segment.to_string(), 1),
            };
            steps.push(step);
        }
        Ok(Self { steps, attr })
    }
}

fn nth_position(parent: &Element, tag: &str, index: usize) -> Option<usize> {
    parent
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, XMLNode::Element(e) if e.name == tag))
        .map(|(i, _)| i)
        .nth(index - 1)
}

fn count_children(parent: &Element, tag: &str) -> usize {
    parent
        .children
        .iter()
        .filter(|n| matches!(n, XMLNode::Element(e) if e.name == tag))
        .count()
}

fn child_at(parent: &mut Element, pos: usize) -> &mut Element {
    match &mut parent.children[pos] {
        XMLNode::Element(e) => e,
        _ => unreachable!("position was taken from an element node"),
    }
}

/// Walk `steps`, creating the next sibling when an index is one past the end.
fn walk_create<'a>(root: &'a mut Element, raw: &str, steps: &[(String, usize)]) -> Result<&'a mut Element> {
    let mut current = root;
    for (tag, index) in steps {
        let pos = match nth_position(current, tag, *index) {
            Some(pos) => pos,
            None if count_children(current, tag) + 1 == *index => {
                current.children.push(XMLNode::Element(Element::new(tag)));
                current.children.len() - 1
            }
            None => return Err(bad_path(raw, format!("no element {tag}[{index}] to extend"))),
        };
        current = child_at(current, pos);
    }
    Ok(current)
}

fn walk<'a>(root: &'a mut Element, steps: &[(String, usize)]) -> Option<&'a mut Element> {
    let mut current = root;
    for (tag, index) in steps {
        let pos = nth_position(current, tag, *index)?;
        current = child_at(current, pos);
    }
    Some(current)
}

fn set(root: &mut Element, path: &str, value: &str) -> Result<()> {
    let expr = PathExpr::parse(path)?;
    let target = walk_create(root, path, &expr.steps)?;
    match expr.attr {
        Some(attr) => {
            target.attributes.insert(attr, value.to_string());
        }
        None => set_text(target, value),
    }
    Ok(())
}

fn create(root: &mut Element, path: &str) -> Result<()> {
    let expr = PathExpr::parse(path)?;
    let target = walk_create(root, path, &expr.steps)?;
    if let Some(attr) = expr.attr {
        target.attributes.entry(attr).or_default();
    }
    Ok(())
}

fn delete(root: &mut Element, path: &str) -> Result<()> {
    let expr = PathExpr::parse(path)?;
    if let Some(attr) = &expr.attr {
        if let Some(target) = walk(root, &expr.steps) {
            target.attributes.shift_remove(attr);
        }
        return Ok(());
    }
    let Some(((tag, index), parents)) = expr.steps.split_last() else {
        return Err(bad_path(path, "cannot delete the domain itself"));
    };
    if let Some(parent) = walk(root, parents) {
        if let Some(pos) = nth_position(parent, tag, *index) {
            parent.children.remove(pos);
        }
    }
    Ok(())
}

impl ElementKind for XmlPath {
    fn cli_name(&self) -> &'static str {
        "xml"
    }

    fn xml_tag(&self) -> &'static str {
        "domain"
    }

    fn placement(&self) -> Placement {
        Placement::Root
    }

    fn options(&self) -> &'static [SubOption] {
        XML_OPTIONS
    }

    fn edit_only(&self) -> bool {
        true
    }

    fn apply_option_string(&self, element: &mut Element, input: &str) -> Result<ParsedOptions> {
        for token in options::tokenize("xml", input)? {
            let Some((key, rest)) = token.split_once('=') else {
                create(element, &token)?;
                continue;
            };
            match key {
                "xpath.set" => {
                    let (path, value) = rest.split_once('=').ok_or_else(|| {
                        VmXmlError::OptionSyntax {
                            kind: "xml".to_string(),
                            input: input.to_string(),
                            reason: "xpath.set expects PATH=VALUE".to_string(),
                        }
                    })?;
                    set(element, path, value)?;
                }
                "xpath.create" => create(element, rest)?,
                "xpath.delete" => delete(element, rest)?,
                path => set(element, path, rest)?,
            }
        }
        Ok(ParsedOptions::unstructured(input))
    }
}
