//! Parser for definition (dfn) sources: the declarative, paragraph-oriented
//! text format enumerating package types, blocks, and data items.
//!
//! One source per package type. Paragraphs are separated by blank lines;
//! `#` starts a comment. The first paragraph is the package header
//! (`package-type`, optional `multi-package` / `extension-blocks`), every
//! later paragraph declares one data item as `key value` lines.
//!
//! Malformed declarations fail fast with [`SpecError::Parse`] naming the
//! offending line; nothing is dropped silently.

use std::collections::BTreeMap;

use crate::error::SpecError;
use crate::shape::ShapeExpr;
use crate::tree::{
    BlockSpec, DataItemSpec, DataStructureSpec, ItemKind, KeystringVariant, PackageSpec,
    StructureKind,
};

// ──────────────────────────────────────────────
// Raw paragraphs
// ──────────────────────────────────────────────

/// One `key value` attribute line inside a paragraph.
struct Attr {
    key: String,
    value: String,
    line: u32,
}

/// A raw item paragraph before assembly into the spec tree.
struct RawItem {
    block: String,
    name: String,
    /// Whitespace-split `type` attribute, lowercased (e.g.
    /// `["double", "precision"]`, `["recarray", "cellid", "head"]`).
    type_words: Vec<String>,
    shape: Option<ShapeExpr>,
    optional: bool,
    tagged: bool,
    in_record: bool,
    block_variable: bool,
    numeric_index: bool,
    ucase: bool,
    default_value: Option<String>,
    valid: Vec<String>,
    description: Option<String>,
    line: u32,
}

fn parse_bool(value: &str, file: &str, line: u32, key: &str) -> Result<bool, SpecError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SpecError::parse(
            file,
            line,
            format!("attribute '{}' expects true/false, got '{}'", key, other),
        )),
    }
}

/// Split a source into paragraphs of attribute lines.
fn split_paragraphs(source: &str) -> Vec<Vec<Attr>> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<Attr> = Vec::new();
    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let text = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let text = text.trim();
        if text.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        let (key, value) = match text.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (text, ""),
        };
        current.push(Attr {
            key: key.to_ascii_lowercase(),
            value: value.to_owned(),
            line: line_no,
        });
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

fn parse_raw_item(attrs: &[Attr], file: &str) -> Result<RawItem, SpecError> {
    let first_line = attrs[0].line;
    let mut item = RawItem {
        block: String::new(),
        name: String::new(),
        type_words: Vec::new(),
        shape: None,
        optional: false,
        tagged: true,
        in_record: false,
        block_variable: false,
        numeric_index: false,
        ucase: false,
        default_value: None,
        valid: Vec::new(),
        description: None,
        line: first_line,
    };
    for attr in attrs {
        match attr.key.as_str() {
            "block" => item.block = attr.value.to_ascii_lowercase(),
            "name" => item.name = attr.value.to_ascii_lowercase(),
            "type" => {
                item.type_words = attr
                    .value
                    .split_whitespace()
                    .map(|w| w.to_ascii_lowercase())
                    .collect();
            }
            "shape" => {
                item.shape = Some(ShapeExpr::parse(&attr.value, file, attr.line)?);
            }
            "optional" => item.optional = parse_bool(&attr.value, file, attr.line, "optional")?,
            "tagged" => item.tagged = parse_bool(&attr.value, file, attr.line, "tagged")?,
            "in_record" => {
                item.in_record = parse_bool(&attr.value, file, attr.line, "in_record")?
            }
            "block_variable" => {
                item.block_variable =
                    parse_bool(&attr.value, file, attr.line, "block_variable")?
            }
            "numeric_index" => {
                item.numeric_index = parse_bool(&attr.value, file, attr.line, "numeric_index")?
            }
            "ucase" => item.ucase = parse_bool(&attr.value, file, attr.line, "ucase")?,
            "default_value" => item.default_value = Some(attr.value.clone()),
            "valid" => {
                item.valid = attr
                    .value
                    .split_whitespace()
                    .map(|w| w.to_ascii_lowercase())
                    .collect();
            }
            "description" => item.description = Some(attr.value.clone()),
            // reader/longname appear in legacy definition sources; they do
            // not affect the data model.
            "reader" | "longname" => {}
            other => {
                return Err(SpecError::parse(
                    file,
                    attr.line,
                    format!("unknown item attribute '{}'", other),
                ));
            }
        }
    }
    if item.block.is_empty() {
        return Err(SpecError::parse(file, first_line, "item missing 'block'"));
    }
    if item.name.is_empty() {
        return Err(SpecError::parse(file, first_line, "item missing 'name'"));
    }
    if item.type_words.is_empty() {
        return Err(SpecError::parse(
            file,
            first_line,
            format!("item '{}' missing 'type'", item.name),
        ));
    }
    Ok(item)
}

// ──────────────────────────────────────────────
// Assembly
// ──────────────────────────────────────────────

/// Pool of in_record component items for one block, looked up by name
/// while resolving record / recarray / keystring component lists.
struct ComponentPool<'a> {
    items: BTreeMap<&'a str, &'a RawItem>,
}

impl<'a> ComponentPool<'a> {
    fn get(&self, name: &str, file: &str, line: u32, owner: &str) -> Result<&'a RawItem, SpecError> {
        self.items.get(name).copied().ok_or_else(|| {
            SpecError::parse(
                file,
                line,
                format!(
                    "'{}' references undeclared in_record component '{}'",
                    owner, name
                ),
            )
        })
    }
}

fn primitive_kind(word: &str) -> Option<ItemKind> {
    match word {
        "keyword" => Some(ItemKind::Keyword),
        "integer" => Some(ItemKind::Integer),
        "double" => Some(ItemKind::Double),
        "string" => Some(ItemKind::String),
        "filename" => Some(ItemKind::Filename),
        _ => None,
    }
}

/// Build a leaf `DataItemSpec` (no record/keystring resolution).
fn leaf_item(raw: &RawItem, kind: ItemKind) -> DataItemSpec {
    DataItemSpec {
        name: raw.name.clone(),
        kind,
        shape: raw.shape.clone(),
        optional: raw.optional,
        tagged: raw.tagged,
        default_value: raw.default_value.clone(),
        numeric_index: raw.numeric_index,
        ucase: raw.ucase,
        valid: raw.valid.clone(),
        description: raw.description.clone(),
    }
}

/// Resolve a raw item into a full `DataItemSpec`, recursing into record
/// and keystring component lists.
fn resolve_item(
    raw: &RawItem,
    pool: &ComponentPool,
    file: &str,
) -> Result<DataItemSpec, SpecError> {
    let head = raw.type_words[0].as_str();
    match head {
        "double" => {
            // `double precision` and bare `double` both mean Double.
            Ok(leaf_item(raw, ItemKind::Double))
        }
        "keyword" | "integer" | "string" | "filename" => match primitive_kind(head) {
            Some(kind) => Ok(leaf_item(raw, kind)),
            None => Err(SpecError::parse(
                file,
                raw.line,
                format!("unknown item type '{}' for '{}'", head, raw.name),
            )),
        },
        "record" => {
            let mut components = Vec::new();
            for comp_name in &raw.type_words[1..] {
                let comp = pool.get(comp_name, file, raw.line, &raw.name)?;
                components.push(resolve_item(comp, pool, file)?);
            }
            if components.is_empty() {
                return Err(SpecError::parse(
                    file,
                    raw.line,
                    format!("record '{}' declares no components", raw.name),
                ));
            }
            Ok(leaf_item(raw, ItemKind::Record(components)))
        }
        "keystring" => {
            let mut variants: Vec<KeystringVariant> = Vec::new();
            for variant_name in &raw.type_words[1..] {
                let comp = pool.get(variant_name, file, raw.line, &raw.name)?;
                let resolved = resolve_item(comp, pool, file)?;
                let items = match resolved.kind {
                    // A record variant contributes its component list; the
                    // record's own name is the discriminator.
                    ItemKind::Record(components) => components,
                    // A bare keyword variant is fully encoded by the
                    // discriminator and has no trailing fields.
                    ItemKind::Keyword => Vec::new(),
                    _ => vec![resolved],
                };
                // Ambiguous keystrings are rejected at registration time
                // rather than resolved first-match at parse time.
                if variants.iter().any(|v| v.name == *variant_name) {
                    return Err(SpecError::parse(
                        file,
                        raw.line,
                        format!(
                            "keystring '{}' declares ambiguous variant '{}' more than once",
                            raw.name, variant_name
                        ),
                    ));
                }
                variants.push(KeystringVariant {
                    name: variant_name.clone(),
                    items,
                });
            }
            if variants.is_empty() {
                return Err(SpecError::parse(
                    file,
                    raw.line,
                    format!("keystring '{}' declares no variants", raw.name),
                ));
            }
            Ok(leaf_item(raw, ItemKind::Keystring(variants)))
        }
        "recarray" => Err(SpecError::parse(
            file,
            raw.line,
            format!(
                "recarray '{}' cannot be a component of another structure",
                raw.name
            ),
        )),
        other => Err(SpecError::parse(
            file,
            raw.line,
            format!("unknown item type '{}' for '{}'", other, raw.name),
        )),
    }
}

/// Turn one free-standing raw item into a data structure.
fn build_structure(
    raw: &RawItem,
    pool: &ComponentPool,
    file: &str,
) -> Result<DataStructureSpec, SpecError> {
    let head = raw.type_words[0].as_str();
    if head == "recarray" {
        let mut columns = Vec::new();
        for comp_name in &raw.type_words[1..] {
            let comp = pool.get(comp_name, file, raw.line, &raw.name)?;
            columns.push(resolve_item(comp, pool, file)?);
        }
        if columns.is_empty() {
            return Err(SpecError::parse(
                file,
                raw.line,
                format!("recarray '{}' declares no columns", raw.name),
            ));
        }
        return Ok(DataStructureSpec {
            name: raw.name.clone(),
            kind: StructureKind::Table,
            items: columns,
            repeating: true,
            optional: raw.optional,
        });
    }

    let item = resolve_item(raw, pool, file)?;
    let kind = match &item.kind {
        ItemKind::Record(_) | ItemKind::Keystring(_) => StructureKind::Table,
        ItemKind::Integer | ItemKind::Double if item.shape.is_some() => StructureKind::Array,
        _ => StructureKind::Scalar,
    };
    let items = match item.kind.clone() {
        // A free-standing record is a one-row table over its components.
        ItemKind::Record(components) => components,
        _ => vec![item],
    };
    Ok(DataStructureSpec {
        name: raw.name.clone(),
        kind,
        items,
        repeating: false,
        optional: raw.optional,
    })
}

// ──────────────────────────────────────────────
// Entry point
// ──────────────────────────────────────────────

/// Parse one definition source into an immutable `PackageSpec`.
pub fn parse_dfn(source: &str, file: &str) -> Result<PackageSpec, SpecError> {
    let paragraphs = split_paragraphs(source);
    if paragraphs.is_empty() {
        return Err(SpecError::parse(file, 1, "empty definition source"));
    }

    // Package header paragraph.
    let mut package_type = String::new();
    let mut multi_package = false;
    let mut extension_blocks = false;
    for attr in &paragraphs[0] {
        match attr.key.as_str() {
            "package-type" => package_type = attr.value.to_ascii_lowercase(),
            "multi-package" => {
                multi_package = parse_bool(&attr.value, file, attr.line, "multi-package")?
            }
            "extension-blocks" => {
                extension_blocks =
                    parse_bool(&attr.value, file, attr.line, "extension-blocks")?
            }
            other => {
                return Err(SpecError::parse(
                    file,
                    attr.line,
                    format!("unknown package attribute '{}'", other),
                ));
            }
        }
    }
    if package_type.is_empty() {
        return Err(SpecError::parse(
            file,
            paragraphs[0][0].line,
            "first paragraph must declare 'package-type'",
        ));
    }

    let raw_items: Vec<RawItem> = paragraphs[1..]
        .iter()
        .map(|p| parse_raw_item(p, file))
        .collect::<Result<_, _>>()?;

    // Block order is declaration order of first appearance.
    let mut block_order: Vec<String> = Vec::new();
    for raw in &raw_items {
        if !block_order.contains(&raw.block) {
            block_order.push(raw.block.clone());
        }
    }

    let mut blocks = Vec::new();
    for block_name in &block_order {
        let members: Vec<&RawItem> = raw_items.iter().filter(|r| &r.block == block_name).collect();
        let pool = ComponentPool {
            items: members
                .iter()
                .filter(|r| r.in_record)
                .map(|r| (r.name.as_str(), *r))
                .collect(),
        };

        let mut transient = false;
        let mut index_item = None;
        let mut structures = Vec::new();
        for raw in &members {
            if raw.block_variable {
                // The recurrence index (e.g. iper) lives in the block
                // header, not among the block's data structures.
                transient = true;
                index_item = Some(raw.name.clone());
                continue;
            }
            if raw.in_record {
                continue;
            }
            let structure = build_structure(raw, &pool, file)?;
            if structures
                .iter()
                .any(|s: &DataStructureSpec| s.name == structure.name)
            {
                return Err(SpecError::parse(
                    file,
                    raw.line,
                    format!(
                        "duplicate data structure '{}' in block '{}'",
                        structure.name, block_name
                    ),
                ));
            }
            structures.push(structure);
        }
        blocks.push(BlockSpec {
            name: block_name.clone(),
            structures,
            transient,
            index_item,
        });
    }

    Ok(PackageSpec {
        package_type,
        blocks,
        multi_package,
        extension_blocks,
    })
}
