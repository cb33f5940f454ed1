//! Runtime blocks and the BEGIN/END text protocol.
//!
//! A block occurrence is parsed into a fresh set of container values and
//! committed only when its END line is seen: statically for ordinary
//! blocks, at the parsed period index for transient blocks. The reader is
//! a small state machine -- seek BEGIN, consume data lines, require the
//! matching END -- and every failure names the file and line.

use std::collections::BTreeMap;

use mfio_spec::{BlockSpec, DataStructureSpec, ItemKind, StructureKind};

use crate::container::{Container, ContainerValue, IoCtx, Occurrence};
use crate::error::DataError;
use crate::lexer::{Line, LineStream, Token};
use crate::value::parse_int;

/// An ordered, named section of a package file and its data containers.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    containers: BTreeMap<String, Container>,
}

impl Block {
    pub fn new(spec: &BlockSpec) -> Block {
        let containers = spec
            .structures
            .iter()
            .map(|s| (s.name.clone(), Container::new(s, spec.transient)))
            .collect();
        Block {
            name: spec.name.clone(),
            containers,
        }
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers.get_mut(name)
    }

    pub fn is_populated(&self) -> bool {
        self.containers.values().any(|c| c.is_populated())
    }

    /// All stress periods with explicit data anywhere in the block.
    pub fn explicit_periods(&self) -> Vec<u32> {
        let mut periods: Vec<u32> = self
            .containers
            .values()
            .flat_map(|c| c.explicit_periods())
            .collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }

    // ── Reading ─────────────────────────────────────────────────────

    /// Read one `BEGIN ... END` occurrence whose BEGIN line has already
    /// been consumed by the caller.
    pub fn read_occurrence(
        &mut self,
        spec: &BlockSpec,
        header: &Line,
        stream: &mut LineStream,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        let file = stream.file().to_owned();
        let begin_line = header.number;

        let period = self.parse_header(spec, header, &file)?;

        // Parse into a scratch occurrence, commit only at END.
        let mut occ: Occurrence = spec
            .structures
            .iter()
            .map(|s| (s.name.clone(), ContainerValue::empty_for(s)))
            .collect();

        loop {
            let line = stream.next_line()?.ok_or_else(|| {
                DataError::parse(
                    &file,
                    begin_line,
                    1,
                    format!(
                        "block '{}' beginning at line {} has no END before end of file",
                        spec.name, begin_line
                    ),
                )
            })?;
            let first = line.first();
            if first.matches("end") {
                self.check_end(spec, &line, &file)?;
                break;
            }
            if first.matches("begin") {
                return Err(DataError::parse(
                    &file,
                    line.number,
                    first.column,
                    format!(
                        "BEGIN inside block '{}' (started at line {}): missing END",
                        spec.name, begin_line
                    ),
                ));
            }
            read_data_line(&mut occ, spec, &line, stream, ctx, &file)?;
        }

        // Commit.
        if let Some(p) = period {
            for (name, value) in occ {
                if !value.is_set() {
                    continue;
                }
                if let Some(Container::Transient(t)) = self.containers.get_mut(&name) {
                    t.set(p, value)?;
                }
            }
        } else {
            for (name, value) in occ {
                if !value.is_set() {
                    continue;
                }
                if let Some(Container::Static(slot)) = self.containers.get_mut(&name) {
                    *slot = value;
                }
            }
        }
        Ok(())
    }

    fn parse_header(
        &self,
        spec: &BlockSpec,
        header: &Line,
        file: &str,
    ) -> Result<Option<u32>, DataError> {
        if spec.transient {
            let tok = header.tokens.get(2).ok_or_else(|| {
                DataError::parse(
                    file,
                    header.number,
                    1,
                    format!(
                        "block '{}' requires a stress period index after its name",
                        spec.name
                    ),
                )
            })?;
            let n = parse_int(tok, spec.index_item.as_deref().unwrap_or("iper"))?;
            if n < 1 {
                return Err(DataError::InvalidPeriod { period: n });
            }
            if let Some(extra) = header.tokens.get(3) {
                return Err(unexpected_token(file, extra));
            }
            Ok(Some(n as u32))
        } else {
            if let Some(extra) = header.tokens.get(2) {
                return Err(unexpected_token(file, extra));
            }
            Ok(None)
        }
    }

    fn check_end(&self, spec: &BlockSpec, line: &Line, file: &str) -> Result<(), DataError> {
        let name_tok = line.tokens.get(1).ok_or_else(|| {
            DataError::parse(
                file,
                line.number,
                1,
                format!("END without a block name (expected END {})", spec.name),
            )
        })?;
        if !name_tok.matches(&spec.name) {
            return Err(DataError::parse(
                file,
                name_tok.line,
                name_tok.column,
                format!(
                    "mismatched block delimiters: BEGIN {} closed by END {}",
                    spec.name, name_tok.text
                ),
            ));
        }
        // a trailing period index on END lines is tolerated
        Ok(())
    }

    // ── Writing ─────────────────────────────────────────────────────

    /// Render every populated occurrence of this block in spec order.
    /// Never-populated optional blocks are omitted; never-populated
    /// required blocks are an error.
    pub fn write_to(
        &self,
        out: &mut String,
        spec: &BlockSpec,
        ctx: &IoCtx,
        package_name: &str,
    ) -> Result<(), DataError> {
        if spec.transient {
            for period in self.explicit_periods() {
                out.push_str(&format!("BEGIN {} {}\n", spec.name.to_uppercase(), period));
                for s in &spec.structures {
                    if let Some(Container::Transient(t)) = self.containers.get(&s.name) {
                        if let Some(value) = t.explicit_at(period) {
                            if value.is_set() {
                                value.write_to(out, s, ctx)?;
                            }
                        }
                    }
                }
                out.push_str(&format!("END {}\n\n", spec.name.to_uppercase()));
            }
            return Ok(());
        }

        if !self.is_populated() {
            if spec.required() {
                return Err(DataError::MissingRequiredBlock {
                    package: package_name.to_owned(),
                    block: spec.name.clone(),
                });
            }
            return Ok(());
        }

        out.push_str(&format!("BEGIN {}\n", spec.name.to_uppercase()));
        for s in &spec.structures {
            match self.containers.get(&s.name) {
                Some(Container::Static(value)) if value.is_set() => {
                    value.write_to(out, s, ctx)?;
                }
                _ if s.optional => {}
                _ => {
                    return Err(DataError::MissingRequiredData {
                        block: spec.name.clone(),
                        name: s.name.clone(),
                    });
                }
            }
        }
        out.push_str(&format!("END {}\n\n", spec.name.to_uppercase()));
        Ok(())
    }
}

fn unexpected_token(file: &str, token: &Token) -> DataError {
    DataError::parse(
        file,
        token.line,
        token.column,
        format!("unexpected token '{}' in block header", token.text),
    )
}

// ── Data line dispatch ──────────────────────────────────────────────

/// Route one data line to the structure it belongs to: by name tag, by a
/// record's leading keyword, as a row of the block's repeating table, or
/// as the next untagged scalar.
fn read_data_line(
    occ: &mut Occurrence,
    spec: &BlockSpec,
    line: &Line,
    stream: &mut LineStream,
    ctx: &IoCtx,
    file: &str,
) -> Result<(), DataError> {
    let first = line.first();
    let lower = first.lower();

    if let Some((structure, tagged_by_name)) = find_target(spec, &lower) {
        let Some(target) = occ.get_mut(&structure.name) else {
            return Err(unrecognized(file, first, spec));
        };
        match (structure.kind, target) {
            (StructureKind::Scalar, ContainerValue::Scalar(scalar)) => {
                return scalar.read_from(
                    &line.tokens[1..],
                    structure.item(),
                    file,
                    line.number,
                );
            }
            (StructureKind::Array, ContainerValue::Array(array)) => {
                if line.tokens.len() > 1 {
                    return array.read_from(&line.tokens[1..], stream, structure.item(), ctx);
                }
                // control record on the following line
                let control = stream.next_line()?.ok_or_else(|| {
                    DataError::parse(
                        file,
                        line.number,
                        1,
                        format!("missing storage control line for array '{}'", structure.name),
                    )
                })?;
                return array.read_from(&control.tokens, stream, structure.item(), ctx);
            }
            (StructureKind::Table, ContainerValue::Table(table)) => {
                let tokens = if tagged_by_name {
                    &line.tokens[1..]
                } else {
                    &line.tokens[..]
                };
                return table.read_row(tokens, line, structure, ctx, file);
            }
            _ => unreachable!("container variant matches structure kind"),
        }
    }

    // Fallback 1: a row of the block's repeating table.
    if let Some(table_spec) = spec
        .structures
        .iter()
        .find(|s| s.kind == StructureKind::Table && s.repeating)
    {
        if let Some(ContainerValue::Table(table)) = occ.get_mut(&table_spec.name) {
            return table.read_row(&line.tokens, line, table_spec, ctx, file);
        }
    }

    // Fallback 2: positional untagged scalars.
    let untagged: Vec<&DataStructureSpec> = spec
        .structures
        .iter()
        .filter(|s| s.kind == StructureKind::Scalar && !s.item().tagged)
        .collect();
    if !untagged.is_empty() {
        let mut idx = 0usize;
        for tok in &line.tokens {
            // skip structures already filled in this occurrence
            while idx < untagged.len()
                && occ.get(&untagged[idx].name).map(|v| v.is_set()).unwrap_or(false)
            {
                idx += 1;
            }
            let structure = untagged.get(idx).ok_or_else(|| unrecognized(file, tok, spec))?;
            if let Some(ContainerValue::Scalar(scalar)) = occ.get_mut(&structure.name) {
                scalar.read_from(std::slice::from_ref(tok), structure.item(), file, line.number)?;
            }
            idx += 1;
        }
        return Ok(());
    }

    Err(unrecognized(file, first, spec))
}

fn unrecognized(file: &str, token: &Token, spec: &BlockSpec) -> DataError {
    DataError::parse(
        file,
        token.line,
        token.column,
        format!(
            "unrecognized data '{}' in block '{}'",
            token.text, spec.name
        ),
    )
}

/// Match a line-leading token to a structure: by structure name, or by
/// the leading keyword component of a record table.
fn find_target<'s>(spec: &'s BlockSpec, lower: &str) -> Option<(&'s DataStructureSpec, bool)> {
    for s in &spec.structures {
        if s.name == lower {
            return Some((s, true));
        }
    }
    for s in &spec.structures {
        if s.kind == StructureKind::Table && !s.repeating {
            if let Some(first_item) = s.items.first() {
                if matches!(first_item.kind, ItemKind::Keyword) && first_item.name == lower {
                    return Some((s, false));
                }
            }
        }
    }
    None
}
